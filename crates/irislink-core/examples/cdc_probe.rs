//! OpenIris CDC Probe
//!
//! Finds OpenIris CDC serial ports, connects to one, and reports the device
//! mode. Optionally runs a Wi-Fi scan.
//!
//! Usage:
//!   cargo run --example cdc_probe -- [OPTIONS] [PORT]
//!
//! Options:
//!   --scan            Run a Wi-Fi scan (may crash firmware in UVC mode)
//!   --timeout MS      Scan timeout in ms (default: 15000)
//!
//! Set `RUST_LOG=irislink_core=debug` to see every request and reply.

use anyhow::{bail, Context};
use irislink_core::prelude::*;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut port_name: Option<String> = None;
    let mut scan = false;
    let mut scan_timeout = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--scan" => scan = true,
            "--timeout" | "-t" => {
                let ms: u64 = args
                    .next()
                    .context("--timeout needs a value")?
                    .parse()
                    .context("--timeout must be milliseconds")?;
                scan_timeout = Some(Duration::from_millis(ms));
            }
            other if !other.starts_with('-') => port_name = Some(other.to_string()),
            other => bail!("unknown option: {other}"),
        }
    }

    let port_name = match port_name {
        Some(name) => name,
        None => {
            let candidates: Vec<PortInfo> = SerialPortLocator
                .list()
                .into_iter()
                .filter(irislink_core::protocol::is_cdc_candidate)
                .collect();
            for port in &candidates {
                println!("candidate: {} - {}", port.name, port.description);
            }
            match candidates.into_iter().next() {
                Some(port) => port.name,
                None => bail!("no CDC serial ports found"),
            }
        }
    };

    let mut session = Session::new(SerialTransport::new(), SessionConfig::for_port(&port_name));
    let report = session
        .connect()
        .with_context(|| format!("opening {port_name}"))?;

    match &report.probe {
        ProbeStatus::Responsive(results) => println!("device mode: {results}"),
        ProbeStatus::Unresponsive(e) => println!("device did not answer probe: {e}"),
    }

    if scan {
        let report = session.scan_wifi(scan_timeout);
        if let Some(e) = &report.error {
            println!("scan failed: {e}");
        }
        match &report.recovery {
            Some(ReconnectOutcome::Reconnected(_)) => println!("reconnected after device crash"),
            Some(ReconnectOutcome::ManualResetRequired(e)) => {
                println!("reconnect failed ({e}); reset the device manually")
            }
            None => {}
        }
        for net in &report.networks {
            println!(
                "{:20} {:15} {:4} dBm  ch {}",
                net.ssid,
                net.security.label(),
                net.rssi,
                net.channel
            );
        }
    }

    session.disconnect();
    Ok(())
}
