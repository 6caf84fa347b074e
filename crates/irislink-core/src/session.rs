//! Device session
//!
//! A [`Session`] owns the transport for its whole life and exposes the typed
//! device operations. It also carries the one piece of recovery policy in the
//! crate: OpenIris firmware in UVC mode is known to crash or drop off USB while
//! scanning for Wi-Fi, so a communication failure during `scan_wifi` closes the
//! port, waits out a cooldown, and reconnects once. The scan itself is not
//! retried; the caller gets an empty list and the reconnect outcome.
//!
//! ```text
//! Disconnected --connect--> Connected --scan_wifi--> Scanning
//!      ^                        ^                       |
//!      |                        +------ ok / device ----+
//!      +-------- crash, reconnect failed ---------------+
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::thread;
use std::time::Duration;

use crate::protocol::transaction::TrafficCounters;
use crate::protocol::{
    Command, DecodedResponse, DeviceMode, ProtocolError, TransactionRunner, Transport,
    DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL_MS,
};
use crate::wifi::{networks_from_results, WiFiNetwork};

/// Session configuration
///
/// Timeouts are empirical values from working with real devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Liveness probe right after opening the port
    pub connect_probe_timeout_ms: u64,
    /// Liveness probe ahead of a Wi-Fi scan
    pub scan_probe_timeout_ms: u64,
    /// Ordinary commands (mode query, mode switch, raw commands)
    pub command_timeout_ms: u64,
    /// Wi-Fi scan, when the caller does not pick one
    pub scan_timeout_ms: u64,
    /// Added to every scan timeout
    pub scan_grace_ms: u64,
    /// Joining a network
    pub connect_wifi_timeout_ms: u64,
    /// Wait between closing a crashed port and reopening it
    pub reconnect_cooldown_ms: u64,
    /// Sleep between empty polls while a reply accumulates
    pub poll_interval_ms: u64,
    /// Also treat a scan timeout as a suspected crash
    pub reconnect_on_timeout: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            connect_probe_timeout_ms: 5000,
            scan_probe_timeout_ms: 3000,
            command_timeout_ms: 10_000,
            scan_timeout_ms: 15_000,
            scan_grace_ms: 5000,
            connect_wifi_timeout_ms: 30_000,
            reconnect_cooldown_ms: 2000,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            reconnect_on_timeout: false,
        }
    }
}

impl SessionConfig {
    /// Default configuration for `port_name`
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No open transport
    Disconnected,
    /// Transport open, ready for commands
    Connected,
    /// A Wi-Fi scan is in flight. Only held for the duration of
    /// [`Session::scan_wifi`], which borrows the session mutably, so
    /// [`Session::state`] never reports it to a caller.
    Scanning,
}

/// Result of the liveness probe run by `connect()`
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeStatus {
    /// The device answered `get_device_mode` with these results
    Responsive(Value),
    /// The device did not answer cleanly. The port is still open and other
    /// commands may work.
    Unresponsive(ProtocolError),
}

/// Outcome of a successful `connect()`
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectReport {
    /// Port that was opened
    pub port: String,
    /// Liveness probe result
    pub probe: ProbeStatus,
}

impl ConnectReport {
    /// Whether the probe got an answer
    pub fn is_responsive(&self) -> bool {
        matches!(self.probe, ProbeStatus::Responsive(_))
    }
}

/// What happened when recovering from a suspected crash
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectOutcome {
    /// The port reopened
    Reconnected(ConnectReport),
    /// The port could not be reopened; the device needs a manual reset and the
    /// session is left disconnected
    ManualResetRequired(ProtocolError),
}

/// Outcome of `scan_wifi`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanReport {
    /// Networks found; empty on any failure
    pub networks: Vec<WiFiNetwork>,
    /// Why the scan produced nothing, if it failed
    pub error: Option<ProtocolError>,
    /// Set when the scan looked like a device crash and a reconnect was tried
    pub recovery: Option<ReconnectOutcome>,
}

impl ScanReport {
    fn failed(error: ProtocolError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// A connection to one OpenIris device
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
    runner: TransactionRunner,
    last_known_mode: Option<DeviceMode>,
}

impl<T: Transport> Session<T> {
    /// Create a disconnected session
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let runner = TransactionRunner::new(SessionConfig::ms(config.poll_interval_ms));
        Self {
            transport,
            config,
            state: SessionState::Disconnected,
            runner,
            last_known_mode: None,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration in use
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Mode the device last reported or was switched to. Advisory only.
    pub fn last_known_mode(&self) -> Option<DeviceMode> {
        self.last_known_mode
    }

    /// Cumulative traffic counters
    pub fn counters(&self) -> TrafficCounters {
        self.runner.counters()
    }

    /// Open the transport and probe the device.
    ///
    /// A failed probe does not fail the connect; it is reported in the
    /// returned [`ConnectReport`].
    pub fn connect(&mut self) -> Result<ConnectReport, ProtocolError> {
        if self.state != SessionState::Disconnected {
            return Err(ProtocolError::AlreadyConnected);
        }

        let port = self.config.port_name.clone();
        self.transport.open(&port, self.config.baud_rate)?;
        self.state = SessionState::Connected;
        tracing::info!(port = %port, baud_rate = self.config.baud_rate, "connected");

        let probe = match self.query_mode(SessionConfig::ms(self.config.connect_probe_timeout_ms)) {
            DecodedResponse::Success(results) => ProbeStatus::Responsive(results),
            DecodedResponse::Error(e) => {
                tracing::warn!(
                    port = %port,
                    error = %e,
                    "device did not answer the liveness probe"
                );
                ProbeStatus::Unresponsive(e)
            }
        };

        Ok(ConnectReport { port, probe })
    }

    /// Close the transport
    pub fn disconnect(&mut self) {
        if let Err(e) = self.transport.close() {
            tracing::debug!(error = %e, "error closing transport");
        }
        if self.state != SessionState::Disconnected {
            tracing::info!(port = %self.config.port_name, "disconnected");
        }
        self.state = SessionState::Disconnected;
    }

    /// Ask the device which mode it is in
    pub fn get_device_mode(&mut self) -> DecodedResponse {
        self.query_mode(SessionConfig::ms(self.config.command_timeout_ms))
    }

    /// Switch the device to `mode`. The firmware applies it on its next boot.
    pub fn switch_mode(&mut self, mode: DeviceMode) -> DecodedResponse {
        let decoded = self.execute(
            &Command::switch_mode(mode),
            SessionConfig::ms(self.config.command_timeout_ms),
        );
        if !decoded.is_error() {
            self.last_known_mode = Some(mode);
        }
        decoded
    }

    /// Join a Wi-Fi network; `password` is left out for open networks
    pub fn connect_wifi(&mut self, ssid: &str, password: Option<&str>) -> DecodedResponse {
        self.execute(
            &Command::connect_wifi(ssid, password),
            SessionConfig::ms(self.config.connect_wifi_timeout_ms),
        )
    }

    /// Pause or resume streaming
    pub fn pause(&mut self, paused: bool) -> DecodedResponse {
        self.execute(
            &Command::pause(paused),
            SessionConfig::ms(self.config.command_timeout_ms),
        )
    }

    /// Read the device serial number
    pub fn get_serial(&mut self) -> DecodedResponse {
        self.execute(
            &Command::get_serial(),
            SessionConfig::ms(self.config.command_timeout_ms),
        )
    }

    /// Send any command, known to this crate or not.
    ///
    /// `timeout` defaults to the ordinary command timeout.
    pub fn send_command(
        &mut self,
        command: &Command,
        timeout: Option<Duration>,
    ) -> DecodedResponse {
        let timeout = timeout.unwrap_or(SessionConfig::ms(self.config.command_timeout_ms));
        self.execute(command, timeout)
    }

    /// Scan for Wi-Fi networks.
    ///
    /// Probes the device first and gives up if it does not answer. A
    /// communication failure during the scan is treated as a device crash:
    /// the port is closed, reopened once after the cooldown, and the
    /// reconnect outcome is attached to the (empty) report.
    pub fn scan_wifi(&mut self, timeout: Option<Duration>) -> ScanReport {
        if self.state == SessionState::Disconnected {
            return ScanReport::failed(ProtocolError::NotConnected);
        }

        if let DecodedResponse::Error(e) =
            self.query_mode(SessionConfig::ms(self.config.scan_probe_timeout_ms))
        {
            tracing::warn!(error = %e, "device not responsive, skipping Wi-Fi scan");
            return ScanReport::failed(e);
        }

        let timeout = timeout
            .unwrap_or(SessionConfig::ms(self.config.scan_timeout_ms))
            .saturating_add(SessionConfig::ms(self.config.scan_grace_ms));

        self.state = SessionState::Scanning;
        let decoded = self
            .runner
            .run(&mut self.transport, &Command::scan_wifi(), timeout);
        self.state = SessionState::Connected;

        match decoded {
            DecodedResponse::Success(results) => {
                let networks = networks_from_results(&results);
                tracing::debug!(count = networks.len(), "Wi-Fi scan complete");
                ScanReport {
                    networks,
                    ..ScanReport::default()
                }
            }
            DecodedResponse::Error(e) if self.is_crash_signal(&e) => {
                tracing::warn!(error = %e, "Wi-Fi scan lost the device, suspecting a crash");
                let recovery = self.recover();
                ScanReport {
                    networks: Vec::new(),
                    error: Some(ProtocolError::SuspectedCrash(e.to_string())),
                    recovery: Some(recovery),
                }
            }
            DecodedResponse::Error(e) => {
                tracing::warn!(error = %e, "Wi-Fi scan failed");
                ScanReport::failed(e)
            }
        }
    }

    fn is_crash_signal(&self, err: &ProtocolError) -> bool {
        err.is_communication_failure()
            || (self.config.reconnect_on_timeout && *err == ProtocolError::Timeout)
    }

    /// Close, cool down, and reconnect exactly once
    fn recover(&mut self) -> ReconnectOutcome {
        self.disconnect();
        thread::sleep(SessionConfig::ms(self.config.reconnect_cooldown_ms));
        match self.connect() {
            Ok(report) => {
                tracing::info!(port = %report.port, "reconnected after suspected crash");
                ReconnectOutcome::Reconnected(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "reconnect failed, device may need a manual reset");
                ReconnectOutcome::ManualResetRequired(e)
            }
        }
    }

    fn query_mode(&mut self, timeout: Duration) -> DecodedResponse {
        let decoded = self.execute(&Command::get_device_mode(), timeout);
        if let Some(mode) = decoded.results().and_then(DeviceMode::from_results) {
            self.last_known_mode = Some(mode);
        }
        decoded
    }

    fn execute(&mut self, command: &Command, timeout: Duration) -> DecodedResponse {
        if self.state == SessionState::Disconnected {
            return DecodedResponse::Error(ProtocolError::NotConnected);
        }
        self.runner.run(&mut self.transport, command, timeout)
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::{MockTransport, Reply};
    use serde_json::json;

    const MODE_WIFI: &str = r#"{"results": ["{\"result\":\"{\\\"mode\\\":\\\"wifi\\\"}\"}"]}"#;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            port_name: "/dev/ttyACM0".into(),
            connect_probe_timeout_ms: 20,
            scan_probe_timeout_ms: 20,
            command_timeout_ms: 20,
            scan_timeout_ms: 20,
            scan_grace_ms: 0,
            connect_wifi_timeout_ms: 20,
            reconnect_cooldown_ms: 0,
            poll_interval_ms: 1,
            ..SessionConfig::default()
        }
    }

    fn session(replies: impl IntoIterator<Item = Reply>) -> Session<MockTransport> {
        Session::new(MockTransport::new().with_replies(replies), fast_config())
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.reconnect_cooldown_ms, 2000);
        assert!(!config.reconnect_on_timeout);
    }

    #[test]
    fn test_config_partial_json() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"port_name": "COM5", "scan_grace_ms": 1000}"#).unwrap();
        assert_eq!(config.port_name, "COM5");
        assert_eq!(config.scan_grace_ms, 1000);
        assert_eq!(config.command_timeout_ms, 10_000);
    }

    #[test]
    fn test_connect_with_responsive_probe() {
        let mut s = session([Reply::text(MODE_WIFI)]);
        let report = s.connect().unwrap();
        assert!(report.is_responsive());
        assert_eq!(report.port, "/dev/ttyACM0");
        assert_eq!(s.state(), SessionState::Connected);
        assert_eq!(s.last_known_mode(), Some(DeviceMode::Wifi));
    }

    #[test]
    fn test_connect_with_silent_probe_still_connects() {
        let mut s = session([Reply::Silent]);
        let report = s.connect().unwrap();
        assert_eq!(report.probe, ProbeStatus::Unresponsive(ProtocolError::Timeout));
        assert_eq!(s.state(), SessionState::Connected);
    }

    #[test]
    fn test_connect_twice() {
        let mut s = session([Reply::Silent]);
        s.connect().unwrap();
        assert_eq!(s.connect(), Err(ProtocolError::AlreadyConnected));
    }

    #[test]
    fn test_open_failure_leaves_disconnected() {
        let mut s = session([]);
        s.transport_mut().fail_next_opens(1);
        assert!(s.connect().is_err());
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_commands_require_connection() {
        let mut s = session([]);
        assert_eq!(
            s.get_device_mode(),
            DecodedResponse::Error(ProtocolError::NotConnected)
        );
        assert!(s.scan_wifi(None).error == Some(ProtocolError::NotConnected));
    }

    #[test]
    fn test_switch_mode_updates_cache() {
        let mut s = session([Reply::Silent, Reply::text(r#"{"results": ["ok"]}"#)]);
        s.connect().unwrap();
        assert_eq!(s.switch_mode(DeviceMode::Uvc), DecodedResponse::Success(json!("ok")));
        assert_eq!(s.last_known_mode(), Some(DeviceMode::Uvc));
        assert_eq!(
            s.transport().written()[1],
            "{\"commands\":[{\"command\":\"switch_mode\",\"data\":{\"mode\":\"uvc\"}}]}\n"
        );
    }

    #[test]
    fn test_device_error_passes_through() {
        let mut s = session([Reply::Silent, Reply::text(r#"{"error": "Invalid SSID"}"#)]);
        s.connect().unwrap();
        assert_eq!(
            s.connect_wifi("", Some("pw")),
            DecodedResponse::Error(ProtocolError::Device("Invalid SSID".into()))
        );
        assert_eq!(s.state(), SessionState::Connected);
    }

    #[test]
    fn test_scan_skipped_when_probe_fails() {
        let mut s = session([Reply::Silent, Reply::Silent]);
        s.connect().unwrap();
        let report = s.scan_wifi(None);
        assert!(report.networks.is_empty());
        assert_eq!(report.error, Some(ProtocolError::Timeout));
        assert!(report.recovery.is_none());
        // Only the two probes were sent, never the scan
        assert_eq!(s.transport().written().len(), 2);
    }

    #[test]
    fn test_scan_timeout_does_not_reconnect_by_default() {
        let mut s = session([Reply::Silent, Reply::text(MODE_WIFI), Reply::Silent]);
        s.connect().unwrap();
        let report = s.scan_wifi(None);
        assert_eq!(report.error, Some(ProtocolError::Timeout));
        assert!(report.recovery.is_none());
        assert_eq!(s.transport().open_calls(), 1);
    }

    #[test]
    fn test_scan_timeout_reconnects_when_configured() {
        let mut config = fast_config();
        config.reconnect_on_timeout = true;
        let transport = MockTransport::new().with_replies([
            Reply::Silent,
            Reply::text(MODE_WIFI),
            Reply::Silent,
        ]);
        let mut s = Session::new(transport, config);
        s.connect().unwrap();
        let report = s.scan_wifi(None);
        assert!(matches!(report.recovery, Some(ReconnectOutcome::Reconnected(_))));
        assert_eq!(s.transport().open_calls(), 2);
    }

    #[test]
    fn test_scan_with_unbounded_timeout() {
        let mut s = session([
            Reply::text(MODE_WIFI),
            Reply::text(MODE_WIFI),
            Reply::text(r#"{"results": [{"ssid": "home", "channel": 6, "authmode": 3}]}"#),
        ]);
        s.connect().unwrap();
        let report = s.scan_wifi(Some(Duration::MAX));
        assert_eq!(report.error, None);
        assert_eq!(report.networks.len(), 1);
        assert_eq!(report.networks[0].ssid, "home");
        assert_eq!(s.state(), SessionState::Connected);
    }

    #[test]
    fn test_failed_reconnect_leaves_disconnected() {
        let mut s = session([Reply::Silent, Reply::text(MODE_WIFI), Reply::Disconnect]);
        s.connect().unwrap();
        s.transport_mut().fail_next_opens(1);
        let report = s.scan_wifi(None);
        assert!(matches!(
            report.recovery,
            Some(ReconnectOutcome::ManualResetRequired(_))
        ));
        assert!(matches!(report.error, Some(ProtocolError::SuspectedCrash(_))));
        assert_eq!(s.state(), SessionState::Disconnected);
    }
}
