//! Serial port handling
//!
//! Provides the CDC serial port implementation of [`Transport`] and port
//! discovery.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{Read, Write};
use std::time::Duration;

use super::{PortInfo, PortLocator, ProtocolError, Transport};

/// Espressif USB vendor ID
pub const ESPRESSIF_VID: u16 = 0x303a;

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => (
                Some(usb_info.vid),
                Some(usb_info.pid),
                usb_info.manufacturer,
                usb_info.product,
            ),
            SerialPortType::BluetoothPort => (None, None, None, Some("Bluetooth".to_string())),
            _ => (None, None, None, None),
        };

        Self {
            description: product.unwrap_or_else(|| info.port_name.clone()),
            name: info.port_name,
            vid,
            pid,
            manufacturer,
        }
    }
}

/// Helper used to sort port names so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    match serialport::available_ports() {
        Ok(found) => {
            for info in found {
                let p = PortInfo::from(info);
                map.entry(p.name.clone()).or_insert(p);
            }
        }
        Err(e) => tracing::debug!("serial port enumeration failed: {e}"),
    }

    // Linux-only: CDC ACM nodes sometimes exist before udev has tagged them
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Whether a port looks like an OpenIris CDC endpoint.
///
/// Matches generic CDC/ACM descriptions, the Espressif vendor ID, or an
/// OpenIris/ESP32 marker on a COM-style port.
pub fn is_cdc_candidate(port: &PortInfo) -> bool {
    const CDC_MARKERS: [&str; 5] = ["cdc", "acm", "usb serial", "virtual com", "composite device"];
    const DEVICE_MARKERS: [&str; 3] = ["openiris", "esp32", "espressif"];

    let description = port.description.to_lowercase();
    let manufacturer = port
        .manufacturer
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    let is_cdc = CDC_MARKERS.iter().any(|m| description.contains(m));
    let is_device = DEVICE_MARKERS
        .iter()
        .any(|m| description.contains(m) || manufacturer.contains(m));
    let vid_match = port.vid == Some(ESPRESSIF_VID);

    is_cdc || vid_match || (is_device && port.name.to_lowercase().contains("com"))
}

/// [`PortLocator`] backed by the OS serial port list
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortLocator;

impl PortLocator for SerialPortLocator {
    fn list(&self) -> Vec<PortInfo> {
        list_ports()
    }
}

/// CDC virtual serial port transport
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    read_timeout: Duration,
}

impl SerialTransport {
    /// Create a closed transport
    pub fn new() -> Self {
        Self {
            port: None,
            // Reads only ever ask for bytes already buffered, so this bounds
            // a misbehaving driver rather than normal operation.
            read_timeout: Duration::from_millis(100),
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, ProtocolError> {
        self.port.as_mut().ok_or(ProtocolError::NotConnected)
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Configure a serial port for CDC communication
fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    // Standard 8N1 configuration
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::io("configure", e))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::io("configure", e))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::io("configure", e))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::io("configure", e))?;

    // The firmware logs line state changes and some hosts only deliver data
    // once DTR is up.
    if let Err(e) = port.write_data_terminal_ready(true) {
        tracing::debug!("failed to set DTR high: {e} (continuing)");
    }
    if let Err(e) = port.write_request_to_send(true) {
        tracing::debug!("failed to set RTS high: {e} (continuing)");
    }

    Ok(())
}

impl Transport for SerialTransport {
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<(), ProtocolError> {
        let mut handle = serialport::new(port, baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(port.to_string()),
                _ => ProtocolError::io("open", e),
            })?;
        configure_port(handle.as_mut())?;
        tracing::debug!(port, baud_rate, "serial port opened");
        self.port = Some(handle);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.port_mut()?
            .write_all(data)
            .map_err(|e| ProtocolError::io("write", e))
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        let port = self.port_mut()?;
        Write::flush(port).map_err(|e| ProtocolError::io("flush", e))
    }

    fn bytes_available(&mut self) -> Result<usize, ProtocolError> {
        self.port_mut()?
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| ProtocolError::io("poll", e))
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>, ProtocolError> {
        let port = self.port_mut()?;
        let mut buf = vec![0u8; max];
        match Read::read(port, &mut buf) {
            // A CDC port that reports data and then reads nothing has gone away
            Ok(0) if max > 0 => Err(ProtocolError::io("read", "end of stream")),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(ProtocolError::io("read", e)),
        }
    }

    fn reset_input_buffer(&mut self) -> Result<(), ProtocolError> {
        self.port_mut()?
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| ProtocolError::io("reset input", e))
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        if self.port.take().is_some() {
            tracing::debug!("serial port closed");
        }
        Ok(())
    }
}
