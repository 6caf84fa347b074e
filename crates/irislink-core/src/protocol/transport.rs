//! Transport abstraction
//!
//! The engine talks to the device through [`Transport`], a reopenable,
//! pollable byte stream. [`SerialTransport`](super::SerialTransport) drives a
//! real CDC port; [`MockTransport`](super::mock::MockTransport) scripts a
//! device for tests.

use super::ProtocolError;

/// Pollable byte stream to the device.
///
/// Reads never block: callers ask how many bytes are waiting and read at most
/// that many. A transport may be closed and opened again, which is how the
/// session recovers from a device that dropped off the bus.
pub trait Transport {
    /// Open the stream to `port` at `baud_rate`
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<(), ProtocolError>;

    /// Whether the stream is currently open
    fn is_open(&self) -> bool;

    /// Write all of `data`
    fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError>;

    /// Push written bytes out to the device
    fn flush(&mut self) -> Result<(), ProtocolError>;

    /// Number of received bytes ready to read
    fn bytes_available(&mut self) -> Result<usize, ProtocolError>;

    /// Read up to `max` bytes that are already available
    fn read(&mut self, max: usize) -> Result<Vec<u8>, ProtocolError>;

    /// Throw away everything received but not yet read
    fn reset_input_buffer(&mut self) -> Result<(), ProtocolError>;

    /// Close the stream. Closing a closed transport is a no-op.
    fn close(&mut self) -> Result<(), ProtocolError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<(), ProtocolError> {
        (**self).open(port, baud_rate)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        (**self).flush()
    }

    fn bytes_available(&mut self) -> Result<usize, ProtocolError> {
        (**self).bytes_available()
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>, ProtocolError> {
        (**self).read(max)
    }

    fn reset_input_buffer(&mut self) -> Result<(), ProtocolError> {
        (**self).reset_input_buffer()
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        (**self).close()
    }
}

/// Information about an available port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// Human readable description
    pub description: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,
}

impl PortInfo {
    /// A port with nothing known beyond its name
    pub fn bare(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            vid: None,
            pid: None,
            manufacturer: None,
        }
    }
}

/// Source of candidate ports
pub trait PortLocator {
    /// List the ports visible to the host
    fn list(&self) -> Vec<PortInfo>;
}
