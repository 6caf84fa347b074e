//! OpenIris Command Protocol
//!
//! Implements the JSON command/response protocol spoken by OpenIris firmware
//! on its USB CDC virtual serial port.
//!
//! Requests are single-line JSON envelopes terminated by `\n`. Replies carry no
//! length header and may arrive pretty-printed across several writes, so a
//! reply is considered framed once the accumulated bytes end with `}`.

pub mod commands;
pub mod decoder;
mod error;
pub mod frame;
pub mod mock;
pub mod serial;
pub mod transaction;
pub mod transport;

pub use commands::{Command, DeviceMode};
pub use decoder::DecodedResponse;
pub use error::ProtocolError;
pub use frame::{FrameAccumulator, FrameOutcome, RawResponse};
pub use serial::{is_cdc_candidate, list_ports, SerialPortLocator, SerialTransport};
pub use transaction::TransactionRunner;
pub use transport::{PortInfo, PortLocator, Transport};

/// Default baud rate for the CDC port
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Interval between polls of the transport while a reply is accumulating
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Longest request line (including the `\n` terminator) the firmware buffers
/// before dispatching. Its CDC receive buffer is 512 bytes with one byte kept
/// for the terminator.
pub const MAX_REQUEST_LEN: usize = 511;
