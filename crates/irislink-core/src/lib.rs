//! # IrisLink Core Library
//!
//! Host-side driver for OpenIris devices reached over a USB CDC virtual
//! serial port.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Command encoding for the line-oriented JSON request envelope
//! - Response framing over a pollable byte stream
//! - Decoding of pretty-printed and nested string-encoded JSON replies
//! - A session with typed operations and crash recovery around Wi-Fi scans
//!
//! ## Example
//!
//! ```rust,ignore
//! use irislink_core::{protocol::SerialTransport, session::{Session, SessionConfig}};
//!
//! let config = SessionConfig::for_port("/dev/ttyACM0");
//! let mut session = Session::new(SerialTransport::new(), config);
//! let report = session.connect()?;
//! println!("probe: {:?}", report.probe);
//!
//! let scan = session.scan_wifi(None);
//! for net in &scan.networks {
//!     println!("{} ({}) {} dBm", net.ssid, net.security.label(), net.rssi);
//! }
//! ```

pub mod protocol;
pub mod session;
pub mod wifi;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        Command, DecodedResponse, DeviceMode, PortInfo, PortLocator, ProtocolError,
        SerialPortLocator, SerialTransport, Transport,
    };
    pub use crate::session::{
        ConnectReport, ProbeStatus, ReconnectOutcome, ScanReport, Session, SessionConfig,
        SessionState,
    };
    pub use crate::wifi::{SecurityMode, WiFiNetwork};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
