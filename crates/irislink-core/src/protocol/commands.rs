//! Protocol commands
//!
//! Defines the command value sent to the device and its wire encoding.
//!
//! A request is a single JSON line holding exactly one command:
//!
//! ```text
//! {"commands":[{"command":"switch_mode","data":{"mode":"wifi"}}]}\n
//! ```
//!
//! Command names are opaque to the engine. Names the firmware does not know
//! are forwarded unchanged and come back as device errors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::{ProtocolError, MAX_REQUEST_LEN};

/// Command names understood by current OpenIris firmware
pub mod names {
    pub const GET_DEVICE_MODE: &str = "get_device_mode";
    pub const SWITCH_MODE: &str = "switch_mode";
    pub const SCAN_WIFI: &str = "scan_wifi";
    pub const CONNECT_WIFI: &str = "connect_wifi";
    pub const PAUSE: &str = "pause";
    pub const GET_SERIAL: &str = "get_serial";
}

/// A single named command with optional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    data: Option<Map<String, Value>>,
}

impl Command {
    /// Create a command that takes no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    /// Create a command with a pre-built parameter map
    pub fn with_data(name: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            data: Some(data),
        }
    }

    /// Create a command from any serializable parameter value.
    ///
    /// The value must serialize to a JSON object.
    pub fn with_params<P: Serialize>(
        name: impl Into<String>,
        params: &P,
    ) -> Result<Self, ProtocolError> {
        match serde_json::to_value(params) {
            Ok(Value::Object(map)) => Ok(Self::with_data(name, map)),
            Ok(other) => Err(ProtocolError::Encoding(format!(
                "command parameters must be a JSON object, got {other}"
            ))),
            Err(e) => Err(ProtocolError::Encoding(e.to_string())),
        }
    }

    /// Command name as sent on the wire
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters, if any
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    pub fn get_device_mode() -> Self {
        Self::new(names::GET_DEVICE_MODE)
    }

    pub fn switch_mode(mode: DeviceMode) -> Self {
        let mut data = Map::new();
        data.insert("mode".into(), Value::String(mode.as_str().into()));
        Self::with_data(names::SWITCH_MODE, data)
    }

    pub fn scan_wifi() -> Self {
        Self::new(names::SCAN_WIFI)
    }

    /// `password` is omitted from the request for open networks
    pub fn connect_wifi(ssid: &str, password: Option<&str>) -> Self {
        let mut data = Map::new();
        data.insert("ssid".into(), Value::String(ssid.into()));
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            data.insert("password".into(), Value::String(password.into()));
        }
        Self::with_data(names::CONNECT_WIFI, data)
    }

    pub fn pause(paused: bool) -> Self {
        let mut data = Map::new();
        data.insert("pause".into(), Value::Bool(paused));
        Self::with_data(names::PAUSE, data)
    }

    pub fn get_serial() -> Self {
        Self::new(names::GET_SERIAL)
    }

    /// Encode into the request line, terminator included.
    ///
    /// Fails with [`ProtocolError::Encoding`] when the name is empty, when the
    /// parameters cannot be serialized, or when the line would overflow the
    /// firmware's request buffer.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.name.is_empty() {
            return Err(ProtocolError::Encoding("command name is empty".into()));
        }

        let request = Request {
            commands: [Envelope {
                command: &self.name,
                data: self.data.as_ref(),
            }],
        };
        let mut line =
            serde_json::to_vec(&request).map_err(|e| ProtocolError::Encoding(e.to_string()))?;
        line.push(b'\n');

        if line.len() > MAX_REQUEST_LEN {
            return Err(ProtocolError::Encoding(format!(
                "request is {} bytes, device accepts at most {}",
                line.len(),
                MAX_REQUEST_LEN
            )));
        }
        Ok(line)
    }
}

/// Wire envelope; always carries exactly one command
#[derive(Serialize)]
struct Request<'a> {
    commands: [Envelope<'a>; 1],
}

#[derive(Serialize)]
struct Envelope<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Map<String, Value>>,
}

/// Streaming mode of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// USB video class camera
    Uvc,
    /// Wi-Fi streaming
    Wifi,
    /// Firmware picks a mode at boot
    Auto,
}

impl DeviceMode {
    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceMode::Uvc => "uvc",
            DeviceMode::Wifi => "wifi",
            DeviceMode::Auto => "auto",
        }
    }

    /// Pull a mode out of a decoded `get_device_mode` reply.
    ///
    /// Firmware revisions differ: some answer with a bare string, others with
    /// an object holding `mode` or `device_mode`.
    pub fn from_results(results: &Value) -> Option<Self> {
        match results {
            Value::String(s) => s.parse().ok(),
            Value::Object(map) => map
                .get("mode")
                .or_else(|| map.get("device_mode"))
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uvc" => Ok(DeviceMode::Uvc),
            "wifi" => Ok(DeviceMode::Wifi),
            "auto" => Ok(DeviceMode::Auto),
            other => Err(ProtocolError::Encoding(format!("unknown device mode '{other}'"))),
        }
    }
}
