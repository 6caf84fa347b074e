//! Wi-Fi scan results
//!
//! Maps decoded `scan_wifi` results onto [`WiFiNetwork`] values. Entries are
//! read leniently: a missing or mistyped field takes its default instead of
//! failing the whole scan.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Authentication mode reported by the ESP32 Wi-Fi stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum SecurityMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
    /// Code outside the known range, kept as reported
    Unknown(i64),
}

impl SecurityMode {
    /// Map a raw `authmode` code
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => SecurityMode::Open,
            1 => SecurityMode::Wep,
            2 => SecurityMode::WpaPsk,
            3 => SecurityMode::Wpa2Psk,
            4 => SecurityMode::WpaWpa2Psk,
            5 => SecurityMode::Wpa2Enterprise,
            6 => SecurityMode::Wpa3Psk,
            7 => SecurityMode::Wpa2Wpa3Psk,
            other => SecurityMode::Unknown(other),
        }
    }

    /// Human readable label
    pub fn label(&self) -> String {
        match self {
            SecurityMode::Open => "Open".into(),
            SecurityMode::Wep => "WEP".into(),
            SecurityMode::WpaPsk => "WPA PSK".into(),
            SecurityMode::Wpa2Psk => "WPA2 PSK".into(),
            SecurityMode::WpaWpa2Psk => "WPA WPA2 PSK".into(),
            SecurityMode::Wpa2Enterprise => "WPA2 Enterprise".into(),
            SecurityMode::Wpa3Psk => "WPA3 PSK".into(),
            SecurityMode::Wpa2Wpa3Psk => "WPA2 WPA3 PSK".into(),
            SecurityMode::Unknown(code) => format!("Unknown({code})"),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One access point from a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiFiNetwork {
    /// Network name, empty when hidden or missing
    pub ssid: String,
    /// Primary channel
    pub channel: i64,
    /// Signal strength in dBm
    pub rssi: i64,
    /// BSSID
    pub mac_address: String,
    /// Authentication mode
    pub security: SecurityMode,
}

impl WiFiNetwork {
    /// Read one scan entry, defaulting whatever is missing
    pub fn from_entry(entry: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let int = |key: &str| entry.get(key).and_then(Value::as_i64).unwrap_or(0);

        Self {
            ssid: text("ssid"),
            channel: int("channel"),
            rssi: int("rssi"),
            mac_address: text("bssid"),
            security: SecurityMode::from_code(int("authmode")),
        }
    }
}

/// Extract networks from decoded scan results.
///
/// The list is either the results value itself or sits under `wifi_networks`
/// or `networks`. A single network may also arrive collapsed to a bare object.
/// Entries that are not objects are skipped.
pub fn networks_from_results(results: &Value) -> Vec<WiFiNetwork> {
    let entries: Vec<&Value> = match results {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("wifi_networks").or_else(|| map.get("networks")) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(_) => Vec::new(),
            None if looks_like_network(map) => vec![results],
            None => Vec::new(),
        },
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(Value::as_object)
        .map(WiFiNetwork::from_entry)
        .collect()
}

fn looks_like_network(map: &Map<String, Value>) -> bool {
    ["ssid", "bssid", "rssi", "channel", "authmode"]
        .iter()
        .any(|k| map.contains_key(*k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_security_labels() {
        assert_eq!(SecurityMode::from_code(0).label(), "Open");
        assert_eq!(SecurityMode::from_code(3).label(), "WPA2 PSK");
        assert_eq!(SecurityMode::from_code(7).label(), "WPA2 WPA3 PSK");
        assert_eq!(SecurityMode::from_code(9).label(), "Unknown(9)");
        assert_eq!(SecurityMode::from_code(-1).to_string(), "Unknown(-1)");
    }

    #[test]
    fn test_full_entry() {
        let results = json!([{
            "ssid": "home",
            "channel": 6,
            "rssi": -52,
            "bssid": "aa:bb:cc:dd:ee:ff",
            "authmode": 3
        }]);
        assert_eq!(
            networks_from_results(&results),
            vec![WiFiNetwork {
                ssid: "home".into(),
                channel: 6,
                rssi: -52,
                mac_address: "aa:bb:cc:dd:ee:ff".into(),
                security: SecurityMode::Wpa2Psk,
            }]
        );
    }

    #[test]
    fn test_missing_fields_default() {
        let results = json!({"networks": [{"rssi": -80}, {"ssid": "cafe", "channel": "x"}]});
        let nets = networks_from_results(&results);
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[0].ssid, "");
        assert_eq!(nets[0].rssi, -80);
        assert_eq!(nets[0].security, SecurityMode::Open);
        assert_eq!(nets[1].channel, 0);
    }

    #[test]
    fn test_wifi_networks_key_and_non_objects() {
        let results = json!({"wifi_networks": [{"ssid": "a"}, 5, "junk", {"ssid": "b"}]});
        let ssids: Vec<String> = networks_from_results(&results)
            .into_iter()
            .map(|n| n.ssid)
            .collect();
        assert_eq!(ssids, vec!["a", "b"]);
    }

    #[test]
    fn test_collapsed_single_network() {
        let results = json!({"ssid": "solo", "channel": 11});
        let nets = networks_from_results(&results);
        assert_eq!(nets.len(), 1);
        assert_eq!(nets[0].channel, 11);
    }

    #[test]
    fn test_unrecognized_results() {
        assert!(networks_from_results(&json!("scan started")).is_empty());
        assert!(networks_from_results(&json!({"status": "busy"})).is_empty());
    }
}
