use irislink_core::protocol::mock::{MockTransport, Reply};
use irislink_core::protocol::{DecodedResponse, DeviceMode, ProtocolError, Transport};
use irislink_core::session::{ReconnectOutcome, Session, SessionConfig, SessionState};
use irislink_core::wifi::SecurityMode;
use pretty_assertions::assert_eq;
use serde_json::json;

const MODE_UVC: &str = r#"{"results": ["{\"result\":\"{\\\"mode\\\":\\\"uvc\\\"}\"}"]}"#;

fn config() -> SessionConfig {
    SessionConfig {
        port_name: "/dev/ttyACM0".into(),
        connect_probe_timeout_ms: 30,
        scan_probe_timeout_ms: 30,
        command_timeout_ms: 30,
        scan_timeout_ms: 30,
        scan_grace_ms: 10,
        connect_wifi_timeout_ms: 30,
        reconnect_cooldown_ms: 5,
        poll_interval_ms: 1,
        ..SessionConfig::default()
    }
}

fn scan_reply(networks: serde_json::Value) -> Reply {
    let payload = json!({ "networks": networks }).to_string();
    let envelope = json!({ "result": payload }).to_string();
    Reply::text(json!({ "results": [envelope] }).to_string())
}

#[test]
fn test_crash_during_scan_reconnects_once() {
    let transport = MockTransport::new().with_replies([
        Reply::text(MODE_UVC), // connect probe
        Reply::text(MODE_UVC), // scan probe
        Reply::Disconnect,     // scan: device drops off the bus
        Reply::text(MODE_UVC), // probe after reconnect
    ]);
    let mut session = Session::new(transport, config());
    session.connect().unwrap();

    let report = session.scan_wifi(None);

    assert!(report.networks.is_empty());
    assert!(matches!(report.error, Some(ProtocolError::SuspectedCrash(_))));
    match report.recovery {
        Some(ReconnectOutcome::Reconnected(ref connect)) => assert!(connect.is_responsive()),
        ref other => panic!("expected a reconnect, got {other:?}"),
    }
    assert_eq!(session.transport().open_calls(), 2);
    assert_eq!(session.state(), SessionState::Connected);
    // The scan itself was sent once and not retried
    let scans = session
        .transport()
        .written()
        .iter()
        .filter(|line| line.contains("scan_wifi"))
        .count();
    assert_eq!(scans, 1);

    // The session is usable again
    assert_eq!(
        session.get_device_mode(),
        DecodedResponse::Error(ProtocolError::Timeout)
    );
}

#[test]
fn test_scan_maps_networks_and_tolerates_missing_ssid() {
    let networks = json!([
        {"ssid": "home", "channel": 6, "rssi": -48, "bssid": "aa:bb:cc:00:11:22", "authmode": 3},
        {"channel": 1, "rssi": -90, "bssid": "aa:bb:cc:00:11:33", "authmode": 0},
        {"ssid": "lab", "channel": 11, "rssi": -70, "bssid": "aa:bb:cc:00:11:44", "authmode": 12}
    ]);
    let transport = MockTransport::new().with_replies([
        Reply::text(MODE_UVC),
        Reply::text(MODE_UVC),
        scan_reply(networks),
    ]);
    let mut session = Session::new(transport, config());
    session.connect().unwrap();

    let report = session.scan_wifi(None);
    assert_eq!(report.error, None);
    assert_eq!(report.networks.len(), 3);
    assert_eq!(report.networks[0].ssid, "home");
    assert_eq!(report.networks[0].security, SecurityMode::Wpa2Psk);
    assert_eq!(report.networks[1].ssid, "");
    assert_eq!(report.networks[1].security.label(), "Open");
    assert_eq!(report.networks[2].security.label(), "Unknown(12)");
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn test_device_error_during_scan_is_not_a_crash() {
    let transport = MockTransport::new().with_replies([
        Reply::text(MODE_UVC),
        Reply::text(MODE_UVC),
        Reply::text(r#"{"error": "WiFi not initialized"}"#),
    ]);
    let mut session = Session::new(transport, config());
    session.connect().unwrap();

    let report = session.scan_wifi(None);
    assert_eq!(
        report.error,
        Some(ProtocolError::Device("WiFi not initialized".into()))
    );
    assert!(report.recovery.is_none());
    assert_eq!(session.transport().open_calls(), 1);
}

#[test]
fn test_typed_operations_over_boxed_transport() {
    let transport: Box<dyn Transport> = Box::new(MockTransport::new().with_replies([
        Reply::text(MODE_UVC),
        Reply::text(r#"{"results": ["{\"result\":\"{\\\"serial\\\":\\\"OI-0042\\\"}\"}"]}"#),
        Reply::text(r#"{"results": ["paused"]}"#),
        Reply::text(r#"{"error": "Command not found"}"#),
    ]));
    let mut session = Session::new(transport, config());

    let report = session.connect().unwrap();
    assert!(report.is_responsive());
    assert_eq!(session.last_known_mode(), Some(DeviceMode::Uvc));

    assert_eq!(
        session.get_serial(),
        DecodedResponse::Success(json!({"serial": "OI-0042"}))
    );
    assert_eq!(session.pause(true), DecodedResponse::Success(json!("paused")));
    let unknown = session.send_command(&irislink_core::protocol::Command::new("reboot_now"), None);
    assert_eq!(unknown.reason().as_deref(), Some("Command not found"));

    let counters = session.counters();
    assert_eq!(counters.tx_packets, 4);
    assert_eq!(counters.rx_packets, 4);

    session.disconnect();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.transport().is_open());
}
