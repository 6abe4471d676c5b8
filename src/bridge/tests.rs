//! Scenario tests for the bridge lifecycle over real UDP sockets

use super::*;
use crate::config::{DeviceConfig, PortSetting};
use crate::notifier::NotifyPolicy;
use crate::osc::BooleanCoercion;
use rosc::{OscMessage, OscPacket};
use std::time::Duration;
use tokio::sync::mpsc;

/// Grab a port the OS considers free right now
fn free_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

fn make_config(feedback_port: u16) -> BridgeConfig {
    BridgeConfig {
        device: DeviceConfig {
            host: "127.0.0.1".to_string(),
            port: PortSetting::Number(free_port() as i64),
            feedback_port: PortSetting::Number(feedback_port as i64),
            listen_address: "127.0.0.1".to_string(),
        },
        boolean_coercion: BooleanCoercion::Strict,
        notify: NotifyPolicy::Always,
        feedbacks: vec![],
    }
}

/// Bridge plus a channel receiving every variable push
async fn started_bridge() -> (MultiplayBridge, mpsc::UnboundedReceiver<VariableUpdate>) {
    let bridge = MultiplayBridge::new(make_config(free_port())).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    bridge.subscribe_variables(move |vars| {
        for var in vars {
            tx.send(var.clone())?;
        }
        Ok(())
    });
    bridge.init().await.unwrap();
    assert_eq!(bridge.status(), InstanceStatus::Ok);
    (bridge, rx)
}

async fn send_osc(bridge: &MultiplayBridge, addr: &str, args: Vec<OscType>) {
    let target = bridge.local_addr().await.unwrap();
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    let bytes = rosc::encoder::encode(&packet).unwrap();
    let device = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    device.send_to(&bytes, target).await.unwrap();
}

async fn next_var(rx: &mut mpsc::UnboundedReceiver<VariableUpdate>) -> VariableUpdate {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for variable push")
        .expect("variable channel closed")
}

#[tokio::test]
async fn test_elapsed_scenario() {
    let (bridge, mut rx) = started_bridge().await;

    send_osc(&bridge, "/status/elapsed", vec![OscType::String("00:12".into())]).await;

    let var = next_var(&mut rx).await;
    assert_eq!(var.id, "t_elapsed");
    assert_eq!(bridge.read(Field::ElapsedTime), FieldValue::String("00:12".into()));
    bridge.destroy().await;
}

#[tokio::test]
async fn test_go_on_off_drives_feedback() {
    let (bridge, mut rx) = started_bridge().await;

    send_osc(&bridge, "/status/go", vec![OscType::Bool(true)]).await;
    next_var(&mut rx).await;
    assert_eq!(bridge.read(Field::GoActive), FieldValue::Boolean(true));
    assert_eq!(bridge.feedback_states().get("go_active"), Some(&true));

    send_osc(&bridge, "/status/go", vec![OscType::Bool(false)]).await;
    next_var(&mut rx).await;
    assert_eq!(bridge.read(Field::GoActive), FieldValue::Boolean(false));
    assert_eq!(bridge.feedback_states().get("go_active"), Some(&false));
    bridge.destroy().await;
}

#[tokio::test]
async fn test_unknown_and_malformed_messages_are_ignored() {
    let (bridge, mut rx) = started_bridge().await;
    let before = bridge.snapshot();

    send_osc(&bridge, "/status/unknown/address", vec![OscType::Int(42)]).await;
    send_osc(&bridge, "/status/remaining", vec![]).await;
    // A valid message afterwards proves the handler survived both
    send_osc(&bridge, "/status/current/qdesc", vec![OscType::String("Intro".into())]).await;

    let var = next_var(&mut rx).await;
    assert_eq!(var.id, "q_description");

    let after = bridge.snapshot();
    for field in Field::all() {
        if *field != Field::CurrentCueDescription {
            assert_eq!(after.get(*field), before.get(*field), "{}", field);
        }
    }
    assert_eq!(bridge.listener_state().await, ListenerState::Listening);
    bridge.destroy().await;
}

#[tokio::test]
async fn test_destroy_when_never_started() {
    let bridge = MultiplayBridge::new(make_config(free_port())).unwrap();
    bridge.destroy().await;
    bridge.destroy().await;
    assert_eq!(bridge.status(), InstanceStatus::Disconnected);
    assert_eq!(bridge.listener_state().await, ListenerState::Stopped);
}

#[tokio::test]
async fn test_rapid_restarts_keep_one_socket_and_state() {
    let (bridge, mut rx) = started_bridge().await;
    let original_port = bridge.local_addr().await.unwrap().port();

    send_osc(&bridge, "/status/stopall", vec![OscType::Bool(true)]).await;
    next_var(&mut rx).await;

    let port_a = free_port();
    let port_b = free_port();
    let (a, b) = tokio::join!(
        bridge.config_updated(make_config(port_a)),
        bridge.config_updated(make_config(port_b)),
    );
    a.unwrap();
    b.unwrap();

    let bound = bridge.local_addr().await.unwrap().port();
    assert!(bound == port_a || bound == port_b);
    assert_eq!(bridge.status(), InstanceStatus::Ok);

    // Every port other than the live one has been released
    for port in [original_port, port_a, port_b] {
        if port != bound {
            assert!(std::net::UdpSocket::bind(("127.0.0.1", port)).is_ok(), "port {} still bound", port);
        }
    }
    assert!(std::net::UdpSocket::bind(("127.0.0.1", bound)).is_err());

    // Values survive the restart
    assert_eq!(bridge.read(Field::StopAllActive), FieldValue::Boolean(true));

    send_osc(&bridge, "/status/fadeall", vec![OscType::Bool(true)]).await;
    next_var(&mut rx).await;
    assert_eq!(bridge.read(Field::FadeAllActive), FieldValue::Boolean(true));
    bridge.destroy().await;
}

#[tokio::test]
async fn test_bind_failure_degrades_then_recovers() {
    let occupied = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let busy_port = occupied.local_addr().unwrap().port();

    let bridge = MultiplayBridge::new(make_config(busy_port)).unwrap();
    let statuses = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let statuses_clone = statuses.clone();
    bridge.subscribe_status(move |s| statuses_clone.lock().push(s.clone()));

    bridge.init().await.unwrap();
    assert!(matches!(bridge.status(), InstanceStatus::ConnectionFailure(_)));
    assert_eq!(bridge.listener_state().await, ListenerState::Stopped);

    // Same port, listener not running: reconfiguration retries the bind
    drop(occupied);
    bridge.config_updated(make_config(busy_port)).await.unwrap();
    assert_eq!(bridge.status(), InstanceStatus::Ok);
    assert_eq!(bridge.local_addr().await.unwrap().port(), busy_port);

    let seen = statuses.lock().clone();
    assert_eq!(seen.first(), Some(&InstanceStatus::Connecting));
    assert_eq!(seen.last(), Some(&InstanceStatus::Ok));
    bridge.destroy().await;
}

#[tokio::test]
async fn test_bad_reconfiguration_keeps_listener() {
    let (bridge, _rx) = started_bridge().await;
    let port = bridge.local_addr().await.unwrap().port();

    let mut bad = make_config(free_port());
    bad.device.host = "not-an-ip".to_string();
    assert!(bridge.config_updated(bad).await.is_err());

    assert!(matches!(bridge.status(), InstanceStatus::BadConfig(_)));
    assert_eq!(bridge.local_addr().await.unwrap().port(), port);
    bridge.destroy().await;
}

#[tokio::test]
async fn test_command_retarget_without_rebind() {
    let (bridge, _rx) = started_bridge().await;
    let listen_port = bridge.local_addr().await.unwrap().port();

    let device = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut config = bridge.config();
    config.device.port = PortSetting::Number(device.local_addr().unwrap().port() as i64);
    bridge.config_updated(config).await.unwrap();

    // Listen side unchanged, same socket
    assert_eq!(bridge.local_addr().await.unwrap().port(), listen_port);

    bridge.send_command("/go", vec![]).await.unwrap();
    let mut buf = [0u8; rosc::decoder::MTU];
    let (size, _) = tokio::time::timeout(Duration::from_secs(2), device.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let (_, packet) = rosc::decoder::decode_udp(&buf[..size]).unwrap();
    assert!(matches!(packet, OscPacket::Message(m) if m.addr == "/go"));

    bridge.destroy().await;
    assert!(matches!(
        bridge.send_command("/go", vec![]).await,
        Err(BridgeError::EndpointClosed)
    ));
}

#[tokio::test]
async fn test_variables_listing() {
    let bridge = MultiplayBridge::new(make_config(free_port())).unwrap();
    let vars = bridge.variables();
    assert_eq!(vars.len(), 8);
    assert_eq!(vars.get("t_remain"), Some(&FieldValue::String(String::new())));
    assert_eq!(vars.get("st_next"), Some(&FieldValue::Boolean(false)));
}

#[tokio::test]
async fn test_cue_description_longer_than_mtu() {
    let (bridge, mut rx) = started_bridge().await;
    let long_cue = "x".repeat(2000);

    send_osc(&bridge, "/status/current/qdesc", vec![OscType::String(long_cue.clone())]).await;

    let var = next_var(&mut rx).await;
    assert_eq!(var.id, "q_description");
    assert_eq!(bridge.read(Field::CurrentCueDescription), FieldValue::String(long_cue));
    bridge.destroy().await;
}

fn with_feedback(mut config: BridgeConfig, id: &str, field: Field, equals: serde_json::Value) -> BridgeConfig {
    config.feedbacks.push(crate::config::FeedbackConfig {
        id: id.to_string(),
        field,
        equals: Some(equals),
        truthy: None,
        in_array: None,
    });
    config
}

#[test]
fn test_new_rejects_duplicate_feedback_ids() {
    let config = make_config(free_port());
    let config = with_feedback(config, "cue", Field::CurrentCueDescription, serde_json::json!("A"));
    let config = with_feedback(config, "cue", Field::CurrentCueDescription, serde_json::json!("B"));

    assert!(matches!(
        MultiplayBridge::new(config),
        Err(BridgeError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_reconfiguration_rejects_reserved_feedback_id() {
    let (bridge, _rx) = started_bridge().await;
    let port = bridge.local_addr().await.unwrap().port();

    let config = with_feedback(bridge.config(), "go_active", Field::ElapsedTime, serde_json::json!(""));
    let err = bridge.config_updated(config).await.unwrap_err();

    assert!(matches!(err, BridgeError::InvalidConfig(_)));
    assert!(matches!(bridge.status(), InstanceStatus::BadConfig(_)));
    assert!(bridge.config().feedbacks.is_empty());
    // The built-in lamp still follows /status/go
    assert_eq!(bridge.feedback_states().get("go_active"), Some(&false));
    assert_eq!(bridge.local_addr().await.unwrap().port(), port);
    bridge.destroy().await;
}

#[tokio::test]
async fn test_command_socket_failure_reports_connection_failure() {
    let (bridge, _rx) = started_bridge().await;
    let addr = bridge.local_addr().await.unwrap();

    let err = BridgeError::Io(std::io::Error::other("no ephemeral port"));
    bridge.report_startup(Ok(addr), Err(err));

    assert!(matches!(
        bridge.status(),
        InstanceStatus::ConnectionFailure(msg) if msg.starts_with("command socket")
    ));
    // Listener keeps running regardless
    assert_eq!(bridge.listener_state().await, ListenerState::Listening);
    bridge.destroy().await;
}
