mod common;

use std::net::{Ipv4Addr, TcpListener, UdpSocket};
use std::sync::Arc;

use airplay_bridge::testing::{
    MockSender, MockSenderConfig, RecordingMediaPlayer, StalledAuthenticator,
};
use airplay_bridge::{
    Bridge, BridgeConfig, BridgeError, BridgeEvent, BridgeState, ConfigurationError,
    PassthroughAuthenticator, TargetConfig,
};
use common::{TestBridge, announce_unanswered, handshakes_started, local_settings};

fn port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
        && UdpSocket::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

#[tokio::test]
async fn test_bridge_start_stop() {
    let mut test = TestBridge::start(local_settings(2), &["Kitchen", "Den"]).await;
    assert_eq!(test.bridge.state(), BridgeState::Running);

    let event = test
        .expect_event(|e| matches!(e, BridgeEvent::Started { .. }))
        .await;
    assert!(matches!(event, BridgeEvent::Started { targets: 2 }));

    let base = test.bridge.settings().port_base;
    for port in base..base + 6 {
        assert!(!port_free(port), "port {port} should be bound");
    }

    test.bridge.stop().await;
    assert_eq!(test.bridge.state(), BridgeState::Stopped);
    test.expect_event(|e| matches!(e, BridgeEvent::Stopped)).await;

    for port in base..base + 6 {
        assert!(port_free(port), "port {port} should be released");
    }
}

#[tokio::test]
async fn test_start_twice_fails() {
    let test = TestBridge::start(local_settings(1), &["Kitchen"]).await;

    let err = test.bridge.start().await.unwrap_err();

    assert!(matches!(err, BridgeError::AlreadyRunning));
    assert_eq!(test.bridge.state(), BridgeState::Running);
    test.bridge.stop().await;
}

#[tokio::test]
async fn test_bridge_restarts_after_stop() {
    let test = TestBridge::start(local_settings(1), &["Kitchen"]).await;
    test.bridge.stop().await;

    test.bridge.start().await.unwrap();
    let mut sender = MockSender::connect(MockSenderConfig::new(test.addr(0)))
        .await
        .unwrap();
    assert!(sender.options().await.unwrap().is_success());

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_bind_failure_releases_ports() {
    common::init_tracing();
    let settings = local_settings(2);
    let base = settings.port_base;

    // Second target's timing port is taken
    let blocker = UdpSocket::bind((Ipv4Addr::LOCALHOST, base + 4)).unwrap();

    let config = BridgeConfig::new(settings)
        .target(TargetConfig::new(Arc::new(RecordingMediaPlayer::new())).name("Kitchen"))
        .target(TargetConfig::new(Arc::new(RecordingMediaPlayer::new())).name("Den"));
    let bridge = Bridge::new(config, Arc::new(PassthroughAuthenticator)).unwrap();

    let err = bridge.start().await.unwrap_err();

    match err {
        BridgeError::Configuration(ConfigurationError::Bind {
            target, port, protocol, ..
        }) => {
            assert_eq!(target, "Den");
            assert_eq!(port, base + 4);
            assert_eq!(protocol, "udp");
        }
        other => panic!("expected bind error, got {other:?}"),
    }
    assert_eq!(bridge.state(), BridgeState::Stopped);
    for port in [base, base + 1, base + 2, base + 3, base + 5] {
        assert!(port_free(port), "port {port} should be released");
    }

    drop(blocker);
    bridge.start().await.unwrap();
    assert_eq!(bridge.state(), BridgeState::Running);
    bridge.stop().await;
}

#[tokio::test]
async fn test_targets_listen_on_their_own_ports() {
    let test = TestBridge::start(local_settings(2), &["Kitchen", "Den"]).await;
    let base = test.bridge.settings().port_base;

    let targets = test.bridge.targets();
    assert_eq!(targets[0].ports.ports(), [base, base + 1, base + 2]);
    assert_eq!(targets[1].ports.ports(), [base + 3, base + 4, base + 5]);

    for index in 0..2 {
        let mut sender = MockSender::connect(MockSenderConfig::new(test.addr(index)))
            .await
            .unwrap();
        assert!(sender.announce().await.unwrap().is_success());
        let response = sender.setup().await.unwrap();
        assert!(response.is_success());
        let transport = response.headers.get("Transport").unwrap();
        let data_port = targets[index].ports.data_port;
        assert!(
            transport.contains(&format!("server_port={data_port}")),
            "{transport}"
        );
    }

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_stop_ends_active_sessions() {
    let mut test = TestBridge::start(local_settings(1), &["Kitchen"]).await;
    let mut sender = MockSender::connect(MockSenderConfig::new(test.addr(0)))
        .await
        .unwrap();
    sender.handshake().await.unwrap();

    test.bridge.stop().await;

    assert!(sender.wait_closed(common::WAIT).await);
    let ended = test
        .expect_event(|e| matches!(e, BridgeEvent::SessionEnded { .. }))
        .await;
    assert!(matches!(
        ended,
        BridgeEvent::SessionEnded {
            reason: airplay_bridge::CloseReason::Shutdown,
            ..
        }
    ));
}

#[tokio::test]
async fn test_stop_interrupts_pending_handshake() {
    let auth = Arc::new(StalledAuthenticator::new(1));
    let mut test = TestBridge::start_with(local_settings(1), &["Kitchen"], auth.clone()).await;
    let mut sender = MockSender::connect(MockSenderConfig::new(test.addr(0)))
        .await
        .unwrap();
    assert!(sender.options().await.unwrap().is_success());
    announce_unanswered(&mut sender).await;
    handshakes_started(&auth, 1).await;

    let stopped = tokio::time::timeout(common::WAIT, test.bridge.stop()).await;

    assert!(stopped.is_ok(), "stop() waited on the handshake");
    assert_eq!(test.bridge.state(), BridgeState::Stopped);
    assert!(sender.wait_closed(common::WAIT).await);
    test.expect_event(|e| {
        matches!(
            e,
            BridgeEvent::SessionEnded {
                reason: airplay_bridge::CloseReason::Shutdown,
                ..
            }
        )
    })
    .await;
    let base = test.bridge.settings().port_base;
    assert!((base..base + 3).all(port_free));
}

#[tokio::test]
async fn test_silent_connection_is_dropped() {
    let settings = local_settings(1).session_timeout(std::time::Duration::from_millis(100));
    let test = TestBridge::start(settings, &["Kitchen"]).await;

    let mut silent = MockSender::connect(MockSenderConfig::new(test.addr(0)))
        .await
        .unwrap();

    assert!(silent.wait_closed(common::WAIT).await);
    assert!(test.bridge.session(airplay_bridge::TargetId(0)).is_none());

    test.bridge.stop().await;
}
