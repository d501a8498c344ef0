use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::auth::PassthroughAuthenticator;
use crate::config::{PreemptionPolicy, TargetConfig};
use crate::session::{SessionHandle, SessionInbox};
use crate::testing::{RecordingMediaPlayer, RecordingSpeaker};

const PREEMPT_TIMEOUT: Duration = Duration::from_secs(1);

fn target(name: &str) -> Target {
    let settings = BridgeSettings::default();
    let ports = PortAllocator::new(settings.port_base).assign(0).unwrap();
    let config = TargetConfig::new(Arc::new(RecordingMediaPlayer::new())).name(name);
    Target::new(TargetId(0), config, &settings, ports)
}

fn session(id: &str) -> (SessionHandle, SessionInbox) {
    SessionHandle::channel(id, 8, &CancellationToken::new())
}

/// Mark the session closed once it is cancelled, like a runner would
fn close_on_cancel(inbox: SessionInbox) -> tokio::task::JoinHandle<CloseReason> {
    tokio::spawn(async move {
        inbox.signal.token().cancelled().await;
        inbox.state.send_replace(SessionState::Closed);
        inbox.signal.reason()
    })
}

fn player_target() -> TargetConfig {
    TargetConfig::new(Arc::new(RecordingMediaPlayer::new()))
}

#[tokio::test]
async fn test_admit_into_empty_slot() {
    let table = SessionTable::new(1);
    let kitchen = target("Kitchen");
    let (first, _inbox) = session("00000001");

    let previous = table
        .admit(&kitchen, PreemptionPolicy::AllowPreempt, PREEMPT_TIMEOUT, first)
        .await
        .unwrap();

    assert_eq!(previous, None);
    assert_eq!(table.active(kitchen.id()).unwrap().id(), "00000001");
    assert_eq!(
        table.snapshot(kitchen.id()).unwrap().state,
        SessionState::Idle
    );
}

#[tokio::test]
async fn test_admit_preempts_and_waits_for_previous() {
    let table = SessionTable::new(1);
    let kitchen = target("Kitchen");
    let (first, first_inbox) = session("00000001");
    let first_closed = close_on_cancel(first_inbox);
    table
        .admit(&kitchen, PreemptionPolicy::AllowPreempt, PREEMPT_TIMEOUT, first.clone())
        .await
        .unwrap();

    let (second, _second_inbox) = session("00000002");
    let previous = table
        .admit(&kitchen, PreemptionPolicy::AllowPreempt, PREEMPT_TIMEOUT, second)
        .await
        .unwrap();

    assert_eq!(previous.as_deref(), Some("00000001"));
    assert!(first.is_closed());
    assert_eq!(first_closed.await.unwrap(), CloseReason::Preempted);
    assert_eq!(table.active(kitchen.id()).unwrap().id(), "00000002");
}

#[tokio::test]
async fn test_admit_waits_for_slow_close_past_timeout() {
    let table = SessionTable::new(1);
    let kitchen = target("Kitchen");
    let (slow, slow_inbox) = session("00000001");
    table
        .admit(&kitchen, PreemptionPolicy::AllowPreempt, PREEMPT_TIMEOUT, slow.clone())
        .await
        .unwrap();
    tokio::spawn(async move {
        slow_inbox.signal.token().cancelled().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        slow_inbox.state.send_replace(SessionState::Closed);
    });

    let (next, _next_inbox) = session("00000002");
    let previous = table
        .admit(
            &kitchen,
            PreemptionPolicy::AllowPreempt,
            Duration::from_millis(20),
            next,
        )
        .await
        .unwrap();

    assert_eq!(previous.as_deref(), Some("00000001"));
    assert_eq!(slow.state(), SessionState::Closed);
    assert_eq!(table.active(kitchen.id()).unwrap().id(), "00000002");
}

#[tokio::test]
async fn test_reject_policy_keeps_current_session() {
    let table = SessionTable::new(1);
    let kitchen = target("Kitchen");
    let (first, _first_inbox) = session("00000001");
    table
        .admit(&kitchen, PreemptionPolicy::Reject, PREEMPT_TIMEOUT, first.clone())
        .await
        .unwrap();

    let (second, _second_inbox) = session("00000002");
    let err = table
        .admit(&kitchen, PreemptionPolicy::Reject, PREEMPT_TIMEOUT, second)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::ResourceExhausted { ref target } if target == "Kitchen"));
    assert!(!first.is_closed());
    assert_eq!(table.active(kitchen.id()).unwrap().id(), "00000001");
}

#[tokio::test]
async fn test_reject_policy_admits_after_session_closed() {
    let table = SessionTable::new(1);
    let kitchen = target("Kitchen");
    let (first, first_inbox) = session("00000001");
    table
        .admit(&kitchen, PreemptionPolicy::Reject, PREEMPT_TIMEOUT, first)
        .await
        .unwrap();
    first_inbox.state.send_replace(SessionState::Closed);

    assert!(table.active(kitchen.id()).is_none());
    let (second, _second_inbox) = session("00000002");
    let previous = table
        .admit(&kitchen, PreemptionPolicy::Reject, PREEMPT_TIMEOUT, second)
        .await
        .unwrap();
    assert_eq!(previous, None);
}

#[tokio::test]
async fn test_remove_if_only_removes_matching_session() {
    let table = SessionTable::new(1);
    let kitchen = target("Kitchen");
    let (first, _inbox) = session("00000001");
    table
        .admit(&kitchen, PreemptionPolicy::AllowPreempt, PREEMPT_TIMEOUT, first)
        .await
        .unwrap();

    assert!(!table.remove_if(kitchen.id(), "0000FFFF"));
    assert!(table.active(kitchen.id()).is_some());
    assert!(table.remove_if(kitchen.id(), "00000001"));
    assert!(table.active(kitchen.id()).is_none());
    assert!(table.handles().is_empty());
}

#[tokio::test]
async fn test_cancel_all_signals_shutdown() {
    let table = SessionTable::new(2);
    let settings = BridgeSettings::default();
    let ports = PortAllocator::new(settings.port_base).assign_all(2).unwrap();
    let targets: Vec<Target> = ports
        .into_iter()
        .enumerate()
        .map(|(i, p)| Target::new(TargetId(i), player_target(), &settings, p))
        .collect();

    let mut inboxes = Vec::new();
    for (i, t) in targets.iter().enumerate() {
        let (handle, inbox) = session(&format!("0000000{i}"));
        table
            .admit(t, PreemptionPolicy::AllowPreempt, PREEMPT_TIMEOUT, handle)
            .await
            .unwrap();
        inboxes.push(inbox);
    }

    table.cancel_all(&CloseReason::Shutdown);

    for inbox in &inboxes {
        assert!(inbox.signal.token().is_cancelled());
        assert_eq!(inbox.signal.reason(), CloseReason::Shutdown);
    }
}

#[tokio::test]
async fn test_admission_is_independent_per_target() {
    let table = Arc::new(SessionTable::new(2));
    let settings = BridgeSettings::default();
    let ports = PortAllocator::new(settings.port_base).assign_all(2).unwrap();
    let kitchen = Target::new(TargetId(0), player_target(), &settings, ports[0]);
    let den = Target::new(TargetId(1), player_target(), &settings, ports[1]);

    let (stuck, _stuck_inbox) = session("00000001");
    table
        .admit(&kitchen, PreemptionPolicy::AllowPreempt, PREEMPT_TIMEOUT, stuck)
        .await
        .unwrap();

    // Kitchen admission blocks on a session that never closes
    let (next, _next_inbox) = session("00000002");
    let blocked = {
        let table = Arc::clone(&table);
        tokio::spawn(async move {
            table
                .admit(&kitchen, PreemptionPolicy::AllowPreempt, Duration::from_millis(500), next)
                .await
        })
    };

    let (other, _other_inbox) = session("00000003");
    let admitted = tokio::time::timeout(
        Duration::from_millis(200),
        table.admit(&den, PreemptionPolicy::AllowPreempt, PREEMPT_TIMEOUT, other),
    )
    .await;

    assert!(matches!(admitted, Ok(Ok(None))));
    assert!(blocked.await.unwrap().is_ok());
}

#[test]
fn test_bridge_requires_targets() {
    let config = BridgeConfig::new(BridgeSettings::default());
    let err = Bridge::new(config, Arc::new(PassthroughAuthenticator)).unwrap_err();
    assert!(matches!(err, ConfigurationError::NoTargets));
}

#[test]
fn test_bridge_rejects_invalid_settings() {
    let config = BridgeConfig::new(BridgeSettings::default().output_sample_rate(0))
        .target(player_target());
    let err = Bridge::new(config, Arc::new(PassthroughAuthenticator)).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidSampleRate(0)));

    let config = BridgeConfig::new(BridgeSettings::default().port_base(0)).target(player_target());
    let err = Bridge::new(config, Arc::new(PassthroughAuthenticator)).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidPortBase(0)));
}

#[test]
fn test_bridge_rejects_port_overflow() {
    let config = BridgeConfig::new(BridgeSettings::default().port_base(65_532))
        .target(player_target())
        .target(player_target());
    let err = Bridge::new(config, Arc::new(PassthroughAuthenticator)).unwrap_err();
    assert!(matches!(err, ConfigurationError::PortOverflow { index: 1, .. }));
}

#[test]
fn test_targets_get_consecutive_port_ranges() {
    let config = BridgeConfig::new(BridgeSettings::default().port_base(9000))
        .target(player_target().name("Kitchen"))
        .target(player_target().name("Den").speaker(Arc::new(RecordingSpeaker::new())));
    let bridge = Bridge::new(config, Arc::new(PassthroughAuthenticator)).unwrap();

    let targets = bridge.targets();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].id, TargetId(0));
    assert_eq!(targets[0].ports.ports(), [9000, 9001, 9002]);
    assert!(!targets[0].has_speaker);
    assert_eq!(targets[1].ports.ports(), [9003, 9004, 9005]);
    assert!(targets[1].has_speaker);
    assert_eq!(targets[1].output_sample_rate, 16_000);
}

#[test]
fn test_target_naming_falls_back() {
    let config = BridgeConfig::new(BridgeSettings::default().device_name("Living Room"))
        .target(player_target().name("Kitchen"))
        .target(TargetConfig::new(Arc::new(RecordingMediaPlayer::named("Sonos Den"))))
        .target(player_target())
        .target(player_target().name("  "));
    let bridge = Bridge::new(config, Arc::new(PassthroughAuthenticator)).unwrap();

    let names: Vec<String> = bridge.targets().into_iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        vec!["Kitchen", "Sonos Den", "Living Room 3", "Living Room 4"]
    );
}

#[tokio::test]
async fn test_new_bridge_is_stopped_and_idle() {
    let config = BridgeConfig::new(BridgeSettings::default()).target(player_target());
    let bridge = Bridge::new(config, Arc::new(PassthroughAuthenticator)).unwrap();

    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert!(bridge.session(TargetId(0)).is_none());
    assert!(
        bridge
            .wait_for_state(TargetId(0), SessionState::Closed, Duration::from_millis(10))
            .await
    );
    assert!(
        !bridge
            .wait_for_state(TargetId(0), SessionState::Streaming, Duration::from_millis(30))
            .await
    );

    // Stopping a stopped bridge is a no-op
    bridge.stop().await;
    assert_eq!(bridge.state(), BridgeState::Stopped);
}
