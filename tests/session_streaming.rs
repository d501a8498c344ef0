mod common;

use std::sync::Arc;
use std::time::Duration;

use airplay_bridge::testing::{
    FixedKeyAuthenticator, MockSender, MockSenderConfig, PlayerCall, RecordingSpeaker,
    ramp_packet,
};
use airplay_bridge::{
    BridgeEvent, CloseReason, PassthroughAuthenticator, SessionState, TargetId, TrackMetadata,
};
use common::{TestBridge, WAIT, local_settings};

const FRAMES: usize = 352;

fn packets(count: i16) -> Vec<Vec<i16>> {
    (0..count).map(|i| ramp_packet(i * 1000 + 1, FRAMES)).collect()
}

async fn streaming_sender(test: &TestBridge, config: MockSenderConfig) -> MockSender {
    let mut sender = MockSender::connect(config).await.unwrap();
    sender.handshake().await.unwrap();
    assert!(
        test.bridge
            .wait_for_state(TargetId(0), SessionState::Streaming, WAIT)
            .await
    );
    sender
}

#[tokio::test]
async fn test_udp_audio_reaches_speaker_in_order() {
    let test = TestBridge::start(local_settings(1), &["Kitchen"]).await;
    let mut sender = streaming_sender(&test, MockSenderConfig::new(test.addr(0))).await;

    let audio = packets(5);
    for samples in &audio {
        sender.send_audio(samples).await.unwrap();
    }

    let speaker = &test.speakers[0];
    assert!(speaker.wait_for_frames(5, WAIT).await);
    assert_eq!(speaker.samples(), audio.concat());
    assert_eq!(test.players[0].calls().last(), Some(&PlayerCall::Play("Kitchen".to_string())));

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_reordered_and_retransmitted_audio() {
    let test = TestBridge::start(local_settings(1), &["Kitchen"]).await;
    let config = MockSenderConfig::new(test.addr(0));
    let first = config.first_sequence;
    let mut sender = streaming_sender(&test, config).await;

    let audio = packets(4);
    sender.send_audio_at(first + 1, 352, &audio[1]).await.unwrap();
    sender.send_audio_at(first, 0, &audio[0]).await.unwrap();
    sender.send_audio_at(first + 3, 3 * 352, &audio[3]).await.unwrap();
    sender.send_retransmit(first + 2, &audio[2]).await.unwrap();

    let speaker = &test.speakers[0];
    assert!(speaker.wait_for_frames(4, WAIT).await);
    assert_eq!(speaker.samples(), audio.concat());

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_interleaved_audio() {
    let test = TestBridge::start(local_settings(1), &["Kitchen"]).await;
    let mut sender =
        streaming_sender(&test, MockSenderConfig::new(test.addr(0)).interleaved()).await;

    let audio = packets(3);
    for samples in &audio {
        sender.send_audio(samples).await.unwrap();
    }

    let speaker = &test.speakers[0];
    assert!(speaker.wait_for_frames(3, WAIT).await);
    assert_eq!(speaker.samples(), audio.concat());

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_encrypted_audio_is_decrypted() {
    let key = [0x5A; 16];
    let iv = [0x11; 16];
    let test = TestBridge::start_with(
        local_settings(1),
        &["Kitchen"],
        Arc::new(FixedKeyAuthenticator::new(key)),
    )
    .await;
    let mut sender = streaming_sender(
        &test,
        MockSenderConfig::new(test.addr(0)).encrypted(key, iv),
    )
    .await;

    let audio = packets(2);
    for samples in &audio {
        sender.send_audio(samples).await.unwrap();
    }

    let speaker = &test.speakers[0];
    assert!(speaker.wait_for_frames(2, WAIT).await);
    assert_eq!(speaker.samples(), audio.concat());

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_encrypted_stream_refused_without_key_exchange() {
    let mut test = TestBridge::start(local_settings(1), &["Kitchen"]).await;
    let mut sender = MockSender::connect(
        MockSenderConfig::new(test.addr(0)).encrypted([1; 16], [2; 16]),
    )
    .await
    .unwrap();

    let response = sender.announce().await.unwrap();

    assert_eq!(response.status.as_u16(), 415);
    assert!(sender.wait_closed(WAIT).await);
    test.expect_event(|e| matches!(e, BridgeEvent::AuthFailed { .. }))
        .await;
    assert!(
        test.bridge
            .wait_for_state(TargetId(0), SessionState::Closed, WAIT)
            .await
    );

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_teardown_drains_buffered_audio() {
    let mut test = TestBridge::start(local_settings(1), &["Kitchen"]).await;
    let config = MockSenderConfig::new(test.addr(0));
    let first = config.first_sequence;
    let mut sender = streaming_sender(&test, config).await;

    let audio = packets(3);
    sender.send_audio_at(first, 0, &audio[0]).await.unwrap();
    sender.send_audio_at(first + 2, 704, &audio[2]).await.unwrap();

    let speaker = test.speakers[0].clone();
    assert!(speaker.wait_for_frames(1, WAIT).await);
    // Let the out-of-order packet reach the jitter buffer
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(sender.teardown().await.unwrap().is_success());
    assert!(sender.wait_closed(WAIT).await);

    test.expect_event(|e| {
        matches!(
            e,
            BridgeEvent::SessionStateChanged {
                state: SessionState::Draining,
                ..
            }
        )
    })
    .await;
    test.expect_event(|e| {
        matches!(
            e,
            BridgeEvent::SessionEnded {
                reason: CloseReason::Teardown,
                ..
            }
        )
    })
    .await;

    let frames = speaker.frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].samples(), audio[0].as_slice());
    assert!(frames[1].is_silent());
    assert_eq!(frames[2].samples(), audio[2].as_slice());
    assert_eq!(speaker.finishes(), 1);
    assert_eq!(test.players[0].calls().last(), Some(&PlayerCall::Stop));

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_volume_and_metadata_reach_sinks() {
    let settings = local_settings(1).media_url_template("http://{ip}:{port}/{target}?title={title}");
    let mut test = TestBridge::start(settings, &["Kitchen"]).await;
    let port = test.bridge.targets()[0].ports.control_port;
    let mut sender = streaming_sender(&test, MockSenderConfig::new(test.addr(0))).await;

    assert!(sender.set_volume(-20.0).await.unwrap().is_success());
    let response = sender.get_parameter().await.unwrap();
    assert_eq!(response.body_text(), "volume: -20.00\r\n");
    let volume = test.speakers[0].volume().unwrap();
    assert!((volume - 0.1).abs() < 0.001);

    let metadata = TrackMetadata {
        title: Some("Hejira".to_string()),
        artist: Some("Joni Mitchell".to_string()),
        ..TrackMetadata::default()
    };
    assert!(sender.set_metadata(&metadata).await.unwrap().is_success());
    test.expect_event(|e| matches!(e, BridgeEvent::MetadataUpdated { .. }))
        .await;

    assert_eq!(
        test.players[0].media_urls(),
        vec![
            format!("http://127.0.0.1:{port}/Kitchen?title="),
            format!("http://127.0.0.1:{port}/Kitchen?title=Hejira"),
        ]
    );

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_pause_and_resume() {
    let test = TestBridge::start(local_settings(1), &["Kitchen"]).await;
    let mut sender = streaming_sender(&test, MockSenderConfig::new(test.addr(0))).await;
    let speaker = &test.speakers[0];

    sender.send_audio(&ramp_packet(1, FRAMES)).await.unwrap();
    assert!(speaker.wait_for_frames(1, WAIT).await);

    assert!(sender.pause().await.unwrap().is_success());
    assert_eq!(speaker.finishes(), 1);

    assert!(sender.flush().await.unwrap().is_success());
    assert!(sender.record().await.unwrap().is_success());
    assert_eq!(speaker.starts(), 2);
    sender.send_audio(&ramp_packet(7, FRAMES)).await.unwrap();
    assert!(speaker.wait_for_frames(2, WAIT).await);

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_inactive_session_times_out() {
    let settings = local_settings(1).session_timeout(std::time::Duration::from_millis(200));
    let mut test = TestBridge::start(settings, &["Kitchen"]).await;
    let mut sender = streaming_sender(&test, MockSenderConfig::new(test.addr(0))).await;

    let ended = test
        .expect_event(|e| matches!(e, BridgeEvent::SessionEnded { .. }))
        .await;

    assert!(matches!(
        ended,
        BridgeEvent::SessionEnded {
            reason: CloseReason::Timeout,
            ..
        }
    ));
    assert!(sender.wait_closed(WAIT).await);
    assert!(test.bridge.session(TargetId(0)).is_none());

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_malformed_request_gets_bad_request() {
    let test = TestBridge::start(local_settings(1), &["Kitchen"]).await;
    let mut sender = MockSender::connect(MockSenderConfig::new(test.addr(0)))
        .await
        .unwrap();

    sender.send_raw(b"HELLO\r\n\r\n").await.unwrap();
    let response = sender.read_response().await.unwrap();
    assert_eq!(response.status.as_u16(), 400);

    let response = sender.options().await.unwrap();
    assert!(response.is_success());
    assert_eq!(response.headers.get("Server"), Some("AirTunes/366.0"));

    test.bridge.stop().await;
}

#[tokio::test]
async fn test_stalled_speaker_does_not_hold_back_other_target() {
    const CAPACITY: usize = 4;
    const ROUNDS: i16 = 24;

    let stalled = Arc::new(RecordingSpeaker::with_write_delay(Duration::from_secs(30)));
    let test = TestBridge::start_with_speakers(
        local_settings(2).frame_queue_capacity(CAPACITY),
        &["Kitchen", "Den"],
        vec![stalled.clone(), Arc::new(RecordingSpeaker::new())],
        Arc::new(PassthroughAuthenticator),
    )
    .await;

    let mut kitchen = streaming_sender(&test, MockSenderConfig::new(test.addr(0))).await;
    let mut den = MockSender::connect(MockSenderConfig::new(test.addr(1)))
        .await
        .unwrap();
    den.handshake().await.unwrap();
    assert!(
        test.bridge
            .wait_for_state(TargetId(1), SessionState::Streaming, WAIT)
            .await
    );

    let audio = packets(ROUNDS);
    for (round, samples) in audio.iter().enumerate() {
        kitchen.send_audio(samples).await.unwrap();
        den.send_audio(samples).await.unwrap();
        if round == audio.len() / 2 {
            // Den keeps up while Kitchen's speaker is stuck on its first frame
            assert!(test.speakers[1].wait_for_frames(round + 1, WAIT).await);
        }
    }

    assert!(
        test.speakers[1]
            .wait_for_frames(audio.len(), WAIT)
            .await
    );
    assert_eq!(test.speakers[1].samples(), audio.concat());

    // One frame is held by the stuck write; the rest wait or were evicted
    let total = audio.len() as u64;
    let backlog = tokio::time::timeout(WAIT, async {
        loop {
            let queue = test.bridge.session(TargetId(0)).and_then(|s| s.queue);
            if let Some(queue) = queue.filter(|q| q.evicted + q.len as u64 + 1 >= total) {
                return queue;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stalled target never evicted");

    assert_eq!(backlog.capacity, CAPACITY);
    assert_eq!(backlog.len, CAPACITY);
    assert_eq!(backlog.evicted + backlog.len as u64 + 1, total);
    assert_eq!(stalled.frame_count(), 0);
    assert_eq!(
        test.bridge.session(TargetId(0)).unwrap().state,
        SessionState::Streaming
    );

    test.bridge.stop().await;
}
