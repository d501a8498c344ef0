use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use super::*;
use crate::audio::AudioFrame;
use crate::error::{SinkError, SinkKind};
use crate::protocol::dmap::TrackMetadata;
use crate::testing::{PlayerCall, RecordingMediaPlayer, RecordingSpeaker};

fn ctx() -> UrlContext {
    UrlContext {
        ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)),
        port: 7003,
        target: "Den".to_string(),
        session: "0000ABCD".to_string(),
    }
}

fn metadata(title: &str) -> TrackMetadata {
    TrackMetadata {
        title: Some(title.to_string()),
        artist: Some("Artist".to_string()),
        ..TrackMetadata::default()
    }
}

fn frame() -> AudioFrame {
    AudioFrame::new(vec![1, 2, 3, 4], 16_000, 2, 0)
}

fn adapter(
    player: &Arc<RecordingMediaPlayer>,
    speaker: Option<&Arc<RecordingSpeaker>>,
    template: &str,
) -> SinkAdapter {
    SinkAdapter::new(
        Arc::clone(player) as Arc<dyn MediaPlayer>,
        speaker.map(|s| Arc::clone(s) as Arc<dyn Speaker>),
        MediaUrlTemplate::new(template),
        "Den",
    )
}

#[test]
fn test_template_substitutes_every_placeholder() {
    let template =
        MediaUrlTemplate::new("http://{ip}:{port}/{target}/{session}?t={title}&a={artist}&b={album}");
    let url = template.render(&ctx(), Some(&metadata("Song"))).unwrap();
    assert_eq!(
        url,
        "http://192.168.1.50:7003/Den/0000ABCD?t=Song&a=Artist&b="
    );
}

#[test]
fn test_template_without_metadata_renders_empty_fields() {
    let template = MediaUrlTemplate::new("http://{ip}/{title}");
    assert_eq!(
        template.render(&ctx(), None).unwrap(),
        "http://192.168.1.50/"
    );
}

#[test]
fn test_empty_template_disables_injection() {
    let template = MediaUrlTemplate::default();
    assert!(template.is_empty());
    assert!(template.render(&ctx(), Some(&metadata("Song"))).is_none());
}

#[test]
fn test_template_does_not_expand_substituted_values() {
    let template = MediaUrlTemplate::new("{title}|{unknown}");
    let url = template.render(&ctx(), Some(&metadata("{target}"))).unwrap();
    assert_eq!(url, "%7Btarget%7D|{unknown}");
}

#[test]
fn test_template_encodes_free_text() {
    let template = MediaUrlTemplate::new("http://{ip}/{target}?t={title}&a={artist}");
    let ctx = UrlContext {
        target: "Living Room".to_string(),
        ..ctx()
    };
    let metadata = TrackMetadata {
        title: Some("Rock & Roll? Yes/No".to_string()),
        artist: Some("Björk".to_string()),
        ..TrackMetadata::default()
    };

    let url = template.render(&ctx, Some(&metadata)).unwrap();

    assert_eq!(
        url,
        "http://192.168.1.50/Living%20Room?t=Rock%20%26%20Roll%3F%20Yes%2FNo&a=Bj%C3%B6rk"
    );
}

#[tokio::test]
async fn test_start_points_player_at_url_then_plays() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let sinks = adapter(&player, None, "http://{ip}/{target}");

    sinks.start(&ctx()).await.unwrap();

    assert_eq!(
        player.calls(),
        vec![
            PlayerCall::SetMediaUrl("http://192.168.1.50/Den".to_string()),
            PlayerCall::Play("Den".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_start_without_template_only_plays() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let sinks = adapter(&player, None, "");

    sinks.start(&ctx()).await.unwrap();

    assert_eq!(player.calls(), vec![PlayerCall::Play("Den".to_string())]);
}

#[tokio::test]
async fn test_player_only_delivery_is_control_only() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let sinks = adapter(&player, None, "");

    assert_eq!(sinks.deliver(&frame()).await, Ok(Delivery::ControlOnly));
    assert_eq!(sinks.health().delivered, 0);
}

#[tokio::test]
async fn test_speaker_receives_frames() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let speaker = Arc::new(RecordingSpeaker::new());
    let sinks = adapter(&player, Some(&speaker), "");

    sinks.start(&ctx()).await.unwrap();
    assert_eq!(sinks.deliver(&frame()).await, Ok(Delivery::Delivered));
    assert_eq!(sinks.deliver(&frame()).await, Ok(Delivery::Delivered));

    assert_eq!(speaker.starts(), 1);
    assert_eq!(speaker.frame_count(), 2);
    assert_eq!(sinks.health().delivered, 2);
}

#[tokio::test]
async fn test_speaker_failure_does_not_stop_player() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let speaker = Arc::new(RecordingSpeaker::new());
    speaker.set_failing(true);
    let sinks = adapter(&player, Some(&speaker), "");

    let err = sinks.deliver(&frame()).await.unwrap_err();
    assert!(matches!(
        err,
        SinkError::Unavailable {
            sink: SinkKind::Speaker,
            ..
        }
    ));
    let health = sinks.health();
    assert_eq!(health.failed, 1);
    assert_eq!(health.consecutive_failures, 1);

    sinks.stop().await.unwrap();
    assert_eq!(player.calls(), vec![PlayerCall::Stop]);
}

#[tokio::test]
async fn test_both_sinks_failing_reports_no_sink() {
    let player = Arc::new(RecordingMediaPlayer::new());
    player.set_failing(true);
    let speaker = Arc::new(RecordingSpeaker::new());
    speaker.set_failing(true);
    let sinks = adapter(&player, Some(&speaker), "");

    assert!(sinks.start(&ctx()).await.is_err());
    assert!(!sinks.health().player_available);
    assert_eq!(
        sinks.deliver(&frame()).await,
        Err(SinkError::NoSinkAvailable)
    );
}

#[tokio::test]
async fn test_consecutive_failures_reset_on_success() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let speaker = Arc::new(RecordingSpeaker::new());
    let sinks = adapter(&player, Some(&speaker), "");

    speaker.set_failing(true);
    let _ = sinks.deliver(&frame()).await;
    let _ = sinks.deliver(&frame()).await;
    assert_eq!(sinks.health().consecutive_failures, 2);

    speaker.set_failing(false);
    sinks.deliver(&frame()).await.unwrap();
    let health = sinks.health();
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.failed, 2);
    assert_eq!(health.delivered, 1);
}

#[tokio::test]
async fn test_metadata_change_updates_url_once() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let sinks = adapter(&player, None, "http://{ip}/{title}");

    assert!(sinks.update_metadata(&metadata("One"), &ctx()).await.unwrap());
    assert!(!sinks.update_metadata(&metadata("One"), &ctx()).await.unwrap());
    assert!(sinks.update_metadata(&metadata("Two"), &ctx()).await.unwrap());

    assert_eq!(
        player.media_urls(),
        vec![
            "http://192.168.1.50/One".to_string(),
            "http://192.168.1.50/Two".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_start_uses_last_metadata() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let sinks = adapter(&player, None, "http://{ip}/{title}");

    sinks.update_metadata(&metadata("Early"), &ctx()).await.unwrap();
    sinks.start(&ctx()).await.unwrap();

    assert_eq!(
        player.media_urls().last().map(String::as_str),
        Some("http://192.168.1.50/Early")
    );
}

#[tokio::test]
async fn test_volume_reaches_both_sinks_clamped() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let speaker = Arc::new(RecordingSpeaker::new());
    let sinks = adapter(&player, Some(&speaker), "");

    sinks.set_volume(1.5).await.unwrap();

    assert_eq!(speaker.volume(), Some(1.0));
    assert_eq!(player.calls(), vec![PlayerCall::SetVolume(1.0)]);
}

#[tokio::test]
async fn test_stop_finishes_speaker() {
    let player = Arc::new(RecordingMediaPlayer::new());
    let speaker = Arc::new(RecordingSpeaker::new());
    let sinks = adapter(&player, Some(&speaker), "");

    sinks.stop().await.unwrap();

    assert_eq!(speaker.finishes(), 1);
    assert_eq!(player.calls(), vec![PlayerCall::Stop]);
}
