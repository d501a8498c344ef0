#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use airplay_bridge::protocol::rtsp::Method;
use airplay_bridge::testing::{
    MockSender, RecordingMediaPlayer, RecordingSpeaker, StalledAuthenticator, encode_request,
    free_port_base,
};
use airplay_bridge::{
    Bridge, BridgeConfig, BridgeEvent, BridgeSettings, PassthroughAuthenticator,
    SessionAuthenticator, TargetConfig,
};
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Settings bound to localhost on free ports, with audio passed through at 44.1kHz
pub fn local_settings(targets: u16) -> BridgeSettings {
    BridgeSettings::default()
        .bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .port_base(free_port_base(targets * 3))
        .output_sample_rate(44_100)
}

pub struct TestBridge {
    pub bridge: Bridge,
    pub players: Vec<Arc<RecordingMediaPlayer>>,
    pub speakers: Vec<Arc<RecordingSpeaker>>,
    pub events: broadcast::Receiver<BridgeEvent>,
}

impl TestBridge {
    pub async fn start(settings: BridgeSettings, names: &[&str]) -> Self {
        Self::start_with(settings, names, Arc::new(PassthroughAuthenticator)).await
    }

    pub async fn start_with(
        settings: BridgeSettings,
        names: &[&str],
        authenticator: Arc<dyn SessionAuthenticator>,
    ) -> Self {
        let speakers = names
            .iter()
            .map(|_| Arc::new(RecordingSpeaker::new()))
            .collect();
        Self::start_with_speakers(settings, names, speakers, authenticator).await
    }

    /// Start with one given speaker per target
    pub async fn start_with_speakers(
        settings: BridgeSettings,
        names: &[&str],
        speakers: Vec<Arc<RecordingSpeaker>>,
        authenticator: Arc<dyn SessionAuthenticator>,
    ) -> Self {
        init_tracing();
        let mut config = BridgeConfig::new(settings);
        let mut players = Vec::new();
        for (name, speaker) in names.iter().zip(&speakers) {
            let player = Arc::new(RecordingMediaPlayer::new());
            config = config.target(
                TargetConfig::new(player.clone())
                    .name(*name)
                    .speaker(speaker.clone()),
            );
            players.push(player);
        }

        let bridge = Bridge::new(config, authenticator).unwrap();
        let events = bridge.subscribe();
        bridge.start().await.unwrap();
        Self {
            bridge,
            players,
            speakers,
            events,
        }
    }

    /// RTSP address of target `index`
    pub fn addr(&self, index: usize) -> SocketAddr {
        let info = &self.bridge.targets()[index];
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), info.ports.control_port)
    }

    /// Wait for the first event matching `pred`
    pub async fn expect_event(
        &mut self,
        pred: impl Fn(&BridgeEvent) -> bool,
    ) -> BridgeEvent {
        wait_event(&mut self.events, pred)
            .await
            .expect("expected event was not emitted")
    }
}

pub async fn wait_event(
    events: &mut broadcast::Receiver<BridgeEvent>,
    pred: impl Fn(&BridgeEvent) -> bool,
) -> Option<BridgeEvent> {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Send ANNOUNCE without waiting for the response
pub async fn announce_unanswered(sender: &mut MockSender) {
    let sdp = sender.sdp();
    let request = sender
        .request(Method::Announce)
        .content_type("application/sdp")
        .body(sdp.into_bytes())
        .build();
    sender.send_raw(&encode_request(&request)).await.unwrap();
}

/// Wait until `auth` has begun `count` handshakes
pub async fn handshakes_started(auth: &StalledAuthenticator, count: usize) {
    tokio::time::timeout(WAIT, async {
        while auth.started() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("handshake never started");
}
