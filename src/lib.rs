//! # airplay-bridge
//!
//! A multi-target `AirPlay` (RAOP) receiver that relays decoded audio to
//! local playback sinks.
//!
//! ## Features
//!
//! - Several independent receiver endpoints, each on its own port range
//! - RTSP session handling with preemption of the previous sender
//! - Jitter buffering, decoding, packet loss concealment and resampling
//! - Media player control with templated media URLs
//! - Optional raw PCM output per target
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use airplay_bridge::testing::RecordingMediaPlayer;
//! use airplay_bridge::{
//!     Bridge, BridgeConfig, BridgeSettings, PassthroughAuthenticator, TargetConfig,
//! };
//!
//! # async fn example() -> Result<(), airplay_bridge::BridgeError> {
//! let config = BridgeConfig::new(BridgeSettings::default().port_base(7000))
//!     .target(TargetConfig::new(Arc::new(RecordingMediaPlayer::new())).name("Kitchen"))
//!     .target(TargetConfig::new(Arc::new(RecordingMediaPlayer::new())).name("Den"));
//!
//! let bridge = Bridge::new(config, Arc::new(PassthroughAuthenticator))?;
//! bridge.start().await?;
//!
//! let mut events = bridge.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//!
//! bridge.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Bridge**: [`Bridge`] owns the targets, binds their ports and admits
//!   senders, at most one per target
//! - **Session**: one RTSP connection and its negotiated stream
//! - **Audio**: sans-IO pipeline from RTP packets to output frames
//! - **Sinks**: host-supplied [`MediaPlayer`] and [`Speaker`]
//! - **Protocol**: RTSP, RTP, SDP and DMAP codecs

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audio;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod diagnostics;
/// Error types
pub mod error;
pub mod ports;
pub mod protocol;
pub mod session;
pub mod sink;

/// Testing utilities
pub mod testing;

pub use audio::{AudioCodec, AudioFrame, StreamParameters};
pub use auth::{HandshakeRequest, PassthroughAuthenticator, SessionAuthenticator, SessionCredentials};
pub use bridge::{Bridge, BridgeEvent, BridgeState, TargetId, TargetInfo};
pub use config::{BridgeConfig, BridgeSettings, PreemptionPolicy, TargetConfig};
pub use error::{AuthFailure, BridgeError, ConfigurationError, SinkError, TransportError};
pub use protocol::dmap::TrackMetadata;
pub use session::{CloseReason, SessionSnapshot, SessionState};
pub use sink::{MediaPlayer, Speaker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
