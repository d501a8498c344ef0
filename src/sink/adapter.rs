use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::template::{MediaUrlTemplate, UrlContext};
use super::{MediaPlayer, Speaker};
use crate::audio::AudioFrame;
use crate::error::SinkError;
use crate::protocol::dmap::TrackMetadata;

/// How a frame was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the speaker
    Delivered,
    /// No speaker; the player streams from its URL and needs no frames
    ControlOnly,
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkHealth {
    /// Frames written to the speaker
    pub delivered: u64,
    /// Frames the speaker refused
    pub failed: u64,
    /// Failures since the last success
    pub consecutive_failures: u64,
    /// Whether the media player accepted its last command
    pub player_available: bool,
}

/// One push interface over a target's media player and optional speaker
///
/// Player and speaker are driven independently: a failure on one never
/// skips a call on the other.
pub struct SinkAdapter {
    player: Arc<dyn MediaPlayer>,
    speaker: Option<Arc<dyn Speaker>>,
    template: MediaUrlTemplate,
    label: String,
    last_metadata: Mutex<Option<TrackMetadata>>,
    player_available: AtomicBool,
    delivered: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl SinkAdapter {
    /// Create an adapter; `label` is what the player is told it is playing
    pub fn new(
        player: Arc<dyn MediaPlayer>,
        speaker: Option<Arc<dyn Speaker>>,
        template: MediaUrlTemplate,
        label: impl Into<String>,
    ) -> Self {
        Self {
            player,
            speaker,
            template,
            label: label.into(),
            last_metadata: Mutex::new(None),
            player_available: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
        }
    }

    /// Whether a speaker is attached
    #[must_use]
    pub fn has_speaker(&self) -> bool {
        self.speaker.is_some()
    }

    fn player_result(&self, result: Result<(), SinkError>) -> Result<(), SinkError> {
        self.player_available.store(result.is_ok(), Ordering::Relaxed);
        result
    }

    /// Begin a stream
    ///
    /// # Errors
    /// Returns the first failure; every sink is still attempted.
    pub async fn start(&self, ctx: &UrlContext) -> Result<(), SinkError> {
        let speaker = match &self.speaker {
            Some(speaker) => speaker.start().await,
            None => Ok(()),
        };

        let metadata = self
            .last_metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let url = match self.template.render(ctx, metadata.as_ref()) {
            Some(url) => self.player.set_media_url(&url).await,
            None => Ok(()),
        };
        let play = match url {
            Ok(()) => self.player.play(&self.label).await,
            Err(e) => Err(e),
        };
        let player = self.player_result(play);

        speaker.and(player)
    }

    /// Hand one frame to the sinks
    ///
    /// # Errors
    /// Returns the speaker's error when it refuses the frame, or
    /// `NoSinkAvailable` when neither sink can take it. The frame is not
    /// retried.
    pub async fn deliver(&self, frame: &AudioFrame) -> Result<Delivery, SinkError> {
        let player_available = self.player_available.load(Ordering::Relaxed);

        let Some(speaker) = &self.speaker else {
            return if player_available {
                Ok(Delivery::ControlOnly)
            } else {
                Err(SinkError::NoSinkAvailable)
            };
        };

        match speaker.write(frame).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Ok(Delivery::Delivered)
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                if player_available {
                    Err(e)
                } else {
                    Err(SinkError::NoSinkAvailable)
                }
            }
        }
    }

    /// Record new track metadata, re-pointing the player when it changed
    ///
    /// Returns whether the player was sent a new URL.
    ///
    /// # Errors
    /// Returns the player's error if it refused the URL.
    pub async fn update_metadata(
        &self,
        metadata: &TrackMetadata,
        ctx: &UrlContext,
    ) -> Result<bool, SinkError> {
        {
            let mut last = self
                .last_metadata
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.as_ref() == Some(metadata) {
                return Ok(false);
            }
            *last = Some(metadata.clone());
        }

        let Some(url) = self.template.render(ctx, Some(metadata)) else {
            return Ok(false);
        };

        tracing::debug!(url = %url, "Updating media URL for new metadata");
        let result = self.player.set_media_url(&url).await;
        self.player_result(result).map(|()| true)
    }

    /// Apply a linear volume to both sinks
    ///
    /// # Errors
    /// Returns the first failure; both sinks are still attempted.
    pub async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
        let volume = volume.clamp(0.0, 1.0);
        let speaker = match &self.speaker {
            Some(speaker) => speaker.set_volume(volume).await,
            None => Ok(()),
        };
        let player = self.player.set_volume(volume).await;
        speaker.and(player)
    }

    /// End the stream on both sinks
    ///
    /// # Errors
    /// Returns the first failure; both sinks are still attempted.
    pub async fn stop(&self) -> Result<(), SinkError> {
        let speaker = match &self.speaker {
            Some(speaker) => speaker.finish().await,
            None => Ok(()),
        };
        let player = self.player.stop().await;
        speaker.and(player)
    }

    /// Current counters
    #[must_use]
    pub fn health(&self) -> SinkHealth {
        SinkHealth {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            player_available: self.player_available.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for SinkAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkAdapter")
            .field("label", &self.label)
            .field("template", &self.template)
            .field("has_speaker", &self.speaker.is_some())
            .field("health", &self.health())
            .finish_non_exhaustive()
    }
}
