//! Playback sinks
//!
//! A target relays to a [`MediaPlayer`] and, optionally, a raw PCM
//! [`Speaker`]. Both are supplied by the host; the [`SinkAdapter`] presents
//! them to a session as one push interface.

mod adapter;
mod template;

#[cfg(test)]
mod tests;

use async_trait::async_trait;

pub use adapter::{Delivery, SinkAdapter, SinkHealth};
pub use template::{MediaUrlTemplate, UrlContext};

use crate::audio::AudioFrame;
use crate::error::SinkError;

/// A media player driven by transport commands and a media URL
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    /// Player's own name, used to label unnamed targets
    fn name(&self) -> Option<String> {
        None
    }

    /// Start playback; `source` labels what is playing
    async fn play(&self, source: &str) -> Result<(), SinkError>;

    /// Point the player at a media URL
    async fn set_media_url(&self, url: &str) -> Result<(), SinkError>;

    /// Stop playback
    async fn stop(&self) -> Result<(), SinkError>;

    /// Set volume, 0.0 to 1.0
    async fn set_volume(&self, _volume: f32) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A raw PCM output
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Prepare for a stream
    async fn start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Play one frame
    async fn write(&self, frame: &AudioFrame) -> Result<(), SinkError>;

    /// Stream ended; play out anything buffered
    async fn finish(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Set volume, 0.0 to 1.0
    async fn set_volume(&self, _volume: f32) -> Result<(), SinkError> {
        Ok(())
    }
}
