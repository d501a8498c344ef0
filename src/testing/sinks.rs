//! Sinks that record what they were asked to do

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::audio::AudioFrame;
use crate::error::SinkError;
use crate::sink::{MediaPlayer, Speaker};

/// A call made on a [`RecordingMediaPlayer`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    /// `play(source)`
    Play(String),
    /// `set_media_url(url)`
    SetMediaUrl(String),
    /// `stop()`
    Stop,
    /// `set_volume(volume)`
    SetVolume(f32),
}

/// Media player that records calls and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingMediaPlayer {
    name: Option<String>,
    calls: Mutex<Vec<PlayerCall>>,
    failing: AtomicBool,
}

impl RecordingMediaPlayer {
    /// Create a player with no name of its own
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a player that reports `name`
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Make every subsequent call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls received so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// URLs passed to `set_media_url`, in order
    #[must_use]
    pub fn media_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlayerCall::SetMediaUrl(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: PlayerCall) -> Result<(), SinkError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if self.failing.load(Ordering::SeqCst) {
            Err(SinkError::player("recording player set to fail"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaPlayer for RecordingMediaPlayer {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn play(&self, source: &str) -> Result<(), SinkError> {
        self.record(PlayerCall::Play(source.to_string()))
    }

    async fn set_media_url(&self, url: &str) -> Result<(), SinkError> {
        self.record(PlayerCall::SetMediaUrl(url.to_string()))
    }

    async fn stop(&self) -> Result<(), SinkError> {
        self.record(PlayerCall::Stop)
    }

    async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
        self.record(PlayerCall::SetVolume(volume))
    }
}

/// Speaker that keeps every frame it is given
#[derive(Debug, Default)]
pub struct RecordingSpeaker {
    frames: Mutex<Vec<AudioFrame>>,
    volume: Mutex<Option<f32>>,
    starts: AtomicUsize,
    finishes: AtomicUsize,
    failing: AtomicBool,
    write_delay: Option<Duration>,
    written: Notify,
}

impl RecordingSpeaker {
    /// Create a speaker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a speaker that takes `delay` to accept each frame
    #[must_use]
    pub fn with_write_delay(delay: Duration) -> Self {
        Self {
            write_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make every subsequent write fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Frames written so far
    #[must_use]
    pub fn frames(&self) -> Vec<AudioFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of frames written
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Every sample written, concatenated
    #[must_use]
    pub fn samples(&self) -> Vec<i16> {
        self.frames()
            .iter()
            .flat_map(|frame| frame.samples().iter().copied())
            .collect()
    }

    /// Times `start` was called
    #[must_use]
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Times `finish` was called
    #[must_use]
    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }

    /// Last volume set
    #[must_use]
    pub fn volume(&self) -> Option<f32> {
        *self.volume.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until at least `count` frames were written; false on timeout
    pub async fn wait_for_frames(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let written = self.written.notified();
                if self.frame_count() >= count {
                    return;
                }
                written.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn start(&self) -> Result<(), SinkError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, frame: &AudioFrame) -> Result<(), SinkError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::speaker("recording speaker set to fail"));
        }
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());
        self.written.notify_waiters();
        Ok(())
    }

    async fn finish(&self) -> Result<(), SinkError> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), SinkError> {
        *self.volume.lock().unwrap_or_else(PoisonError::into_inner) = Some(volume);
        Ok(())
    }
}
