//! Bridge configuration
//!
//! Scalar settings live in [`BridgeSettings`], which derives serde so a host
//! can load them from its own configuration format. Targets carry sink handles
//! and are attached programmatically.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::JitterConfig;
use crate::error::ConfigurationError;
use crate::sink::{MediaPlayer, Speaker};

/// Default first port of the first target
pub const DEFAULT_PORT_BASE: u16 = 7000;

/// Default sample rate delivered to sinks
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 16_000;

/// Default advertised device name, used to label unnamed targets
pub const DEFAULT_DEVICE_NAME: &str = "AirPlay Bridge";

/// What to do when a sender connects to a target that already has a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreemptionPolicy {
    /// Refuse the new sender with `453 Not Enough Bandwidth`
    Reject,
    /// Tear down the existing session and admit the new sender
    #[default]
    AllowPreempt,
}

/// Scalar bridge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Name prefix for targets without an explicit name
    pub device_name: String,
    /// Address listeners bind to
    pub bind_address: IpAddr,
    /// First port of the first target; each target uses three ports
    pub port_base: u16,
    /// Sample rate of frames delivered to sinks
    pub output_sample_rate: u32,
    /// Template for the media player URL; empty disables URL injection
    pub media_url_template: String,
    /// Inactivity period after which a session is drained
    #[serde(with = "millis")]
    pub session_timeout: Duration,
    /// Consecutive expired checks required before the timeout fires
    pub timeout_confirmations: u32,
    /// Upper bound on flushing buffered audio during teardown
    #[serde(with = "millis")]
    pub drain_timeout: Duration,
    /// Preempted sessions closing slower than this are logged
    #[serde(with = "millis")]
    pub preempt_timeout: Duration,
    /// Packets accepted ahead of the next expected sequence
    pub reorder_window: u16,
    /// How long a missing packet is waited for before silence is inserted
    #[serde(with = "millis")]
    pub gap_timeout: Duration,
    /// Frames buffered between the pipeline and the sinks
    pub frame_queue_capacity: usize,
    /// Packets buffered between the UDP listeners and a session
    pub packet_channel_capacity: usize,
    /// Behaviour when a target is already in use
    pub preemption: PreemptionPolicy,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port_base: DEFAULT_PORT_BASE,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            media_url_template: String::new(),
            session_timeout: Duration::from_secs(30),
            timeout_confirmations: 2,
            drain_timeout: Duration::from_secs(2),
            preempt_timeout: Duration::from_secs(3),
            reorder_window: 64,
            gap_timeout: Duration::from_millis(200),
            frame_queue_capacity: 64,
            packet_channel_capacity: 256,
            preemption: PreemptionPolicy::AllowPreempt,
        }
    }
}

impl BridgeSettings {
    /// Set device name
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set bind address
    #[must_use]
    pub fn bind_address(mut self, addr: IpAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set port base
    #[must_use]
    pub fn port_base(mut self, port: u16) -> Self {
        self.port_base = port;
        self
    }

    /// Set output sample rate
    #[must_use]
    pub fn output_sample_rate(mut self, rate: u32) -> Self {
        self.output_sample_rate = rate;
        self
    }

    /// Set media URL template
    #[must_use]
    pub fn media_url_template(mut self, template: impl Into<String>) -> Self {
        self.media_url_template = template.into();
        self
    }

    /// Set session inactivity timeout
    #[must_use]
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Set drain timeout
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set gap timeout
    #[must_use]
    pub fn gap_timeout(mut self, timeout: Duration) -> Self {
        self.gap_timeout = timeout;
        self
    }

    /// Set frame queue capacity
    #[must_use]
    pub fn frame_queue_capacity(mut self, capacity: usize) -> Self {
        self.frame_queue_capacity = capacity;
        self
    }

    /// Set preemption policy
    #[must_use]
    pub fn preemption(mut self, policy: PreemptionPolicy) -> Self {
        self.preemption = policy;
        self
    }

    /// Set preemption warning threshold
    #[must_use]
    pub fn preempt_timeout(mut self, timeout: Duration) -> Self {
        self.preempt_timeout = timeout;
        self
    }

    /// Jitter buffer settings derived from these settings
    #[must_use]
    pub fn jitter(&self) -> JitterConfig {
        JitterConfig {
            reorder_window: self.reorder_window.max(1),
            gap_timeout: self.gap_timeout,
        }
    }

    /// Check settings that do not depend on targets
    ///
    /// # Errors
    /// Returns `ConfigurationError` for a zero sample rate or port base.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.output_sample_rate == 0 {
            return Err(ConfigurationError::InvalidSampleRate(
                self.output_sample_rate,
            ));
        }
        if self.port_base == 0 {
            return Err(ConfigurationError::InvalidPortBase(self.port_base));
        }
        Ok(())
    }
}

/// One configured relay target
#[derive(Clone)]
pub struct TargetConfig {
    /// Display name; generated when absent
    pub name: Option<String>,
    /// Media player sink, always present
    pub media_player: Arc<dyn MediaPlayer>,
    /// Optional raw PCM sink
    pub speaker: Option<Arc<dyn Speaker>>,
}

impl TargetConfig {
    /// Create a target backed by a media player only
    pub fn new(media_player: Arc<dyn MediaPlayer>) -> Self {
        Self {
            name: None,
            media_player,
            speaker: None,
        }
    }

    /// Set display name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a speaker
    #[must_use]
    pub fn speaker(mut self, speaker: Arc<dyn Speaker>) -> Self {
        self.speaker = Some(speaker);
        self
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("name", &self.name)
            .field("has_speaker", &self.speaker.is_some())
            .finish_non_exhaustive()
    }
}

/// Full bridge configuration
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// Scalar settings
    pub settings: BridgeSettings,
    /// Relay targets, in port order
    pub targets: Vec<TargetConfig>,
}

impl BridgeConfig {
    /// Create a configuration with the given settings and no targets
    #[must_use]
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            settings,
            targets: Vec::new(),
        }
    }

    /// Append a target
    #[must_use]
    pub fn target(mut self, target: TargetConfig) -> Self {
        self.targets.push(target);
        self
    }

    /// Validate settings and target list
    ///
    /// # Errors
    /// Returns `ConfigurationError` when no targets are configured or the
    /// settings are invalid.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.targets.is_empty() {
            return Err(ConfigurationError::NoTargets);
        }
        self.settings.validate()
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "configured timeouts are far below u64::MAX milliseconds"
        )]
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
