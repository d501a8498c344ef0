//! Relay targets

use std::fmt;
use std::sync::Arc;

use crate::config::{BridgeSettings, TargetConfig};
use crate::ports::PortAssignment;
use crate::sink::{MediaPlayer, Speaker};

/// Index of a target in configuration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub usize);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One AirPlay endpoint relaying to local sinks
///
/// Immutable once the bridge is built.
pub struct Target {
    id: TargetId,
    name: String,
    media_player: Arc<dyn MediaPlayer>,
    speaker: Option<Arc<dyn Speaker>>,
    output_sample_rate: u32,
    ports: PortAssignment,
}

impl Target {
    /// Build a target from its configuration
    ///
    /// Unnamed targets take the media player's own name, falling back to
    /// `"{device_name} {index + 1}"`.
    pub fn new(
        id: TargetId,
        config: TargetConfig,
        settings: &BridgeSettings,
        ports: PortAssignment,
    ) -> Self {
        let name = config
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| config.media_player.name().filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| format!("{} {}", settings.device_name, id.0 + 1));

        Self {
            id,
            name,
            media_player: config.media_player,
            speaker: config.speaker,
            output_sample_rate: settings.output_sample_rate,
            ports,
        }
    }

    /// Target id
    #[must_use]
    pub fn id(&self) -> TargetId {
        self.id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Media player sink
    #[must_use]
    pub fn media_player(&self) -> &Arc<dyn MediaPlayer> {
        &self.media_player
    }

    /// Speaker sink, if configured
    #[must_use]
    pub fn speaker(&self) -> Option<&Arc<dyn Speaker>> {
        self.speaker.as_ref()
    }

    /// Sample rate delivered to the sinks
    #[must_use]
    pub fn output_sample_rate(&self) -> u32 {
        self.output_sample_rate
    }

    /// Assigned ports
    #[must_use]
    pub fn ports(&self) -> PortAssignment {
        self.ports
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("has_speaker", &self.speaker.is_some())
            .field("output_sample_rate", &self.output_sample_rate)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a target for callers of the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    /// Target id
    pub id: TargetId,
    /// Display name
    pub name: String,
    /// Assigned ports
    pub ports: PortAssignment,
    /// Whether a speaker is attached
    pub has_speaker: bool,
    /// Sample rate delivered to the sinks
    pub output_sample_rate: u32,
}

impl From<&Target> for TargetInfo {
    fn from(target: &Target) -> Self {
        Self {
            id: target.id,
            name: target.name.clone(),
            ports: target.ports,
            has_speaker: target.speaker.is_some(),
            output_sample_rate: target.output_sample_rate,
        }
    }
}
