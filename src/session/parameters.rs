//! GET_PARAMETER / SET_PARAMETER bodies

use std::str::FromStr;

use crate::protocol::dmap::{MetadataError, TrackMetadata, parse_dmap_metadata};

/// Lowest volume a sender reports; silence
pub const VOLUME_MIN_DB: f32 = -144.0;
/// Full volume
pub const VOLUME_MAX_DB: f32 = 0.0;
/// Volumes at or below this are treated as silence
pub const SILENCE_THRESHOLD_DB: f32 = -100.0;

/// Volume from SET_PARAMETER
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeUpdate {
    /// Volume in dB as sent
    pub db: f32,
    /// Linear volume (0.0 to 1.0)
    pub linear: f32,
}

impl VolumeUpdate {
    /// Create from dB value
    #[must_use]
    pub fn from_db(db: f32) -> Self {
        let db = db.clamp(VOLUME_MIN_DB, VOLUME_MAX_DB);
        Self {
            db,
            linear: db_to_linear(db),
        }
    }

    /// Whether this volume mutes output
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.linear <= 0.0
    }
}

/// Convert dB volume to linear (0.0 to 1.0)
#[must_use]
pub fn db_to_linear(db: f32) -> f32 {
    if db <= SILENCE_THRESHOLD_DB {
        return 0.0;
    }
    10.0_f32.powf(db / 20.0).clamp(0.0, 1.0)
}

/// Convert linear volume to the dB value reported by GET_PARAMETER
#[must_use]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0001 {
        return VOLUME_MIN_DB;
    }
    (20.0 * linear.min(1.0).log10()).max(VOLUME_MIN_DB)
}

/// Parse volume from a `text/parameters` body
///
/// Format: "volume: -15.000000\r\n"
#[must_use]
pub fn parse_volume_parameter(body: &str) -> Option<VolumeUpdate> {
    body.lines()
        .filter_map(|line| line.trim().strip_prefix("volume:"))
        .find_map(|value| f32::from_str(value.trim()).ok())
        .map(VolumeUpdate::from_db)
}

/// Body for a GET_PARAMETER volume reply
#[must_use]
pub fn volume_response_body(linear: f32) -> String {
    format!("volume: {:.2}\r\n", linear_to_db(linear))
}

/// What a SET_PARAMETER request carried
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterUpdate {
    /// New volume
    Volume(VolumeUpdate),
    /// New track metadata
    Metadata(TrackMetadata),
    /// Artwork, progress, or anything else; acknowledged and ignored
    Ignored,
}

/// Interpret a SET_PARAMETER body by content type
///
/// # Errors
/// Returns `MetadataError` if a DMAP body is truncated.
pub fn parse_set_parameter(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<ParameterUpdate, MetadataError> {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

    if content_type.starts_with("application/x-dmap-tagged") {
        return parse_dmap_metadata(body).map(ParameterUpdate::Metadata);
    }

    if content_type.starts_with("text/parameters") {
        let text = String::from_utf8_lossy(body);
        if let Some(volume) = parse_volume_parameter(&text) {
            return Ok(ParameterUpdate::Volume(volume));
        }
    }

    Ok(ParameterUpdate::Ignored)
}
