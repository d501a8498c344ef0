use thiserror::Error;

use super::{MediaDescription, SessionDescription};

/// SDP parse failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdpParseError {
    #[error("invalid media line: {0}")]
    InvalidMedia(String),
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Line-oriented SDP parser
///
/// Attributes after an `m=` line belong to that media section. Lines the
/// receiver has no use for are skipped without validation.
pub struct SdpParser;

impl SdpParser {
    /// Parse an SDP body
    ///
    /// # Errors
    ///
    /// Returns `SdpParseError` if an `m=` line is malformed.
    pub fn parse(input: &str) -> Result<SessionDescription, SdpParseError> {
        let mut sdp = SessionDescription::default();

        for line in input.lines().map(str::trim) {
            let Some((kind, value)) = line.split_once('=') else {
                continue;
            };

            match kind {
                "s" => sdp.session_name = value.to_string(),
                "m" => sdp.media.push(Self::parse_media(value)?),
                "a" => {
                    let (name, value) = match value.split_once(':') {
                        Some((name, value)) => (name, Some(value.trim().to_string())),
                        None => (value, None),
                    };
                    let attributes = match sdp.media.last_mut() {
                        Some(media) => &mut media.attributes,
                        None => &mut sdp.attributes,
                    };
                    attributes.insert(name.to_string(), value);
                }
                _ => {}
            }
        }

        Ok(sdp)
    }

    /// `<media> <port> <proto> <fmt> ...`
    fn parse_media(value: &str) -> Result<MediaDescription, SdpParseError> {
        let mut fields = value.split_whitespace();
        let media_type = fields.next();
        let formats: Vec<String> = fields.skip(2).map(str::to_string).collect();

        match media_type {
            Some(media_type) if !formats.is_empty() => Ok(MediaDescription {
                media_type: media_type.to_string(),
                formats,
                attributes: super::Attributes::new(),
            }),
            _ => Err(SdpParseError::InvalidMedia(value.to_string())),
        }
    }
}
