//! SDP bodies of RAOP ANNOUNCE requests
//!
//! Only what a receiver acts on is kept: the media sections and their
//! attributes. Origin, connection and timing lines are skipped.

mod parser;
pub mod raop;

#[cfg(test)]
mod raop_tests;

pub use parser::{SdpParseError, SdpParser};
pub use raop::{AlacParameters, EncryptionParams, extract_stream_parameters};

use std::collections::HashMap;

type Attributes = HashMap<String, Option<String>>;

/// Parsed session description
#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    /// `s=` line, the sender's name for the session
    pub session_name: String,
    /// `m=` sections in order
    pub media: Vec<MediaDescription>,
    /// Session-level `a=` attributes
    pub attributes: Attributes,
}

/// One `m=` section
#[derive(Debug, Clone, Default)]
pub struct MediaDescription {
    /// `audio`, `video`, ...
    pub media_type: String,
    /// Payload type list
    pub formats: Vec<String>,
    /// Media-level `a=` attributes
    pub attributes: Attributes,
}

impl SessionDescription {
    /// Session-level attribute value
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)?.as_deref()
    }

    /// First audio section
    #[must_use]
    pub fn audio_media(&self) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.media_type == "audio")
    }

    /// Attribute of the audio section, falling back to the session level
    ///
    /// Some senders put `rsaaeskey`/`aesiv` before the `m=` line.
    #[must_use]
    pub fn audio_attribute(&self, name: &str) -> Option<&str> {
        self.audio_media()
            .and_then(|m| m.get_attribute(name))
            .or_else(|| self.get_attribute(name))
    }

    /// RSA-wrapped AES key, base64
    #[must_use]
    pub fn rsaaeskey(&self) -> Option<&str> {
        self.audio_attribute("rsaaeskey")
    }

    /// AES IV, base64
    #[must_use]
    pub fn aesiv(&self) -> Option<&str> {
        self.audio_attribute("aesiv")
    }
}

impl MediaDescription {
    /// Media-level attribute value
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)?.as_deref()
    }
}
