//! Media URL templates
//!
//! The media player is pointed at a URL built from a template with
//! `{name}` placeholders. An empty template disables URL injection.

use std::net::IpAddr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::protocol::dmap::TrackMetadata;

/// Everything but RFC 3986 unreserved characters
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Values available to a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlContext {
    /// Local address of the sender's RTSP connection
    pub ip: IpAddr,
    /// Target control port
    pub port: u16,
    /// Target name
    pub target: String,
    /// Session id
    pub session: String,
}

/// A media URL template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaUrlTemplate(String);

impl MediaUrlTemplate {
    /// Placeholders a template may use
    pub const PLACEHOLDERS: [&'static str; 7] = [
        "{ip}", "{port}", "{target}", "{session}", "{title}", "{artist}", "{album}",
    ];

    /// Wrap a template string
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Whether URL injection is disabled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw template
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute every placeholder; absent metadata renders empty
    ///
    /// Target names and track metadata are free text and are
    /// percent-encoded. Returns `None` for an empty template.
    #[must_use]
    pub fn render(&self, ctx: &UrlContext, metadata: Option<&TrackMetadata>) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let metadata = metadata.cloned().unwrap_or_default();
        let values = [
            ctx.ip.to_string(),
            ctx.port.to_string(),
            encode(&ctx.target),
            ctx.session.clone(),
            encode(&metadata.title.unwrap_or_default()),
            encode(&metadata.artist.unwrap_or_default()),
            encode(&metadata.album.unwrap_or_default()),
        ];

        // Single pass, so substituted values are never re-expanded
        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match Self::PLACEHOLDERS.iter().position(|p| tail.starts_with(p)) {
                Some(i) => {
                    out.push_str(&values[i]);
                    rest = &tail[Self::PLACEHOLDERS[i].len()..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        Some(out)
    }
}

impl From<&str> for MediaUrlTemplate {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
