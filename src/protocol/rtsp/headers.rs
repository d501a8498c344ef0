/// Standard RTSP header names
pub mod names {
    pub const CSEQ: &str = "CSeq";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const SESSION: &str = "Session";
    pub const TRANSPORT: &str = "Transport";
    pub const PUBLIC: &str = "Public";
    pub const RTP_INFO: &str = "RTP-Info";
}

/// Headers specific to AirTunes senders and receivers
pub mod raop {
    /// Base64 nonce the sender asks the receiver to sign
    pub const APPLE_CHALLENGE: &str = "Apple-Challenge";
    /// Signed nonce
    pub const APPLE_RESPONSE: &str = "Apple-Response";
    /// Receiver latency in samples, on RECORD
    pub const AUDIO_LATENCY: &str = "Audio-Latency";
    pub const AUDIO_JACK_STATUS: &str = "Audio-Jack-Status";
    /// Remote-control id, echoed on OPTIONS
    pub const DACP_ID: &str = "DACP-ID";
    /// Remote-control token, echoed on OPTIONS
    pub const ACTIVE_REMOTE: &str = "Active-Remote";
    pub const SERVER: &str = "Server";
}

/// Ordered, case-insensitive header map
///
/// Senders are inconsistent about case (`CSeq`, `Cseq`, `cseq`), so every
/// lookup ignores it. Order is kept for encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, overwriting an existing entry of any case in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let entry = (name.into(), value.into());
        match self.position(&entry.0) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Value of `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.entries[index].1.as_str())
    }

    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.get(names::CSEQ)?.trim().parse().ok()
    }

    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get(names::CONTENT_LENGTH)?.trim().parse().ok()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get(names::CONTENT_TYPE)
    }

    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.get(names::SESSION)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/sdp");
        assert_eq!(headers.get("content-type"), Some("application/sdp"));
        assert_eq!(headers.content_type(), Some("application/sdp"));
        assert_eq!(headers.get("Content-Length"), None);
    }

    #[test]
    fn test_insert_overwrites_in_place() {
        let mut headers = Headers::new();
        headers.insert("Transport", "RTP/AVP");
        headers.insert("cseq", "1");
        headers.insert("CSeq", "2");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.cseq(), Some(2));
        let order: Vec<_> = headers.iter().collect();
        assert_eq!(order, [("Transport", "RTP/AVP"), ("CSeq", "2")]);
    }

    #[test]
    fn test_unparseable_numbers() {
        let mut headers = Headers::new();
        assert!(headers.is_empty());
        headers.insert("CSeq", "x");
        headers.insert("Content-Length", "-1");
        assert_eq!(headers.cseq(), None);
        assert_eq!(headers.content_length(), None);
    }
}
