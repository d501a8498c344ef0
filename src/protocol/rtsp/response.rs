use super::Headers;

/// RTSP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const UNSUPPORTED_MEDIA_TYPE: StatusCode = StatusCode(415);
    /// Sent when a busy target refuses a second sender
    pub const NOT_ENOUGH_BANDWIDTH: StatusCode = StatusCode(453);
    pub const METHOD_NOT_VALID: StatusCode = StatusCode(455);
    pub const UNSUPPORTED_TRANSPORT: StatusCode = StatusCode(461);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);

    /// 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Numeric code
    #[must_use]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Reason phrase for the status line
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            403 => "Forbidden",
            415 => "Unsupported Media Type",
            453 => "Not Enough Bandwidth",
            455 => "Method Not Valid in This State",
            461 => "Unsupported Transport",
            501 => "Not Implemented",
            _ => "Unknown",
        }
    }
}

/// An RTSP response
#[derive(Debug, Clone)]
pub struct RtspResponse {
    /// Protocol version, `RTSP/1.0`
    pub version: String,
    /// Status code
    pub status: StatusCode,
    /// Reason phrase
    pub reason: String,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Vec<u8>,
}

impl RtspResponse {
    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `CSeq` echoed from the request
    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.headers.cseq()
    }

    /// Session id, once SETUP has succeeded
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.headers.session()
    }

    /// Body as UTF-8 text, lossy
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
