use super::{Headers, Method};

/// A request received from a sender
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// Method
    pub method: Method,
    /// Request URI, e.g. `rtsp://192.168.1.10/3413821438`
    pub uri: String,
    /// Request headers
    pub headers: Headers,
    /// Request body, empty without `Content-Length`
    pub body: Vec<u8>,
}

impl RtspRequest {
    /// `CSeq` of the request, defaulting to 1 when absent or malformed
    #[must_use]
    pub fn cseq(&self) -> u32 {
        self.headers.cseq().unwrap_or(1)
    }

    /// Body as UTF-8 text, lossy
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
