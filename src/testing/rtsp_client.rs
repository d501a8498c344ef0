//! Sender side of RTSP: request encoding and response parsing

use bytes::{Buf, BytesMut};
use thiserror::Error;

use crate::protocol::rtsp::headers::names;
use crate::protocol::rtsp::{Headers, Method, RtspRequest, RtspResponse, StatusCode};

/// Largest response the reader buffers
const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Builds requests the way a RAOP sender writes them
#[derive(Debug)]
pub struct RequestBuilder {
    request: RtspRequest,
}

impl RequestBuilder {
    /// Start a request with no headers and no body
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            request: RtspRequest {
                method,
                uri: uri.into(),
                headers: Headers::new(),
                body: Vec::new(),
            },
        }
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name, value);
        self
    }

    /// Set `CSeq`
    #[must_use]
    pub fn cseq(self, seq: u32) -> Self {
        self.header(names::CSEQ, seq.to_string())
    }

    /// Set `Content-Type`
    #[must_use]
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(names::CONTENT_TYPE, content_type)
    }

    /// Set `Session`
    #[must_use]
    pub fn session(self, session_id: &str) -> Self {
        self.header(names::SESSION, session_id)
    }

    /// Set the body; `Content-Length` is added on encoding
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.request.body = body;
        self
    }

    /// Finish the request
    #[must_use]
    pub fn build(self) -> RtspRequest {
        self.request
    }
}

/// Serialize a request for the wire
#[must_use]
pub fn encode_request(request: &RtspRequest) -> Vec<u8> {
    let mut head = format!("{} {} RTSP/1.0\r\n", request.method, request.uri);
    for (name, value) in request
        .headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(names::CONTENT_LENGTH))
    {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    if !request.body.is_empty() {
        head.push_str(&format!("{}: {}\r\n", names::CONTENT_LENGTH, request.body.len()));
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(&request.body);
    out
}

/// Response parsing failures
#[derive(Debug, Error)]
pub enum ResponseReadError {
    #[error("invalid status line: {0}")]
    InvalidStatusLine(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("response exceeds {MAX_RESPONSE_SIZE} bytes")]
    TooLarge,
}

/// Incremental reader of the bridge's responses
#[derive(Debug, Default)]
pub struct ResponseReader {
    buffer: BytesMut,
}

impl ResponseReader {
    /// Create an empty reader
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer bytes read from the connection
    ///
    /// # Errors
    /// Returns `ResponseReadError::TooLarge` once the buffer would pass the
    /// size limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), ResponseReadError> {
        if self.buffer.len() + bytes.len() > MAX_RESPONSE_SIZE {
            return Err(ResponseReadError::TooLarge);
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Take the next complete response, if buffered
    ///
    /// # Errors
    /// Returns `ResponseReadError` for a malformed status line or header.
    pub fn decode(&mut self) -> Result<Option<RtspResponse>, ResponseReadError> {
        let Some(head_len) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
            return Ok(None);
        };

        let head = String::from_utf8_lossy(&self.buffer[..head_len]).into_owned();
        let mut lines = head.split("\r\n");
        let (version, status, reason) = parse_status_line(lines.next().unwrap_or_default())?;

        let mut headers = Headers::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ResponseReadError::InvalidHeader(line.to_string()))?;
            headers.insert(name.trim(), value.trim());
        }

        let body_start = head_len + 4;
        let body_end = body_start + headers.content_length().unwrap_or(0);
        if self.buffer.len() < body_end {
            return Ok(None);
        }

        self.buffer.advance(body_start);
        let body = self.buffer.split_to(body_end - body_start).to_vec();

        Ok(Some(RtspResponse {
            version,
            status,
            reason,
            headers,
            body,
        }))
    }
}

fn parse_status_line(line: &str) -> Result<(String, StatusCode, String), ResponseReadError> {
    let invalid = || ResponseReadError::InvalidStatusLine(line.to_string());
    let mut parts = line.splitn(3, ' ');

    let version = parts.next().filter(|v| v.starts_with("RTSP/")).ok_or_else(invalid)?;
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(invalid)?;
    let reason = parts.next().unwrap_or_default();

    Ok((version.to_string(), StatusCode(status), reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request_counts_body() {
        let request = RequestBuilder::new(Method::SetParameter, "rtsp://10.0.0.2/1")
            .cseq(5)
            .content_type("text/parameters")
            .header(names::CONTENT_LENGTH, "999")
            .body(b"volume: -20.0\r\n".to_vec())
            .build();

        let encoded = String::from_utf8(encode_request(&request)).unwrap();
        assert!(encoded.starts_with("SET_PARAMETER rtsp://10.0.0.2/1 RTSP/1.0\r\n"));
        assert!(encoded.contains("CSeq: 5\r\n"));
        assert!(encoded.contains("Content-Length: 15\r\n"));
        assert!(!encoded.contains("999"));
        assert!(encoded.ends_with("\r\n\r\nvolume: -20.0\r\n"));
    }

    #[test]
    fn test_read_response_in_pieces() {
        let mut reader = ResponseReader::new();
        reader
            .feed(b"RTSP/1.0 200 OK\r\nCSeq: 7\r\nContent-Length: 5\r\n\r\nhel")
            .unwrap();
        assert!(reader.decode().unwrap().is_none());
        reader.feed(b"lo").unwrap();

        let response = reader.decode().unwrap().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.cseq(), Some(7));
        assert_eq!(response.body, b"hello");
        assert!(reader.decode().unwrap().is_none());
    }

    #[test]
    fn test_read_pipelined_responses() {
        let mut reader = ResponseReader::new();
        reader
            .feed(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\nRTSP/1.0 455 Method Not Valid in This State\r\nCSeq: 2\r\n\r\n")
            .unwrap();
        assert_eq!(reader.decode().unwrap().unwrap().cseq(), Some(1));
        assert_eq!(
            reader.decode().unwrap().unwrap().status,
            StatusCode::METHOD_NOT_VALID
        );
    }

    #[test]
    fn test_malformed_status_line() {
        let mut reader = ResponseReader::new();
        reader.feed(b"HTTP/1.1 abc\r\n\r\n").unwrap();
        assert!(matches!(
            reader.decode(),
            Err(ResponseReadError::InvalidStatusLine(_))
        ));
    }
}
