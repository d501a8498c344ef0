//! Server-side RTSP codec
//!
//! Parses RTSP requests and RTSP-interleaved binary frames from a single
//! byte stream, and encodes responses. RAOP senders that negotiate
//! `RTP/AVP/TCP` multiplex audio onto the control connection as
//! `'$' <channel> <u16 length> <payload>` frames between requests.

use bytes::{Buf, Bytes, BytesMut};
use std::str;

use super::{Headers, Method, RtspRequest, RtspResponse, StatusCode, headers::names};

/// Errors during RTSP parsing
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid request line: {0}")]
    InvalidRequestLine(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("Body too large: {size} > {max}")]
    BodyTooLarge { size: usize, max: usize },

    #[error("Invalid UTF-8 in headers")]
    InvalidUtf8,
}

/// Maximum allowed body size
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Maximum header section size
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Interleaved frame marker
const INTERLEAVED_MAGIC: u8 = b'$';

/// A complete message read from the control connection
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// RTSP request
    Request(RtspRequest),
    /// Interleaved binary frame
    Interleaved {
        /// Channel number (0 = RTP audio, 1 = RTP control)
        channel: u8,
        /// Frame payload
        payload: Bytes,
    },
}

/// Server-side RTSP codec
///
/// Performs no I/O: `feed()` appends bytes, `decode()` yields complete
/// messages.
pub struct RtspServerCodec {
    buffer: BytesMut,
}

impl RtspServerCodec {
    /// Create a new server codec
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Feed bytes into the internal buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Get current buffer length
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Attempt to decode one complete message
    ///
    /// Returns `Ok(None)` when more data is needed.
    ///
    /// # Errors
    /// Returns `ParseError` if the request is malformed. The buffer is
    /// cleared so the caller can reply and continue or drop the connection.
    pub fn decode(&mut self) -> Result<Option<InboundMessage>, ParseError> {
        // Stray CRLFs between messages are legal keep-alives
        while self.buffer.starts_with(b"\r\n") {
            self.buffer.advance(2);
        }

        if self.buffer.first() == Some(&INTERLEAVED_MAGIC) {
            return Ok(self.decode_interleaved());
        }

        match self.decode_request() {
            Ok(request) => Ok(request.map(InboundMessage::Request)),
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    fn decode_interleaved(&mut self) -> Option<InboundMessage> {
        if self.buffer.len() < 4 {
            return None;
        }
        let channel = self.buffer[1];
        let len = usize::from(u16::from_be_bytes([self.buffer[2], self.buffer[3]]));
        if self.buffer.len() < 4 + len {
            return None;
        }
        self.buffer.advance(4);
        let payload = self.buffer.split_to(len).freeze();
        Some(InboundMessage::Interleaved { channel, payload })
    }

    fn decode_request(&mut self) -> Result<Option<RtspRequest>, ParseError> {
        let Some(header_end) = self.find_header_end() else {
            if self.buffer.len() > MAX_HEADER_SIZE {
                return Err(ParseError::InvalidHeader("Headers too large".into()));
            }
            return Ok(None);
        };

        let header_str =
            str::from_utf8(&self.buffer[..header_end]).map_err(|_| ParseError::InvalidUtf8)?;

        let (method, uri, headers) = Self::parse_headers(header_str)?;

        let content_length = headers
            .get(names::CONTENT_LENGTH)
            .map(|v| v.trim().parse::<usize>())
            .transpose()
            .map_err(|_| ParseError::InvalidContentLength("Not a number".into()))?
            .unwrap_or(0);

        if content_length > MAX_BODY_SIZE {
            return Err(ParseError::BodyTooLarge {
                size: content_length,
                max: MAX_BODY_SIZE,
            });
        }

        let total_size = header_end + 4 + content_length;
        if self.buffer.len() < total_size {
            return Ok(None);
        }

        self.buffer.advance(header_end + 4);
        let body = self.buffer.split_to(content_length).to_vec();

        Ok(Some(RtspRequest {
            method,
            uri,
            headers,
            body,
        }))
    }

    fn find_header_end(&self) -> Option<usize> {
        self.buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    fn parse_headers(header_str: &str) -> Result<(Method, String, Headers), ParseError> {
        let mut lines = header_str.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| ParseError::InvalidRequestLine("Empty request".into()))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, uri, protocol] = parts.as_slice() else {
            return Err(ParseError::InvalidRequestLine(request_line.to_string()));
        };

        if !protocol.starts_with("RTSP/") && !protocol.starts_with("HTTP/") {
            return Err(ParseError::InvalidRequestLine(format!(
                "Invalid protocol: {protocol}"
            )));
        }

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(ParseError::InvalidHeader(line.to_string()));
            };
            headers.insert(name.trim(), value.trim());
        }

        Ok((Method::from_token(method), (*uri).to_string(), headers))
    }
}

impl Default for RtspServerCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for RTSP responses
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl ResponseBuilder {
    /// Create a new response builder with the given status
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: None,
        }
    }

    /// Create an OK (200) response
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Create an error response
    #[must_use]
    pub fn error(status: StatusCode) -> Self {
        Self::new(status)
    }

    /// Set the `CSeq` header
    #[must_use]
    pub fn cseq(mut self, cseq: u32) -> Self {
        self.headers.insert(names::CSEQ, cseq.to_string());
        self
    }

    /// Set the Session header
    #[must_use]
    pub fn session(mut self, session_id: &str) -> Self {
        self.headers.insert(names::SESSION, session_id);
        self
    }

    /// Add a custom header
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a `text/parameters` body
    #[must_use]
    pub fn text_body(self, body: &str) -> Self {
        self.binary_body(body.as_bytes().to_vec(), "text/parameters")
    }

    /// Set a binary body
    #[must_use]
    pub fn binary_body(mut self, body: Vec<u8>, content_type: &str) -> Self {
        self.body = Some(body);
        self.headers.insert(names::CONTENT_TYPE, content_type);
        self
    }

    /// Set the Audio-Latency header
    #[must_use]
    pub fn audio_latency(mut self, samples: u32) -> Self {
        self.headers
            .insert(super::headers::raop::AUDIO_LATENCY, samples.to_string());
        self
    }

    /// Build into an `RtspResponse`
    #[must_use]
    pub fn build(mut self) -> RtspResponse {
        if let Some(ref body) = self.body {
            self.headers
                .insert(names::CONTENT_LENGTH, body.len().to_string());
        }

        RtspResponse {
            version: "RTSP/1.0".to_string(),
            status: self.status,
            reason: self.status.reason().to_string(),
            headers: self.headers,
            body: self.body.unwrap_or_default(),
        }
    }
}

/// Encode an RTSP response to bytes
#[must_use]
pub fn encode_response(response: &RtspResponse) -> Vec<u8> {
    let mut output = Vec::with_capacity(256 + response.body.len());

    output.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            response.version,
            response.status.as_u16(),
            response.reason
        )
        .as_bytes(),
    );

    for (name, value) in response.headers.iter() {
        output.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    output.extend_from_slice(b"\r\n");
    output.extend_from_slice(&response.body);

    output
}

/// Encode an interleaved binary frame
///
/// Payloads longer than `u16::MAX` are truncated to fit the length field.
#[must_use]
pub fn encode_interleaved(channel: u8, payload: &[u8]) -> Vec<u8> {
    let len = u16::try_from(payload.len()).unwrap_or(u16::MAX);
    let mut output = Vec::with_capacity(4 + usize::from(len));
    output.push(INTERLEAVED_MAGIC);
    output.push(channel);
    output.extend_from_slice(&len.to_be_bytes());
    output.extend_from_slice(&payload[..usize::from(len)]);
    output
}
