//! Sans-IO RTSP server side for RAOP
//!
//! Requests are parsed and responses encoded here; nothing performs I/O.

pub mod headers;
pub mod request;
pub mod response;
pub mod server_codec;
pub mod transport;


pub use headers::Headers;
pub use request::RtspRequest;
pub use response::{RtspResponse, StatusCode};
pub use server_codec::{
    InboundMessage, ParseError, ResponseBuilder, RtspServerCodec, encode_interleaved,
    encode_response,
};
pub use transport::{LowerTransport, TransportHeader, TransportParseError};

/// RTSP methods used by RAOP senders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Capability query
    Options,
    /// Announce stream information (SDP)
    Announce,
    /// Set up transport
    Setup,
    /// Start streaming
    Record,
    /// Pause playback
    Pause,
    /// Flush buffers
    Flush,
    /// Tear down session
    Teardown,
    /// Set parameter (volume, metadata, artwork, progress)
    SetParameter,
    /// Get parameter (volume)
    GetParameter,
    /// POST (`/fp-setup`, pairing endpoints)
    Post,
    /// GET (`/info`)
    Get,
    /// Any method this receiver does not implement
    Unsupported,
}

impl Method {
    /// Methods advertised in the OPTIONS `Public` header
    pub const PUBLIC: &'static str = "ANNOUNCE, SETUP, RECORD, PAUSE, FLUSH, TEARDOWN, OPTIONS, GET_PARAMETER, SET_PARAMETER, POST, GET";

    /// Convert to RTSP method string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Announce => "ANNOUNCE",
            Method::Setup => "SETUP",
            Method::Record => "RECORD",
            Method::Pause => "PAUSE",
            Method::Flush => "FLUSH",
            Method::Teardown => "TEARDOWN",
            Method::SetParameter => "SET_PARAMETER",
            Method::GetParameter => "GET_PARAMETER",
            Method::Post => "POST",
            Method::Get => "GET",
            Method::Unsupported => "UNSUPPORTED",
        }
    }

    /// Parse a method token; unknown tokens map to [`Method::Unsupported`]
    #[must_use]
    pub fn from_token(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "OPTIONS" => Method::Options,
            "ANNOUNCE" => Method::Announce,
            "SETUP" => Method::Setup,
            "RECORD" => Method::Record,
            "PAUSE" => Method::Pause,
            "FLUSH" => Method::Flush,
            "TEARDOWN" => Method::Teardown,
            "SET_PARAMETER" => Method::SetParameter,
            "GET_PARAMETER" => Method::GetParameter,
            "POST" => Method::Post,
            "GET" => Method::Get,
            _ => Method::Unsupported,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
