//! SETUP `Transport` header
//!
//! RAOP senders ask for either UDP delivery,
//! `RTP/AVP/UDP;unicast;mode=record;control_port=6001;timing_port=6002`,
//! or RTP interleaved on the RTSP connection,
//! `RTP/AVP/TCP;unicast;interleaved=0-1;mode=record`.

use std::fmt;

use crate::ports::PortAssignment;

/// How RTP reaches the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerTransport {
    /// Separate data, control and timing sockets
    Udp,
    /// `$`-framed on the RTSP connection
    Tcp,
}

impl fmt::Display for LowerTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
        })
    }
}

/// A sender's transport request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHeader {
    /// UDP or interleaved TCP
    pub lower_transport: LowerTransport,
    /// `mode=` parameter, normally `record`
    pub mode: Option<String>,
    /// Sender's control port
    pub control_port: Option<u16>,
    /// Sender's timing port
    pub timing_port: Option<u16>,
    /// Interleaved `(data, control)` channels
    pub interleaved: Option<(u8, u8)>,
}

impl TransportHeader {
    /// Parse a Transport header value
    ///
    /// Unknown parameters are ignored.
    ///
    /// # Errors
    /// Returns `TransportParseError` for anything other than unicast
    /// `RTP/AVP` over UDP or TCP, or for malformed ports and channels.
    pub fn parse(value: &str) -> Result<Self, TransportParseError> {
        let mut params = value.split(';').map(str::trim);

        let lower_transport = match params.next().unwrap_or_default() {
            "" => return Err(TransportParseError::MissingProtocol),
            "RTP/AVP" | "RTP/AVP/UDP" => LowerTransport::Udp,
            "RTP/AVP/TCP" => LowerTransport::Tcp,
            other => return Err(TransportParseError::UnsupportedProtocol(other.to_string())),
        };

        let mut header = Self {
            lower_transport,
            mode: None,
            control_port: None,
            timing_port: None,
            interleaved: None,
        };

        for param in params {
            match param.split_once('=') {
                None if param == "multicast" => return Err(TransportParseError::Multicast),
                Some(("mode", mode)) => header.mode = Some(mode.to_string()),
                Some(("control_port", port)) => header.control_port = Some(parse_port(port)?),
                Some(("timing_port", port)) => header.timing_port = Some(parse_port(port)?),
                Some(("interleaved", channels)) => {
                    let (data, control) = channels
                        .split_once('-')
                        .ok_or(TransportParseError::InvalidInterleaved)?;
                    header.interleaved = Some((
                        data.parse()
                            .map_err(|_| TransportParseError::InvalidInterleaved)?,
                        control
                            .parse()
                            .map_err(|_| TransportParseError::InvalidInterleaved)?,
                    ));
                }
                _ => {}
            }
        }

        Ok(header)
    }

    /// Transport header for the SETUP response
    ///
    /// UDP replies name the target's data, control and timing ports. TCP
    /// replies confirm the interleaved channels, `0-1` unless the sender
    /// picked others.
    #[must_use]
    pub fn to_response_header(&self, ports: &PortAssignment) -> String {
        match self.lower_transport {
            LowerTransport::Udp => {
                let mode = self
                    .mode
                    .as_deref()
                    .map(|m| format!(";mode={m}"))
                    .unwrap_or_default();
                format!(
                    "RTP/AVP/UDP;unicast{mode};server_port={};control_port={};timing_port={}",
                    ports.data_port, ports.control_port, ports.timing_port
                )
            }
            LowerTransport::Tcp => {
                let (data, control) = self.interleaved.unwrap_or((0, 1));
                let mode = self.mode.as_deref().unwrap_or("record");
                format!("RTP/AVP/TCP;unicast;interleaved={data}-{control};mode={mode}")
            }
        }
    }
}

fn parse_port(value: &str) -> Result<u16, TransportParseError> {
    value.parse().map_err(|_| TransportParseError::InvalidPort)
}

/// Transport header could not be parsed
#[derive(Debug, thiserror::Error)]
pub enum TransportParseError {
    #[error("Missing protocol specification")]
    MissingProtocol,

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Multicast delivery is not supported")]
    Multicast,

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid interleaved channel specification")]
    InvalidInterleaved,
}
