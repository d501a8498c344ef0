//! Mock RAOP sender for exercising the bridge
//!
//! Speaks just enough RTSP to negotiate a 16-bit PCM stream, then sends
//! audio over UDP or interleaved on the RTSP connection. Every request
//! waits for its response.

use std::fmt::Write as _;
use std::net::SocketAddr;

use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD as BASE64};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use super::auth::encrypt_payload;
use super::rtsp_client::{RequestBuilder, ResponseReadError, ResponseReader, encode_request};
use crate::protocol::dmap::{TrackMetadata, encode_item, tags};
use crate::protocol::rtp::{ControlPacket, NtpTimestamp, PayloadType, RtpPacket};
use crate::protocol::rtsp::headers::names;
use crate::protocol::rtsp::{Method, RtspRequest, RtspResponse, encode_interleaved};

const SSRC: u32 = 0x1234_5678;

/// How audio reaches the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockTransport {
    /// Separate UDP datagrams to the advertised ports
    Udp,
    /// `$`-framed on the RTSP connection
    Interleaved,
}

/// Mock sender configuration
#[derive(Debug, Clone)]
pub struct MockSenderConfig {
    /// Receiver RTSP address
    pub receiver_addr: SocketAddr,
    /// Sample rate announced
    pub sample_rate: u32,
    /// Channels announced
    pub channels: u8,
    /// RTP timestamp advance per packet
    pub frames_per_packet: u32,
    /// AES key and IV; announces an encrypted stream when set
    pub encryption: Option<([u8; 16], [u8; 16])>,
    /// Audio transport
    pub transport: MockTransport,
    /// First RTP sequence number
    pub first_sequence: u16,
}

impl MockSenderConfig {
    /// Unencrypted 44.1kHz stereo PCM over UDP
    #[must_use]
    pub fn new(receiver_addr: SocketAddr) -> Self {
        Self {
            receiver_addr,
            sample_rate: 44_100,
            channels: 2,
            frames_per_packet: 352,
            encryption: None,
            transport: MockTransport::Udp,
            first_sequence: 100,
        }
    }

    /// Announce an encrypted stream
    #[must_use]
    pub fn encrypted(mut self, key: [u8; 16], iv: [u8; 16]) -> Self {
        self.encryption = Some((key, iv));
        self
    }

    /// Send audio interleaved on the RTSP connection
    #[must_use]
    pub fn interleaved(mut self) -> Self {
        self.transport = MockTransport::Interleaved;
        self
    }

    /// Announce a different format
    #[must_use]
    pub fn format(mut self, sample_rate: u32, channels: u8) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct ServerPorts {
    data: u16,
    control: u16,
}

/// Mock RAOP sender
#[derive(Debug)]
pub struct MockSender {
    config: MockSenderConfig,
    stream: TcpStream,
    reader: ResponseReader,
    udp: Option<UdpSocket>,
    server: Option<ServerPorts>,
    cseq: u32,
    session_id: Option<String>,
    sequence: u16,
    timestamp: u32,
}

impl MockSender {
    /// Connect to the receiver
    ///
    /// # Errors
    /// Returns `MockSenderError::Io` if the connection fails.
    pub async fn connect(config: MockSenderConfig) -> Result<Self, MockSenderError> {
        let stream = TcpStream::connect(config.receiver_addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            sequence: config.first_sequence,
            config,
            stream,
            reader: ResponseReader::new(),
            udp: None,
            server: None,
            cseq: 0,
            session_id: None,
            timestamp: 0,
        })
    }

    fn uri(&self) -> String {
        format!("rtsp://{}/3413821438", self.config.receiver_addr.ip())
    }

    /// Session id from the SETUP response
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Sequence number the next audio packet will carry
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Local address of the RTSP connection
    ///
    /// # Errors
    /// Returns `MockSenderError::Io` if the socket is gone.
    pub fn local_addr(&self) -> Result<SocketAddr, MockSenderError> {
        Ok(self.stream.local_addr()?)
    }

    /// Start a request with the next `CSeq` and the session id
    pub fn request(&mut self, method: Method) -> RequestBuilder {
        self.cseq += 1;
        let mut builder = RequestBuilder::new(method, self.uri())
            .cseq(self.cseq)
            .header("User-Agent", "AirPlay/381.13");
        if let Some(session) = &self.session_id {
            builder = builder.session(session);
        }
        builder
    }

    /// Send a request and wait for its response
    ///
    /// # Errors
    /// Returns `MockSenderError` if the connection fails or the response is
    /// malformed.
    pub async fn send(&mut self, request: RtspRequest) -> Result<RtspResponse, MockSenderError> {
        self.stream.write_all(&encode_request(&request)).await?;
        self.read_response().await
    }

    /// Write raw bytes on the RTSP connection
    ///
    /// # Errors
    /// Returns `MockSenderError::Io` if the write fails.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), MockSenderError> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Wait for the next response
    ///
    /// # Errors
    /// Returns `MockSenderError::Closed` if the receiver hung up first.
    pub async fn read_response(&mut self) -> Result<RtspResponse, MockSenderError> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(response) = self.reader.decode()? {
                return Ok(response);
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(MockSenderError::Closed);
            }
            self.reader.feed(&buf[..n])?;
        }
    }

    /// Whether the receiver closed the connection within `timeout`
    pub async fn wait_closed(&mut self, timeout: std::time::Duration) -> bool {
        let mut buf = [0u8; 1024];
        tokio::time::timeout(timeout, async {
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        })
        .await
        .is_ok()
    }

    /// OPTIONS
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn options(&mut self) -> Result<RtspResponse, MockSenderError> {
        let request = self.request(Method::Options).build();
        self.send(request).await
    }

    /// ANNOUNCE with the configured stream
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn announce(&mut self) -> Result<RtspResponse, MockSenderError> {
        let sdp = self.sdp();
        self.announce_sdp("application/sdp", &sdp).await
    }

    /// ANNOUNCE with an arbitrary body
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn announce_sdp(
        &mut self,
        content_type: &str,
        sdp: &str,
    ) -> Result<RtspResponse, MockSenderError> {
        let request = self
            .request(Method::Announce)
            .content_type(content_type)
            .body(sdp.as_bytes().to_vec())
            .build();
        self.send(request).await
    }

    /// SETUP for the configured transport
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn setup(&mut self) -> Result<RtspResponse, MockSenderError> {
        let transport = match self.config.transport {
            MockTransport::Udp => {
                let socket = UdpSocket::bind(SocketAddr::new(
                    self.config.receiver_addr.ip(),
                    0,
                ))
                .await?;
                let port = socket.local_addr()?.port();
                self.udp = Some(socket);
                format!(
                    "RTP/AVP/UDP;unicast;mode=record;control_port={port};timing_port={port}"
                )
            }
            MockTransport::Interleaved => "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record".to_string(),
        };

        let request = self
            .request(Method::Setup)
            .header(names::TRANSPORT, transport)
            .build();
        let response = self.send(request).await?;

        if response.is_success() {
            self.session_id = response.session().map(ToString::to_string);
            self.server = response
                .headers
                .get(names::TRANSPORT)
                .and_then(parse_server_ports);
        }
        Ok(response)
    }

    /// RECORD, announcing the next sequence number
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn record(&mut self) -> Result<RtspResponse, MockSenderError> {
        let rtp_info = format!("seq={};rtptime={}", self.sequence, self.timestamp);
        let request = self
            .request(Method::Record)
            .header("Range", "npt=0-")
            .header(names::RTP_INFO, rtp_info)
            .build();
        self.send(request).await
    }

    /// OPTIONS, ANNOUNCE, SETUP and RECORD, each required to succeed
    ///
    /// # Errors
    /// Returns `MockSenderError::Status` for the first refused request.
    pub async fn handshake(&mut self) -> Result<(), MockSenderError> {
        let response = self.options().await?;
        expect_success(&response)?;
        let response = self.announce().await?;
        expect_success(&response)?;
        let response = self.setup().await?;
        expect_success(&response)?;
        let response = self.record().await?;
        expect_success(&response)?;
        Ok(())
    }

    /// Send the next audio packet
    ///
    /// # Errors
    /// Returns `MockSenderError::NotSetup` before a successful SETUP.
    pub async fn send_audio(&mut self, samples: &[i16]) -> Result<(), MockSenderError> {
        let sequence = self.sequence;
        let timestamp = self.timestamp;
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(self.config.frames_per_packet);
        self.send_audio_at(sequence, timestamp, samples).await
    }

    /// Send an audio packet with an explicit sequence number
    ///
    /// # Errors
    /// Returns `MockSenderError::NotSetup` before a successful SETUP.
    pub async fn send_audio_at(
        &mut self,
        sequence: u16,
        timestamp: u32,
        samples: &[i16],
    ) -> Result<(), MockSenderError> {
        let packet = self.audio_packet(sequence, timestamp, samples);
        self.send_data(&packet.encode()).await
    }

    /// Send an audio packet wrapped as a retransmission on the control channel
    ///
    /// # Errors
    /// Returns `MockSenderError::NotSetup` before a successful SETUP.
    pub async fn send_retransmit(
        &mut self,
        sequence: u16,
        samples: &[i16],
    ) -> Result<(), MockSenderError> {
        let timestamp = u32::from(sequence.wrapping_sub(self.config.first_sequence))
            .wrapping_mul(self.config.frames_per_packet);
        let packet = self.audio_packet(sequence, timestamp, samples);
        self.send_control(&ControlPacket::encode_retransmit(&packet))
            .await
    }

    /// Send a sync packet on the control channel
    ///
    /// # Errors
    /// Returns `MockSenderError::NotSetup` before a successful SETUP.
    pub async fn send_sync(&mut self) -> Result<(), MockSenderError> {
        let mut packet = vec![0x90, 0x80 | PayloadType::Sync as u8, 0x00, 0x07];
        packet.extend_from_slice(&self.timestamp.to_be_bytes());
        packet.extend_from_slice(&NtpTimestamp::now().encode());
        packet.extend_from_slice(&self.timestamp.to_be_bytes());
        self.send_control(&packet).await
    }

    /// FLUSH, restarting at the next sequence number
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn flush(&mut self) -> Result<RtspResponse, MockSenderError> {
        let rtp_info = format!("seq={};rtptime={}", self.sequence, self.timestamp);
        let request = self
            .request(Method::Flush)
            .header(names::RTP_INFO, rtp_info)
            .build();
        self.send(request).await
    }

    /// PAUSE
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn pause(&mut self) -> Result<RtspResponse, MockSenderError> {
        let request = self.request(Method::Pause).build();
        self.send(request).await
    }

    /// SET_PARAMETER volume in dB
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn set_volume(&mut self, db: f32) -> Result<RtspResponse, MockSenderError> {
        let request = self
            .request(Method::SetParameter)
            .content_type("text/parameters")
            .body(format!("volume: {db:.6}\r\n").into_bytes())
            .build();
        self.send(request).await
    }

    /// SET_PARAMETER track metadata
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn set_metadata(
        &mut self,
        metadata: &TrackMetadata,
    ) -> Result<RtspResponse, MockSenderError> {
        let request = self
            .request(Method::SetParameter)
            .content_type("application/x-dmap-tagged")
            .body(dmap_body(metadata))
            .build();
        self.send(request).await
    }

    /// GET_PARAMETER volume
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn get_parameter(&mut self) -> Result<RtspResponse, MockSenderError> {
        let request = self
            .request(Method::GetParameter)
            .content_type("text/parameters")
            .body(b"volume\r\n".to_vec())
            .build();
        self.send(request).await
    }

    /// TEARDOWN
    ///
    /// # Errors
    /// Returns `MockSenderError` if the request fails.
    pub async fn teardown(&mut self) -> Result<RtspResponse, MockSenderError> {
        let request = self.request(Method::Teardown).build();
        self.send(request).await
    }

    /// Session description for the configured stream
    #[must_use]
    pub fn sdp(&self) -> String {
        let ip = self.config.receiver_addr.ip();
        let mut sdp = format!(
            "v=0\r\n\
             o=iTunes 3413821438 0 IN IP4 {ip}\r\n\
             s=iTunes\r\n\
             c=IN IP4 {ip}\r\n\
             t=0 0\r\n\
             m=audio 0 RTP/AVP 96\r\n\
             a=rtpmap:96 L16/{}/{}\r\n",
            self.config.sample_rate, self.config.channels,
        );
        if let Some((_, iv)) = &self.config.encryption {
            // Stand-in for the RSA-wrapped key; test authenticators ignore it
            let _ = write!(sdp, "a=rsaaeskey:{}\r\n", BASE64.encode([0u8; 128]));
            let _ = write!(sdp, "a=aesiv:{}\r\n", BASE64.encode(iv));
        }
        sdp
    }

    fn audio_packet(&self, sequence: u16, timestamp: u32, samples: &[i16]) -> RtpPacket {
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
        let payload = match &self.config.encryption {
            Some((key, iv)) => encrypt_payload(key, iv, &pcm),
            None => pcm,
        };
        RtpPacket::audio(sequence, timestamp, SSRC, payload, false)
    }

    async fn send_data(&mut self, datagram: &[u8]) -> Result<(), MockSenderError> {
        match self.config.transport {
            MockTransport::Udp => {
                let port = self.server.ok_or(MockSenderError::NotSetup)?.data;
                self.send_udp(datagram, port).await
            }
            MockTransport::Interleaved => self.send_raw(&encode_interleaved(0, datagram)).await,
        }
    }

    async fn send_control(&mut self, datagram: &[u8]) -> Result<(), MockSenderError> {
        match self.config.transport {
            MockTransport::Udp => {
                let port = self.server.ok_or(MockSenderError::NotSetup)?.control;
                self.send_udp(datagram, port).await
            }
            MockTransport::Interleaved => self.send_raw(&encode_interleaved(1, datagram)).await,
        }
    }

    async fn send_udp(&self, datagram: &[u8], port: u16) -> Result<(), MockSenderError> {
        let socket = self.udp.as_ref().ok_or(MockSenderError::NotSetup)?;
        let addr = SocketAddr::new(self.config.receiver_addr.ip(), port);
        socket.send_to(datagram, addr).await?;
        Ok(())
    }
}

fn expect_success(response: &RtspResponse) -> Result<(), MockSenderError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(MockSenderError::Status(response.status.as_u16()))
    }
}

fn parse_server_ports(transport: &str) -> Option<ServerPorts> {
    let mut data = None;
    let mut control = None;
    for part in transport.split(';') {
        if let Some(value) = part.strip_prefix("server_port=") {
            data = value.split('-').next().and_then(|p| p.parse().ok());
        } else if let Some(value) = part.strip_prefix("control_port=") {
            control = value.parse().ok();
        }
    }
    Some(ServerPorts {
        data: data?,
        control: control?,
    })
}

/// DMAP listing item carrying the text fields of `metadata`
#[must_use]
pub fn dmap_body(metadata: &TrackMetadata) -> Vec<u8> {
    let mut items = Vec::new();
    for (tag, value) in [
        (tags::ITEM_NAME, &metadata.title),
        (tags::ITEM_ARTIST, &metadata.artist),
        (tags::ITEM_ALBUM, &metadata.album),
        (tags::ITEM_GENRE, &metadata.genre),
    ] {
        if let Some(value) = value {
            items.extend(encode_item(tag, value.as_bytes()));
        }
    }
    encode_item(tags::LISTING_ITEM, &items)
}

/// Errors from the mock sender
#[derive(Debug, thiserror::Error)]
pub enum MockSenderError {
    /// Audio sent before SETUP succeeded
    #[error("not set up")]
    NotSetup,

    /// Receiver closed the connection
    #[error("connection closed by receiver")]
    Closed,

    /// Receiver refused a handshake step
    #[error("request failed with status {0}")]
    Status(u16),

    /// Response could not be parsed
    #[error("invalid response: {0}")]
    InvalidResponse(#[from] ResponseReadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
