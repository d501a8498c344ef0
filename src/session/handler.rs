//! RTSP request handling for one sender
//!
//! Handlers perform no socket I/O: [`SessionHandler::handle`] turns a
//! request into a response plus a flow decision, and packet intake is a
//! plain method call. The runner owns the connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::activity::ActivityMonitor;
use super::parameters::{ParameterUpdate, VolumeUpdate, parse_set_parameter, volume_response_body};
use super::QueueSlot;
use super::state::{CloseReason, SessionError, SessionState};
use crate::audio::{AudioPipeline, FrameQueue, JitterResult, PipelineStats, StreamParameters};
use crate::auth::{HandshakeRequest, SessionAuthenticator, SessionCredentials};
use crate::bridge::{BridgeEvent, Target, TargetId};
use crate::config::BridgeSettings;
use crate::diagnostics::DiagnosticThrottle;
use crate::error::{AuthFailure, TransportError};
use crate::protocol::dmap::TrackMetadata;
use crate::protocol::rtp::{ControlPacket, RtpPacket, constants::AUDIO_LATENCY};
use crate::protocol::rtsp::headers::{names, raop};
use crate::protocol::rtsp::{
    Method, ResponseBuilder, RtspRequest, RtspResponse, StatusCode, TransportHeader,
};
use crate::protocol::sdp::{SdpParser, extract_stream_parameters};
use crate::sink::{MediaUrlTemplate, SinkAdapter, SinkHealth, UrlContext};

/// Value of the `Server` header on every response
pub const SERVER_NAME: &str = "AirTunes/366.0";

const JACK_STATUS: &str = "connected; type=analog";

/// Add the headers every response carries
pub(crate) fn stamp(builder: ResponseBuilder, cseq: u32) -> ResponseBuilder {
    builder
        .cseq(cseq)
        .header(raop::SERVER, SERVER_NAME)
        .header(raop::AUDIO_JACK_STATUS, JACK_STATUS)
}

/// Shared context a session runs in
#[derive(Clone)]
pub struct SessionEnv {
    /// Target the session relays to
    pub target: Arc<Target>,
    /// Bridge settings
    pub settings: Arc<BridgeSettings>,
    /// Handshake policy
    pub authenticator: Arc<dyn SessionAuthenticator>,
    /// Bridge event channel
    pub events: broadcast::Sender<BridgeEvent>,
}

impl std::fmt::Debug for SessionEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEnv")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Which UDP port a packet arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSource {
    /// Audio data port, or interleaved channel 0
    Data,
    /// Control port (sync, retransmissions), or interleaved channel 1
    Control,
}

/// What the connection should do after a response is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading requests
    Continue,
    /// End the session
    Close(CloseReason),
}

/// Response to one request
#[derive(Debug)]
pub struct Handled {
    /// Response to write back
    pub response: RtspResponse,
    /// Whether the session continues
    pub flow: Flow,
}

type Reply = (ResponseBuilder, Flow);

fn proceed(builder: ResponseBuilder) -> Reply {
    (builder, Flow::Continue)
}

fn reject(status: StatusCode) -> Reply {
    (ResponseBuilder::error(status), Flow::Continue)
}

/// Sequence number from an `RTP-Info: seq=N;rtptime=T` header
fn rtp_info_sequence(value: &str) -> Option<u16> {
    value
        .split(';')
        .find_map(|part| part.trim().strip_prefix("seq="))
        .and_then(|seq| seq.trim().parse().ok())
}

/// State of one sender's session
pub struct SessionHandler {
    id: String,
    env: SessionEnv,
    peer: SocketAddr,
    local: SocketAddr,
    state: watch::Sender<SessionState>,
    sinks: Arc<SinkAdapter>,
    stream: Option<StreamParameters>,
    credentials: SessionCredentials,
    pipeline: Option<AudioPipeline>,
    delivery: Option<JoinHandle<()>>,
    transport: Option<TransportHeader>,
    sinks_started: bool,
    paused: bool,
    volume: f32,
    metadata: Option<TrackMetadata>,
    activity: ActivityMonitor,
    packet_warnings: DiagnosticThrottle,
    queue_slot: Option<QueueSlot>,
}

impl SessionHandler {
    /// Create a session in `Idle`
    #[must_use]
    pub fn new(
        env: SessionEnv,
        id: impl Into<String>,
        peer: SocketAddr,
        local: SocketAddr,
        state: watch::Sender<SessionState>,
        now: Instant,
    ) -> Self {
        let sinks = Arc::new(SinkAdapter::new(
            Arc::clone(env.target.media_player()),
            env.target.speaker().cloned(),
            MediaUrlTemplate::new(env.settings.media_url_template.clone()),
            env.target.name(),
        ));
        let activity = ActivityMonitor::new(
            env.settings.session_timeout,
            env.settings.timeout_confirmations,
            now,
        );
        state.send_replace(SessionState::Idle);

        Self {
            id: id.into(),
            env,
            peer,
            local,
            state,
            sinks,
            stream: None,
            credentials: SessionCredentials::unencrypted(),
            pipeline: None,
            delivery: None,
            transport: None,
            sinks_started: false,
            paused: false,
            volume: 1.0,
            metadata: None,
            activity,
            packet_warnings: DiagnosticThrottle::default(),
            queue_slot: None,
        }
    }

    /// Publish the frame queue to `slot` once ANNOUNCE creates it
    #[must_use]
    pub fn with_queue_slot(mut self, slot: QueueSlot) -> Self {
        self.queue_slot = Some(slot);
        self
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Negotiated stream, after ANNOUNCE
    #[must_use]
    pub fn stream(&self) -> Option<&StreamParameters> {
        self.stream.as_ref()
    }

    /// Linear volume last set by the sender
    #[must_use]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Track metadata last sent by the sender
    #[must_use]
    pub fn metadata(&self) -> Option<&TrackMetadata> {
        self.metadata.as_ref()
    }

    /// Pipeline counters, after ANNOUNCE
    #[must_use]
    pub fn pipeline_stats(&self) -> Option<PipelineStats> {
        self.pipeline.as_ref().map(AudioPipeline::stats)
    }

    /// Sink counters
    #[must_use]
    pub fn sink_health(&self) -> SinkHealth {
        self.sinks.health()
    }

    fn target_id(&self) -> TargetId {
        self.env.target.id()
    }

    fn emit(&self, event: BridgeEvent) {
        // No subscribers is fine
        let _ = self.env.events.send(event);
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        self.state.send_replace(next);
        tracing::debug!(session = %self.id, from = %current, to = %next, "Session state changed");
        self.emit(BridgeEvent::SessionStateChanged {
            target: self.target_id(),
            session: self.id.clone(),
            state: next,
        });
        Ok(())
    }

    fn enter(&mut self, next: SessionState) {
        if let Err(e) = self.transition(next) {
            tracing::warn!(session = %self.id, "{}", e);
        }
    }

    fn url_context(&self) -> UrlContext {
        UrlContext {
            ip: self.local.ip(),
            port: self.env.target.ports().control_port,
            target: self.env.target.name().to_string(),
            session: self.id.clone(),
        }
    }

    /// Handle one RTSP request
    pub async fn handle(&mut self, request: &RtspRequest, now: Instant) -> Handled {
        self.activity.touch(now);
        tracing::debug!(
            session = %self.id,
            method = %request.method,
            uri = %request.uri,
            state = %self.state(),
            "RTSP request"
        );

        let (builder, flow) = match request.method {
            Method::Options => proceed(self.options(request)),
            Method::Announce => self.announce(request).await,
            Method::Setup => self.setup(request),
            Method::Record => self.record(request).await,
            Method::Flush => self.flush(request),
            Method::Pause => self.pause().await,
            Method::SetParameter => self.set_parameter(request).await,
            Method::GetParameter => self.get_parameter(),
            Method::Post => self.post(request),
            Method::Teardown => (ResponseBuilder::ok(), Flow::Close(CloseReason::Teardown)),
            Method::Get | Method::Unsupported => reject(StatusCode::NOT_IMPLEMENTED),
        };

        let mut builder = stamp(builder, request.cseq());
        if self.transport.is_some() {
            builder = builder.session(&self.id);
        }
        let response = builder.build();

        tracing::debug!(
            session = %self.id,
            method = %request.method,
            status = response.status.as_u16(),
            "RTSP response"
        );
        Handled { response, flow }
    }

    fn not_valid(&self, method: Method) -> Reply {
        tracing::debug!(session = %self.id, %method, state = %self.state(), "Method not valid in this state");
        reject(StatusCode::METHOD_NOT_VALID)
    }

    fn options(&self, request: &RtspRequest) -> ResponseBuilder {
        let mut builder = ResponseBuilder::ok().header(names::PUBLIC, Method::PUBLIC);

        for name in [raop::DACP_ID, raop::ACTIVE_REMOTE] {
            if let Some(value) = request.headers.get(name) {
                builder = builder.header(name, value);
            }
        }

        if let Some(challenge) = request.headers.get(raop::APPLE_CHALLENGE) {
            match self
                .env
                .authenticator
                .challenge_response(challenge, self.local)
            {
                Some(answer) => builder = builder.header(raop::APPLE_RESPONSE, &answer),
                None => tracing::warn!(
                    session = %self.id,
                    "Apple-Challenge received but no challenge responder is configured"
                ),
            }
        }

        builder
    }

    async fn announce(&mut self, request: &RtspRequest) -> Reply {
        if self.state() != SessionState::Idle {
            return self.not_valid(request.method);
        }
        self.enter(SessionState::Negotiating);

        match self.negotiate(request).await {
            Ok(()) => proceed(ResponseBuilder::ok()),
            Err(failure) => {
                tracing::warn!(session = %self.id, peer = %self.peer, "Handshake failed: {}", failure);
                let status = match &failure {
                    AuthFailure::Malformed(_) => StatusCode::BAD_REQUEST,
                    AuthFailure::Unsupported(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    AuthFailure::Rejected(_) => StatusCode::FORBIDDEN,
                };
                self.emit(BridgeEvent::AuthFailed {
                    target: self.target_id(),
                    reason: failure.to_string(),
                });
                (
                    ResponseBuilder::error(status),
                    Flow::Close(CloseReason::AuthFailed(failure.to_string())),
                )
            }
        }
    }

    async fn negotiate(&mut self, request: &RtspRequest) -> Result<(), AuthFailure> {
        if let Some(content_type) = request.headers.content_type() {
            if !content_type
                .to_ascii_lowercase()
                .starts_with("application/sdp")
            {
                return Err(AuthFailure::Unsupported(format!(
                    "ANNOUNCE content type '{content_type}'"
                )));
            }
        }

        let sdp = SdpParser::parse(&request.body_text())
            .map_err(|e| AuthFailure::Malformed(e.to_string()))?;
        let stream =
            extract_stream_parameters(&sdp).map_err(|e| AuthFailure::Malformed(e.to_string()))?;

        let handshake = HandshakeRequest {
            peer: self.peer,
            target: self.env.target.name().to_string(),
            headers: request.headers.clone(),
            stream: stream.clone(),
        };
        let credentials = self.env.authenticator.negotiate(&handshake).await?;

        let queue = Arc::new(FrameQueue::new(self.env.settings.frame_queue_capacity));
        let pipeline = AudioPipeline::new(
            &stream,
            self.env.target.output_sample_rate(),
            self.env.settings.jitter(),
            Arc::clone(&queue),
        )
        .map_err(|e| AuthFailure::Unsupported(e.to_string()))?;

        tracing::info!(
            session = %self.id,
            target_name = %self.env.target.name(),
            codec = %stream.codec,
            sample_rate = stream.sample_rate,
            channels = stream.channels,
            encrypted = credentials.decryptor.is_some(),
            "Stream negotiated"
        );

        if let Some(slot) = &self.queue_slot {
            // Only one ANNOUNCE is accepted per session
            let _ = slot.set(Arc::clone(&queue));
        }
        self.delivery = Some(spawn_delivery(
            &queue,
            Arc::clone(&self.sinks),
            self.env.events.clone(),
            self.target_id(),
            self.id.clone(),
        ));
        self.pipeline = Some(pipeline);
        self.credentials = credentials;
        self.stream = Some(stream);
        Ok(())
    }

    fn setup(&mut self, request: &RtspRequest) -> Reply {
        if !matches!(
            self.state(),
            SessionState::Negotiating | SessionState::Streaming
        ) {
            return self.not_valid(request.method);
        }

        let Some(value) = request.headers.get(names::TRANSPORT) else {
            tracing::warn!(session = %self.id, "SETUP without Transport header");
            return reject(StatusCode::BAD_REQUEST);
        };

        let transport = match TransportHeader::parse(value) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(session = %self.id, transport = value, "Unsupported transport: {}", e);
                return reject(StatusCode::UNSUPPORTED_TRANSPORT);
            }
        };

        let reply = transport.to_response_header(&self.env.target.ports());
        tracing::debug!(session = %self.id, transport = %reply, "Transport set up");
        self.transport = Some(transport);

        proceed(ResponseBuilder::ok().header(names::TRANSPORT, &reply))
    }

    async fn record(&mut self, request: &RtspRequest) -> Reply {
        let state = self.state();
        if self.transport.is_none()
            || !matches!(state, SessionState::Negotiating | SessionState::Streaming)
        {
            return self.not_valid(request.method);
        }

        if let Some(seq) = request
            .headers
            .get(names::RTP_INFO)
            .and_then(rtp_info_sequence)
        {
            if let Some(pipeline) = self.pipeline.as_mut() {
                pipeline.start_at(seq);
            }
        }

        if state == SessionState::Negotiating {
            self.enter(SessionState::Streaming);
        }
        self.paused = false;

        if !self.sinks_started {
            self.start_sinks().await;
        }

        proceed(ResponseBuilder::ok().audio_latency(AUDIO_LATENCY))
    }

    async fn start_sinks(&mut self) {
        // Set first so an interrupted start is still stopped on close
        self.sinks_started = true;
        let ctx = self.url_context();
        if let Err(error) = self.sinks.start(&ctx).await {
            tracing::warn!(session = %self.id, "Failed to start sinks: {}", error);
            self.emit(BridgeEvent::SinkUnavailable {
                target: self.target_id(),
                error,
            });
        }
        if (self.volume - 1.0).abs() > f32::EPSILON {
            self.apply_volume().await;
        }
    }

    async fn apply_volume(&self) {
        if let Err(error) = self.sinks.set_volume(self.volume).await {
            tracing::warn!(session = %self.id, "Failed to set volume: {}", error);
            self.emit(BridgeEvent::SinkUnavailable {
                target: self.target_id(),
                error,
            });
        }
    }

    fn flush(&mut self, request: &RtspRequest) -> Reply {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return self.not_valid(request.method);
        };

        pipeline.flush();
        if let Some(seq) = request
            .headers
            .get(names::RTP_INFO)
            .and_then(rtp_info_sequence)
        {
            pipeline.start_at(seq);
        }
        tracing::debug!(session = %self.id, "Flushed audio pipeline");
        proceed(ResponseBuilder::ok())
    }

    async fn pause(&mut self) -> Reply {
        if self.state() != SessionState::Streaming {
            return self.not_valid(Method::Pause);
        }

        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.flush();
        }
        self.paused = true;

        if self.sinks_started {
            if let Err(error) = self.sinks.stop().await {
                tracing::warn!(session = %self.id, "Failed to stop sinks: {}", error);
            }
            self.sinks_started = false;
        }
        tracing::debug!(session = %self.id, "Paused");
        proceed(ResponseBuilder::ok())
    }

    async fn set_parameter(&mut self, request: &RtspRequest) -> Reply {
        let update = match parse_set_parameter(request.headers.content_type(), &request.body) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(session = %self.id, "Invalid SET_PARAMETER body: {}", e);
                return reject(StatusCode::BAD_REQUEST);
            }
        };

        match update {
            ParameterUpdate::Volume(volume) => self.set_volume(volume).await,
            ParameterUpdate::Metadata(metadata) => self.set_metadata(metadata).await,
            ParameterUpdate::Ignored => {
                tracing::trace!(
                    session = %self.id,
                    content_type = ?request.headers.content_type(),
                    "Ignoring SET_PARAMETER body"
                );
            }
        }

        proceed(ResponseBuilder::ok())
    }

    async fn set_volume(&mut self, volume: VolumeUpdate) {
        tracing::debug!(session = %self.id, db = volume.db, linear = volume.linear, "Volume changed");
        self.volume = volume.linear;
        self.apply_volume().await;
        self.emit(BridgeEvent::VolumeChanged {
            target: self.target_id(),
            db: volume.db,
            linear: volume.linear,
        });
    }

    async fn set_metadata(&mut self, metadata: TrackMetadata) {
        tracing::debug!(
            session = %self.id,
            title = ?metadata.title,
            artist = ?metadata.artist,
            "Track metadata received"
        );

        let ctx = self.url_context();
        if let Err(error) = self.sinks.update_metadata(&metadata, &ctx).await {
            tracing::warn!(session = %self.id, "Failed to update media URL: {}", error);
            self.emit(BridgeEvent::SinkUnavailable {
                target: self.target_id(),
                error,
            });
        }

        self.emit(BridgeEvent::MetadataUpdated {
            target: self.target_id(),
            metadata: metadata.clone(),
        });
        self.metadata = Some(metadata);
    }

    fn get_parameter(&self) -> Reply {
        proceed(ResponseBuilder::ok().text_body(&volume_response_body(self.volume)))
    }

    fn post(&self, request: &RtspRequest) -> Reply {
        if request.uri.ends_with("/fp-setup") {
            proceed(ResponseBuilder::ok().binary_body(Vec::new(), "application/octet-stream"))
        } else {
            tracing::debug!(session = %self.id, uri = %request.uri, "Unsupported POST");
            reject(StatusCode::NOT_IMPLEMENTED)
        }
    }

    /// Feed one datagram into the pipeline
    ///
    /// # Errors
    /// Returns `TransportError` when the packet is dropped.
    pub fn accept_packet(
        &mut self,
        source: PacketSource,
        data: &[u8],
        now: Instant,
    ) -> Result<(), TransportError> {
        self.activity.touch(now);

        if !self.state().accepts_audio() || self.paused {
            return Err(TransportError::NotStreaming);
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(TransportError::NotStreaming);
        };

        let packet = match source {
            PacketSource::Data => {
                let packet = RtpPacket::decode(data)?;
                if !packet.header.payload_type.is_audio() {
                    return Err(TransportError::UnexpectedPayload(
                        packet.header.payload_type as u8,
                    ));
                }
                packet
            }
            PacketSource::Control => match ControlPacket::decode(data)? {
                ControlPacket::Sync(sync) => {
                    tracing::trace!(
                        session = %self.id,
                        rtp_timestamp = sync.rtp_timestamp,
                        next_timestamp = sync.next_timestamp,
                        "Sync packet"
                    );
                    return Ok(());
                }
                ControlPacket::RetransmitResponse(packet) => packet,
            },
        };

        let sequence = packet.header.sequence;
        let payload = match &self.credentials.decryptor {
            Some(decryptor) => Bytes::from(decryptor.decrypt(&packet.payload)),
            None => packet.payload,
        };

        let expected = pipeline.next_sequence();
        match pipeline.push_packet(sequence, payload, now) {
            JitterResult::Buffered | JitterResult::Resynced { .. } => Ok(()),
            JitterResult::TooLate => Err(TransportError::TooLate {
                sequence,
                expected: expected.unwrap_or(sequence),
            }),
            JitterResult::Duplicate => Err(TransportError::Duplicate(sequence)),
        }
    }

    /// Feed one datagram, logging a dropped packet
    pub fn receive(&mut self, source: PacketSource, data: &[u8], now: Instant) {
        match self.accept_packet(source, data, now) {
            Ok(()) => {}
            Err(TransportError::NotStreaming) => {
                tracing::trace!(session = %self.id, "Dropping packet outside streaming state");
            }
            Err(e) => {
                if let Some(suppressed) = self.packet_warnings.check(now) {
                    tracing::warn!(session = %self.id, suppressed, "Dropping packet: {}", e);
                }
            }
        }
    }

    /// Feed an RTSP-interleaved frame
    pub fn receive_interleaved(&mut self, channel: u8, payload: &[u8], now: Instant) {
        let (data, control) = self
            .transport
            .as_ref()
            .and_then(|t| t.interleaved)
            .unwrap_or((0, 1));

        let source = if channel == data {
            PacketSource::Data
        } else if channel == control {
            PacketSource::Control
        } else {
            tracing::trace!(session = %self.id, channel, "Ignoring interleaved frame");
            return;
        };
        self.receive(source, payload, now);
    }

    /// Release overdue audio and check for inactivity
    ///
    /// Returns `Some(CloseReason::Timeout)` once inactivity is confirmed.
    pub fn tick(&mut self, now: Instant) -> Option<CloseReason> {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.poll(now);
        }

        if self.activity.check(now) {
            tracing::info!(
                session = %self.id,
                idle = ?self.activity.idle_time(now),
                "Session inactive"
            );
            return Some(CloseReason::Timeout);
        }
        None
    }

    /// How often [`tick`](Self::tick) should run
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.activity
            .check_interval()
            .min(self.env.settings.gap_timeout / 2)
            .max(Duration::from_millis(10))
    }

    /// End the session
    ///
    /// A session that was streaming plays out its buffered audio first when
    /// it ends by teardown, timeout or connection loss, bounded by the drain
    /// timeout. Every other reason drops buffered audio.
    pub async fn close(&mut self, reason: CloseReason) {
        if self.state().is_terminal() {
            return;
        }

        let drain = self.state() == SessionState::Streaming
            && matches!(
                reason,
                CloseReason::Teardown | CloseReason::Timeout | CloseReason::ConnectionLost
            );
        let drain_timeout = self.env.settings.drain_timeout;

        if drain {
            self.enter(SessionState::Draining);
            if let Some(pipeline) = self.pipeline.as_mut() {
                let released = pipeline.drain(Instant::now());
                tracing::debug!(session = %self.id, released, "Draining buffered audio");
                pipeline.close();
            }
            if let Some(mut delivery) = self.delivery.take() {
                if tokio::time::timeout(drain_timeout, &mut delivery)
                    .await
                    .is_err()
                {
                    tracing::warn!(session = %self.id, "Drain timed out, dropping remaining audio");
                    delivery.abort();
                }
            }
        } else {
            if let Some(pipeline) = &self.pipeline {
                pipeline.close();
            }
            if let Some(delivery) = self.delivery.take() {
                delivery.abort();
            }
        }

        if self.sinks_started {
            match tokio::time::timeout(drain_timeout, self.sinks.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(session = %self.id, "Failed to stop sinks: {}", e),
                Err(_) => tracing::warn!(session = %self.id, "Timed out stopping sinks"),
            }
            self.sinks_started = false;
        }

        self.enter(SessionState::Closed);
        tracing::info!(session = %self.id, target_name = %self.env.target.name(), %reason, "Session closed");
        self.emit(BridgeEvent::SessionEnded {
            target: self.target_id(),
            session: self.id.clone(),
            reason,
        });
    }
}

impl Drop for SessionHandler {
    fn drop(&mut self) {
        if let Some(delivery) = self.delivery.take() {
            delivery.abort();
        }
    }
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("id", &self.id)
            .field("target", &self.env.target.name())
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}

/// Move frames from the queue to the sinks until the queue closes
fn spawn_delivery(
    queue: &Arc<FrameQueue>,
    sinks: Arc<SinkAdapter>,
    events: broadcast::Sender<BridgeEvent>,
    target: TargetId,
    session: String,
) -> JoinHandle<()> {
    let mut frames = queue.stream();
    tokio::spawn(async move {
        let mut warnings = DiagnosticThrottle::default();
        while let Some(frame) = frames.next().await {
            if let Err(error) = sinks.deliver(&frame).await {
                if let Some(suppressed) = warnings.check(Instant::now()) {
                    tracing::warn!(session = %session, suppressed, "Sink refused frame: {}", error);
                    let _ = events.send(BridgeEvent::SinkUnavailable { target, error });
                }
            }
        }
        tracing::trace!(session = %session, "Frame delivery finished");
    })
}

#[cfg(test)]
mod tests {
    use super::rtp_info_sequence;

    #[test]
    fn test_rtp_info_sequence() {
        assert_eq!(rtp_info_sequence("seq=1234;rtptime=5678"), Some(1234));
        assert_eq!(rtp_info_sequence("rtptime=5678; seq=7"), Some(7));
        assert_eq!(rtp_info_sequence("rtptime=5678"), None);
        assert_eq!(rtp_info_sequence("seq=notanumber"), None);
    }
}
