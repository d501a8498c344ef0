//! Per-target network tasks
//!
//! Every target binds one TCP listener (RTSP) and three UDP sockets
//! (control, timing, audio data). The RTSP connection that wins admission
//! becomes the target's session; the UDP tasks forward datagrams to
//! whichever session is active.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::events::BridgeEvent;
use super::table::SessionTable;
use super::target::Target;
use crate::diagnostics::DiagnosticThrottle;
use crate::error::ConfigurationError;
use crate::protocol::rtp::{NtpTimestamp, TimingRequest, TimingResponse};
use crate::protocol::rtsp::{
    InboundMessage, ResponseBuilder, RtspRequest, RtspServerCodec, StatusCode, encode_response,
};
use crate::session::{
    InboundPacket, PacketSource, SessionEnv, SessionHandle, SessionHandler, SessionRunner,
    new_session_id, stamp,
};

/// Largest datagram a sender produces, with headroom
const MAX_DATAGRAM: usize = 2048;

const READ_BUFFER_SIZE: usize = 4096;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Sockets bound for one target
#[derive(Debug)]
pub struct TargetSockets {
    rtsp: TcpListener,
    control: UdpSocket,
    timing: UdpSocket,
    data: UdpSocket,
}

impl TargetSockets {
    /// Bind every port of `target`
    ///
    /// # Errors
    /// Returns `ConfigurationError::Bind` for the first port that fails.
    /// Sockets bound before the failure are dropped, releasing their ports.
    pub async fn bind(target: &Target, address: IpAddr) -> Result<Self, ConfigurationError> {
        let ports = target.ports();
        let bind_error = |port: u16, protocol: &'static str| {
            let target = target.name().to_string();
            move |source: io::Error| ConfigurationError::Bind {
                target,
                port,
                protocol,
                source,
            }
        };

        let rtsp = TcpListener::bind(SocketAddr::new(address, ports.control_port))
            .await
            .map_err(bind_error(ports.control_port, "tcp"))?;
        let control = UdpSocket::bind(SocketAddr::new(address, ports.control_port))
            .await
            .map_err(bind_error(ports.control_port, "udp"))?;
        let timing = UdpSocket::bind(SocketAddr::new(address, ports.timing_port))
            .await
            .map_err(bind_error(ports.timing_port, "udp"))?;
        let data = UdpSocket::bind(SocketAddr::new(address, ports.data_port))
            .await
            .map_err(bind_error(ports.data_port, "udp"))?;

        Ok(Self {
            rtsp,
            control,
            timing,
            data,
        })
    }
}

/// What a target's tasks share
#[derive(Clone)]
pub struct TargetContext {
    /// Session environment for this target
    pub env: SessionEnv,
    /// Bridge session table
    pub sessions: Arc<SessionTable>,
    /// Bridge cancellation
    pub cancel: CancellationToken,
    /// Tracks connection tasks so shutdown can await them
    pub tracker: TaskTracker,
}

impl TargetContext {
    fn target(&self) -> &Target {
        &self.env.target
    }

    fn emit(&self, event: BridgeEvent) {
        let _ = self.env.events.send(event);
    }
}

/// Spawn the accept loop, the UDP receive loops and the timing responder
pub fn spawn_target(sockets: TargetSockets, ctx: &TargetContext) {
    let TargetSockets {
        rtsp,
        control,
        timing,
        data,
    } = sockets;

    ctx.tracker.spawn(accept_loop(rtsp, ctx.clone()));
    ctx.tracker
        .spawn(packet_loop(data, PacketSource::Data, ctx.clone()));
    ctx.tracker
        .spawn(packet_loop(control, PacketSource::Control, ctx.clone()));
    ctx.tracker.spawn(timing_loop(timing, ctx.cancel.clone()));
}

async fn accept_loop(listener: TcpListener, ctx: TargetContext) {
    tracing::debug!(target_name = %ctx.target().name(), port = ctx.target().ports().control_port, "Accepting RTSP connections");

    loop {
        tokio::select! {
            () = ctx.cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(target_name = %ctx.target().name(), %peer, "RTSP connection accepted");
                    ctx.tracker.spawn(serve_connection(stream, peer, ctx.clone()));
                }
                Err(e) => {
                    tracing::warn!(target_name = %ctx.target().name(), "Accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    tracing::debug!(target_name = %ctx.target().name(), "Accept loop stopped");
}

/// Read until the first complete request, giving up after `within`
///
/// Interleaved frames before a session exists are discarded, and malformed
/// requests are answered with `400`. A peer that sends nothing usable in
/// time gets `TimedOut`.
async fn read_first_request(
    stream: &mut TcpStream,
    codec: &mut RtspServerCodec,
    within: Duration,
) -> io::Result<Option<RtspRequest>> {
    tokio::time::timeout(within, read_request(stream, codec))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no request received"))?
}

async fn read_request(
    stream: &mut TcpStream,
    codec: &mut RtspServerCodec,
) -> io::Result<Option<RtspRequest>> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match codec.decode() {
            Ok(Some(InboundMessage::Request(request))) => return Ok(Some(request)),
            Ok(Some(InboundMessage::Interleaved { channel, .. })) => {
                tracing::trace!(channel, "Dropping interleaved frame before session");
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Malformed RTSP request: {}", e);
                let response = stamp(ResponseBuilder::error(StatusCode::BAD_REQUEST), 0).build();
                stream.write_all(&encode_response(&response)).await?;
                continue;
            }
        }

        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        codec.feed(&buf[..n]);
    }
}

async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, ctx: TargetContext) {
    let local = match stream.local_addr() {
        Ok(local) => local,
        Err(e) => {
            tracing::warn!(%peer, "Connection has no local address: {}", e);
            return;
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, "Failed to set TCP_NODELAY: {}", e);
    }

    let mut codec = RtspServerCodec::new();
    let first = tokio::select! {
        () = ctx.cancel.cancelled() => return,
        first = read_first_request(&mut stream, &mut codec, ctx.env.settings.session_timeout) => first,
    };
    let request = match first {
        Ok(Some(request)) => request,
        Ok(None) => {
            tracing::debug!(%peer, "Connection closed before first request");
            return;
        }
        Err(e) => {
            tracing::debug!(%peer, "Connection failed before first request: {}", e);
            return;
        }
    };

    let target = Arc::clone(&ctx.env.target);
    let settings = Arc::clone(&ctx.env.settings);
    let id = new_session_id();
    let (handle, inbox) =
        SessionHandle::channel(id.clone(), settings.packet_channel_capacity, &ctx.cancel);

    let admitted = ctx
        .sessions
        .admit(&target, settings.preemption, settings.preempt_timeout, handle)
        .await;
    match admitted {
        Ok(previous) => {
            if let Some(previous) = previous {
                ctx.emit(BridgeEvent::SessionPreempted {
                    target: target.id(),
                    previous,
                });
            }
        }
        Err(e) => {
            tracing::info!(target_name = %target.name(), %peer, "Rejecting sender: {}", e);
            ctx.emit(BridgeEvent::SessionRejected {
                target: target.id(),
                peer,
            });
            let response = stamp(
                ResponseBuilder::error(StatusCode::NOT_ENOUGH_BANDWIDTH),
                request.cseq(),
            )
            .build();
            if let Err(e) = stream.write_all(&encode_response(&response)).await {
                tracing::debug!(%peer, "Failed to send rejection: {}", e);
            }
            return;
        }
    }

    tracing::info!(target_name = %target.name(), session = %id, %peer, "Session started");
    ctx.emit(BridgeEvent::SessionStarted {
        target: target.id(),
        session: id.clone(),
        peer,
    });

    let handler = SessionHandler::new(
        ctx.env.clone(),
        id.clone(),
        peer,
        local,
        inbox.state,
        Instant::now(),
    )
    .with_queue_slot(inbox.queue);
    let runner = SessionRunner::new(handler, stream, codec, inbox.packets, inbox.signal);
    let reason = runner.run(Some(request)).await;

    ctx.sessions.remove_if(target.id(), &id);
    tracing::debug!(target_name = %target.name(), session = %id, %reason, "Connection finished");
}

async fn packet_loop(socket: UdpSocket, source: PacketSource, ctx: TargetContext) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut dropped = DiagnosticThrottle::default();

    loop {
        let received = tokio::select! {
            () = ctx.cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };
        let (len, peer) = match received {
            Ok(received) => received,
            Err(e) => {
                tracing::debug!(target_name = %ctx.target().name(), ?source, "UDP receive failed: {}", e);
                continue;
            }
        };

        let Some(session) = ctx.sessions.active(ctx.target().id()) else {
            tracing::trace!(target_name = %ctx.target().name(), %peer, ?source, "Packet without session");
            continue;
        };

        let now = Instant::now();
        let packet = InboundPacket {
            source,
            data: Bytes::copy_from_slice(&buf[..len]),
            received_at: now,
        };
        if !session.try_send(packet) {
            if let Some(suppressed) = dropped.check(now) {
                tracing::warn!(
                    target_name = %ctx.target().name(),
                    session = %session.id(),
                    suppressed,
                    "Session packet channel full, dropping packet"
                );
            }
        }
    }

    tracing::debug!(target_name = %ctx.target().name(), ?source, "Packet loop stopped");
}

async fn timing_loop(socket: UdpSocket, cancel: CancellationToken) {
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };
        let (len, peer) = match received {
            Ok(received) => received,
            Err(e) => {
                tracing::debug!("Timing receive failed: {}", e);
                continue;
            }
        };

        match TimingRequest::decode(&buf[..len]) {
            Ok(request) => {
                let reply = TimingResponse::reply_to(&request, NtpTimestamp::now()).encode();
                if let Err(e) = socket.send_to(&reply, peer).await {
                    tracing::debug!(%peer, "Failed to send timing reply: {}", e);
                }
            }
            Err(e) => tracing::trace!(%peer, "Ignoring timing packet: {}", e),
        }
    }
}
