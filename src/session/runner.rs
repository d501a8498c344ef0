//! Drives a [`SessionHandler`] from its RTSP connection

use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::handler::{Flow, SessionHandler, stamp};
use super::state::CloseReason;
use super::{CancelSignal, InboundPacket};
use crate::protocol::rtsp::{
    InboundMessage, ResponseBuilder, RtspRequest, RtspResponse, RtspServerCodec, StatusCode,
    encode_response,
};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Event loop of one session
///
/// Reads RTSP requests and interleaved frames from the connection, takes
/// packets forwarded by the UDP listeners, and ticks the handler until the
/// session ends. The handler is closed before [`run`](Self::run) returns.
pub struct SessionRunner<S> {
    handler: SessionHandler,
    stream: S,
    codec: RtspServerCodec,
    packets: mpsc::Receiver<InboundPacket>,
    signal: Arc<CancelSignal>,
}

impl<S> SessionRunner<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a runner; `codec` may already hold bytes read from `stream`
    pub fn new(
        handler: SessionHandler,
        stream: S,
        codec: RtspServerCodec,
        packets: mpsc::Receiver<InboundPacket>,
        signal: Arc<CancelSignal>,
    ) -> Self {
        Self {
            handler,
            stream,
            codec,
            packets,
            signal,
        }
    }

    /// Serve the connection, then close the session
    pub async fn run(mut self, first: Option<RtspRequest>) -> CloseReason {
        let reason = self.serve(first).await;
        tracing::debug!(session = %self.handler.id(), %reason, "Session ending");
        self.handler.close(reason.clone()).await;
        // Best effort; the peer may already be gone
        let _ = self.stream.shutdown().await;
        reason
    }

    async fn serve(&mut self, first: Option<RtspRequest>) -> CloseReason {
        let signal = Arc::clone(&self.signal);
        if let Some(request) = first {
            if let Some(reason) = until_cancelled(&signal, self.respond(&request)).await {
                return reason;
            }
        }
        if let Some(reason) = until_cancelled(&signal, self.process_buffered()).await {
            return reason;
        }

        let mut ticker = tokio::time::interval(self.handler.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            tokio::select! {
                () = signal.token().cancelled() => {
                    return signal.reason();
                }
                read = self.stream.read(&mut buf) => match read {
                    Ok(0) => return CloseReason::ConnectionLost,
                    Ok(n) => {
                        self.codec.feed(&buf[..n]);
                        if let Some(reason) = until_cancelled(&signal, self.process_buffered()).await {
                            return reason;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(session = %self.handler.id(), "Connection read failed: {}", e);
                        return CloseReason::ConnectionLost;
                    }
                },
                Some(packet) = self.packets.recv() => {
                    self.handler.receive(packet.source, &packet.data, packet.received_at);
                }
                _ = ticker.tick() => {
                    if let Some(reason) = self.handler.tick(Instant::now()) {
                        return reason;
                    }
                }
            }
        }
    }

    async fn process_buffered(&mut self) -> Option<CloseReason> {
        loop {
            match self.codec.decode() {
                Ok(Some(InboundMessage::Request(request))) => {
                    if let Some(reason) = self.respond(&request).await {
                        return Some(reason);
                    }
                }
                Ok(Some(InboundMessage::Interleaved { channel, payload })) => {
                    self.handler
                        .receive_interleaved(channel, &payload, Instant::now());
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(session = %self.handler.id(), "Malformed RTSP request: {}", e);
                    let response = stamp(ResponseBuilder::error(StatusCode::BAD_REQUEST), 0).build();
                    if !self.write(&response).await {
                        return Some(CloseReason::ConnectionLost);
                    }
                }
            }
        }
    }

    async fn respond(&mut self, request: &RtspRequest) -> Option<CloseReason> {
        let handled = self.handler.handle(request, Instant::now()).await;
        if !self.write(&handled.response).await {
            return Some(CloseReason::ConnectionLost);
        }
        match handled.flow {
            Flow::Continue => None,
            Flow::Close(reason) => Some(reason),
        }
    }

    async fn write(&mut self, response: &RtspResponse) -> bool {
        match self.stream.write_all(&encode_response(response)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(session = %self.handler.id(), "Connection write failed: {}", e);
                false
            }
        }
    }
}

/// Run one step of request handling unless the session is cancelled first
///
/// Authenticator and sink calls may never resolve; a cancelled step is
/// dropped where it stands and the session closes with the cancel reason.
async fn until_cancelled<F>(signal: &CancelSignal, step: F) -> Option<CloseReason>
where
    F: Future<Output = Option<CloseReason>>,
{
    tokio::select! {
        biased;
        () = signal.token().cancelled() => Some(signal.reason()),
        reason = step => reason,
    }
}
