//! Session authentication
//!
//! The pairing and key exchange a sender performs before streaming is not
//! implemented here. A [`SessionAuthenticator`] is handed the announced
//! stream and decides whether the session may proceed, and with which
//! decryption context.

mod decrypt;


use std::net::SocketAddr;

use async_trait::async_trait;

pub use decrypt::AudioDecryptor;

use crate::audio::StreamParameters;
use crate::error::AuthFailure;
use crate::protocol::rtsp::Headers;

/// What the sender announced, as seen by the authenticator
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    /// Sender address
    pub peer: SocketAddr,
    /// Name of the target being connected to
    pub target: String,
    /// Headers of the ANNOUNCE request
    pub headers: Headers,
    /// Stream parameters parsed from the SDP body
    pub stream: StreamParameters,
}

/// Per-session context produced by a successful handshake
#[derive(Debug, Clone, Default)]
pub struct SessionCredentials {
    /// Audio decryptor, for encrypted streams
    pub decryptor: Option<AudioDecryptor>,
}

impl SessionCredentials {
    /// Credentials for a stream sent in the clear
    #[must_use]
    pub fn unencrypted() -> Self {
        Self::default()
    }

    /// Credentials carrying the session AES key
    #[must_use]
    pub fn encrypted(key: [u8; 16], iv: [u8; 16]) -> Self {
        Self {
            decryptor: Some(AudioDecryptor::new(key, iv)),
        }
    }
}

/// Pluggable sender authentication
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// Decide whether an announced stream may proceed
    ///
    /// # Errors
    /// Returns `AuthFailure` when the request is malformed, asks for an
    /// unsupported capability, or is refused.
    async fn negotiate(&self, request: &HandshakeRequest) -> Result<SessionCredentials, AuthFailure>;

    /// Answer an `Apple-Challenge` header
    ///
    /// `None` omits `Apple-Response` from the reply.
    fn challenge_response(&self, _challenge: &str, _local_addr: SocketAddr) -> Option<String> {
        None
    }
}

/// Accepts unencrypted streams and nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAuthenticator;

#[async_trait]
impl SessionAuthenticator for PassthroughAuthenticator {
    async fn negotiate(&self, request: &HandshakeRequest) -> Result<SessionCredentials, AuthFailure> {
        if request.stream.is_encrypted() {
            return Err(AuthFailure::Unsupported(
                "encrypted stream (rsaaeskey) requires a key exchange authenticator".to_string(),
            ));
        }
        Ok(SessionCredentials::unencrypted())
    }
}
