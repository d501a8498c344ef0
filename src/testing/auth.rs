//! Authenticators for encrypted test streams

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use async_trait::async_trait;

use crate::auth::{
    HandshakeRequest, PassthroughAuthenticator, SessionAuthenticator, SessionCredentials,
};
use crate::error::AuthFailure;

const BLOCK_SIZE: usize = 16;

/// Accepts every stream; encrypted streams use a key known in advance
///
/// Stands in for the RSA key exchange: the announced `rsaaeskey` is
/// ignored and the stream's `aesiv` is paired with a fixed key.
#[derive(Debug, Clone, Copy)]
pub struct FixedKeyAuthenticator {
    key: [u8; 16],
    challenge_response: bool,
}

impl FixedKeyAuthenticator {
    /// Create with the session key senders will use
    #[must_use]
    pub fn new(key: [u8; 16]) -> Self {
        Self {
            key,
            challenge_response: false,
        }
    }

    /// Also answer `Apple-Challenge` with a fixed token
    #[must_use]
    pub fn with_challenge_response(mut self) -> Self {
        self.challenge_response = true;
        self
    }
}

#[async_trait]
impl SessionAuthenticator for FixedKeyAuthenticator {
    async fn negotiate(&self, request: &HandshakeRequest) -> Result<SessionCredentials, AuthFailure> {
        Ok(match &request.stream.encryption {
            Some(params) => SessionCredentials::encrypted(self.key, params.aes_iv),
            None => SessionCredentials::unencrypted(),
        })
    }

    fn challenge_response(&self, challenge: &str, _local_addr: SocketAddr) -> Option<String> {
        self.challenge_response
            .then(|| format!("response-to-{challenge}"))
    }
}

/// Refuses every sender
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingAuthenticator;

#[async_trait]
impl SessionAuthenticator for RejectingAuthenticator {
    async fn negotiate(&self, _request: &HandshakeRequest) -> Result<SessionCredentials, AuthFailure> {
        Err(AuthFailure::Rejected("sender not paired".to_string()))
    }
}

/// Never answers the first `stalls` handshakes; later ones pass through
///
/// Models an authenticator waiting on something that never arrives, such
/// as a pairing prompt nobody confirms.
#[derive(Debug, Default)]
pub struct StalledAuthenticator {
    stalls: AtomicUsize,
    started: AtomicUsize,
}

impl StalledAuthenticator {
    /// Stall the next `stalls` handshakes
    #[must_use]
    pub fn new(stalls: usize) -> Self {
        Self {
            stalls: AtomicUsize::new(stalls),
            started: AtomicUsize::new(0),
        }
    }

    /// Handshakes begun so far, stalled or not
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionAuthenticator for StalledAuthenticator {
    async fn negotiate(&self, request: &HandshakeRequest) -> Result<SessionCredentials, AuthFailure> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let stall = self
            .stalls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stall {
            std::future::pending::<()>().await;
        }
        PassthroughAuthenticator.negotiate(request).await
    }
}

/// Encrypt an audio payload the way a RAOP sender does
///
/// AES-128-CBC restarted from `iv` for every payload; a trailing partial
/// block is left in the clear.
#[must_use]
pub fn encrypt_payload(key: &[u8; 16], iv: &[u8; 16], plain: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let encrypted_len = (plain.len() / BLOCK_SIZE) * BLOCK_SIZE;
    let mut out = Vec::with_capacity(plain.len());

    let mut prev_block = *iv;
    for chunk in plain[..encrypted_len].chunks_exact(BLOCK_SIZE) {
        let mut block = GenericArray::clone_from_slice(chunk);
        for (b, p) in block.iter_mut().zip(prev_block.iter()) {
            *b ^= *p;
        }
        cipher.encrypt_block(&mut block);
        prev_block.copy_from_slice(&block);
        out.extend_from_slice(&block);
    }

    out.extend_from_slice(&plain[encrypted_len..]);
    out
}
