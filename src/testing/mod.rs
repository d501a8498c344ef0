//! Test doubles for the bridge
//!
//! Recording sinks, a scripted RAOP sender and authenticators with known
//! keys. Used by the crate's own tests and available to hosts testing
//! their integration.

mod auth;
mod mock_sender;
mod rtsp_client;
mod sinks;

pub use auth::{
    FixedKeyAuthenticator, RejectingAuthenticator, StalledAuthenticator, encrypt_payload,
};
pub use mock_sender::{
    MockSender, MockSenderConfig, MockSenderError, MockTransport, dmap_body,
};
pub use rtsp_client::{RequestBuilder, ResponseReadError, ResponseReader, encode_request};
pub use sinks::{PlayerCall, RecordingMediaPlayer, RecordingSpeaker};

use std::net::{Ipv4Addr, TcpListener, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};

/// Ports handed out by [`free_port_base`] start here
const PORT_SCAN_START: u16 = 20_000;

static NEXT_PORT: AtomicU16 = AtomicU16::new(PORT_SCAN_START);

/// Find a base port with `count` consecutive free TCP+UDP ports on localhost
///
/// Successive calls in one process never return overlapping ranges, so
/// tests running in parallel do not collide with each other.
#[must_use]
pub fn free_port_base(count: u16) -> u16 {
    loop {
        let base = NEXT_PORT.fetch_add(count, Ordering::SeqCst);
        if base < PORT_SCAN_START || base.checked_add(count).is_none() {
            NEXT_PORT.store(PORT_SCAN_START, Ordering::SeqCst);
            continue;
        }
        let free = (base..base + count).all(|port| {
            TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
                && UdpSocket::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
        });
        if free {
            return base;
        }
    }
}

/// One packet of a 16-bit stereo ramp starting at `start`
#[must_use]
pub fn ramp_packet(start: i16, frames: usize) -> Vec<i16> {
    (0..frames)
        .flat_map(|i| {
            let value = start.wrapping_add(i16::try_from(i % 1000).unwrap_or(0));
            [value, value]
        })
        .collect()
}
