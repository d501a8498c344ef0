//! RAOP wire formats
//!
//! Sans-IO codecs for the protocols a RAOP sender speaks to the bridge:
//! RTSP control, RTP audio/control/timing, SDP stream descriptions, and
//! DMAP track metadata.

pub mod dmap;
pub mod rtp;
pub mod rtsp;
pub mod sdp;
