//! Client SDK for the Ayame WebRTC signaling protocol
//!
//! Joins a room on an Ayame signaling server, works out which side offers,
//! and relays SDP and ICE candidates between the server and a media engine
//! until the peers are connected.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Application                                             │
//! │  ↑ ChannelEvent stream        ↓ connect / disconnect     │
//! │  MediaChannel (one coordination task)                    │
//! │  ├─ SignalingSession ── SignalingTransport (WebSocket)   │
//! │  │    register / accept / offer / answer / candidate     │
//! │  └─ MediaNegotiator (webrtc-rs by default)               │
//! │       peer connection, local tracks, ICE                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - `webrtc-engine` (default): [`WebRtcNegotiator`] over webrtc-rs
//! - `cli`: the `ayame_client` binary

#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod error;
pub mod media;
pub mod signaling;

#[cfg(test)]
pub(crate) mod test_support;

pub use channel::{ChannelEvent, ChannelEvents, ConnectionState, MediaChannel, Polarity};
pub use config::{ChannelConfig, MediaOptions, VideoCodec};
pub use error::{Error, Result};
pub use media::{
    IceConnectionState, IceServerConfig, MediaEvent, MediaNegotiator, SdpType,
    SessionDescription, StreamHandle, StreamRole,
};
#[cfg(feature = "webrtc-engine")]
pub use media::peer::{LocalTracks, LocalTracksHandle, WebRtcNegotiator};
pub use signaling::{SessionIdentity, SignalingTransport, TransportEvent, TransportFactory};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::version().is_empty());
    }
}
