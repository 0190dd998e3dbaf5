//! Media negotiation capability
//!
//! The channel never talks to a WebRTC engine directly. It drives a
//! [`MediaNegotiator`] with plain commands and listens to the
//! [`MediaEvent`]s the negotiator reports on the sender it was bound to.
//! Commands return immediately; results (descriptions, candidates, state
//! changes, failures) always come back as events.

#[cfg(feature = "webrtc-engine")]
pub mod peer;

use crate::config::MediaOptions;
use crate::signaling::protocol::{IceCandidate, IceServer};
use std::fmt;
use tokio::sync::mpsc;

/// Offer or answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

/// A local or remote session description; the SDP text is opaque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// STUN/TURN server handed to [`MediaNegotiator::initialize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl From<&IceServer> for IceServerConfig {
    fn from(server: &IceServer) -> Self {
        Self {
            urls: server.urls.clone(),
            username: server.username.clone(),
            credential: server.credential.clone(),
        }
    }
}

/// ICE connectivity as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// Lowercase state name, as browsers spell it
    pub fn as_str(&self) -> &'static str {
        match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Closed => "closed",
        }
    }

    /// Media can flow
    pub fn is_established(&self) -> bool {
        matches!(self, IceConnectionState::Connected | IceConnectionState::Completed)
    }

    /// Connectivity is lost or was torn down
    pub fn is_lost(&self) -> bool {
        matches!(
            self,
            IceConnectionState::Disconnected
                | IceConnectionState::Failed
                | IceConnectionState::Closed
        )
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a stream is captured here or received from the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    Local,
    Remote,
}

/// Opaque handle for a media stream surfaced to the application
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    /// Engine stream id (msid)
    pub id: String,
    pub role: StreamRole,
}

impl StreamHandle {
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: StreamRole::Local,
        }
    }

    pub fn remote(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: StreamRole::Remote,
        }
    }
}

/// Everything a negotiator reports back
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// A local offer or answer was created and applied
    LocalDescriptionReady(SessionDescription),
    /// A local ICE candidate was gathered
    LocalCandidateDiscovered(IceCandidate),
    ConnectivityStateChanged(IceConnectionState),
    StreamAdded(StreamHandle),
    StreamRemoved(StreamHandle),
    /// A command failed; negotiation may continue
    Failure(String),
}

pub type MediaEventSender = mpsc::UnboundedSender<MediaEvent>;
pub type MediaEventReceiver = mpsc::UnboundedReceiver<MediaEvent>;

/// Media-negotiation capability driven by the channel
///
/// Every method is a non-blocking command. Implementations must report
/// results in the order the commands were issued.
pub trait MediaNegotiator: Send + 'static {
    /// Attach the event sink; called before any other command
    ///
    /// The channel binds a fresh sink at the start of every connect after
    /// the first. Events from commands issued before a rebind, including
    /// callbacks from a closed peer connection, must go to the old sink.
    fn bind(&mut self, events: MediaEventSender);

    /// Start capturing local media; reports `StreamAdded(Local)` when ready
    fn start_local_capture(&mut self, options: &MediaOptions);

    fn stop_local_capture(&mut self);

    /// Create the peer connection with the given ICE servers
    fn initialize(&mut self, ice_servers: Vec<IceServerConfig>);

    /// Create and apply a local offer; reports `LocalDescriptionReady`
    fn create_offer(&mut self);

    /// Create and apply a local answer; reports `LocalDescriptionReady`
    fn create_answer(&mut self);

    fn set_remote_description(&mut self, description: SessionDescription);

    fn add_remote_candidate(&mut self, candidate: IceCandidate);

    /// Tear down the peer connection and release all engine resources
    fn close(&mut self);
}
