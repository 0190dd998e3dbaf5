//! Signaling session state machine
//!
//! One [`SignalingSession`] covers one connection attempt:
//!
//! ```text
//! NotConnected --open--> AwaitingRegistration --accept--> Registered
//!                                  |                          |
//!                                reject                  bye / close / failure
//!                                  v                          v
//!                               Rejected                    Closed
//! ```
//!
//! The session is driven synchronously by its owner: transport events go in
//! through [`SignalingSession::handle_transport_event`] and at most one
//! [`SessionEvent`] comes out per call. Nothing here spawns or awaits.

use super::protocol::{
    AcceptMessage, DecodeError, IceCandidate, RegisterMessage, RejectMessage, SignalingMessage,
};
use super::transport::{SignalingTransport, TransportEvent, TransportEventSender, NORMAL_CLOSURE};
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Who this client is and where it registers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionIdentity {
    /// WebSocket URL of the signaling server
    pub signaling_url: String,
    pub room_id: String,
    pub client_id: String,
    pub signaling_key: Option<String>,
    /// Opaque JSON forwarded to the server's authentication webhook
    pub authn_metadata: Option<Value>,
}

impl SessionIdentity {
    fn register_message(&self) -> SignalingMessage {
        SignalingMessage::Register(RegisterMessage {
            room_id: self.room_id.clone(),
            client_id: self.client_id.clone(),
            signaling_key: self.signaling_key.clone(),
            authn_metadata: self.authn_metadata.clone(),
        })
    }
}

/// Lifecycle of a signaling session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotConnected,
    AwaitingRegistration,
    Registered,
    Rejected,
    Closed,
}

impl SessionState {
    /// No further protocol traffic will be processed
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Rejected | SessionState::Closed)
    }
}

/// What the session's owner has to react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Registration accepted; carries ICE servers and polarity flags
    Accepted(AcceptMessage),
    /// Registration refused; the session is finished
    Rejected(RejectMessage),
    /// Remote offer SDP
    Offer(String),
    /// Remote answer SDP
    Answer(String),
    /// Remote ICE candidate
    Candidate(IceCandidate),
    /// Server said bye or closed the socket
    Closed,
    /// The socket failed
    Error(String),
}

/// Client side of the Ayame signaling protocol
pub struct SignalingSession {
    identity: SessionIdentity,
    transport: Option<Box<dyn SignalingTransport>>,
    state: SessionState,
}

impl SignalingSession {
    pub fn new(identity: SessionIdentity, transport: Box<dyn SignalingTransport>) -> Self {
        Self {
            identity,
            transport: Some(transport),
            state: SessionState::NotConnected,
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Open the WebSocket; `register` goes out once the transport reports `Open`
    pub fn connect(&mut self, events: TransportEventSender) {
        if self.state != SessionState::NotConnected {
            warn!("connect() ignored in state {:?}", self.state);
            return;
        }
        match self.transport.as_mut() {
            Some(transport) => {
                info!(
                    "Connecting to {} as {} in room {}",
                    self.identity.signaling_url, self.identity.client_id, self.identity.room_id
                );
                transport.connect(&self.identity.signaling_url, events);
            }
            None => warn!("connect() ignored, transport already released"),
        }
    }

    /// Feed one transport event through the state machine
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Option<SessionEvent> {
        if self.state.is_terminal() {
            debug!("Session {:?}, ignoring transport event {:?}", self.state, event);
            return None;
        }

        match event {
            TransportEvent::Open => {
                if self.state != SessionState::NotConnected {
                    warn!("Unexpected transport open in state {:?}", self.state);
                    return None;
                }
                info!("Signaling socket open, registering");
                self.state = SessionState::AwaitingRegistration;
                self.send(&self.identity.register_message());
                None
            }
            TransportEvent::Message(text) => self.handle_message(&text),
            TransportEvent::Closing { code, reason } => {
                info!("Signaling socket closing: code={} reason={}", code, reason);
                self.release_transport(code, &reason);
                self.state = SessionState::Closed;
                Some(SessionEvent::Closed)
            }
            TransportEvent::Failure(cause) => {
                warn!("Signaling socket failed: {}", cause);
                self.transport = None;
                self.state = SessionState::Closed;
                Some(SessionEvent::Error(cause))
            }
        }
    }

    fn handle_message(&mut self, text: &str) -> Option<SessionEvent> {
        debug!("Received signaling message: {}", text);

        let message = match SignalingMessage::from_json(text) {
            Ok(message) => message,
            Err(e @ (DecodeError::UnknownType(_) | DecodeError::MissingType)) => {
                warn!("Discarding signaling frame: {}", e);
                return None;
            }
            Err(e) => {
                error!("Failed to decode signaling frame: {}", e);
                return None;
            }
        };

        match message {
            SignalingMessage::Ping => {
                self.send(&SignalingMessage::Pong);
                None
            }
            SignalingMessage::Bye => {
                info!("Server said bye");
                self.release_transport(NORMAL_CLOSURE, "");
                self.state = SessionState::Closed;
                Some(SessionEvent::Closed)
            }
            SignalingMessage::Accept(accept) => {
                if self.state != SessionState::AwaitingRegistration {
                    warn!("Ignoring accept in state {:?}", self.state);
                    return None;
                }
                info!(
                    "Registered in room {} ({} ICE servers)",
                    self.identity.room_id,
                    accept.ice_servers.len()
                );
                self.state = SessionState::Registered;
                Some(SessionEvent::Accepted(accept))
            }
            SignalingMessage::Reject(reject) => {
                if self.state != SessionState::AwaitingRegistration {
                    warn!("Ignoring reject in state {:?}", self.state);
                    return None;
                }
                warn!("Registration rejected: {}", reject.reason);
                self.release_transport(NORMAL_CLOSURE, "");
                self.state = SessionState::Rejected;
                Some(SessionEvent::Rejected(reject))
            }
            SignalingMessage::Offer(offer) => {
                self.registered_only("offer").map(|_| SessionEvent::Offer(offer.sdp))
            }
            SignalingMessage::Answer(answer) => {
                self.registered_only("answer").map(|_| SessionEvent::Answer(answer.sdp))
            }
            SignalingMessage::Candidate(candidate) => self
                .registered_only("candidate")
                .map(|_| SessionEvent::Candidate(candidate.ice)),
            other @ (SignalingMessage::Register(_) | SignalingMessage::Pong) => {
                warn!("Ignoring client-only message {}", other.kind());
                None
            }
        }
    }

    fn registered_only(&self, kind: &str) -> Option<()> {
        if self.state == SessionState::Registered {
            Some(())
        } else {
            warn!("Dropping {} received in state {:?}", kind, self.state);
            None
        }
    }

    /// Send the local offer
    pub fn send_offer(&self, sdp: &str) {
        self.send(&SignalingMessage::offer(sdp));
    }

    /// Send the local answer
    pub fn send_answer(&self, sdp: &str) {
        self.send(&SignalingMessage::answer(sdp));
    }

    /// Trickle one local candidate
    pub fn send_candidate(&self, candidate: &IceCandidate) {
        self.send(&SignalingMessage::candidate(candidate.clone()));
    }

    /// Say bye and close the socket. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            if matches!(
                self.state,
                SessionState::AwaitingRegistration | SessionState::Registered
            ) {
                send_on(transport.as_ref(), &SignalingMessage::Bye);
            }
            transport.close(NORMAL_CLOSURE, "");
            info!("Signaling session disconnected");
        }
        self.state = SessionState::Closed;
    }

    fn send(&self, message: &SignalingMessage) {
        match self.transport.as_deref() {
            Some(transport) => send_on(transport, message),
            None => warn!("Dropping {} message, transport released", message.kind()),
        }
    }

    fn release_transport(&mut self, code: u16, reason: &str) {
        if let Some(transport) = self.transport.take() {
            transport.close(code, reason);
        }
    }
}

fn send_on(transport: &dyn SignalingTransport, message: &SignalingMessage) {
    match message.to_json() {
        Ok(json) => {
            debug!("Sending signaling message: {}", json);
            transport.send(json);
        }
        Err(e) => warn!("{}", e),
    }
}
