//! Ayame signaling: wire protocol, WebSocket transport and session state machine

pub mod protocol;
pub mod session;
pub mod transport;

pub use protocol::{
    AcceptMessage, DecodeError, IceCandidate, IceServer, MessageKind, RejectMessage,
    SignalingMessage,
};
pub use session::{SessionEvent, SessionIdentity, SessionState, SignalingSession};
pub use transport::{
    websocket_factory, SignalingTransport, TransportEvent, TransportEventReceiver,
    TransportEventSender, TransportFactory, WebSocketTransport,
};
