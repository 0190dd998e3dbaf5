//! Ayame signaling protocol types
//!
//! Every frame on the signaling WebSocket is one JSON object carrying a
//! mandatory `type` discriminator. Decoding looks at the discriminator first
//! and only then parses the payload for that kind, so an unknown `type` and a
//! malformed payload for a known `type` are reported as distinct errors.
//! Unknown fields are ignored everywhere.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Name of the discriminator field on every signaling message
pub const TYPE_FIELD: &str = "type";

/// Signaling message types
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// Join a room (client -> server, always first)
    Register(RegisterMessage),

    /// Registration accepted (server -> client)
    Accept(AcceptMessage),

    /// Registration rejected (server -> client)
    Reject(RejectMessage),

    /// SDP offer (both directions)
    Offer(SdpMessage),

    /// SDP answer (both directions)
    Answer(SdpMessage),

    /// Trickled ICE candidate (both directions)
    Candidate(CandidateMessage),

    /// Keep-alive probe (server -> client)
    Ping,

    /// Keep-alive reply (client -> server)
    Pong,

    /// Intentional session termination (both directions)
    Bye,
}

/// Payload of `register`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMessage {
    /// Room to join
    pub room_id: String,

    /// Client identifier within the room
    pub client_id: String,

    /// Shared secret checked by the signaling server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signaling_key: Option<String>,

    /// Opaque JSON forwarded to the server's authentication webhook
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_metadata: Option<Value>,
}

/// Payload of `accept`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcceptMessage {
    /// Opaque authorization metadata returned by the server
    #[serde(default)]
    pub authz_metadata: Option<Value>,

    /// STUN/TURN servers to use, in server order
    pub ice_servers: Vec<IceServer>,

    /// Set by current servers when another client is already in the room
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_exist_client: Option<bool>,

    /// Legacy spelling of `is_exist_client` used by older servers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_exist_user: Option<bool>,
}

/// Payload of `reject`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RejectMessage {
    /// Server-provided reason
    pub reason: String,
}

/// Payload of `offer` and `answer`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SdpMessage {
    /// Session description, passed through untouched
    pub sdp: String,
}

/// Payload of `candidate`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateMessage {
    /// The candidate itself
    pub ice: IceCandidate,
}

/// ICE candidate as carried on the wire
///
/// All three fields are mandatory here even though the browser API allows
/// them to be missing; native engines need all of them to add a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    /// `candidate:` attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,

    /// Index of the m-line the candidate belongs to
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u16,
}

/// STUN/TURN server entry from `accept`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServer {
    /// Server URLs (`stun:`, `turn:`, `turns:`)
    pub urls: Vec<String>,

    /// TURN username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// TURN credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Discriminator values understood by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Register,
    Accept,
    Reject,
    Offer,
    Answer,
    Candidate,
    Ping,
    Pong,
    Bye,
}

impl MessageKind {
    /// Wire value of the discriminator
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Register => "register",
            MessageKind::Accept => "accept",
            MessageKind::Reject => "reject",
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::Candidate => "candidate",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Bye => "bye",
        }
    }

    /// Parse a wire discriminator
    pub fn from_wire(value: &str) -> Option<Self> {
        let kind = match value {
            "register" => MessageKind::Register,
            "accept" => MessageKind::Accept,
            "reject" => MessageKind::Reject,
            "offer" => MessageKind::Offer,
            "answer" => MessageKind::Answer,
            "candidate" => MessageKind::Candidate,
            "ping" => MessageKind::Ping,
            "pong" => MessageKind::Pong,
            "bye" => MessageKind::Bye,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an inbound frame was discarded
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Frame is not valid JSON
    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Frame is not an object or has no string `type`
    #[error("missing message type")]
    MissingType,

    /// `type` is not one this client understands
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// `type` is known but the payload does not match it
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Discriminator of the rejected message
        kind: MessageKind,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },
}

impl SignalingMessage {
    /// Build an `offer`
    pub fn offer(sdp: impl Into<String>) -> Self {
        SignalingMessage::Offer(SdpMessage { sdp: sdp.into() })
    }

    /// Build an `answer`
    pub fn answer(sdp: impl Into<String>) -> Self {
        SignalingMessage::Answer(SdpMessage { sdp: sdp.into() })
    }

    /// Build a `candidate`
    pub fn candidate(ice: IceCandidate) -> Self {
        SignalingMessage::Candidate(CandidateMessage { ice })
    }

    /// Discriminator of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            SignalingMessage::Register(_) => MessageKind::Register,
            SignalingMessage::Accept(_) => MessageKind::Accept,
            SignalingMessage::Reject(_) => MessageKind::Reject,
            SignalingMessage::Offer(_) => MessageKind::Offer,
            SignalingMessage::Answer(_) => MessageKind::Answer,
            SignalingMessage::Candidate(_) => MessageKind::Candidate,
            SignalingMessage::Ping => MessageKind::Ping,
            SignalingMessage::Pong => MessageKind::Pong,
            SignalingMessage::Bye => MessageKind::Bye,
        }
    }

    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to serialize {} message: {}",
                self.kind(),
                e
            ))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(text: &str) -> std::result::Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text).map_err(DecodeError::Malformed)?;

        let kind = match value.get(TYPE_FIELD) {
            Some(Value::String(name)) => MessageKind::from_wire(name)
                .ok_or_else(|| DecodeError::UnknownType(name.clone()))?,
            _ => return Err(DecodeError::MissingType),
        };

        let message = match kind {
            MessageKind::Register => SignalingMessage::Register(payload(kind, value)?),
            MessageKind::Accept => SignalingMessage::Accept(payload(kind, value)?),
            MessageKind::Reject => SignalingMessage::Reject(payload(kind, value)?),
            MessageKind::Offer => SignalingMessage::Offer(payload(kind, value)?),
            MessageKind::Answer => SignalingMessage::Answer(payload(kind, value)?),
            MessageKind::Candidate => SignalingMessage::Candidate(payload(kind, value)?),
            MessageKind::Ping => SignalingMessage::Ping,
            MessageKind::Pong => SignalingMessage::Pong,
            MessageKind::Bye => SignalingMessage::Bye,
        };

        Ok(message)
    }
}

fn payload<T: DeserializeOwned>(
    kind: MessageKind,
    value: Value,
) -> std::result::Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload { kind, source })
}
