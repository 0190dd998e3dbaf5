//! Configuration types for a media channel

use crate::signaling::SessionIdentity;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Main configuration for a [`MediaChannel`](crate::MediaChannel)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Ayame signaling server URL (ws:// or wss://)
    pub signaling_url: String,

    /// Room to join
    pub room_id: String,

    /// Client ID within the room (random UUID v4 if None)
    pub client_id: Option<String>,

    /// Signaling key checked by the server (optional)
    pub signaling_key: Option<String>,

    /// Authentication metadata as a JSON document (optional)
    ///
    /// Parsed when the session identity is built; text that is not valid
    /// JSON is dropped with a warning.
    pub authn_metadata: Option<String>,

    /// Local media to capture and offer
    pub media: MediaOptions,
}

/// Local media options handed to the negotiator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaOptions {
    /// Capture and send audio (default: true)
    pub audio_enabled: bool,

    /// Capture and send video (default: true)
    pub video_enabled: bool,

    /// Preferred video codec (default: VP9)
    pub video_codec: VideoCodec,
}

/// Supported video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    /// VP8 codec
    VP8,
    /// VP9 codec (default)
    VP9,
    /// H.264 codec
    H264,
    /// AV1 codec
    AV1,
}

impl VideoCodec {
    /// RTP mime type for this codec
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::VP8 => "video/VP8",
            VideoCodec::VP9 => "video/VP9",
            VideoCodec::H264 => "video/H264",
            VideoCodec::AV1 => "video/AV1",
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:3000/signaling".to_string(),
            room_id: String::new(),
            client_id: None,
            signaling_key: None,
            authn_metadata: None,
            media: MediaOptions::default(),
        }
    }
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
            video_codec: VideoCodec::VP9,
        }
    }
}

impl ChannelConfig {
    /// Config for `room_id` on the server at `signaling_url`, defaults elsewhere
    pub fn new(signaling_url: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            room_id: room_id.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a YAML or JSON file
    ///
    /// The format is picked from the extension (`.json` is JSON, anything
    /// else is YAML). The loaded config is validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config: ChannelConfig = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                Error::SerializationError(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::SerializationError(format!("Failed to parse {}: {}", path.display(), e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a valid WebSocket URL
    /// - `room_id` is empty
    /// - `client_id` is present but empty
    pub fn validate(&self) -> Result<()> {
        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.room_id.trim().is_empty() {
            return Err(Error::InvalidConfig("room_id must not be empty".to_string()));
        }

        if matches!(&self.client_id, Some(id) if id.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "client_id must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the immutable identity used for one signaling session
    ///
    /// A missing `client_id` becomes a fresh UUID v4, so call this once per
    /// channel and reuse the result.
    pub fn identity(&self) -> SessionIdentity {
        let authn_metadata = self.authn_metadata.as_deref().and_then(|raw| {
            match serde_json::from_str(raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("authn_metadata is not valid JSON, sending none: {}", e);
                    None
                }
            }
        });

        SessionIdentity {
            signaling_url: self.signaling_url.clone(),
            room_id: self.room_id.clone(),
            client_id: self
                .client_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            signaling_key: self.signaling_key.clone(),
            authn_metadata,
        }
    }
}
