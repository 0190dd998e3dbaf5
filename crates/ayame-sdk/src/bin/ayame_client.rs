//! Ayame client binary entry point
//!
//! Joins a room, negotiates a webrtc-rs peer connection and logs channel
//! events until the session ends or Ctrl+C is pressed.
//!
//! # Usage
//!
//! ```bash
//! # Join room-1 on a local server
//! cargo run --bin ayame_client --features cli -- --room-id room-1
//!
//! # Use a config file, override the room from the environment
//! AYAME_ROOM_ID=room-2 cargo run --bin ayame_client --features cli -- --config ayame.yaml
//!
//! # Audio only
//! cargo run --bin ayame_client --features cli -- --room-id room-1 --no-video
//! ```
//!
//! # Environment Variables
//!
//! - `AYAME_SIGNALING_URL`: Signaling server WebSocket URL (default: `ws://localhost:3000/signaling`)
//! - `AYAME_ROOM_ID`: Room to join
//! - `AYAME_CLIENT_ID`: Client ID (default: random UUID v4)
//! - `AYAME_SIGNALING_KEY`: Signaling key (default: none)
//! - `AYAME_AUTHN_METADATA`: Authentication metadata as JSON (default: none)
//! - `RUST_LOG`: Logging level (default: `info`)

use anyhow::Context;
use ayame_sdk::{ChannelConfig, ChannelEvent, MediaChannel, VideoCodec, WebRtcNegotiator};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "ayame_client",
    version,
    about = "Join an Ayame room and negotiate a WebRTC session"
)]
struct Args {
    /// YAML or JSON config file; flags override its values
    #[arg(short, long, env = "AYAME_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "AYAME_SIGNALING_URL")]
    signaling_url: Option<String>,

    #[arg(long, env = "AYAME_ROOM_ID")]
    room_id: Option<String>,

    #[arg(long, env = "AYAME_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "AYAME_SIGNALING_KEY")]
    signaling_key: Option<String>,

    #[arg(long, env = "AYAME_AUTHN_METADATA")]
    authn_metadata: Option<String>,

    /// Do not send audio
    #[arg(long)]
    no_audio: bool,

    /// Do not send video
    #[arg(long)]
    no_video: bool,

    #[arg(long, value_enum)]
    video_codec: Option<CodecArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodecArg {
    Vp8,
    Vp9,
    H264,
    Av1,
}

impl From<CodecArg> for VideoCodec {
    fn from(codec: CodecArg) -> Self {
        match codec {
            CodecArg::Vp8 => VideoCodec::VP8,
            CodecArg::Vp9 => VideoCodec::VP9,
            CodecArg::H264 => VideoCodec::H264,
            CodecArg::Av1 => VideoCodec::AV1,
        }
    }
}

impl Args {
    fn into_config(self) -> anyhow::Result<ChannelConfig> {
        let mut config = match &self.config {
            Some(path) => ChannelConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ChannelConfig::default(),
        };

        if let Some(url) = self.signaling_url {
            config.signaling_url = url;
        }
        if let Some(room_id) = self.room_id {
            config.room_id = room_id;
        }
        if self.client_id.is_some() {
            config.client_id = self.client_id;
        }
        if self.signaling_key.is_some() {
            config.signaling_key = self.signaling_key;
        }
        if self.authn_metadata.is_some() {
            config.authn_metadata = self.authn_metadata;
        }
        if self.no_audio {
            config.media.audio_enabled = false;
        }
        if self.no_video {
            config.media.video_enabled = false;
        }
        if let Some(codec) = self.video_codec {
            config.media.video_codec = codec.into();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!(version = ayame_sdk::version(), "Ayame client starting");

    let config = Args::parse().into_config()?;
    info!(
        signaling_url = %config.signaling_url,
        room_id = %config.room_id,
        audio = config.media.audio_enabled,
        video = config.media.video_enabled,
        "Configuration loaded"
    );

    let (channel, mut events) = MediaChannel::new(config, WebRtcNegotiator::new())?;
    info!(client_id = channel.client_id(), "Media channel created");
    channel.connect()?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ChannelEvent::Connected) => info!("Peer connected"),
                Some(ChannelEvent::StreamAdded(stream)) => {
                    info!(stream = %stream.id, role = ?stream.role, "Stream added");
                }
                Some(ChannelEvent::StreamRemoved(stream)) => {
                    info!(stream = %stream.id, role = ?stream.role, "Stream removed");
                }
                Some(ChannelEvent::Error { message }) => warn!("{}", message),
                Some(ChannelEvent::Disconnected { reason }) => {
                    info!("Disconnected: {}", reason);
                    break;
                }
                None => {
                    error!("Channel stopped unexpectedly");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, disconnecting");
                break;
            }
        }
    }

    channel.shutdown().await?;
    info!("Ayame client shut down");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
