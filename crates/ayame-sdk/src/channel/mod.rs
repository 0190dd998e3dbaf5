//! Negotiation orchestrator
//!
//! A [`MediaChannel`] owns one signaling session and one
//! [`MediaNegotiator`] and routes everything between them: registration,
//! offer/answer role selection, SDP and candidate exchange, and connection
//! lifecycle. The application only sees the [`ChannelEvent`] stream.
//!
//! # Example
//!
//! ```no_run
//! use ayame_sdk::{ChannelConfig, ChannelEvent, MediaChannel, WebRtcNegotiator};
//!
//! # async fn example() -> ayame_sdk::Result<()> {
//! let config = ChannelConfig::new("wss://ayame.example.com/signaling", "room-1");
//! let (channel, mut events) = MediaChannel::new(config, WebRtcNegotiator::new())?;
//!
//! channel.connect()?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChannelEvent::Connected => println!("media flowing"),
//!         ChannelEvent::Disconnected { reason } => {
//!             println!("disconnected: {}", reason);
//!             break;
//!         }
//!         other => println!("{:?}", other),
//!     }
//! }
//! channel.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod coordinator;
pub mod polarity;

pub use polarity::Polarity;

use crate::config::ChannelConfig;
use crate::media::{MediaNegotiator, StreamHandle};
use crate::signaling::transport::{websocket_factory, TransportFactory};
use crate::{Error, Result};
use coordinator::{Command, Coordinator};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// What the application hears from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// ICE connectivity established
    ///
    /// Emitted once per connect, when leaving `Connecting`. ICE recovering
    /// after a loss does not emit it again; connect anew instead.
    Connected,
    /// The session ended; at most once per connect
    Disconnected { reason: String },
    /// Something failed; a session-fatal failure is followed by `Disconnected`
    Error { message: String },
    StreamAdded(StreamHandle),
    StreamRemoved(StreamHandle),
}

/// Channel lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// Handle to a running media channel
///
/// Every operation posts a command to the channel's coordination task and
/// returns immediately. Dropping the handle shuts the task down.
pub struct MediaChannel {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    client_id: String,
    task: JoinHandle<()>,
}

impl MediaChannel {
    /// Create a channel signaling over WebSocket
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new<N: MediaNegotiator>(
        config: ChannelConfig,
        negotiator: N,
    ) -> Result<(Self, ChannelEvents)> {
        Self::with_transport(config, negotiator, websocket_factory())
    }

    /// Create a channel with a custom signaling transport
    pub fn with_transport<N: MediaNegotiator>(
        config: ChannelConfig,
        negotiator: N,
        transport_factory: TransportFactory,
    ) -> Result<(Self, ChannelEvents)> {
        config.validate()?;

        let identity = config.identity();
        let client_id = identity.client_id.clone();
        info!(
            "Creating media channel: room={} client={}",
            identity.room_id, client_id
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator::new(
            identity,
            config.media,
            negotiator,
            transport_factory,
            events_tx,
            state_tx,
        );
        let task = tokio::spawn(coordinator.run(commands_rx));

        Ok((
            Self {
                commands: commands_tx,
                state: state_rx,
                client_id,
                task,
            },
            events_rx,
        ))
    }

    /// Start local capture and register with the signaling server
    ///
    /// Ignored with a warning while a session is live. A channel whose
    /// session ended can be connected again; a fresh session is built.
    pub fn connect(&self) -> Result<()> {
        self.post(Command::Connect)
    }

    /// Say bye, close the socket and release media
    ///
    /// Emits no [`ChannelEvent`] and is safe to call repeatedly. The
    /// published [`state`](Self::state) becomes `Disconnected`.
    pub fn disconnect(&self) -> Result<()> {
        self.post(Command::Disconnect)
    }

    /// Current lifecycle snapshot
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Client ID this channel registers with
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Disconnect and wait for the coordination task to finish
    pub async fn shutdown(self) -> Result<()> {
        debug!("Shutting down media channel {}", self.client_id);
        // The task may already be gone; join either way
        let _ = self.commands.send(Command::Shutdown);
        self.task
            .await
            .map_err(|e| Error::ChannelClosed(format!("Coordination task failed: {}", e)))
    }

    fn post(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::ChannelClosed("Coordination task is not running".to_string()))
    }
}
