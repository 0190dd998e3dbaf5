//! Coordination task behind a [`MediaChannel`](super::MediaChannel)
//!
//! All channel state lives here and is touched only from one task. Commands
//! from the handle, transport events and media events are merged with
//! `tokio::select!` and handled one at a time, so no locks are needed.

use super::polarity::Polarity;
use super::{ChannelEvent, ConnectionState};
use crate::config::MediaOptions;
use crate::media::{
    IceServerConfig, MediaEvent, MediaEventReceiver, MediaNegotiator, SdpType, SessionDescription,
    StreamHandle,
};
use crate::signaling::protocol::IceCandidate;
use crate::signaling::{
    SessionEvent, SessionIdentity, SignalingSession, TransportEvent, TransportEventReceiver,
    TransportFactory,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Requests from the [`MediaChannel`](super::MediaChannel) handle
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    Shutdown,
}

pub(crate) struct Coordinator<N: MediaNegotiator> {
    identity: SessionIdentity,
    media_options: MediaOptions,
    negotiator: N,
    transport_factory: TransportFactory,

    session: Option<SignalingSession>,
    transport_events: Option<TransportEventReceiver>,
    media_events: Option<MediaEventReceiver>,

    events: mpsc::UnboundedSender<ChannelEvent>,
    state: watch::Sender<ConnectionState>,
    lifecycle: ConnectionState,

    polarity: Option<Polarity>,
    streams: Vec<StreamHandle>,
    /// Local candidates wait here until our description is on the wire
    pending_candidates: Vec<IceCandidate>,
    local_description_sent: bool,
    /// Set once the negotiator was asked to build this lifecycle's peer
    peer_initialized: bool,
    media_active: bool,
}

impl<N: MediaNegotiator> Coordinator<N> {
    pub(crate) fn new(
        identity: SessionIdentity,
        media_options: MediaOptions,
        mut negotiator: N,
        transport_factory: TransportFactory,
        events: mpsc::UnboundedSender<ChannelEvent>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        negotiator.bind(media_tx);

        Self {
            identity,
            media_options,
            negotiator,
            transport_factory,
            session: None,
            transport_events: None,
            media_events: Some(media_rx),
            events,
            state,
            lifecycle: ConnectionState::Idle,
            polarity: None,
            streams: Vec::new(),
            pending_candidates: Vec::new(),
            local_description_sent: false,
            peer_initialized: false,
            media_active: false,
        }
    }

    /// Run until shut down or until every channel handle is dropped
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("Coordination task started for client {}", self.identity.client_id);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Connect) => self.connect(),
                    Some(Command::Disconnect) => self.disconnect(),
                    Some(Command::Shutdown) | None => {
                        self.disconnect();
                        break;
                    }
                },
                event = recv_or_pending(&mut self.transport_events) => match event {
                    Some(event) => self.on_transport_event(event),
                    None => self.transport_events = None,
                },
                event = recv_or_pending(&mut self.media_events) => match event {
                    Some(event) => self.on_media_event(event),
                    None => {
                        debug!("Negotiator dropped its event sender");
                        self.media_events = None;
                    }
                },
            }
        }

        debug!("Coordination task stopped for client {}", self.identity.client_id);
    }

    fn is_session_active(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| !session.state().is_terminal())
            .unwrap_or(false)
    }

    pub(crate) fn connect(&mut self) {
        if self.is_session_active() {
            warn!("connect() ignored, channel is {:?}", self.lifecycle);
            return;
        }

        // The previous session ended on its own; media is still up
        if self.media_active {
            self.negotiator.stop_local_capture();
            self.negotiator.close();
            self.media_active = false;
        }
        if self.session.is_some() {
            self.start_media_generation();
        }

        info!(
            "Connecting client {} to room {}",
            self.identity.client_id, self.identity.room_id
        );

        self.polarity = None;
        self.pending_candidates.clear();
        self.local_description_sent = false;
        self.peer_initialized = false;
        self.set_lifecycle(ConnectionState::Connecting);

        self.negotiator.start_local_capture(&self.media_options);
        self.media_active = true;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = SignalingSession::new(self.identity.clone(), (self.transport_factory)());
        session.connect(tx);
        self.session = Some(session);
        self.transport_events = Some(rx);
    }

    /// Route media events to a fresh channel
    ///
    /// Whatever the previous peer connection still reports lands in the old
    /// receiver and is dropped with it. Streams it never got to remove are
    /// removed here so listeners see every stream end.
    fn start_media_generation(&mut self) {
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        self.negotiator.bind(media_tx);
        self.media_events = Some(media_rx);

        for stream in std::mem::take(&mut self.streams) {
            debug!("Dropping stale stream {} ({:?})", stream.id, stream.role);
            self.emit(ChannelEvent::StreamRemoved(stream));
        }
    }

    /// Tear everything down without a listener event; safe to repeat
    ///
    /// The published state still moves to `Disconnected`.
    pub(crate) fn disconnect(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.disconnect();
        }
        if self.media_active {
            info!("Releasing media for client {}", self.identity.client_id);
            self.negotiator.stop_local_capture();
            self.negotiator.close();
            self.media_active = false;
        }
        self.pending_candidates.clear();
        self.peer_initialized = false;

        if self.session.is_some() && self.lifecycle != ConnectionState::Disconnected {
            self.set_lifecycle(ConnectionState::Disconnected);
        }
    }

    pub(crate) fn on_transport_event(&mut self, event: TransportEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!("Transport event without a session: {:?}", event);
            return;
        };
        if let Some(event) = session.handle_transport_event(event) {
            self.on_session_event(event);
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Accepted(accept) => {
                let servers: Vec<IceServerConfig> =
                    accept.ice_servers.iter().map(IceServerConfig::from).collect();
                self.negotiator.initialize(servers);
                self.peer_initialized = true;

                let polarity = Polarity::from_accept(&accept);
                info!("Registered, polarity {:?}", polarity);
                self.polarity = Some(polarity);

                if polarity.is_initiator() {
                    self.negotiator.create_offer();
                } else {
                    debug!("Waiting for remote offer");
                }
            }
            SessionEvent::Rejected(reject) => {
                let message = format!("Signaling rejected: {}", reject.reason);
                self.emit(ChannelEvent::Error {
                    message: message.clone(),
                });
                self.mark_disconnected(message);
            }
            SessionEvent::Offer(sdp) => {
                self.negotiator
                    .set_remote_description(SessionDescription::offer(sdp));
                self.negotiator.create_answer();
            }
            SessionEvent::Answer(sdp) => {
                self.negotiator
                    .set_remote_description(SessionDescription::answer(sdp));
            }
            SessionEvent::Candidate(candidate) => {
                self.negotiator.add_remote_candidate(candidate);
            }
            SessionEvent::Closed => {
                self.mark_disconnected("Signaling channel closed".to_string());
            }
            SessionEvent::Error(reason) => {
                let message = format!("Signaling error: {}", reason);
                self.emit(ChannelEvent::Error {
                    message: message.clone(),
                });
                self.mark_disconnected(message);
            }
        }
    }

    pub(crate) fn on_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::LocalDescriptionReady(description) => {
                self.send_local_description(&description);
            }
            MediaEvent::LocalCandidateDiscovered(candidate) => {
                if self.local_description_sent {
                    if let Some(session) = &self.session {
                        session.send_candidate(&candidate);
                    }
                } else {
                    debug!("Holding local candidate until the description is sent");
                    self.pending_candidates.push(candidate);
                }
            }
            MediaEvent::ConnectivityStateChanged(state) => {
                if !self.peer_initialized {
                    debug!("Ignoring ICE {} with no peer in this lifecycle", state);
                } else if state.is_established() {
                    if self.lifecycle == ConnectionState::Connecting {
                        self.set_lifecycle(ConnectionState::Connected);
                        self.emit(ChannelEvent::Connected);
                    } else {
                        debug!("ICE {} while {:?}", state, self.lifecycle);
                    }
                } else if state.is_lost() {
                    self.mark_disconnected(state.to_string());
                } else {
                    debug!("ICE connection state: {}", state);
                }
            }
            MediaEvent::StreamAdded(stream) => {
                info!("Stream added: {} ({:?})", stream.id, stream.role);
                self.streams.push(stream.clone());
                self.emit(ChannelEvent::StreamAdded(stream));
            }
            MediaEvent::StreamRemoved(stream) => {
                info!("Stream removed: {} ({:?})", stream.id, stream.role);
                self.streams.retain(|known| known != &stream);
                self.emit(ChannelEvent::StreamRemoved(stream));
            }
            MediaEvent::Failure(message) => {
                warn!("Media failure: {}", message);
                self.emit(ChannelEvent::Error { message });
            }
        }
    }

    fn send_local_description(&mut self, description: &SessionDescription) {
        let Some(session) = &self.session else {
            warn!("Local {:?} produced without a session", description.sdp_type);
            return;
        };

        match description.sdp_type {
            SdpType::Offer => session.send_offer(&description.sdp),
            SdpType::Answer => session.send_answer(&description.sdp),
        }
        self.local_description_sent = true;

        for candidate in self.pending_candidates.drain(..) {
            session.send_candidate(&candidate);
        }
    }

    fn mark_disconnected(&mut self, reason: String) {
        if self.lifecycle == ConnectionState::Disconnected {
            debug!("Already disconnected, dropping reason: {}", reason);
            return;
        }
        info!("Disconnected: {}", reason);
        self.set_lifecycle(ConnectionState::Disconnected);
        self.emit(ChannelEvent::Disconnected { reason });
    }

    fn set_lifecycle(&mut self, next: ConnectionState) {
        debug!("Lifecycle {:?} -> {:?}", self.lifecycle, next);
        self.lifecycle = next;
        self.state.send_replace(next);
    }

    fn emit(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            debug!("Channel event dropped, receiver is gone");
        }
    }

    #[cfg(test)]
    pub(crate) fn streams(&self) -> &[StreamHandle] {
        &self.streams
    }

    #[cfg(test)]
    pub(crate) fn polarity(&self) -> Option<Polarity> {
        self.polarity
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
