//! webrtc-rs backed [`MediaNegotiator`]
//!
//! Commands are queued to one worker task that owns the
//! `RTCPeerConnection`, so they are applied strictly in order even though
//! every engine call is async. Engine callbacks (candidates, ICE state,
//! remote tracks) report straight onto the bound event sender.
//!
//! There is no device capture here. `start_local_capture` creates sample
//! tracks for the enabled kinds; the application feeds them through
//! [`WebRtcNegotiator::local_tracks_handle`].

use super::{
    IceConnectionState, IceServerConfig, MediaEvent, MediaEventSender, MediaNegotiator, SdpType,
    SessionDescription, StreamHandle,
};
use crate::config::MediaOptions;
use crate::signaling::protocol::IceCandidate;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Local sample tracks created by `start_local_capture`
#[derive(Clone)]
pub struct LocalTracks {
    /// msid shared by both tracks
    pub stream_id: String,
    pub audio: Option<Arc<TrackLocalStaticSample>>,
    pub video: Option<Arc<TrackLocalStaticSample>>,
}

impl LocalTracks {
    fn create(options: &MediaOptions) -> Option<Self> {
        if !options.audio_enabled && !options.video_enabled {
            return None;
        }

        let stream_id = format!("local-{}", uuid::Uuid::new_v4());

        let audio = options.audio_enabled.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                "audio".to_string(),
                stream_id.clone(),
            ))
        });

        let video = options.video_enabled.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: options.video_codec.mime_type().to_string(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                "video".to_string(),
                stream_id.clone(),
            ))
        });

        Some(Self {
            stream_id,
            audio,
            video,
        })
    }

    fn tracks(&self) -> impl Iterator<Item = &Arc<TrackLocalStaticSample>> {
        self.audio.iter().chain(self.video.iter())
    }
}

enum Operation {
    Rebind(MediaEventSender),
    StartCapture(MediaOptions),
    StopCapture,
    Initialize(Vec<IceServerConfig>),
    CreateOffer,
    CreateAnswer,
    SetRemote(SessionDescription),
    AddCandidate(IceCandidate),
    Close,
}

/// [`MediaNegotiator`] over a webrtc-rs `RTCPeerConnection`
///
/// `bind` spawns the worker, so it must run inside a tokio runtime.
#[derive(Default)]
pub struct WebRtcNegotiator {
    operations: Option<mpsc::UnboundedSender<Operation>>,
    local_tracks: Arc<Mutex<Option<LocalTracks>>>,
    switches: Arc<TrackSwitches>,
    remote_track_sink: Option<mpsc::UnboundedSender<Arc<TrackRemote>>>,
}

impl WebRtcNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every remote track to `sink` as it arrives
    pub fn with_remote_track_sink(
        mut self,
        sink: mpsc::UnboundedSender<Arc<TrackRemote>>,
    ) -> Self {
        self.remote_track_sink = Some(sink);
        self
    }

    /// Handle to the local tracks and their mute switches
    pub fn local_tracks_handle(&self) -> LocalTracksHandle {
        LocalTracksHandle {
            tracks: Arc::clone(&self.local_tracks),
            switches: Arc::clone(&self.switches),
        }
    }

    fn submit(&self, operation: Operation) {
        match &self.operations {
            Some(tx) => {
                if tx.send(operation).is_err() {
                    warn!("Media worker is gone, dropping command");
                }
            }
            None => warn!("Negotiator not bound, dropping command"),
        }
    }
}

/// Send switches shared by every handle of one negotiator
struct TrackSwitches {
    audio: AtomicBool,
    video: AtomicBool,
}

impl Default for TrackSwitches {
    fn default() -> Self {
        Self {
            audio: AtomicBool::new(true),
            video: AtomicBool::new(true),
        }
    }
}

/// Shared view of the negotiator's local tracks
///
/// Stays valid after the negotiator moved into a channel. Disabling a kind
/// mutes it without stopping capture: samples written while disabled are
/// dropped and the track stays negotiated. Both kinds start enabled.
#[derive(Clone)]
pub struct LocalTracksHandle {
    tracks: Arc<Mutex<Option<LocalTracks>>>,
    switches: Arc<TrackSwitches>,
}

impl LocalTracksHandle {
    /// Current local tracks; `None` until capture has started
    pub fn get(&self) -> Option<LocalTracks> {
        self.tracks.lock().clone()
    }

    pub fn audio_enabled(&self) -> bool {
        self.switches.audio.load(Ordering::Relaxed)
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        debug!("Local audio {}", if enabled { "enabled" } else { "muted" });
        self.switches.audio.store(enabled, Ordering::Relaxed);
    }

    pub fn video_enabled(&self) -> bool {
        self.switches.video.load(Ordering::Relaxed)
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        debug!("Local video {}", if enabled { "enabled" } else { "paused" });
        self.switches.video.store(enabled, Ordering::Relaxed);
    }

    /// Send an encoded audio sample unless audio is disabled
    ///
    /// # Errors
    ///
    /// Returns an error if no audio track is being captured or the write fails.
    pub async fn write_audio(&self, sample: &Sample) -> Result<()> {
        let track = self
            .get()
            .and_then(|tracks| tracks.audio)
            .ok_or_else(|| Error::MediaError("No local audio track".to_string()))?;
        if !self.audio_enabled() {
            return Ok(());
        }
        track
            .write_sample(sample)
            .await
            .map_err(|e| Error::MediaError(format!("Failed to write audio sample: {}", e)))
    }

    /// Send an encoded video sample unless video is disabled
    ///
    /// # Errors
    ///
    /// Returns an error if no video track is being captured or the write fails.
    pub async fn write_video(&self, sample: &Sample) -> Result<()> {
        let track = self
            .get()
            .and_then(|tracks| tracks.video)
            .ok_or_else(|| Error::MediaError("No local video track".to_string()))?;
        if !self.video_enabled() {
            return Ok(());
        }
        track
            .write_sample(sample)
            .await
            .map_err(|e| Error::MediaError(format!("Failed to write video sample: {}", e)))
    }
}

impl MediaNegotiator for WebRtcNegotiator {
    fn bind(&mut self, events: MediaEventSender) {
        if self.operations.is_some() {
            self.submit(Operation::Rebind(events));
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            events,
            peer_connection: None,
            senders: Vec::new(),
            local_tracks: Arc::clone(&self.local_tracks),
            remote_streams: Arc::new(Mutex::new(Vec::new())),
            remote_track_sink: self.remote_track_sink.clone(),
        };
        tokio::spawn(worker.run(rx));
        self.operations = Some(tx);
    }

    fn start_local_capture(&mut self, options: &MediaOptions) {
        self.submit(Operation::StartCapture(options.clone()));
    }

    fn stop_local_capture(&mut self) {
        self.submit(Operation::StopCapture);
    }

    fn initialize(&mut self, ice_servers: Vec<IceServerConfig>) {
        self.submit(Operation::Initialize(ice_servers));
    }

    fn create_offer(&mut self) {
        self.submit(Operation::CreateOffer);
    }

    fn create_answer(&mut self) {
        self.submit(Operation::CreateAnswer);
    }

    fn set_remote_description(&mut self, description: SessionDescription) {
        self.submit(Operation::SetRemote(description));
    }

    fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        self.submit(Operation::AddCandidate(candidate));
    }

    fn close(&mut self) {
        self.submit(Operation::Close);
    }
}

/// Owns the peer connection; applies operations one at a time
struct Worker {
    events: MediaEventSender,
    peer_connection: Option<Arc<RTCPeerConnection>>,
    /// Senders for the local tracks on the current peer connection
    senders: Vec<Arc<RTCRtpSender>>,
    local_tracks: Arc<Mutex<Option<LocalTracks>>>,
    /// Remote stream ids already announced
    remote_streams: Arc<Mutex<Vec<String>>>,
    remote_track_sink: Option<mpsc::UnboundedSender<Arc<TrackRemote>>>,
}

impl Worker {
    async fn run(mut self, mut operations: mpsc::UnboundedReceiver<Operation>) {
        while let Some(operation) = operations.recv().await {
            if let Err(e) = self.apply(operation).await {
                warn!("{}", e);
                self.emit(MediaEvent::Failure(e.to_string()));
            }
        }

        if self.peer_connection.is_some() {
            let _ = self.close().await;
        }
        debug!("Media worker terminated");
    }

    async fn apply(&mut self, operation: Operation) -> Result<()> {
        match operation {
            Operation::Rebind(events) => {
                debug!("Media events rebound");
                self.events = events;
                Ok(())
            }
            Operation::StartCapture(options) => self.start_capture(&options),
            Operation::StopCapture => self.stop_capture().await,
            Operation::Initialize(servers) => self.initialize(servers).await,
            Operation::CreateOffer => self.create_local_description(SdpType::Offer).await,
            Operation::CreateAnswer => self.create_local_description(SdpType::Answer).await,
            Operation::SetRemote(description) => self.set_remote(description).await,
            Operation::AddCandidate(candidate) => self.add_candidate(candidate).await,
            Operation::Close => self.close().await,
        }
    }

    fn emit(&self, event: MediaEvent) {
        if self.events.send(event).is_err() {
            debug!("Media event dropped, channel is gone");
        }
    }

    fn start_capture(&mut self, options: &MediaOptions) -> Result<()> {
        let mut slot = self.local_tracks.lock();
        if slot.is_some() {
            debug!("Local capture already running");
            return Ok(());
        }

        match LocalTracks::create(options) {
            Some(tracks) => {
                info!(
                    "Local capture started: stream={} audio={} video={}",
                    tracks.stream_id,
                    tracks.audio.is_some(),
                    tracks.video.is_some()
                );
                let handle = StreamHandle::local(tracks.stream_id.clone());
                *slot = Some(tracks);
                drop(slot);
                self.emit(MediaEvent::StreamAdded(handle));
            }
            None => info!("Audio and video disabled, nothing to capture"),
        }
        Ok(())
    }

    async fn stop_capture(&mut self) -> Result<()> {
        let tracks = self.local_tracks.lock().take();
        let Some(tracks) = tracks else {
            return Ok(());
        };

        if let Some(pc) = &self.peer_connection {
            for sender in self.senders.drain(..) {
                if let Err(e) = pc.remove_track(&sender).await {
                    debug!("Failed to remove local track: {}", e);
                }
            }
        }

        info!("Local capture stopped: stream={}", tracks.stream_id);
        self.emit(MediaEvent::StreamRemoved(StreamHandle::local(tracks.stream_id)));
        Ok(())
    }

    async fn initialize(&mut self, servers: Vec<IceServerConfig>) -> Result<()> {
        if let Some(previous) = self.peer_connection.take() {
            warn!("Replacing existing peer connection");
            let _ = previous.close().await;
            self.senders.clear();
        }

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::MediaError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::MediaError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = servers
            .into_iter()
            .map(|server| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: server.urls,
                    username: server.username.unwrap_or_default(),
                    credential: server.credential.unwrap_or_default(),
                    ..Default::default()
                }
            })
            .collect();

        info!("Creating peer connection with {} ICE servers", ice_servers.len());

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::MediaError(format!("Failed to create peer connection: {}", e))
        })?);

        self.register_handlers(&pc);

        let local = self.local_tracks.lock().clone();
        if let Some(local) = local {
            for track in local.tracks() {
                let sender = pc
                    .add_track(Arc::clone(track) as Arc<dyn TrackLocal + Send + Sync>)
                    .await
                    .map_err(|e| Error::MediaError(format!("Failed to add local track: {}", e)))?;
                self.senders.push(sender);
            }
            debug!("Attached {} local tracks", self.senders.len());
        }

        self.peer_connection = Some(pc);
        Ok(())
    }

    fn register_handlers(&self, pc: &Arc<RTCPeerConnection>) {
        let events = self.events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = events.clone();
            Box::pin(async move {
                // None marks the end of gathering
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let ice = IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid.unwrap_or_default(),
                            sdp_mline_index: init.sdp_mline_index.unwrap_or(0),
                        };
                        let _ = events.send(MediaEvent::LocalCandidateDiscovered(ice));
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                }
            })
        }));

        let events = self.events.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let events = events.clone();
            Box::pin(async move {
                debug!("ICE connection state: {}", state);
                if let Some(state) = map_ice_state(state) {
                    let _ = events.send(MediaEvent::ConnectivityStateChanged(state));
                }
            })
        }));

        let events = self.events.clone();
        let remote_streams = Arc::clone(&self.remote_streams);
        let sink = self.remote_track_sink.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = events.clone();
            let remote_streams = Arc::clone(&remote_streams);
            let sink = sink.clone();
            Box::pin(async move {
                let stream_id = track.stream_id();
                info!(
                    "Remote track added: kind={} stream={}",
                    track.kind(),
                    stream_id
                );

                let is_new = {
                    let mut known = remote_streams.lock();
                    if known.contains(&stream_id) {
                        false
                    } else {
                        known.push(stream_id.clone());
                        true
                    }
                };
                if is_new {
                    let _ = events.send(MediaEvent::StreamAdded(StreamHandle::remote(stream_id)));
                }

                if let Some(sink) = sink {
                    let _ = sink.send(track);
                }
            })
        }));
    }

    fn peer(&self) -> Result<Arc<RTCPeerConnection>> {
        self.peer_connection
            .clone()
            .ok_or_else(|| Error::MediaError("Peer connection not initialized".to_string()))
    }

    async fn create_local_description(&mut self, sdp_type: SdpType) -> Result<()> {
        let pc = self.peer()?;

        let description = match sdp_type {
            SdpType::Offer => pc.create_offer(None).await,
            SdpType::Answer => pc.create_answer(None).await,
        }
        .map_err(|e| Error::MediaError(format!("Failed to create {:?}: {}", sdp_type, e)))?;

        pc.set_local_description(description)
            .await
            .map_err(|e| Error::MediaError(format!("Failed to set local description: {}", e)))?;

        let local = pc.local_description().await.ok_or_else(|| {
            Error::MediaError("No local description after setting it".to_string())
        })?;

        debug!("Created local {:?}", sdp_type);
        self.emit(MediaEvent::LocalDescriptionReady(SessionDescription {
            sdp_type,
            sdp: local.sdp,
        }));
        Ok(())
    }

    async fn set_remote(&mut self, description: SessionDescription) -> Result<()> {
        let pc = self.peer()?;

        let remote = match description.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(description.sdp),
            SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(|e| Error::MediaError(format!("Failed to parse remote description: {}", e)))?;

        pc.set_remote_description(remote)
            .await
            .map_err(|e| Error::MediaError(format!("Failed to set remote description: {}", e)))?;

        debug!("Applied remote {:?}", description.sdp_type);
        Ok(())
    }

    async fn add_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        let pc = self.peer()?;

        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            ..Default::default()
        };

        pc.add_ice_candidate(init)
            .await
            .map_err(|e| Error::MediaError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(pc) = self.peer_connection.take() else {
            return Ok(());
        };

        info!("Closing peer connection");
        self.senders.clear();

        let remote: Vec<String> = std::mem::take(&mut *self.remote_streams.lock());
        for stream_id in remote {
            self.emit(MediaEvent::StreamRemoved(StreamHandle::remote(stream_id)));
        }

        pc.close()
            .await
            .map_err(|e| Error::MediaError(format!("Failed to close peer connection: {}", e)))
    }
}

fn map_ice_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        _ => None,
    }
}
