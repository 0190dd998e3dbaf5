//! Scripted media negotiator
//!
//! Records every command and answers offer/answer creation with canned SDP
//! and one host candidate, so the full signaling flow runs without an
//! engine. Teardown reports what webrtc-rs reports: the local stream going
//! away and the peer's final ICE state.

use ayame_sdk::media::{IceServerConfig, MediaEventSender};
use ayame_sdk::signaling::IceCandidate;
use ayame_sdk::{
    IceConnectionState, MediaEvent, MediaNegotiator, MediaOptions, SessionDescription,
    StreamHandle,
};
use parking_lot::Mutex;
use std::sync::Arc;

pub const OFFER_SDP: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=scripted-offer\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 3 4 IN IP4 127.0.0.1\r\ns=scripted-answer\r\n";
pub const LOCAL_STREAM: &str = "local-scripted";

#[derive(Debug, Clone, PartialEq)]
pub enum NegotiatorCall {
    StartLocalCapture(MediaOptions),
    StopLocalCapture,
    Initialize(Vec<IceServerConfig>),
    CreateOffer,
    CreateAnswer,
    SetRemoteDescription(SessionDescription),
    AddRemoteCandidate(IceCandidate),
    Close,
}

#[derive(Default)]
struct Shared {
    calls: Vec<NegotiatorCall>,
    events: Option<MediaEventSender>,
    capturing: bool,
    peer_open: bool,
}

#[derive(Clone, Default)]
pub struct ScriptedNegotiator {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<NegotiatorCall> {
        self.shared.lock().calls.clone()
    }

    pub fn has_call(&self, predicate: impl Fn(&NegotiatorCall) -> bool) -> bool {
        self.shared.lock().calls.iter().any(predicate)
    }

    /// Inject an engine event, as if webrtc reported it
    pub fn emit(&self, event: MediaEvent) {
        if let Some(events) = &self.shared.lock().events {
            let _ = events.send(event);
        }
    }

    fn record(&self, call: NegotiatorCall) {
        self.shared.lock().calls.push(call);
    }

    fn local_candidate() -> IceCandidate {
        IceCandidate {
            candidate: "candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host".to_string(),
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
        }
    }
}

impl MediaNegotiator for ScriptedNegotiator {
    fn bind(&mut self, events: MediaEventSender) {
        self.shared.lock().events = Some(events);
    }

    fn start_local_capture(&mut self, options: &MediaOptions) {
        self.record(NegotiatorCall::StartLocalCapture(options.clone()));
        self.shared.lock().capturing = true;
        self.emit(MediaEvent::StreamAdded(StreamHandle::local(LOCAL_STREAM)));
    }

    fn stop_local_capture(&mut self) {
        self.record(NegotiatorCall::StopLocalCapture);
        let was_capturing = std::mem::take(&mut self.shared.lock().capturing);
        if was_capturing {
            self.emit(MediaEvent::StreamRemoved(StreamHandle::local(LOCAL_STREAM)));
        }
    }

    fn initialize(&mut self, ice_servers: Vec<IceServerConfig>) {
        self.record(NegotiatorCall::Initialize(ice_servers));
        self.shared.lock().peer_open = true;
    }

    fn create_offer(&mut self) {
        self.record(NegotiatorCall::CreateOffer);
        // Gathering may start before the description is handed out
        self.emit(MediaEvent::LocalCandidateDiscovered(Self::local_candidate()));
        self.emit(MediaEvent::LocalDescriptionReady(SessionDescription::offer(
            OFFER_SDP,
        )));
    }

    fn create_answer(&mut self) {
        self.record(NegotiatorCall::CreateAnswer);
        self.emit(MediaEvent::LocalDescriptionReady(SessionDescription::answer(
            ANSWER_SDP,
        )));
        self.emit(MediaEvent::LocalCandidateDiscovered(Self::local_candidate()));
    }

    fn set_remote_description(&mut self, description: SessionDescription) {
        self.record(NegotiatorCall::SetRemoteDescription(description));
    }

    fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        self.record(NegotiatorCall::AddRemoteCandidate(candidate));
    }

    fn close(&mut self) {
        self.record(NegotiatorCall::Close);
        let was_open = std::mem::take(&mut self.shared.lock().peer_open);
        if was_open {
            self.emit(MediaEvent::ConnectivityStateChanged(IceConnectionState::Closed));
        }
    }
}
