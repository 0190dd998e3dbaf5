//! In-memory transport and negotiator for unit tests

use crate::config::MediaOptions;
use crate::media::{IceServerConfig, MediaEventSender, MediaNegotiator, SessionDescription};
use crate::signaling::protocol::IceCandidate;
use crate::signaling::{SignalingTransport, TransportEvent, TransportEventSender, TransportFactory};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

#[derive(Default)]
struct WireRecord {
    connected_urls: Vec<String>,
    sent: Vec<String>,
    closes: Vec<(u16, String)>,
    events: Option<TransportEventSender>,
}

/// Shared record of everything the recording transports saw
#[derive(Clone, Default)]
pub(crate) struct TransportLog(Arc<Mutex<WireRecord>>);

impl TransportLog {
    pub(crate) fn connected_urls(&self) -> Vec<String> {
        self.0.lock().connected_urls.clone()
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.0.lock().sent.clone()
    }

    pub(crate) fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub(crate) fn closes(&self) -> Vec<(u16, String)> {
        self.0.lock().closes.clone()
    }

    /// Deliver an event as if the latest connected socket produced it
    pub(crate) fn emit(&self, event: TransportEvent) {
        let sender = self.0.lock().events.clone();
        sender.unwrap().send(event).unwrap();
    }

    /// Factory whose transports all record into this log
    pub(crate) fn factory(&self) -> TransportFactory {
        let log = self.clone();
        Arc::new(move || {
            Box::new(RecordingTransport { log: log.clone() }) as Box<dyn SignalingTransport>
        })
    }
}

pub(crate) struct RecordingTransport {
    log: TransportLog,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self {
            log: TransportLog::default(),
        }
    }

    pub(crate) fn log(&self) -> TransportLog {
        self.log.clone()
    }
}

impl SignalingTransport for RecordingTransport {
    fn connect(&mut self, url: &str, events: TransportEventSender) {
        let mut record = self.log.0.lock();
        record.connected_urls.push(url.to_string());
        record.events = Some(events);
    }

    fn send(&self, text: String) {
        self.log.0.lock().sent.push(text);
    }

    fn close(&self, code: u16, reason: &str) {
        self.log.0.lock().closes.push((code, reason.to_string()));
    }
}

/// One recorded negotiator command
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NegotiatorCall {
    StartLocalCapture,
    StopLocalCapture,
    Initialize(Vec<IceServerConfig>),
    CreateOffer,
    CreateAnswer,
    SetRemoteDescription(SessionDescription),
    AddRemoteCandidate(IceCandidate),
    Close,
}

#[derive(Default)]
struct NegotiatorRecord {
    calls: Vec<NegotiatorCall>,
    events: Option<MediaEventSender>,
}

#[derive(Clone, Default)]
pub(crate) struct NegotiatorLog(Arc<Mutex<NegotiatorRecord>>);

impl NegotiatorLog {
    pub(crate) fn calls(&self) -> Vec<NegotiatorCall> {
        self.0.lock().calls.clone()
    }

    /// Sender the negotiator was bound to
    pub(crate) fn events_sender(&self) -> MediaEventSender {
        self.0.lock().events.clone().unwrap()
    }
}

/// Negotiator that only records what it was asked to do
#[derive(Default)]
pub(crate) struct RecordingNegotiator {
    log: NegotiatorLog,
}

impl RecordingNegotiator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn log(&self) -> NegotiatorLog {
        self.log.clone()
    }

    fn record(&self, call: NegotiatorCall) {
        self.log.0.lock().calls.push(call);
    }
}

impl MediaNegotiator for RecordingNegotiator {
    fn bind(&mut self, events: MediaEventSender) {
        self.log.0.lock().events = Some(events);
    }

    fn start_local_capture(&mut self, _options: &MediaOptions) {
        self.record(NegotiatorCall::StartLocalCapture);
    }

    fn stop_local_capture(&mut self) {
        self.record(NegotiatorCall::StopLocalCapture);
    }

    fn initialize(&mut self, ice_servers: Vec<IceServerConfig>) {
        self.record(NegotiatorCall::Initialize(ice_servers));
    }

    fn create_offer(&mut self) {
        self.record(NegotiatorCall::CreateOffer);
    }

    fn create_answer(&mut self) {
        self.record(NegotiatorCall::CreateAnswer);
    }

    fn set_remote_description(&mut self, description: SessionDescription) {
        self.record(NegotiatorCall::SetRemoteDescription(description));
    }

    fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        self.record(NegotiatorCall::AddRemoteCandidate(candidate));
    }

    fn close(&mut self) {
        self.record(NegotiatorCall::Close);
    }
}
