//! WebSocket transport for the signaling session
//!
//! The session never awaits the socket. It hands the transport an event
//! sender on `connect` and from then on only fires `send`/`close` commands;
//! everything the socket does comes back as [`TransportEvent`]s on that
//! sender, in order, from a single background task.

use crate::Error;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Close code sent on a normal, locally initiated shutdown
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the stream ends without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// How long to wait for the server to acknowledge a locally sent close frame
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Something the socket did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and `send` will reach the server
    Open,
    /// A text frame arrived
    Message(String),
    /// The server closed (or the stream ended); terminal
    Closing { code: u16, reason: String },
    /// The connection could not be established or broke; terminal
    Failure(String),
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Builds a fresh transport for every connection attempt
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn SignalingTransport> + Send + Sync>;

/// Fire-and-forget text transport used by [`SignalingSession`](super::SignalingSession)
///
/// Implementations report asynchronously through the sender given to
/// `connect`. At most one terminal event (`Closing` or `Failure`) is
/// reported per connection, and none after a locally requested `close`.
pub trait SignalingTransport: Send {
    /// Start connecting to `url`; progress is reported on `events`
    fn connect(&mut self, url: &str, events: TransportEventSender);

    /// Queue a text frame; dropped with a warning if the connection is gone
    fn send(&self, text: String);

    /// Start a graceful close; a no-op when already closed
    fn close(&self, code: u16, reason: &str);
}

/// Build a factory producing [`WebSocketTransport`]s
pub fn websocket_factory() -> TransportFactory {
    Arc::new(|| Box::new(WebSocketTransport::new()) as Box<dyn SignalingTransport>)
}

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// tokio-tungstenite backed [`SignalingTransport`]
///
/// Must be connected from inside a tokio runtime. Dropping the transport
/// closes the socket gracefully.
#[derive(Default)]
pub struct WebSocketTransport {
    /// Outgoing command sender, present once `connect` was called
    tx: Option<mpsc::UnboundedSender<Outbound>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection task: owns the socket for its whole life
    async fn connection_task(
        url: String,
        mut rx: mpsc::UnboundedReceiver<Outbound>,
        events: TransportEventSender,
    ) {
        info!("Connecting to signaling server: {}", url);

        let ws_stream: WsStream = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                error!("Failed to connect to {}: {}", url, e);
                report_failure(&events, format!("Failed to connect: {}", e));
                return;
            }
        };

        info!("Connected to signaling server");
        let _ = events.send(TransportEvent::Open);

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                outbound = rx.recv() => match outbound {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            error!("Failed to send WebSocket message: {}", e);
                            report_failure(&events, format!("Send failed: {}", e));
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        debug!("Closing WebSocket: code={} reason={}", code, reason);
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        if write.send(Message::Close(Some(frame))).await.is_ok() {
                            Self::await_close_ack(&mut read).await;
                        }
                        break;
                    }
                    None => {
                        debug!("Transport handle dropped, closing WebSocket");
                        let _ = write.close().await;
                        break;
                    }
                },
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(TransportEvent::Message(text));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                            None => (NORMAL_CLOSURE, String::new()),
                        };
                        info!("WebSocket closed by server: code={} reason={}", code, reason);
                        let _ = events.send(TransportEvent::Closing { code, reason });
                        let _ = write.close().await;
                        break;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!("Ignoring {} byte binary frame", data.len());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        report_failure(&events, e.to_string());
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended without a close frame");
                        let _ = events.send(TransportEvent::Closing {
                            code: ABNORMAL_CLOSURE,
                            reason: "connection lost".to_string(),
                        });
                        break;
                    }
                },
            }
        }

        debug!("Connection task terminated");
    }

    /// Drain the read half until the server echoes our close frame
    async fn await_close_ack(read: &mut futures::stream::SplitStream<WsStream>) {
        let drain = async {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, drain).await.is_err() {
            debug!("Server did not acknowledge close within {:?}", CLOSE_HANDSHAKE_TIMEOUT);
        }
    }
}

impl SignalingTransport for WebSocketTransport {
    fn connect(&mut self, url: &str, events: TransportEventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);
        tokio::spawn(Self::connection_task(url.to_string(), rx, events));
    }

    fn send(&self, text: String) {
        match &self.tx {
            Some(tx) => {
                if tx.send(Outbound::Text(text)).is_err() {
                    warn!("Dropping outbound message, WebSocket is closed");
                }
            }
            None => warn!("Dropping outbound message, WebSocket was never connected"),
        }
    }

    fn close(&self, code: u16, reason: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Outbound::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }
}

fn report_failure(events: &TransportEventSender, cause: String) {
    let error = Error::WebSocketError(cause);
    let _ = events.send(TransportEvent::Failure(error.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_connect_is_dropped() {
        let transport = WebSocketTransport::new();
        transport.send("{}".to_string());
        transport.close(NORMAL_CLOSURE, "");
        assert!(transport.tx.is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_reported_once() {
        // Bind then drop a listener so the port is very likely refusing
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WebSocketTransport::new();
        transport.connect(&format!("ws://{}/signaling", addr), tx);

        let event = rx.recv().await.unwrap();
        match event {
            TransportEvent::Failure(cause) => {
                assert!(cause.starts_with("WebSocket error: Failed to connect"), "{}", cause)
            }
            other => panic!("unexpected event {:?}", other),
        }
        // Task ended and dropped its sender
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_factory_builds_independent_transports() {
        let factory = websocket_factory();
        let first = factory();
        let second = factory();
        first.send("a".to_string());
        second.close(NORMAL_CLOSURE, "bye");
    }
}
