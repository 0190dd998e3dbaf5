//! Scripted Ayame signaling server

use super::{HarnessError, HarnessResult, STEP_TIMEOUT};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, warn};

/// Accepts WebSocket clients and hands each one to the test
pub struct TestSignalingServer {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
    accept_task: JoinHandle<()>,
}

impl TestSignalingServer {
    /// Bind to a random local port and start accepting
    pub async fn start() -> HarnessResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| HarnessError::ServerError(format!("Failed to bind: {}", e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| HarnessError::ServerError(e.to_string()))?;

        let (tx, connections) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        info!("Test server accepted {}", peer);
                        if tx.send(ServerConnection { ws }).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Test server handshake with {} failed: {}", peer, e),
                }
            }
        });

        info!("Test signaling server listening on {}", addr);
        Ok(Self {
            addr,
            connections,
            accept_task,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}/signaling", self.addr)
    }

    /// Wait for the next client socket
    pub async fn next_connection(&mut self) -> HarnessResult<ServerConnection> {
        tokio::time::timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .map_err(|_| HarnessError::Timeout("no client connected".to_string()))?
            .ok_or_else(|| HarnessError::ServerError("accept loop stopped".to_string()))
    }

    pub fn shutdown(self) {
        self.accept_task.abort();
    }
}

/// Server side of one client socket
pub struct ServerConnection {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConnection {
    /// Next JSON text frame from the client
    pub async fn recv_json(&mut self) -> HarnessResult<Value> {
        let next = async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Test server received: {}", text);
                        return serde_json::from_str(&text)
                            .map_err(|e| HarnessError::ProtocolError(e.to_string()));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(HarnessError::ConnectionError(
                            "client closed the socket".to_string(),
                        ))
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(HarnessError::ConnectionError(e.to_string())),
                }
            }
        };
        tokio::time::timeout(STEP_TIMEOUT, next)
            .await
            .map_err(|_| HarnessError::Timeout("no message from client".to_string()))?
    }

    /// Next message, which must carry the given `type`
    pub async fn expect(&mut self, kind: &str) -> HarnessResult<Value> {
        let message = self.recv_json().await?;
        if message["type"] != kind {
            return Err(HarnessError::ProtocolError(format!(
                "expected {}, got {}",
                kind, message
            )));
        }
        Ok(message)
    }

    pub async fn send_json(&mut self, value: Value) -> HarnessResult<()> {
        self.ws
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| HarnessError::ConnectionError(e.to_string()))
    }

    /// Close with a close frame
    pub async fn close(&mut self, reason: &str) -> HarnessResult<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        };
        self.ws
            .close(Some(frame))
            .await
            .map_err(|e| HarnessError::ConnectionError(e.to_string()))
    }

    /// Drop the TCP connection without a closing handshake
    pub fn abort(self) {
        drop(self.ws);
    }

    /// Collect text frames until the client closes the socket
    pub async fn until_closed(&mut self) -> HarnessResult<Vec<Value>> {
        let collect = async {
            let mut messages = Vec::new();
            while let Some(frame) = self.ws.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let value = serde_json::from_str(&text)
                            .map_err(|e| HarnessError::ProtocolError(e.to_string()))?;
                        messages.push(value);
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            Ok::<_, HarnessError>(messages)
        };
        tokio::time::timeout(STEP_TIMEOUT, collect)
            .await
            .map_err(|_| HarnessError::Timeout("client never closed".to_string()))?
    }
}
