//! Ayame end-to-end test harness
//!
//! Provides:
//! - A scripted signaling server on a random local port, where each test
//!   plays the server side of the protocol by hand
//! - A scripted `MediaNegotiator` that records commands and answers
//!   `create_offer`/`create_answer` with canned SDP
//!
//! Basic usage pattern:
//!
//! 1. Start a `TestSignalingServer`
//! 2. Build a `MediaChannel` against `server.url()` with a `ScriptedNegotiator`
//! 3. Accept the client's socket with `server.next_connection()` and drive it
//! 4. Assert on channel events and recorded negotiator calls

#![allow(dead_code)]

pub mod negotiator;
pub mod test_server;

use std::time::Duration;

pub use negotiator::{NegotiatorCall, ScriptedNegotiator};
pub use test_server::{ServerConnection, TestSignalingServer};

/// Default timeout for any single harness wait
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Result type for test harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error type for test harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

/// Initialize test logging (safe to call from every test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,ayame_sdk=debug")
        .with_test_writer()
        .try_init();
}
