//! Error type for the signed client (§4.9, §7).

use std::fmt;

#[derive(Debug)]
pub enum SignalClientError {
    /// The hub's HTTP API returned a non-2xx response.
    Http { status: u16, message: String },
    /// The HTTP request itself failed (connect, timeout, TLS, ...).
    Transport(String),
    /// The WebSocket connection failed or was closed unexpectedly.
    Connection(String),
    /// A frame could not be serialized or deserialized.
    Protocol(String),
    /// A signature could not be produced or verified.
    Signing(String),
}

impl fmt::Display for SignalClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalClientError::Http { status, message } => {
                write!(f, "hub returned {status}: {message}")
            }
            SignalClientError::Transport(e) => write!(f, "transport error: {e}"),
            SignalClientError::Connection(e) => write!(f, "connection error: {e}"),
            SignalClientError::Protocol(e) => write!(f, "protocol error: {e}"),
            SignalClientError::Signing(e) => write!(f, "signing error: {e}"),
        }
    }
}

impl std::error::Error for SignalClientError {}

impl From<reqwest::Error> for SignalClientError {
    fn from(e: reqwest::Error) -> Self {
        SignalClientError::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SignalClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SignalClientError::Connection(e.to_string())
    }
}

impl From<serde_json::Error> for SignalClientError {
    fn from(e: serde_json::Error) -> Self {
        SignalClientError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SignalClientError>;
