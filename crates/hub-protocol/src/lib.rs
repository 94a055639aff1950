//! Wire types for the signed-message relay hub.
//!
//! Unlike a multi-kind device protocol, the hub's WebSocket carries exactly one
//! JSON shape in both directions: [`Frame`]. System notices (rate-limit warnings,
//! errors) are ordinary frames with `from = "system"`. There is no separate
//! hello/ack handshake — the upgrade itself (`GET /ws?token=...`) is the handshake.

use serde::{Deserialize, Serialize};

/// Sentinel recipient that triggers broadcast fan-out.
pub const BROADCAST_RECIPIENT: &str = "broadcast";

/// Sender identifier used for hub-generated notices (rate limiting, errors).
pub const SYSTEM_SENDER: &str = "system";

/// The one wire frame shape, sent as a WebSocket text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Store-assigned id. Zero/absent on ingress; always set on egress.
    #[serde(default)]
    pub id: i64,
    pub from: String,
    pub to: String,
    /// RFC3339 timestamp. Re-stamped server-side if the sender sends the zero value.
    pub timestamp: String,
    pub content: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub is_broadcast: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub is_forward_message: bool,
}

fn default_status() -> String {
    MessageStatus::Pending.as_str().to_owned()
}

/// Canonical values for [`Frame::status`].
///
/// `Pending`/`Delivered`/`Error` are the store-owned statuses (§3). `Verified`,
/// `InvalidSignature`, `Unverified`, and `Unsigned` are client-side decorations
/// applied by the Signed Client after verifying an incoming frame's signature —
/// they never appear in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Delivered,
    Error,
    Verified,
    InvalidSignature,
    Unverified,
    Unsigned,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Error => "error",
            MessageStatus::Verified => "verified",
            MessageStatus::InvalidSignature => "invalid_signature",
            MessageStatus::Unverified => "unverified",
            MessageStatus::Unsigned => "unsigned",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalize a message's signed fields into the exact string covered by the
/// Ed25519 signature: `from|to|timestampNanos|content`. Any deviation breaks
/// verification, so this is the single place both the server and the client
/// must call.
pub fn canonicalize(from: &str, to: &str, timestamp_nanos: i64, content: &str) -> String {
    format!("{from}|{to}|{timestamp_nanos}|{content}")
}

/// Frozen error-code constants shared between the WS error frame and the HTTP
/// error envelope, so both surfaces report identical codes for identical
/// failures.
pub mod error_codes {
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    pub const AUTH_ERROR: &str = "AUTH_ERROR";
    pub const RATE_LIMIT_ERROR: &str = "RATE_LIMIT_ERROR";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
    pub const BACKPRESSURE_WARNING: &str = "BACKPRESSURE_WARNING";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
}

/// Frozen HTTP error envelope used by all non-2xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// HTTP request/response bodies (frozen schema definitions)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub username: String,
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub challenge: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginVerifyRequest {
    pub user_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: String,
    pub username: String,
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckUserIdResponse {
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveUsersResponse {
    pub online: Vec<String>,
    pub offline: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_matches_pipe_delimited_format() {
        assert_eq!(
            canonicalize("alice", "bob", 12345, "hi"),
            "alice|bob|12345|hi"
        );
    }

    #[test]
    fn frame_round_trips_through_json_with_default_status() {
        let json = r#"{"from":"alice","to":"bob","timestamp":"2026-01-01T00:00:00Z","content":"hi"}"#;
        let frame: Frame = serde_json::from_str(json).expect("frame should parse");
        assert_eq!(frame.status, "pending");
        assert_eq!(frame.id, 0);
        assert!(!frame.is_broadcast);
        assert!(frame.signature.is_none());
    }

    #[test]
    fn broadcast_recipient_is_the_documented_sentinel() {
        let frame = Frame {
            id: 1,
            from: "alice".to_owned(),
            to: BROADCAST_RECIPIENT.to_owned(),
            timestamp: "2026-01-01T00:00:00Z".to_owned(),
            content: "hello".to_owned(),
            status: MessageStatus::Pending.to_string(),
            is_broadcast: true,
            signature: None,
            is_forward_message: false,
        };
        assert_eq!(frame.to, "broadcast");
    }
}
