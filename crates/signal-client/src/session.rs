//! Session transport plus sign/verify helpers for outgoing and incoming
//! frames (§4.9). The WebSocket plumbing mirrors the teacher's
//! `UplinkSession` (split sink/stream over `tokio_tungstenite`, JSON text
//! frames); unlike the teacher's bearer-header upgrade, the hub takes its
//! token as a query parameter (`GET /ws?token=...`, §6), so the header
//! injection the teacher does in `build_ws_request` is replaced with a URL
//! rewrite here.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hub_protocol::{BROADCAST_RECIPIENT, Frame, MessageStatus, canonicalize};
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::{Result, SignalClientError};
use crate::http_client::HubClient;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// One WebSocket connection to the hub. Reconnecting produces a new
/// `SignedSession`; this type owns no retry policy of its own (see
/// [`crate::backoff::Backoff`] for that).
pub struct SignedSession {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl SignedSession {
    /// Connects to `ws_base_url` (e.g. `wss://hub.example.com/ws`), appending
    /// the bearer token as a query parameter per §6.
    pub async fn connect(ws_base_url: &str, token: &str) -> Result<Self> {
        let separator = if ws_base_url.contains('?') { '&' } else { '?' };
        let url = format!("{ws_base_url}{separator}token={token}");
        let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = stream.split();
        Ok(Self { write, read })
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receives the next frame, transparently absorbing protocol-level
    /// ping/pong control frames.
    pub async fn recv(&mut self) -> Result<Frame> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(SignalClientError::Connection(
                        "connection closed by peer".to_owned(),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}

fn now_rfc3339_and_nanos() -> (String, i64) {
    let now: DateTime<Utc> = Utc::now();
    let nanos = now.timestamp_nanos_opt().unwrap_or(0);
    (now.to_rfc3339(), nanos)
}

fn rfc3339_to_nanos(timestamp: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.timestamp_nanos_opt().unwrap_or(0))
        .map_err(|e| SignalClientError::Protocol(format!("bad timestamp {timestamp}: {e}")))
}

/// Builds and signs an outgoing frame (§4.9 "Outgoing").
///
/// Stamps the current time, canonicalizes `from|to|timestampNanos|content`,
/// and signs with the caller's Ed25519 key.
pub fn sign_frame(signing_key: &SigningKey, from: &str, to: &str, content: &str) -> Frame {
    let (timestamp, timestamp_nanos) = now_rfc3339_and_nanos();
    let canonical = canonicalize(from, to, timestamp_nanos, content);
    let signature: Signature = signing_key.sign(canonical.as_bytes());
    Frame {
        id: 0,
        from: from.to_owned(),
        to: to.to_owned(),
        timestamp,
        content: content.to_owned(),
        status: MessageStatus::Pending.to_string(),
        is_broadcast: to == BROADCAST_RECIPIENT,
        signature: Some(STANDARD.encode(signature.to_bytes())),
        is_forward_message: false,
    }
}

/// Verifies an incoming frame's signature and decorates its `status` field
/// (§4.9 "Incoming"). System frames (`from == "system"`) are accepted
/// without verification.
pub async fn verify_and_decorate(hub: &HubClient, mut frame: Frame) -> Frame {
    if frame.from == hub_protocol::SYSTEM_SENDER {
        return frame;
    }

    let Some(signature_b64) = frame.signature.clone() else {
        frame.status = MessageStatus::Unsigned.to_string();
        return frame;
    };

    let public_key_b64 = match hub.public_key_for(&frame.from).await {
        Ok(Some(key)) => key,
        _ => {
            frame.status = MessageStatus::Unverified.to_string();
            return frame;
        }
    };

    frame.status = match verify_signature(&public_key_b64, &signature_b64, &frame) {
        Ok(true) => MessageStatus::Verified.to_string(),
        _ => MessageStatus::InvalidSignature.to_string(),
    };
    frame
}

fn verify_signature(public_key_b64: &str, signature_b64: &str, frame: &Frame) -> Result<bool> {
    let key_bytes = STANDARD
        .decode(public_key_b64)
        .map_err(|e| SignalClientError::Signing(format!("bad public key encoding: {e}")))?;
    let key_array: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| SignalClientError::Signing("public key must be 32 bytes".to_owned()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_array)
        .map_err(|e| SignalClientError::Signing(format!("bad public key: {e}")))?;

    let sig_bytes = STANDARD
        .decode(signature_b64)
        .map_err(|e| SignalClientError::Signing(format!("bad signature encoding: {e}")))?;
    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| SignalClientError::Signing("signature must be 64 bytes".to_owned()))?;
    let signature = Signature::from_bytes(&sig_array);

    let timestamp_nanos = rfc3339_to_nanos(&frame.timestamp)?;
    let canonical = canonicalize(&frame.from, &frame.to, timestamp_nanos, &frame.content);
    Ok(verifying_key.verify(canonical.as_bytes(), &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_then_verify_round_trips() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let frame = sign_frame(&signing_key, "alice", "bob", "hello");

        let public_key_b64 = STANDARD.encode(verifying_key.to_bytes());
        let signature_b64 = frame.signature.clone().unwrap();
        assert!(verify_signature(&public_key_b64, &signature_b64, &frame).unwrap());
    }

    #[test]
    fn tampering_with_content_invalidates_signature() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        let mut frame = sign_frame(&signing_key, "alice", "bob", "hello");
        frame.content = "goodbye".to_owned();

        let public_key_b64 = STANDARD.encode(verifying_key.to_bytes());
        let signature_b64 = frame.signature.clone().unwrap();
        assert!(!verify_signature(&public_key_b64, &signature_b64, &frame).unwrap());
    }

    #[test]
    fn broadcast_recipient_sets_is_broadcast() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let frame = sign_frame(&signing_key, "alice", BROADCAST_RECIPIENT, "hello everyone");
        assert!(frame.is_broadcast);
    }
}
