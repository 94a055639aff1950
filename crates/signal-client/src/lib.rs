//! Signed Client (C9): the counterpart library used by endpoints to talk to
//! the relay hub — register, authenticate via challenge/response, sign
//! outgoing frames, verify incoming ones, and reconnect with backoff (§4.9).
//!
//! Grounded on the teacher's forwarder `uplink.rs` (connect/session/backoff
//! shape) and the CYXWIZ-Lab gateway auth file (Ed25519 challenge signing).

pub mod backoff;
pub mod error;
pub mod http_client;
pub mod session;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer, SigningKey};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

pub use backoff::Backoff;
pub use error::{Result, SignalClientError};
pub use http_client::HubClient;
pub use hub_protocol::Frame;
pub use session::{SignedSession, sign_frame, verify_and_decorate};

/// Configuration for a [`SignedClient`].
pub struct SignedClientConfig {
    /// Base HTTP URL of the hub, e.g. `https://hub.example.com`.
    pub hub_http_url: String,
    /// Base WebSocket URL of the hub's upgrade endpoint, e.g.
    /// `wss://hub.example.com/ws`.
    pub hub_ws_url: String,
    pub user_id: String,
    pub username: String,
    pub signing_key: SigningKey,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl SignedClientConfig {
    pub fn new(
        hub_http_url: impl Into<String>,
        hub_ws_url: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
        signing_key: SigningKey,
    ) -> Self {
        Self {
            hub_http_url: hub_http_url.into(),
            hub_ws_url: hub_ws_url.into(),
            user_id: user_id.into(),
            username: username.into(),
            signing_key,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(60),
        }
    }
}

/// Bounded dedup set for message ids (§9 open question: live broadcast
/// fan-out writes no ledger row, so a recipient who was live at broadcast
/// time and later reconnects sees the same broadcast again during replay —
/// the hub deliberately pushes that dedup duty onto this client). Capped so
/// a long-lived connection doesn't grow this without bound.
struct SeenIds {
    set: HashSet<i64>,
    order: VecDeque<i64>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns `true` if `id` has not been seen before (and records it).
    /// `id == 0` (unassigned, e.g. a system notice) is never deduped.
    fn insert_is_new(&mut self, id: i64) -> bool {
        if id == 0 {
            return true;
        }
        if !self.set.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        true
    }
}

/// The signed client. Owns the caller's Ed25519 identity and a cached HTTP
/// client for the hub's REST surface; sessions are created and discarded as
/// connections come and go.
pub struct SignedClient {
    config: SignedClientConfig,
    hub: Arc<HubClient>,
}

/// How many message ids [`SignedClient::run_with_reconnect`] remembers to
/// filter out broadcast replays it already delivered to the caller.
const SEEN_IDS_CAPACITY: usize = 4096;

impl SignedClient {
    pub fn new(config: SignedClientConfig) -> Result<Self> {
        let hub = Arc::new(HubClient::new(&config.hub_http_url)?);
        Ok(Self { config, hub })
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    /// `POST /auth/register` with this client's public key.
    pub async fn register(&self) -> Result<()> {
        let public_key_b64 = STANDARD.encode(self.config.signing_key.verifying_key().to_bytes());
        self.hub
            .register(&self.config.user_id, &self.config.username, &public_key_b64)
            .await
    }

    /// Runs the two-step challenge login (§4.2) and returns a bearer token.
    pub async fn authenticate(&self) -> Result<String> {
        let challenge = self.hub.login(&self.config.user_id).await?;
        let signature = self.config.signing_key.sign(challenge.as_bytes());
        let signature_b64 = STANDARD.encode(signature.to_bytes());
        self.hub
            .login_verify(&self.config.user_id, &signature_b64)
            .await
    }

    pub async fn connect(&self, token: &str) -> Result<SignedSession> {
        SignedSession::connect(&self.config.hub_ws_url, token).await
    }

    /// Signs and sends a frame addressed to `to` (use [`hub_protocol::BROADCAST_RECIPIENT`]
    /// for broadcast).
    pub async fn send(&self, session: &mut SignedSession, to: &str, content: &str) -> Result<()> {
        let frame = sign_frame(&self.config.signing_key, &self.config.user_id, to, content);
        session.send(&frame).await
    }

    /// Receives the next frame and verifies/decorates it per §4.9.
    pub async fn recv_verified(&self, session: &mut SignedSession) -> Result<Frame> {
        let frame = session.recv().await?;
        Ok(verify_and_decorate(&self.hub, frame).await)
    }

    /// `POST /direct-message/{recipient}`, the HTTP side-channel (§4.8
    /// `DeliverHTTP`), for sending without an open session.
    pub async fn send_via_http(&self, token: &str, to: &str, content: &str) -> Result<()> {
        let frame = sign_frame(&self.config.signing_key, &self.config.user_id, to, content);
        self.hub.send_direct_message(token, to, &frame).await
    }

    /// Authenticates, connects, and forwards every verified incoming frame to
    /// `on_frame` until it returns `false`. Reconnects with exponential
    /// backoff (§4.9) on authentication failure, connect failure, or session
    /// loss. Returns only when `on_frame` asks to stop.
    pub async fn run_with_reconnect<F>(&self, mut on_frame: F) -> Result<()>
    where
        F: FnMut(Frame) -> bool,
    {
        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);
        let mut seen = SeenIds::new(SEEN_IDS_CAPACITY);
        loop {
            let token = match self.authenticate().await {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, "authentication failed, retrying");
                    tokio::time::sleep(backoff.next_delay()).await;
                    continue;
                }
            };

            let mut session = match self.connect(&token).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "connect failed, retrying");
                    tokio::time::sleep(backoff.next_delay()).await;
                    continue;
                }
            };
            backoff.reset();

            loop {
                match session.recv().await {
                    Ok(frame) => {
                        if !seen.insert_is_new(frame.id) {
                            continue;
                        }
                        let decorated = verify_and_decorate(&self.hub, frame).await;
                        if !on_frame(decorated) {
                            let _ = session.close().await;
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "session ended, reconnecting");
                        break;
                    }
                }
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }
}
