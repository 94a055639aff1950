//! HTTP calls used by the signed client: registration, login, and public-key
//! lookups (§4.9, §6). Grounded on the reqwest usage in the teacher's receiver
//! control API (`fetch_server_streams`/`get_races`): a short-timeout client
//! built once, `bearer_auth` for authenticated calls, errors folded into a
//! single crate error type rather than propagated as `reqwest::Error`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hub_protocol::{
    CheckUserIdResponse, LoginRequest, LoginResponse, LoginVerifyRequest, RegisterRequest,
    TokenResponse, UserResponse,
};
use tokio::sync::RwLock;

use crate::error::{Result, SignalClientError};

/// 30 s ceiling on any outbound HTTP call (§5).
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin HTTP client for the hub's REST surface, with a process-local cache of
/// other users' public keys (fetched lazily, never invalidated — keys are
/// immutable after registration per §3).
pub struct HubClient {
    base_url: String,
    client: reqwest::Client,
    key_cache: Arc<RwLock<HashMap<String, String>>>,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(SignalClientError::from)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
            key_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn error_from_response(resp: reqwest::Response) -> SignalClientError {
        let status = resp.status().as_u16();
        let message = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_owned());
        SignalClientError::Http { status, message }
    }

    pub async fn register(&self, user_id: &str, username: &str, public_key_b64: &str) -> Result<()> {
        let body = RegisterRequest {
            user_id: user_id.to_owned(),
            username: username.to_owned(),
            public_key: public_key_b64.to_owned(),
        };
        let resp = self
            .client
            .post(self.url("/auth/register"))
            .json(&body)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(resp).await)
        }
    }

    /// Step 1 of login: request a challenge nonce.
    pub async fn login(&self, user_id: &str) -> Result<String> {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                user_id: user_id.to_owned(),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let body: LoginResponse = resp.json().await?;
        Ok(body.challenge)
    }

    /// Step 2 of login: present a signature over the challenge, receive a token.
    pub async fn login_verify(&self, user_id: &str, signature_b64: &str) -> Result<String> {
        let resp = self
            .client
            .post(self.url("/auth/login?verify=true"))
            .json(&LoginVerifyRequest {
                user_id: user_id.to_owned(),
                signature: signature_b64.to_owned(),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let body: TokenResponse = resp.json().await?;
        Ok(body.token)
    }

    pub async fn check_user_id(&self, user_id: &str) -> Result<bool> {
        let resp = self
            .client
            .get(self.url(&format!("/auth/check-userid/{user_id}")))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let body: CheckUserIdResponse = resp.json().await?;
        Ok(body.exists)
    }

    /// Fetch a user's public key, using the process-local cache when present.
    pub async fn public_key_for(&self, user_id: &str) -> Result<Option<String>> {
        if let Some(key) = self.key_cache.read().await.get(user_id).cloned() {
            return Ok(Some(key));
        }
        let resp = self
            .client
            .get(self.url(&format!("/auth/users/{user_id}")))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let body: UserResponse = resp.json().await?;
        self.key_cache
            .write()
            .await
            .insert(user_id.to_owned(), body.public_key.clone());
        Ok(Some(body.public_key))
    }

    /// `POST /direct-message/{recipient}`, the HTTP side-channel for sending a
    /// message without an open session (`DeliverHTTP`, §4.8).
    pub async fn send_direct_message(
        &self,
        token: &str,
        recipient: &str,
        frame: &hub_protocol::Frame,
    ) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/direct-message/{recipient}")))
            .bearer_auth(token)
            .json(frame)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(resp).await)
        }
    }
}
