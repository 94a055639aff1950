//! Challenge Authenticator (C2) and Token Verifier (C3). Grounded on the
//! CYXWIZ-Lab-cyxcloud gateway auth file for the JWT encode/decode shape
//! (HMAC secret, pinned algorithm, `exp` claim) and Ed25519 verification; the
//! hub's own `extract_bearer` helper is kept verbatim from
//! `services/server/src/auth.rs`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::TOKEN_LIFETIME;

pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

/// Bearer token claims (§4.2): `{user_id, exp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: String,
    pub exp: usize,
}

/// Result of token verification (§4.3): all failure modes collapse to
/// `Unauthorized` by design — callers never see *why* verification failed.
#[derive(Debug)]
pub enum TokenVerifyError {
    Unauthorized,
}

/// Issues and consumes single-use login challenges, in process memory only
/// (§3 Challenge). Keyed by claimed user id regardless of whether that id is
/// registered — step 1 never checks existence, to avoid an account
/// enumeration timing channel (§4.2).
#[derive(Default)]
pub struct ChallengeStore {
    challenges: RwLock<HashMap<String, Vec<u8>>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh 256-bit nonce for `user_id`, overwriting any prior one.
    pub fn issue(&self, user_id: &str) -> Vec<u8> {
        let mut nonce = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.challenges
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(user_id.to_owned(), nonce.clone());
        nonce
    }

    /// Removes and returns the pending nonce for `user_id`, if any. Called
    /// exactly once per verification attempt — success or failure — so a
    /// failed attempt cannot be retried against the same nonce (§4.2).
    pub fn consume(&self, user_id: &str) -> Option<Vec<u8>> {
        self.challenges
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(user_id)
    }
}

/// Mints a bearer token for `user_id`, expiring `TOKEN_LIFETIME` from now.
pub fn mint_token(jwt_secret: &[u8], user_id: &str) -> Result<String, TokenVerifyError> {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as usize
        + TOKEN_LIFETIME.as_secs() as usize;
    let claims = TokenClaims {
        user_id: user_id.to_owned(),
        exp,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret),
    )
    .map_err(|_| TokenVerifyError::Unauthorized)
}

/// Verifies a bearer token (§4.3): parseable, HMAC-SHA256, not expired,
/// `user_id` non-empty. Does not itself check C1 membership — callers that
/// need "and the user still exists" should follow up with a store lookup.
pub fn verify_token(jwt_secret: &[u8], token: &str) -> Result<TokenClaims, TokenVerifyError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.required_spec_claims = ["exp"].into_iter().map(str::to_owned).collect();

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(jwt_secret), &validation)
        .map_err(|_| TokenVerifyError::Unauthorized)?;

    if data.claims.user_id.is_empty() {
        return Err(TokenVerifyError::Unauthorized);
    }
    Ok(data.claims)
}

/// Verifies an Ed25519 signature over `message` using a base64-encoded
/// public key, as used both for challenge verification (§4.2) and incoming
/// message verification (§4.9, done client-side in `signal-client`).
pub fn verify_ed25519(public_key_b64: &str, message: &[u8], signature_b64: &str) -> bool {
    let Ok(key_bytes) = STANDARD.decode(public_key_b64) else {
        return false;
    };
    let Ok(key_array) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    let Ok(sig_bytes) = STANDARD.decode(signature_b64) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_array);
    verifying_key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(extract_bearer("Basic xyz"), None);
    }

    #[test]
    fn mint_then_verify_token_round_trips() {
        let secret = b"test-secret-at-least-this-long";
        let token = mint_token(secret, "alice").unwrap();
        let claims = verify_token(secret, &token).unwrap();
        assert_eq!(claims.user_id, "alice");
    }

    #[test]
    fn verify_token_rejects_wrong_secret() {
        let token = mint_token(b"secret-a-long-enough-value", "alice").unwrap();
        assert!(matches!(
            verify_token(b"secret-b-long-enough-value", &token),
            Err(TokenVerifyError::Unauthorized)
        ));
    }

    #[test]
    fn verify_token_rejects_none_algorithm_tokens() {
        // A token forged with `alg: none` and no signature segment must never
        // verify, even against the correct secret — `jsonwebtoken::Algorithm`
        // has no `None` variant to encode one through the normal API, so the
        // forgery is built by hand the way an attacker would.
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"user_id":"alice","exp":99999999999}"#);
        let forged = format!("{header}.{payload}.");

        let secret = b"test-secret-at-least-this-long";
        assert!(matches!(
            verify_token(secret, &forged),
            Err(TokenVerifyError::Unauthorized)
        ));
    }

    #[test]
    fn challenge_is_single_use() {
        let store = ChallengeStore::new();
        let nonce = store.issue("alice");
        assert_eq!(store.consume("alice"), Some(nonce));
        assert_eq!(store.consume("alice"), None);
    }

    #[test]
    fn reissue_overwrites_prior_challenge() {
        let store = ChallengeStore::new();
        let first = store.issue("alice");
        let second = store.issue("alice");
        assert_ne!(first, second);
        assert_eq!(store.consume("alice"), Some(second));
    }

    #[test]
    fn verify_ed25519_detects_tampering() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key_b64 = STANDARD.encode(signing_key.verifying_key().to_bytes());
        let message = b"challenge-nonce-bytes";
        let signature = signing_key.sign(message);
        let signature_b64 = STANDARD.encode(signature.to_bytes());

        assert!(verify_ed25519(&public_key_b64, message, &signature_b64));
        assert!(!verify_ed25519(&public_key_b64, b"different message", &signature_b64));
    }
}
