//! `/auth/*` handlers (§6). Grounded on `services/server/src/http/admin.rs`'s
//! `State(state)` + `match ... .into_response()` handler shape.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hub_protocol::{
    CheckUserIdResponse, LoginRequest, LoginResponse, LoginVerifyRequest, RegisterRequest, TokenResponse, UserResponse,
};
use serde::Deserialize;

use crate::auth;
use crate::error::{bad_request, conflict, internal_error, json_error, not_found, unauthorized};
use crate::state::AppState;
use crate::store::RegisterOutcome;

pub async fn register(State(state): State<AppState>, Json(body): Json<RegisterRequest>) -> impl IntoResponse {
    if STANDARD.decode(&body.public_key).is_err() {
        return bad_request("public_key must be valid base64");
    }
    match state.store.register_user(&body.user_id, &body.username, &body.public_key) {
        Ok(RegisterOutcome::Created) => StatusCode::CREATED.into_response(),
        Ok(RegisterOutcome::AlreadyExists) => conflict("user_id already registered"),
        Err(e) => internal_error(&e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub verify: bool,
}

/// Handles both `POST /auth/login` and `POST /auth/login?verify=true`: the
/// query flag picks the step, but the route and body shape are distinct
/// enough that the two bodies are parsed independently below.
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
    body: axum::body::Bytes,
) -> axum::response::Response {
    if query.verify {
        let request: LoginVerifyRequest = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(_) => return bad_request("invalid request body"),
        };
        return login_verify(state, request).await;
    }

    let request: LoginRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return bad_request("invalid request body"),
    };
    let nonce = state.challenges.issue(&request.user_id);
    Json(LoginResponse {
        challenge: STANDARD.encode(nonce),
    })
    .into_response()
}

async fn login_verify(state: AppState, request: LoginVerifyRequest) -> axum::response::Response {
    let nonce = match state.challenges.consume(&request.user_id) {
        Some(nonce) => nonce,
        None => return unauthorized(),
    };

    let user = match state.store.lookup_user(&request.user_id) {
        Ok(Some(user)) => user,
        Ok(None) => return unauthorized(),
        Err(e) => return internal_error(&e.to_string()),
    };

    if !auth::verify_ed25519(&user.public_key, &nonce, &request.signature) {
        return unauthorized();
    }

    match auth::mint_token(&state.config.jwt_secret, &request.user_id) {
        Ok(token) => Json(TokenResponse { token }).into_response(),
        Err(_) => internal_error("failed to mint token"),
    }
}

pub async fn get_user(State(state): State<AppState>, Path(user_id): Path<String>) -> impl IntoResponse {
    match state.store.lookup_user(&user_id) {
        Ok(Some(row)) => Json(UserResponse {
            user_id: row.user_id,
            username: row.username,
            public_key: row.public_key,
        })
        .into_response(),
        Ok(None) => not_found("unknown user"),
        Err(e) => internal_error(&e.to_string()),
    }
}

pub async fn check_user_id(State(state): State<AppState>, Path(user_id): Path<String>) -> impl IntoResponse {
    match state.store.user_exists(&user_id) {
        Ok(exists) => Json(CheckUserIdResponse { exists }).into_response(),
        Err(e) => internal_error(&e.to_string()),
    }
}

pub fn extract_bearer_user(state: &AppState, authorization: Option<&str>) -> Result<String, axum::response::Response> {
    let header = authorization.ok_or_else(unauthorized)?;
    let token = auth::extract_bearer(header).ok_or_else(unauthorized)?;
    let claims = auth::verify_token(&state.config.jwt_secret, token).map_err(|_| unauthorized())?;
    match state.store.user_exists(&claims.user_id) {
        Ok(true) => Ok(claims.user_id),
        Ok(false) => Err(unauthorized()),
        Err(e) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            hub_protocol::error_codes::STORAGE_ERROR,
            &e.to_string(),
        )),
    }
}
