//! `/active-users` and the `/direct-message/{recipient}` HTTP side-channel
//! (§4.8's `DeliverHTTP`, §6).

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use hub_protocol::ActiveUsersResponse;
use serde::Deserialize;

use crate::config::HTTP_CALL_CEILING;
use crate::error::{bad_request, internal_error};
use crate::http::auth::extract_bearer_user;
use crate::state::AppState;
use crate::store::NewMessage;

pub async fn active_users(State(state): State<AppState>) -> impl IntoResponse {
    let online: Vec<String> = state.registry.snapshot();
    let all = match state.store.list_all_user_ids() {
        Ok(ids) => ids,
        Err(e) => return internal_error(&e.to_string()),
    };
    let offline = all.into_iter().filter(|id| !online.contains(id)).collect();
    Json(ActiveUsersResponse { online, offline }).into_response()
}

#[derive(Debug, Deserialize)]
pub struct DirectMessageRequest {
    pub content: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct DirectMessageQuery {
    #[serde(default)]
    pub await_response: bool,
}

pub async fn direct_message(
    State(state): State<AppState>,
    Path(recipient): Path<String>,
    Query(query): Query<DirectMessageQuery>,
    headers: HeaderMap,
    Json(body): Json<DirectMessageRequest>,
) -> impl IntoResponse {
    let authorization = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let sender = match extract_bearer_user(&state, authorization) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    if !state.store.user_exists(&recipient).unwrap_or(false) {
        return bad_request("unknown recipient");
    }

    // Registered before the insert so a reply arriving the instant the
    // recipient's reader loop processes the forward can never race ahead of
    // this wait (§4.7 step 4, §5 shared resource (c)).
    let wait = query.await_response.then(|| state.response_channels.register(&recipient));

    let insert = state.store.insert_message(NewMessage {
        from_user: sender,
        to_user: recipient.clone(),
        timestamp: body.timestamp,
        content: body.content,
        is_broadcast: false,
        signature: body.signature,
        is_forward_message: true,
    });

    let id = match insert {
        Ok(id) => id,
        Err(e) => {
            if wait.is_some() {
                state.response_channels.cancel(&recipient);
            }
            return internal_error(&e.to_string());
        }
    };

    let row = match state.store.get_message(id) {
        Ok(Some(row)) => row,
        Ok(None) => {
            if wait.is_some() {
                state.response_channels.cancel(&recipient);
            }
            return internal_error("message vanished after insert");
        }
        Err(e) => {
            if wait.is_some() {
                state.response_channels.cancel(&recipient);
            }
            return internal_error(&e.to_string());
        }
    };
    state.delivery.deliver_http(&row);

    let Some(wait) = wait else {
        return StatusCode::ACCEPTED.into_response();
    };

    match tokio::time::timeout(HTTP_CALL_CEILING, wait).await {
        Ok(Ok(reply)) => Json(reply).into_response(),
        Ok(Err(_)) | Err(_) => {
            state.response_channels.cancel(&recipient);
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
    }
}
