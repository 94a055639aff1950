//! `GET /ws?token=<bearer>` upgrade handler (§6: "the upgrade itself is the
//! handshake"). Grounded on `services/server/src/ws_forwarder.rs`'s
//! `ws_forwarder_handler`, adapted from header-based to query-string token
//! extraction since there is no separate post-upgrade hello message here.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::auth;
use crate::error::unauthorized;
use crate::session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> axum::response::Response {
    let claims = match auth::verify_token(&state.config.jwt_secret, &query.token) {
        Ok(claims) => claims,
        Err(_) => return unauthorized(),
    };
    match state.store.user_exists(&claims.user_id) {
        Ok(true) => {}
        Ok(false) => return unauthorized(),
        Err(_) => return unauthorized(),
    }

    let user_id = claims.user_id;
    let deps = state.session_deps();
    ws.on_upgrade(move |socket| async move {
        session::run(socket, deps, user_id).await;
    })
    .into_response()
}
