pub mod auth;
pub mod config;
pub mod delivery;
pub mod error;
pub mod http;
pub mod rate_limit;
pub mod registry;
pub mod response_channel;
pub mod session;
pub mod state;
pub mod store;
pub mod ws;

pub use state::AppState;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::upgrade))
        .route("/healthz", get(http::healthz))
        .route("/readyz", get(http::healthz))
        .route("/auth/register", post(http::auth::register))
        .route("/auth/login", post(http::auth::login))
        .route("/auth/users/{user_id}", get(http::auth::get_user))
        .route("/auth/check-userid/{user_id}", get(http::auth::check_user_id))
        .route("/active-users", get(http::messages::active_users))
        .route("/direct-message/{recipient}", post(http::messages::direct_message))
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}
