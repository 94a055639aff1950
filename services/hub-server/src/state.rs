//! Process-wide shared state, grounded on `services/server/src/state.rs`'s
//! shape: one struct of `Arc`-wrapped components, cloned cheaply into every
//! handler via axum's `State` extractor.

use std::sync::Arc;

use crate::auth::ChallengeStore;
use crate::config::ServerConfig;
use crate::delivery::DeliveryEngine;
use crate::rate_limit::RateLimiter;
use crate::registry::Registry;
use crate::response_channel::ResponseChannels;
use crate::session::SessionDeps;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<Store>,
    pub registry: Arc<Registry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub delivery: Arc<DeliveryEngine>,
    pub challenges: Arc<ChallengeStore>,
    pub response_channels: Arc<ResponseChannels>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Store) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(store);
        let registry = Arc::new(Registry::new());
        let rate_limiter = Arc::new(RateLimiter::new(config.message_rate_limit, config.message_burst_limit));
        let delivery = Arc::new(DeliveryEngine::new(store.clone(), registry.clone()));
        let challenges = Arc::new(ChallengeStore::new());
        let response_channels = Arc::new(ResponseChannels::new());

        Self {
            config,
            store,
            registry,
            rate_limiter,
            delivery,
            challenges,
            response_channels,
        }
    }

    pub fn session_deps(&self) -> Arc<SessionDeps> {
        Arc::new(SessionDeps {
            store: self.store.clone(),
            registry: self.registry.clone(),
            rate_limiter: self.rate_limiter.clone(),
            delivery: self.delivery.clone(),
            response_channels: self.response_channels.clone(),
        })
    }
}
