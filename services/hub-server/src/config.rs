//! Process configuration loaded from the environment (§6 "Configuration").
//! Grounded on the CYXWIZ-Lab-cyxcloud auth file's `AuthConfig::from_env`
//! (random-secret-with-warning fallback) and the teacher's `main.rs`
//! (`LOG_LEVEL`/default-and-expect env reads).

use std::time::Duration;

use rand::RngCore;

/// Process-lifetime configuration. Read once at startup and passed down
/// explicitly — never read from the environment deep in the stack (§9).
#[derive(Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub message_rate_limit: f64,
    pub message_burst_limit: u32,
    pub jwt_secret: Vec<u8>,
    pub database_path: String,
    pub log_level: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let server_addr = std::env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8443".to_owned());
        let message_rate_limit = std::env::var("MESSAGE_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5.0);
        let message_burst_limit = std::env::var("MESSAGE_BURST_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let jwt_secret = std::env::var("JWT_SECRET")
            .map(|s| s.into_bytes())
            .unwrap_or_else(|_| {
                tracing::warn!("JWT_SECRET not set; generating a random secret for this process only");
                let mut bytes = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                bytes
            });
        let database_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "hub.sqlite3".to_owned());
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        Self {
            server_addr,
            message_rate_limit,
            message_burst_limit,
            jwt_secret,
            database_path,
            log_level,
        }
    }
}

/// 24 h token lifetime (§4.2).
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);
/// §4.7
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;
pub const READ_DEADLINE: Duration = Duration::from_secs(60);
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);
pub const PING_INTERVAL: Duration = Duration::from_secs(54);
pub const EGRESS_QUEUE_CAPACITY: usize = 256;
/// §5
pub const GRACEFUL_SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);
pub const HTTP_CALL_CEILING: Duration = Duration::from_secs(30);
