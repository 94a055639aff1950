use hub_server::config::{GRACEFUL_SHUTDOWN_DRAIN, ServerConfig};
use hub_server::store::Store;
use hub_server::{AppState, build_router};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let config = ServerConfig::from_env();

    info!(path = %config.database_path, "opening message store");
    let store = Store::open(std::path::Path::new(&config.database_path)).expect("failed to open message store");

    let bind_addr = config.server_addr.clone();
    let state = AppState::new(config, store);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "hub listening");

    // Once the shutdown signal fires, in-flight sessions get
    // GRACEFUL_SHUTDOWN_DRAIN to finish before this process force-exits,
    // bounding how long a stuck session can hold the process open (§5).
    let (drain_started, _) = tokio::sync::broadcast::channel::<()>(1);
    let watchdog = drain_started.clone();
    tokio::spawn(async move {
        if watchdog.subscribe().recv().await.is_ok() {
            tokio::time::sleep(GRACEFUL_SHUTDOWN_DRAIN).await;
            warn!("graceful shutdown drain period exceeded, forcing exit");
            std::process::exit(1);
        }
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = drain_started.send(());
        })
        .await
        .expect("server error");
    info!("hub shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
