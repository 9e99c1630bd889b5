use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use messenger_api::config::Config;
use messenger_api::db::memory::MemoryRepository;
use messenger_api::db::repository::{MessageRepository, PgMessageRepository};
use messenger_api::gateway::registry::ConnectionRegistry;
use messenger_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let repo: Arc<dyn MessageRepository> = match config.database_url.as_deref() {
        Some(url) => {
            let db = messenger_api::db::pool::connect(url).expect("failed to build database pool");
            Arc::new(PgMessageRepository::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, messages are kept in memory only");
            Arc::new(MemoryRepository::new())
        }
    };

    tracing::info!(
        queue_capacity = config.broadcast_queue_capacity,
        write_timeout = ?config.write_timeout,
        read_idle_timeout = ?config.read_idle_timeout,
        "messenger-api configured"
    );

    let (state, worker) = AppState::new(config, repo);
    tokio::spawn(worker.run());

    let registry = state.registry.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(messenger_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "messenger-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .expect("server error");
}

/// Resolve on Ctrl-C or SIGTERM, closing every open chat connection so the
/// server can drain.
async fn shutdown_signal(registry: Arc<ConnectionRegistry>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let closed = registry.close_all().await;
    tracing::info!(closed, "shutdown signal received, connections closed");
}
