use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use mfs_backend::auth::TokenService;
use mfs_backend::config::Config;
use mfs_backend::store::MongoStore;
use mfs_backend::{db, routes, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let (client, database) = db::connect(&config)
        .await
        .context("MongoDB connection failed")?;
    tracing::info!(db = %config.mongodb_db, "connected to MongoDB");

    let store = Arc::new(MongoStore::new(client, &database));
    store
        .ensure_indexes()
        .await
        .context("index creation failed")?;

    let state = AppState::new(store, TokenService::new(&config.jwt_secret));
    state
        .ledger
        .ensure_fee_account()
        .await
        .context("fee vault provisioning failed")?;

    let app = routes::app(state);
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "mfs backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler failed");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::warn!(error = %err, "sigterm handler failed"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
