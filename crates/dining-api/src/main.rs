mod allergens;
mod cache;
mod config;
mod error;
mod eta;
mod images;
mod menu;
mod merge;
mod model;
mod parser;
mod query;
mod ranking;
mod server;
mod store;

use std::sync::Arc;

use dining_common::redis::RedisCache;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use server::AppState;
use store::PgMenuStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting dining-api");

    let config = Config::from_env()?;
    if let Some(base) = &config.api_base_url {
        info!(api_base_url = %base, "public base url");
    }

    let store = Arc::new(PgMenuStore::connect_lazy(&config.database)?);
    match store.ping().await {
        Ok(()) => info!("postgres reachable"),
        Err(e) => tracing::warn!(error = %e, "postgres not reachable yet, menu endpoints will report storage errors"),
    }

    let redis = RedisCache::new(config.redis_url.as_deref());
    if redis.is_available().await {
        info!("redis connected, menu cache is shared");
    } else {
        info!("redis unavailable, menu cache is in-process only");
    }

    let state = Arc::new(AppState::from_config(&config, store.clone(), redis)?);
    let app = server::router(state, config.max_body_bytes);

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address).await?;
    info!(%address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("dining-api shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install terminate handler");
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
}
