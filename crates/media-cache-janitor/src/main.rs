//! Media Cache Janitor - keeps the local media cache within its size and age limits
//!
//! Hosts a single cache instance, runs its maintenance pass on a fixed cadence
//! with retries, and exposes cache statistics and on-demand cleanup over HTTP.

mod config;
mod error;
mod scheduler;
mod server;
mod types;

use crate::config::JanitorConfig;
use crate::error::Result;
use crate::scheduler::CleanupScheduler;
use crate::server::{start_server, ServerState, SharedState};
use media_cache::MediaCache;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("media_cache_janitor=info".parse()?)
        .add_directive("media_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Media Cache Janitor...");

    let config = JanitorConfig::from_env();
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache.cache_dir);
    info!(
        "Max cache size: {} MB",
        config.cache.max_cache_size / (1024 * 1024)
    );
    info!("Cache TTL: {} seconds", config.cache.cache_ttl_secs);
    info!(
        "Cleanup interval: {} seconds",
        config.scheduler.interval.as_secs()
    );

    let cache = Arc::new(MediaCache::new(config.cache));
    cache.initialize().await?;

    let scheduler = CleanupScheduler::new(cache.clone(), config.scheduler);
    scheduler.schedule_periodic();

    let state: SharedState = Arc::new(ServerState::new(cache.clone(), scheduler.clone()));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    // Serve until Ctrl-C
    start_server(state, config.port, shutdown).await?;

    scheduler.cancel_periodic();
    cache.shutdown().await;
    info!("Media Cache Janitor stopped");

    Ok(())
}
