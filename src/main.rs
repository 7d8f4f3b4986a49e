mod config;
mod http;
mod models;
mod notify;
mod pipeline;
mod scheduler;
mod scrapers;
mod storage;

use std::sync::Arc;

use anyhow::Context;
use reqwest::Url;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::ScoutConfig;
use http::{build_router, AppState};
use notify::{DiscordWebhook, NotificationBatcher};
use pipeline::Scraper;
use scheduler::{Scheduler, SharedScraper};
use scrapers::{ProxyPool, VintedClient};
use storage::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "vinted_scout=info".into()),
        )
        .init();

    info!("🧥 Vinted Scout");

    let config = ScoutConfig::load(None).context("failed to load configuration")?;

    let store = Arc::new(
        SqliteStore::open(&config.database.path)
            .with_context(|| format!("failed to open database {}", config.database.path.display()))?,
    );
    info!(path = %config.database.path.display(), "Database ready");

    let base_url = Url::parse(&config.marketplace.base_url)
        .with_context(|| format!("invalid marketplace base url {}", config.marketplace.base_url))?;
    let proxies = ProxyPool::from_config_and_env(&config.marketplace.proxies);
    let client = VintedClient::connect(base_url, proxies)
        .await
        .context("failed to build marketplace client")?;

    let mut scraper = Scraper::new(
        Box::new(client),
        store.clone(),
        store.clone(),
        config.scraper.lookback(),
    );

    match &config.notifications.discord_webhook_url {
        Some(url) => {
            let webhook = DiscordWebhook::new(url.clone()).context("failed to build webhook client")?;
            scraper = scraper.with_notifier(NotificationBatcher::new(
                Arc::new(webhook),
                config.notifications.max_items(),
                config.notifications.deadline(),
            ));
            info!("Discord notifications enabled");
        }
        None => warn!("No Discord webhook configured, notifications disabled"),
    }

    if config.server.api_token.is_none() {
        warn!("No API token configured, the admin API will reject every request");
    }

    let scraper: SharedScraper = Arc::new(Mutex::new(scraper));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = tokio::spawn(
        Scheduler::new(scraper.clone(), config.scraper.interval()).run(shutdown_rx),
    );

    let state = Arc::new(AppState {
        store,
        scraper,
        api_token: config.server.api_token.clone(),
    });

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Admin API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("admin API server failed")?;

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    scheduler.await.context("scheduler task failed")?;
    info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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
