mod classifier;
mod commands;
mod config;
mod dispatcher;
mod error;
mod platform;
mod poller;
mod push;
mod registry;
mod server;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::platform::telegram::{self, BotState, TelegramGateway};
use crate::poller::fetch::HttpFetcher;
use crate::poller::task::PollerTask;
use crate::poller::Poller;
use crate::push::PushHandler;
use crate::registry::Registry;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,apirelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let listen_addr = config.listen_addr()?;

    info!("Configuration loaded successfully");
    info!("  Poll interval: {:?}", config.poll_interval());
    info!("  Fetch timeout: {:?}", config.fetch_timeout());
    info!("  Listen address: {}", listen_addr);
    info!("  Push attribution: {}", config.push.attribution);
    info!("  Admin-only changes: {}", config.telegram.require_admin);

    let bot = teloxide::Bot::new(&config.telegram.bot_token);
    let registry = Registry::in_memory();
    let dispatcher = Dispatcher::new(Arc::new(TelegramGateway::new(bot.clone())));

    let fetcher = HttpFetcher::new(config.fetch_timeout())?;
    let poller = Arc::new(Poller::new(
        registry.clone(),
        Arc::new(fetcher),
        dispatcher.clone(),
    ));
    let push = Arc::new(PushHandler::new(
        registry.clone(),
        dispatcher,
        config.push.attribution,
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        });
    }

    let listener = server::bind(listen_addr).await?;
    let poller_task = PollerTask::start(poller, config.poll_interval());
    let server = tokio::spawn(server::serve(listener, push, shutdown.clone()));

    let state = Arc::new(BotState {
        registry,
        require_admin: config.telegram.require_admin,
    });
    info!("Bot is starting...");
    let bot_result = telegram::run(bot, state, shutdown.clone()).await;

    // The bot can also stop on its own; take everything else down with it
    shutdown.cancel();
    poller_task.stop().await?;
    server.await.context("Push server task panicked")??;
    bot_result?;

    Ok(())
}
