//! Stellarium bot server
//!
//! Follows Stellar ledger activity and notifies Telegram chats about the
//! accounts they track.

mod bot;
mod commands;
mod config;
mod horizon_source;
mod server;
mod shutdown;
mod state;
mod telegram_sender;

use bot::CommandListener;
use clap::Parser;
use commands::CommandHandler;
use config::{ConfigLoader, Overrides};
use horizon_source::HorizonSource;
use server::{build_router, run_server};
use state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use stellarium_core::checkpoint::CheckpointStore;
use stellarium_core::events::{StreamKind, notification_channel};
use stellarium_core::framework::DatabaseProcessor;
use stellarium_core::processors::{
    BulkAggregator, CheckpointSaver, Delivery, EventTranslator, LedgerSource, OutboundSender,
    StreamConsumer,
};
use stellarium_core::registry::SubscriberRegistry;
use stellarium_sdk::client::{HorizonClient, TelegramClient};
use telegram_sender::TelegramSender;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Stellarium - Stellar account notifications for Telegram
#[derive(Parser, Debug)]
#[command(name = "stellarium")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./stellarium.toml")]
    config: PathBuf,

    /// Override the SQLite database path
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Telegram bot token (takes precedence over the token file)
    #[arg(long, env = "STELLARIUM_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let started_at = Instant::now();

    tracing::info!("Starting stellarium v{}", env!("CARGO_PKG_VERSION"));

    let loader = ConfigLoader::new(
        &args.config,
        Overrides {
            database: args.database,
            token: args.token,
        },
    );
    let config = loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!(config = ?config, "Configuration loaded");
    let pipeline = config.pipeline.clone();

    tracing::info!(path = ?config.database_path, "Opening database");
    let db = DatabaseProcessor::open(&config.database_path)
        .await
        .map_err(|e| {
            tracing::error!("Failed to open database: {}", e);
            e
        })?;

    let registry = SubscriberRegistry::load(db.clone()).await?;
    let checkpoints = CheckpointStore::load(db.clone(), pipeline.checkpoint_freshness).await?;

    let telegram = TelegramClient::new(&config.token)?;
    let me = telegram.get_me().await.map_err(|e| {
        tracing::error!("Failed to reach the Telegram Bot API: {}", e);
        e
    })?;
    tracing::info!(
        username = me.username.as_deref().unwrap_or_default(),
        "Telegram bot account"
    );
    let horizon = HorizonClient::new(config.horizon_url.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sender: Arc<dyn OutboundSender> = Arc::new(TelegramSender::new(telegram.clone()));
    let delivery = Delivery::new(sender, registry.clone(), &pipeline);
    let (notification_tx, notification_rx) = notification_channel(pipeline.queue_capacity);

    let mut tasks = Vec::new();

    let aggregator = BulkAggregator::new(
        notification_rx,
        delivery.clone(),
        shutdown_rx.clone(),
        &pipeline,
    );
    tasks.push(tokio::spawn(aggregator.run()));

    let saver = CheckpointSaver::new(
        checkpoints.clone(),
        pipeline.checkpoint_interval,
        shutdown_rx.clone(),
    );
    tasks.push(tokio::spawn(saver.run()));

    let source: Arc<dyn LedgerSource> = Arc::new(HorizonSource::new(horizon.clone()));
    let translator = EventTranslator::new(
        registry.clone(),
        checkpoints.clone(),
        notification_tx,
        &pipeline,
    );
    for kind in StreamKind::ALL {
        let consumer = StreamConsumer::new(
            kind,
            source.clone(),
            translator.clone(),
            checkpoints.clone(),
            shutdown_rx.clone(),
            &pipeline,
        );
        tasks.push(tokio::spawn(consumer.run()));
    }
    drop(translator);

    let handler = Arc::new(CommandHandler::new(
        registry.clone(),
        Arc::new(horizon),
        started_at,
    ));
    let listener = CommandListener::new(Arc::new(telegram), handler, delivery, shutdown_rx.clone());
    tasks.push(tokio::spawn(listener.run()));

    if let Some(listen) = config.listen {
        let router = build_router(AppState::new(registry.clone(), started_at));
        let shutdown_rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = run_server(router, listen, shutdown_rx).await {
                tracing::error!("Diagnostics endpoint failed: {}", e);
            }
        }));
    }

    shutdown::wait_for_shutdown().await;
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!("Task failed during shutdown: {}", e);
        }
    }

    match checkpoints.persist().await {
        Ok(streams) => tracing::info!(streams, "Final checkpoints persisted"),
        Err(e) => tracing::error!("Failed to persist final checkpoints: {}", e),
    }

    tracing::info!("Closing database connections...");
    db.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
