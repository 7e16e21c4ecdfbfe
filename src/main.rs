//! Slider Bridge - turns mixer slider reports into volume move events

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slider_bridge::config::TransportKind;
use slider_bridge::{BridgeController, ConfigWatcher, EventDispatcher};

/// Slider Bridge - forward mixer slider moves to volume bindings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<String>,

    /// Override the configured transport
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Http,
    Stream,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Http => TransportKind::Http,
            TransportArg::Stream => TransportKind::Stream,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&args.log_level, args.log_dir.as_deref())?;

    info!("Starting Slider Bridge...");
    info!("Configuration file: {}", args.config);

    // Load configuration with hot-reload watcher
    let (config_watcher, initial_config) = ConfigWatcher::new(args.config.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let mut config = (*initial_config).clone();
    if let Some(transport) = args.transport {
        config.transport.kind = transport.into();
        config.validate().context("Invalid transport override")?;
    }

    let dispatcher = Arc::new(EventDispatcher::new(config.publish_mode()));
    let bridge = BridgeController::new(config.tracker_settings(), dispatcher);

    // Reloads reset slider state so every binding gets re-sent
    let _reload_task =
        bridge.watch_reloads(config_watcher.subscribe_to_changes(), config.reset_delay());

    // Stand-in consumer until a volume binding subscribes
    let mut moves = bridge.subscribe();
    tokio::spawn(async move {
        while let Some(event) = moves.recv().await {
            info!(
                "🎚️  Slider {} -> {:.2}%",
                event.slider_index, event.percent_value
            );
        }
    });

    bridge.start(config.line_source()?)?;

    tokio::select! {
        _ = shutdown_signal() => {
            bridge.stop();
            bridge.wait_until_idle().await;
        }
        _ = bridge.wait_until_idle() => {
            warn!("Bridge transport ended, exiting");
        }
    }

    info!("Slider Bridge shutdown complete");
    Ok(())
}

fn init_logging(
    level: &str,
    log_dir: Option<&str>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "slider-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
