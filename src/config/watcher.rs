//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use super::BridgeConfig;

/// Wait this long after a modify event for file writes to complete
const DEBOUNCE: Duration = Duration::from_millis(100);

type Subscribers = Arc<Mutex<Vec<mpsc::Sender<Arc<BridgeConfig>>>>>;

/// Config watcher that monitors file changes and notifies every subscriber
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    current: Arc<RwLock<Arc<BridgeConfig>>>,
    subscribers: Subscribers,
}

impl ConfigWatcher {
    /// Create a new config watcher for the specified file
    pub async fn new(config_path: String) -> Result<(Self, Arc<BridgeConfig>)> {
        // Load initial config
        let initial_config = BridgeConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;
        let initial_config = Arc::new(initial_config);

        let current = Arc::new(RwLock::new(Arc::clone(&initial_config)));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        // notify callbacks run on their own OS thread, not in Tokio context,
        // so they only queue a signal for the reload task below
        let (modified_tx, modified_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    // Only reload on modify events
                    if matches!(event.kind, EventKind::Modify(_)) {
                        debug!("Config file modified: {:?}", event.paths);
                        let _ = modified_tx.send(());
                    }
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(Path::new(&config_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path))?;

        tokio::spawn(reload_loop(
            config_path.clone(),
            modified_rx,
            Arc::clone(&current),
            Arc::clone(&subscribers),
        ));

        info!("Config file watcher started for: {}", config_path);

        Ok((
            Self {
                _watcher: watcher,
                current,
                subscribers,
            },
            initial_config,
        ))
    }

    /// Most recently loaded valid configuration
    pub fn current(&self) -> Arc<BridgeConfig> {
        self.current.read().clone()
    }

    /// Receive notifications of successful reloads, in order.
    ///
    /// Holds at most one pending notification. A reload arriving while it is
    /// still unread is skipped for this subscriber only.
    pub fn subscribe_to_changes(&self) -> mpsc::Receiver<Arc<BridgeConfig>> {
        let (tx, rx) = mpsc::channel(1);
        self.subscribers.lock().push(tx);
        rx
    }
}

/// Reload sequentially so notifications keep file order
async fn reload_loop(
    config_path: String,
    mut modified_rx: mpsc::UnboundedReceiver<()>,
    current: Arc<RwLock<Arc<BridgeConfig>>>,
    subscribers: Subscribers,
) {
    while modified_rx.recv().await.is_some() {
        // Debounce: a single save often produces several modify events
        tokio::time::sleep(DEBOUNCE).await;
        while modified_rx.try_recv().is_ok() {}

        let new_config = match BridgeConfig::load(&config_path).await {
            Ok(config) => Arc::new(config),
            Err(e) => {
                warn!("Failed to reload config (keeping old config): {:#}", e);
                continue;
            }
        };
        info!("Configuration reloaded successfully");
        *current.write() = Arc::clone(&new_config);

        subscribers.lock().retain(|tx| match tx.try_send(Arc::clone(&new_config)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Config subscriber has an unread reload, skipping this one");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Config subscriber dropped");
                false
            }
        });
    }
}
