//! Hot reload of the bridge configuration file
//!
//! Editors often emit several modify events per save, so each event is
//! debounced and the reparsed config is only forwarded when it differs from
//! the last one handed to the bridge.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::BridgeConfig;

/// Delay letting editors finish writing before the file is re-read
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// Last configuration delivered to the bridge
type LastConfig = Arc<Mutex<BridgeConfig>>;

/// Watches the config file and yields each distinct valid revision
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<BridgeConfig>,
}

impl ConfigWatcher {
    /// Load the config file and start watching it
    pub async fn new(config_path: String) -> Result<(Self, BridgeConfig)> {
        let initial = BridgeConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let (tx, rx) = mpsc::channel(10);
        let last: LastConfig = Arc::new(Mutex::new(initial.clone()));

        // notify callbacks run on their own OS thread, outside the runtime
        let runtime = tokio::runtime::Handle::current();
        let path = config_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Config watch error: {}", e);
                    return;
                },
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            debug!("Config file event {:?} on {:?}", event.kind, event.paths);
            runtime.spawn(reload(path.clone(), last.clone(), tx.clone()));
        })?;

        watcher
            .watch(Path::new(&config_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path))?;

        info!("Watching {} for configuration changes", config_path);

        Ok((Self { _watcher: watcher, rx }, initial))
    }

    /// Next distinct configuration, or `None` once the watcher is gone
    pub async fn next_config(&mut self) -> Option<BridgeConfig> {
        self.rx.recv().await
    }
}

/// Re-read the file after the debounce delay and forward it if it changed
async fn reload(path: String, last: LastConfig, tx: mpsc::Sender<BridgeConfig>) {
    tokio::time::sleep(RELOAD_DEBOUNCE).await;

    let candidate = match BridgeConfig::load(&path).await {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring invalid config file (keeping current config): {:#}", e);
            return;
        },
    };

    if !is_new_config(&last, &candidate) {
        debug!("Config file rewritten without changes");
        return;
    }

    info!("Configuration reloaded from {}", path);
    if let Err(e) = tx.send(candidate).await {
        error!("Bridge no longer accepts config updates: {}", e);
    }
}

/// Record `candidate` as the latest config, returning false if it was already current
fn is_new_config(last: &Mutex<BridgeConfig>, candidate: &BridgeConfig) -> bool {
    let mut last = last.lock();
    if *last == *candidate {
        return false;
    }
    *last = candidate.clone();
    true
}
