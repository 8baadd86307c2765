//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Delay before re-reading, so editors can finish writing
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the config file and yields every config that reloads cleanly
///
/// A reload that fails to parse or validate is logged and skipped, so the
/// consumer keeps running on the previous configuration.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
    path: PathBuf,
}

impl ConfigWatcher {
    /// Start watching `config_path`
    ///
    /// The parent directory is watched rather than the file itself so that
    /// editors which save by rename are still picked up.
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = config_path.into();
        let (tx, rx) = mpsc::channel(10);

        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .with_context(|| format!("Config path has no file name: {}", path.display()))?;
        let watch_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // notify callbacks run on their own OS thread
        let runtime_handle = tokio::runtime::Handle::current();
        let reload_path = path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Watch error: {}", e);
                    return;
                }
            };

            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            if !event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                return;
            }
            debug!("Config file changed: {:?}", event.paths);

            let path = reload_path.clone();
            let tx = tx.clone();
            runtime_handle.spawn(async move {
                tokio::time::sleep(DEBOUNCE).await;

                match AppConfig::load(&path).await {
                    Ok(new_config) => {
                        info!("Configuration reloaded ({} mappings)", new_config.mapping_count());
                        if let Err(e) = tx.send(new_config).await {
                            error!("Failed to send config update: {}", e);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to reload config (keeping old config): {}", e);
                    }
                }
            });
        })?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", watch_dir.display()))?;

        info!("Config file watcher started for: {}", path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next config update
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}
