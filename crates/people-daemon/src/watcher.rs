//! Debounced vault watcher producing store changes.

use crate::native_store::is_vault_note;
use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use people_core::StoreChange;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, error};

pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Last seen mtime per relative path, to drop events that changed nothing
type MtimeCache = Arc<Mutex<HashMap<String, SystemTime>>>;

/// Watches a vault directory recursively.
///
/// Changes arrive in batches, one per debounce window, so a rename seen as a
/// deletion plus a creation stays together.
pub struct FileWatcher {
    vault_path: PathBuf,
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    change_rx: mpsc::UnboundedReceiver<Vec<StoreChange>>,
}

impl FileWatcher {
    pub fn new(vault_path: PathBuf) -> Result<Self> {
        // FSEvents needs the resolved path (/var -> /private/var on macOS)
        let vault_path = vault_path.canonicalize().unwrap_or(vault_path);

        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let root = vault_path.clone();
        let mtimes: MtimeCache = Arc::new(Mutex::new(HashMap::new()));

        let mut debouncer = new_debouncer(
            WATCH_DEBOUNCE,
            move |result: std::result::Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    let batch: Vec<StoreChange> = events
                        .iter()
                        .filter_map(|event| classify(&event.path, &root, &mtimes))
                        .collect();
                    if !batch.is_empty() && change_tx.send(batch).is_err() {
                        debug!("Watcher receiver dropped");
                    }
                }
                Err(e) => error!("File watcher error: {}", e),
            },
        )?;

        debouncer
            .watcher()
            .watch(&vault_path, RecursiveMode::Recursive)?;

        Ok(Self {
            vault_path,
            _debouncer: debouncer,
            change_rx,
        })
    }

    pub async fn recv(&mut self) -> Option<Vec<StoreChange>> {
        self.change_rx.recv().await
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }
}

/// Turn a raw filesystem path into a change of a vault note.
///
/// A path that no longer exists is a deletion. Modifications whose mtime
/// equals the last one seen are dropped.
pub(crate) fn classify(path: &Path, vault_path: &Path, mtimes: &MtimeCache) -> Option<StoreChange> {
    let relative = path.strip_prefix(vault_path).ok()?;
    let relative: String = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?
        .join("/");

    if !is_vault_note(&relative) {
        return None;
    }

    let mut cache = mtimes.lock().unwrap_or_else(|e| e.into_inner());
    let change = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(mtime) => {
            if cache.get(&relative) == Some(&mtime) {
                return None;
            }
            cache.insert(relative.clone(), mtime);
            StoreChange::modified(relative)
        }
        Err(_) if path.exists() => StoreChange::modified(relative),
        Err(_) => {
            cache.remove(&relative);
            StoreChange::deleted(relative)
        }
    };

    debug!("File event: {:?} {}", change.kind, change.path);
    Some(change)
}
