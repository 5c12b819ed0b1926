//! Document store over a vault directory using tokio::fs.

use async_trait::async_trait;
use obsidian_fs::validate_relative_path;
use people_core::store::{apply_frontmatter_mutation, Result};
use people_core::{Document, DocumentStore, EventBus, FrontmatterMutator, StoreChange, StoreChangeKind, StoreError};
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::debug;

/// Markdown notes below `base_path`, indexed by vault-relative path.
///
/// Hidden files and directories are not part of the vault.
pub struct NativeStore {
    base_path: PathBuf,
    index: RwLock<BTreeSet<String>>,
    /// Modification time of each document as last written by this store
    own_writes: Mutex<HashMap<String, SystemTime>>,
    changes: Arc<EventBus<StoreChange>>,
}

fn io_error(path: &str, e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(path.to_string())
    } else {
        StoreError::Io(format!("{}: {}", path, e))
    }
}

fn millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Whether a vault-relative path names a visible markdown note
pub fn is_vault_note(path: &str) -> bool {
    path.ends_with(".md") && !path.split('/').any(|segment| segment.starts_with('.'))
}

impl NativeStore {
    /// Open a vault and index the notes it contains.
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        let store = Self {
            base_path,
            index: RwLock::new(BTreeSet::new()),
            own_writes: Mutex::new(HashMap::new()),
            changes: Arc::new(EventBus::new()),
        };
        let paths = store.walk().await?;
        debug!("Found {} notes in {:?}", paths.len(), store.base_path);
        *store.index.write().unwrap_or_else(|e| e.into_inner()) = paths;
        Ok(store)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, path: &str) -> Result<(String, PathBuf)> {
        let relative = validate_relative_path(path).map_err(|e| StoreError::InvalidPath {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let full = self.base_path.join(&relative);
        Ok((relative, full))
    }

    async fn walk(&self) -> Result<BTreeSet<String>> {
        let mut found = BTreeSet::new();
        let mut pending = vec![String::new()];

        while let Some(relative_dir) = pending.pop() {
            let dir_path = self.base_path.join(&relative_dir);
            let mut dir = fs::read_dir(&dir_path)
                .await
                .map_err(|e| io_error(&relative_dir, e))?;

            while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(&relative_dir, e))? {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let relative = if relative_dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", relative_dir, name)
                };
                let file_type = entry.file_type().await.map_err(|e| io_error(&relative, e))?;
                if file_type.is_dir() {
                    pending.push(relative);
                } else if is_vault_note(&relative) {
                    found.insert(relative);
                }
            }
        }

        Ok(found)
    }

    /// Publish one watcher batch, pairing a deleted and a created note into a rename.
    pub async fn apply_external_batch(&self, changes: Vec<StoreChange>) {
        let changes = {
            let index = self.index.read().unwrap_or_else(|e| e.into_inner());
            pair_rename(changes, |path| index.contains(path))
        };
        for change in changes {
            self.apply_external(change).await;
        }
    }

    /// Publish a change observed on disk by the watcher.
    ///
    /// Reports of this store's own writes are dropped while the file still
    /// carries the written modification time.
    pub async fn apply_external(&self, change: StoreChange) {
        if !is_vault_note(&change.path) {
            return;
        }

        match change.kind {
            StoreChangeKind::Deleted => {
                self.index
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&change.path);
                self.own_writes
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&change.path);
            }
            StoreChangeKind::Modified => {
                let current = match fs::metadata(self.base_path.join(&change.path)).await {
                    Ok(metadata) => metadata.modified().ok(),
                    Err(_) => None,
                };
                let own = self
                    .own_writes
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&change.path);
                if own.is_some() && own == current {
                    debug!("Ignoring echo of our write to {}", change.path);
                    return;
                }

                if let Some(old_path) = &change.old_path {
                    self.own_writes
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(old_path);
                }
                let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
                if let Some(old_path) = &change.old_path {
                    index.remove(old_path);
                }
                index.insert(change.path.clone());
            }
        }

        self.changes.emit(change);
    }
}

/// Turn the deletion of a known note and the creation of an unknown one into
/// a single rename. Batches with more than one candidate of either kind are
/// returned unchanged.
fn pair_rename(changes: Vec<StoreChange>, known: impl Fn(&str) -> bool) -> Vec<StoreChange> {
    let positions = |wanted: &dyn Fn(&StoreChange) -> bool| -> Vec<usize> {
        changes
            .iter()
            .enumerate()
            .filter(|(_, change)| wanted(change))
            .map(|(pos, _)| pos)
            .collect()
    };
    let deleted = positions(&|c: &StoreChange| {
        c.kind == StoreChangeKind::Deleted && known(&c.path)
    });
    let created = positions(&|c: &StoreChange| {
        c.kind == StoreChangeKind::Modified && c.old_path.is_none() && !known(&c.path)
    });
    let (&[from], &[to]) = (deleted.as_slice(), created.as_slice()) else {
        return changes;
    };

    let old_path = changes[from].path.clone();
    debug!("Pairing {} and {} as a rename", old_path, changes[to].path);
    changes
        .into_iter()
        .enumerate()
        .filter(|(pos, _)| *pos != from)
        .map(|(pos, change)| {
            if pos == to {
                StoreChange::renamed(old_path.clone(), change.path)
            } else {
                change
            }
        })
        .collect()
}

#[async_trait]
impl DocumentStore for NativeStore {
    async fn read(&self, path: &str) -> Result<Document> {
        let (relative, full) = self.full_path(path)?;
        let raw = fs::read_to_string(&full)
            .await
            .map_err(|e| io_error(&relative, e))?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|e| io_error(&relative, e))?;
        let mtime_millis = metadata.modified().map(millis).unwrap_or(0);
        Ok(Document::parse(relative, &raw, mtime_millis))
    }

    async fn list_markdown(&self) -> Result<Vec<String>> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        Ok(index.iter().cloned().collect())
    }

    fn resolve_link(&self, link_path: &str, source_path: &str) -> Option<String> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        obsidian_fs::resolve_link_path(index.iter().map(String::as_str), link_path, source_path)
    }

    async fn process_frontmatter(&self, path: &str, mutator: FrontmatterMutator<'_>) -> Result<bool> {
        let (relative, full) = self.full_path(path)?;
        let raw = fs::read_to_string(&full)
            .await
            .map_err(|e| io_error(&relative, e))?;

        let Some(updated) = apply_frontmatter_mutation(&relative, &raw, mutator)? else {
            return Ok(false);
        };

        fs::write(&full, updated)
            .await
            .map_err(|e| io_error(&relative, e))?;
        if let Ok(modified) = fs::metadata(&full).await.and_then(|m| m.modified()) {
            self.own_writes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(relative.clone(), modified);
        }

        debug!("Wrote frontmatter of {}", relative);
        self.changes.emit(StoreChange::modified(relative));
        Ok(true)
    }

    fn changes(&self) -> &Arc<EventBus<StoreChange>> {
        &self.changes
    }
}
