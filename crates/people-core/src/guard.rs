//! Paths with a reconciler write in flight.
//!
//! Changes to a guarded path are the reconciler's own echo and must not be
//! reconciled again. Guards are RAII tokens: dropping one releases the path
//! whether the write succeeded, failed or was abandoned.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct SyncGuardSet {
    paths: Arc<Mutex<HashSet<String>>>,
}

impl SyncGuardSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard `path`, or return `None` if it is already guarded.
    pub fn try_acquire(&self, path: &str) -> Option<SyncGuard> {
        let inserted = self
            .paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string());
        inserted.then(|| SyncGuard {
            paths: self.paths.clone(),
            path: path.to_string(),
        })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its path from the set on drop
#[must_use = "the path is released as soon as the guard is dropped"]
pub struct SyncGuard {
    paths: Arc<Mutex<HashSet<String>>>,
    path: String,
}

impl SyncGuard {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.path);
    }
}

impl std::fmt::Debug for SyncGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncGuard").field("path", &self.path).finish()
    }
}
