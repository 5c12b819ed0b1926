//! Document store abstraction over a vault of markdown notes.
//!
//! Implementations:
//! - `InMemoryStore` - For testing and embedding
//! - `NativeStore` (in people-daemon) - Uses tokio::fs

use crate::events::EventBus;
use async_trait::async_trait;
use chrono::Utc;
use obsidian_fs::{
    build_note_with_frontmatter, parse_frontmatter, split_frontmatter, Frontmatter, FrontmatterError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Frontmatter of {0} is not a valid YAML mapping")]
    MalformedFrontmatter(String),

    #[error("Failed to write frontmatter of {path}: {source}")]
    Frontmatter {
        path: String,
        #[source]
        source: FrontmatterError,
    },

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One revision of a markdown document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    /// Empty when the note has no (parseable) frontmatter block
    pub frontmatter: Frontmatter,
    pub body: String,
    /// Modification time in milliseconds since epoch
    pub mtime_millis: u64,
}

impl Document {
    /// Split raw note text into frontmatter and body.
    pub fn parse(path: impl Into<String>, raw: &str, mtime_millis: u64) -> Self {
        let parsed = parse_frontmatter(raw);
        Self {
            path: path.into(),
            frontmatter: parsed.frontmatter.unwrap_or_default(),
            body: parsed.content.to_string(),
            mtime_millis,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChangeKind {
    /// Created, modified or renamed
    Modified,
    Deleted,
}

/// Raw change notification published by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub path: String,
    /// Previous location when the document was renamed
    pub old_path: Option<String>,
    pub kind: StoreChangeKind,
}

impl StoreChange {
    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            kind: StoreChangeKind::Modified,
        }
    }

    pub fn renamed(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_path: Some(old_path.into()),
            kind: StoreChangeKind::Modified,
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            kind: StoreChangeKind::Deleted,
        }
    }
}

/// Mutation applied to a document's frontmatter inside `process_frontmatter`.
pub type FrontmatterMutator<'a> = Box<dyn FnOnce(&mut Frontmatter) + Send + 'a>;

/// Vault access needed by the indexer and the relationship reconciler.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read and parse one document
    async fn read(&self, path: &str) -> Result<Document>;

    /// All markdown document paths, sorted
    async fn list_markdown(&self) -> Result<Vec<String>>;

    /// Resolve a link path (`"Bob"`, `"People/Bob.md"`) written in `source_path`
    /// to the path of an existing document.
    fn resolve_link(&self, link_path: &str, source_path: &str) -> Option<String>;

    /// Read-modify-write the frontmatter of an existing document.
    ///
    /// The mutator runs without store locks held, so it may call
    /// `resolve_link`. Returns `false` and writes nothing when the mutator left
    /// the frontmatter unchanged.
    async fn process_frontmatter(&self, path: &str, mutator: FrontmatterMutator<'_>) -> Result<bool>;

    /// Change notifications for every document mutation
    fn changes(&self) -> &Arc<EventBus<StoreChange>>;
}

/// Rewrite `raw` with the mutated frontmatter, or `None` if nothing changed.
///
/// A frontmatter block that does not parse is never rewritten: the call fails
/// with `MalformedFrontmatter` and the note stays as it is.
pub fn apply_frontmatter_mutation(
    path: &str,
    raw: &str,
    mutator: FrontmatterMutator<'_>,
) -> Result<Option<String>> {
    let parsed = parse_frontmatter(raw);
    let block_has_content = split_frontmatter(raw)
        .0
        .is_some_and(|yaml| !yaml.trim().is_empty());
    if parsed.frontmatter.is_none() && block_has_content {
        return Err(StoreError::MalformedFrontmatter(path.to_string()));
    }
    let before = parsed.frontmatter.unwrap_or_default();
    let mut after = before.clone();
    mutator(&mut after);
    if after == before {
        return Ok(None);
    }

    build_note_with_frontmatter(&after, parsed.content)
        .map(Some)
        .map_err(|source| StoreError::Frontmatter {
            path: path.to_string(),
            source,
        })
}

#[derive(Debug, Clone)]
struct StoredNote {
    raw: String,
    mtime_millis: u64,
}

/// In-memory document store for testing
pub struct InMemoryStore {
    notes: RwLock<BTreeMap<String, StoredNote>>,
    changes: Arc<EventBus<StoreChange>>,
    clock: AtomicU64,
    /// Paths written through `process_frontmatter`, in order
    write_log: Mutex<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            notes: RwLock::new(BTreeMap::new()),
            changes: Arc::new(EventBus::new()),
            clock: AtomicU64::new(0),
            write_log: Mutex::new(Vec::new()),
        }
    }

    /// Strictly increasing wall-clock milliseconds, so each write gets a new mtime
    fn next_mtime(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    fn normalize_path(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    /// Create or overwrite a document and publish the change.
    pub fn insert(&self, path: &str, raw: &str) {
        let path = Self::normalize_path(path);
        let mtime_millis = self.next_mtime();
        self.notes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                path.clone(),
                StoredNote {
                    raw: raw.to_string(),
                    mtime_millis,
                },
            );
        self.changes.emit(StoreChange::modified(path));
    }

    /// Move a document and publish a rename.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = Self::normalize_path(old_path);
        let new_path = Self::normalize_path(new_path);
        {
            let mut notes = self.notes.write().unwrap_or_else(|e| e.into_inner());
            let note = notes
                .remove(&old_path)
                .ok_or_else(|| StoreError::NotFound(old_path.clone()))?;
            notes.insert(new_path.clone(), note);
        }
        self.changes.emit(StoreChange::renamed(old_path, new_path));
        Ok(())
    }

    /// Delete a document and publish the deletion.
    pub fn remove(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        self.notes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        self.changes.emit(StoreChange::deleted(path));
        Ok(())
    }

    /// Raw text of a document
    pub fn raw(&self, path: &str) -> Option<String> {
        let notes = self.notes.read().unwrap_or_else(|e| e.into_inner());
        notes.get(&Self::normalize_path(path)).map(|note| note.raw.clone())
    }

    /// Parsed frontmatter of a document (empty map when it has none)
    pub fn frontmatter(&self, path: &str) -> Option<Frontmatter> {
        self.raw(path)
            .map(|raw| parse_frontmatter(&raw).frontmatter.unwrap_or_default())
    }

    /// Paths written through `process_frontmatter`, in write order
    pub fn write_log(&self) -> Vec<String> {
        self.write_log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn read(&self, path: &str) -> Result<Document> {
        let path = Self::normalize_path(path);
        let notes = self.notes.read().unwrap_or_else(|e| e.into_inner());
        notes
            .get(&path)
            .map(|note| Document::parse(path.clone(), &note.raw, note.mtime_millis))
            .ok_or(StoreError::NotFound(path))
    }

    async fn list_markdown(&self) -> Result<Vec<String>> {
        let notes = self.notes.read().unwrap_or_else(|e| e.into_inner());
        Ok(notes.keys().filter(|p| p.ends_with(".md")).cloned().collect())
    }

    fn resolve_link(&self, link_path: &str, source_path: &str) -> Option<String> {
        let notes = self.notes.read().unwrap_or_else(|e| e.into_inner());
        obsidian_fs::resolve_link_path(notes.keys().map(String::as_str), link_path, source_path)
    }

    async fn process_frontmatter(&self, path: &str, mutator: FrontmatterMutator<'_>) -> Result<bool> {
        let path = Self::normalize_path(path);
        let raw = self
            .raw(&path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;

        let Some(updated) = apply_frontmatter_mutation(&path, &raw, mutator)? else {
            return Ok(false);
        };

        let mtime_millis = self.next_mtime();
        {
            let mut notes = self.notes.write().unwrap_or_else(|e| e.into_inner());
            let note = notes
                .get_mut(&path)
                .ok_or_else(|| StoreError::NotFound(path.clone()))?;
            note.raw = updated;
            note.mtime_millis = mtime_millis;
        }
        self.write_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.clone());
        self.changes.emit(StoreChange::modified(path));
        Ok(true)
    }

    fn changes(&self) -> &Arc<EventBus<StoreChange>> {
        &self.changes
    }
}
