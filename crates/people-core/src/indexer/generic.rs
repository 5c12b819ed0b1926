//! Generic frontmatter indexer over a `DocumentStore`.
//!
//! Runs an initial full scan, then watches store changes and publishes one
//! `IndexerEvent` per affected document with the frontmatter diff against the
//! last revision it saw. Scans and watch batches never interleave.

use crate::diff::{compute_diff, FrontmatterDiff};
use crate::events::{EventBus, Subscription};
use crate::store::{self, Document, DocumentStore, StoreChange, StoreChangeKind, StoreError};
use futures::stream::{self, StreamExt};
use obsidian_fs::Frontmatter;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const DEFAULT_SCAN_CONCURRENCY: usize = 10;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Filter deciding which document paths the indexer tracks
pub type IncludeFile = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct IndexerConfig {
    pub include_file: IncludeFile,
    /// Keys left out of every diff
    pub excluded_diff_keys: Vec<String>,
    /// Maximum number of concurrent reads during a scan
    pub scan_concurrency: usize,
    /// Window in which bursts of store changes are coalesced
    pub debounce: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            include_file: Arc::new(|_: &str| true),
            excluded_diff_keys: Vec::new(),
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl std::fmt::Debug for IndexerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerConfig")
            .field("excluded_diff_keys", &self.excluded_diff_keys)
            .field("scan_concurrency", &self.scan_concurrency)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerEventKind {
    FileChanged,
    FileDeleted,
}

/// Current revision of an indexed document
#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    pub path: String,
    pub frontmatter: Frontmatter,
    pub mtime_millis: u64,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexerEvent {
    pub kind: IndexerEventKind,
    pub path: String,
    /// Previous location when the document was renamed
    pub old_path: Option<String>,
    /// Present on changes
    pub source: Option<FileSource>,
    /// Last revision seen before this event
    pub old_frontmatter: Option<Frontmatter>,
    /// Present on changes, never on deletions
    pub frontmatter_diff: Option<FrontmatterDiff>,
    /// Published by a full scan rather than by a store change. The diff is
    /// against whatever the indexer knew before, possibly nothing.
    pub baseline: bool,
}

struct Worker {
    _subscription: Subscription,
    task: JoinHandle<()>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct IndexerInner {
    store: Arc<dyn DocumentStore>,
    config: RwLock<IndexerConfig>,
    /// Last frontmatter published per path
    known: Mutex<HashMap<String, Frontmatter>>,
    events: Arc<EventBus<IndexerEvent>>,
    indexing_complete: watch::Sender<bool>,
    /// Serializes scans against watch batches
    scan_lock: tokio::sync::Mutex<()>,
}

/// Full-scan plus incremental-watch indexer.
pub struct Indexer {
    inner: Arc<IndexerInner>,
    worker: tokio::sync::Mutex<Option<Worker>>,
}

impl Indexer {
    pub fn new(store: Arc<dyn DocumentStore>, config: IndexerConfig) -> Self {
        let (indexing_complete, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(IndexerInner {
                store,
                config: RwLock::new(config),
                known: Mutex::new(HashMap::new()),
                events: Arc::new(EventBus::new()),
                indexing_complete,
                scan_lock: tokio::sync::Mutex::new(()),
            }),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    pub fn events(&self) -> &Arc<EventBus<IndexerEvent>> {
        &self.inner.events
    }

    /// Turns `true` once a full scan has been published
    pub fn indexing_complete(&self) -> watch::Receiver<bool> {
        self.inner.indexing_complete.subscribe()
    }

    pub fn config(&self) -> IndexerConfig {
        self.inner.config()
    }

    /// Replace the configuration. A changed filter takes effect on the next `resync`.
    pub fn set_config(&self, config: IndexerConfig) {
        *self.inner.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    /// Initial scan, then watch for changes. Calling it again while running does nothing.
    pub async fn start(&self) -> store::Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Ok(());
        }

        // Subscribe before scanning so nothing written during the scan is missed
        let (subscription, rx) = self.inner.store.changes().subscribe_channel();
        self.inner.scan().await?;

        let task = tokio::spawn(watch_loop(self.inner.clone(), rx));
        *worker = Some(Worker {
            _subscription: subscription,
            task,
        });
        Ok(())
    }

    /// Stop watching. Events still buffered are discarded.
    pub async fn stop(&self) {
        if self.worker.lock().await.take().is_some() {
            self.inner.indexing_complete.send_replace(false);
            debug!("Indexer stopped");
        }
    }

    /// Full rescan. Known paths now out of scope or gone are published as deleted.
    pub async fn resync(&self) -> store::Result<usize> {
        self.inner.scan().await
    }
}

impl IndexerInner {
    fn config(&self) -> IndexerConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn known(&self) -> std::sync::MutexGuard<'_, HashMap<String, Frontmatter>> {
        self.known.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn scan(&self) -> store::Result<usize> {
        let _guard = self.scan_lock.lock().await;
        self.indexing_complete.send_replace(false);
        let started = Instant::now();
        let config = self.config();

        let paths: Vec<String> = self
            .store
            .list_markdown()
            .await?
            .into_iter()
            .filter(|path| (config.include_file)(path))
            .collect();

        let listed: HashSet<&str> = paths.iter().map(String::as_str).collect();
        let stale: BTreeSet<String> = self
            .known()
            .keys()
            .filter(|path| !listed.contains(path.as_str()))
            .cloned()
            .collect();
        for path in stale {
            self.forget(&path, true);
        }

        let store = self.store.clone();
        let mut reads = stream::iter(paths.clone())
            .map(|path| {
                let store = store.clone();
                async move {
                    let result = store.read(&path).await;
                    (path, result)
                }
            })
            .buffered(config.scan_concurrency.max(1));

        let mut indexed = 0;
        while let Some((path, result)) = reads.next().await {
            match result {
                Ok(document) => {
                    self.publish_revision(document, None, &config.excluded_diff_keys, true);
                    indexed += 1;
                }
                Err(e) => debug!("Skipping {} during scan: {}", path, e),
            }
        }

        self.indexing_complete.send_replace(true);
        info!("Indexed {} documents in {:?}", indexed, started.elapsed());
        Ok(indexed)
    }

    async fn process_batch(&self, batch: Vec<PendingChange>) {
        let _guard = self.scan_lock.lock().await;
        let config = self.config();
        for change in batch {
            self.process_change(change, &config).await;
        }
    }

    async fn process_change(&self, change: PendingChange, config: &IndexerConfig) {
        let in_scope = change.path.ends_with(".md") && (config.include_file)(&change.path);

        if change.kind == StoreChangeKind::Deleted || !in_scope {
            if let Some(old_path) = &change.old_path {
                self.forget(old_path, false);
            }
            self.forget(&change.path, false);
            return;
        }

        match self.store.read(&change.path).await {
            Ok(document) => self.publish_revision(
                document,
                change.old_path,
                &config.excluded_diff_keys,
                false,
            ),
            Err(StoreError::NotFound(_)) => {
                // Gone again before we got to read it
                if let Some(old_path) = &change.old_path {
                    self.forget(old_path, false);
                }
                self.forget(&change.path, false);
            }
            Err(e) => debug!("Failed to read {}: {}", change.path, e),
        }
    }

    fn publish_revision(
        &self,
        document: Document,
        old_path: Option<String>,
        excluded: &[String],
        baseline: bool,
    ) {
        let (old_path, old_frontmatter) = {
            let mut known = self.known();
            let renamed_from = old_path
                .filter(|old| *old != document.path)
                .and_then(|old| known.remove(&old).map(|fm| (old, fm)));
            let result = match renamed_from {
                Some((old, fm)) => (Some(old), Some(fm)),
                None => (None, known.get(&document.path).cloned()),
            };
            known.insert(document.path.clone(), document.frontmatter.clone());
            result
        };

        let diff = compute_diff(old_frontmatter.as_ref(), &document.frontmatter, excluded);
        let folder = obsidian_fs::parent_folder(&document.path).to_string();
        self.events.emit(IndexerEvent {
            kind: IndexerEventKind::FileChanged,
            path: document.path.clone(),
            old_path,
            source: Some(FileSource {
                path: document.path,
                frontmatter: document.frontmatter,
                mtime_millis: document.mtime_millis,
                folder,
            }),
            old_frontmatter,
            frontmatter_diff: Some(diff),
            baseline,
        });
    }

    /// Drop a known path and publish its deletion. Unknown paths are ignored.
    fn forget(&self, path: &str, baseline: bool) {
        let Some(old_frontmatter) = self.known().remove(path) else {
            return;
        };
        self.events.emit(IndexerEvent {
            kind: IndexerEventKind::FileDeleted,
            path: path.to_string(),
            old_path: None,
            source: None,
            old_frontmatter: Some(old_frontmatter),
            frontmatter_diff: None,
            baseline,
        });
    }
}

/// A coalesced store change waiting to be processed
#[derive(Debug, Clone, PartialEq)]
struct PendingChange {
    path: String,
    old_path: Option<String>,
    kind: StoreChangeKind,
}

/// Merge a store change into the pending batch, keeping first-seen order.
fn coalesce(batch: &mut Vec<PendingChange>, change: StoreChange) {
    let mut old_path = change.old_path;

    // A rename of a path that is already pending carries that entry's origin along
    if let Some(renamed) = old_path.as_deref() {
        if let Some(pos) = batch.iter().position(|p| p.path == renamed) {
            let earlier = batch.remove(pos);
            if earlier.old_path.is_some() {
                old_path = earlier.old_path;
            }
        }
    }

    match batch.iter_mut().find(|p| p.path == change.path) {
        Some(pending) => {
            pending.kind = change.kind;
            if pending.old_path.is_none() {
                pending.old_path = old_path;
            }
        }
        None => batch.push(PendingChange {
            path: change.path,
            old_path,
            kind: change.kind,
        }),
    }
}

async fn watch_loop(inner: Arc<IndexerInner>, mut rx: mpsc::UnboundedReceiver<StoreChange>) {
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::new();
        coalesce(&mut batch, first);

        let debounce = inner.config().debounce;
        if debounce.is_zero() {
            while let Ok(change) = rx.try_recv() {
                coalesce(&mut batch, change);
            }
        } else {
            let deadline = tokio::time::Instant::now() + debounce;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    next = rx.recv() => match next {
                        Some(change) => coalesce(&mut batch, change),
                        None => break,
                    },
                }
            }
        }

        debug!("Processing {} coalesced changes", batch.len());
        inner.process_batch(batch).await;
    }
}
