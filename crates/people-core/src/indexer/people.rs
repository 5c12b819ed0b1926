//! Person-note indexer: the generic indexer scoped to the people directory.

use super::generic::{Indexer, IndexerConfig, IndexerEvent, IndexerEventKind};
use crate::diff::FrontmatterDiff;
use crate::events::{EventBus, Subscription};
use crate::person::PersonFrontmatter;
use crate::settings::SettingsStore;
use crate::store::{self, DocumentStore};
use obsidian_fs::Frontmatter;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonEventKind {
    PersonChanged,
    PersonDeleted,
}

/// Current revision of a person note, with sanitized frontmatter
#[derive(Debug, Clone, PartialEq)]
pub struct PersonSource {
    pub path: String,
    pub frontmatter: PersonFrontmatter,
    pub mtime_millis: u64,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonEvent {
    pub kind: PersonEventKind,
    pub path: String,
    pub old_path: Option<String>,
    pub source: Option<PersonSource>,
    /// Raw frontmatter of the previous revision
    pub old_frontmatter: Option<Frontmatter>,
    /// Raw diff from the previous revision
    pub frontmatter_diff: Option<FrontmatterDiff>,
    /// Published by a full scan, see `IndexerEvent::baseline`
    pub baseline: bool,
}

impl PersonEvent {
    /// Translate a generic event. Changes without a current revision yield `None`.
    pub fn from_indexer_event(event: IndexerEvent) -> Option<Self> {
        match event.kind {
            IndexerEventKind::FileChanged => {
                let source = event.source?;
                Some(Self {
                    kind: PersonEventKind::PersonChanged,
                    path: event.path,
                    old_path: event.old_path,
                    source: Some(PersonSource {
                        frontmatter: PersonFrontmatter::sanitize(&source.frontmatter),
                        path: source.path,
                        mtime_millis: source.mtime_millis,
                        folder: source.folder,
                    }),
                    old_frontmatter: event.old_frontmatter,
                    frontmatter_diff: event.frontmatter_diff,
                    baseline: event.baseline,
                })
            }
            IndexerEventKind::FileDeleted => Some(Self {
                kind: PersonEventKind::PersonDeleted,
                path: event.path,
                old_path: event.old_path,
                source: None,
                old_frontmatter: event.old_frontmatter,
                frontmatter_diff: None,
                baseline: event.baseline,
            }),
        }
    }
}

/// Indexes person notes under the configured directory.
///
/// Changing the directory in settings triggers a full resync.
pub struct PeopleIndexer {
    indexer: Arc<Indexer>,
    settings: SettingsStore,
    directory: Arc<RwLock<String>>,
    events: Arc<EventBus<PersonEvent>>,
    _translation: Subscription,
    settings_task: Mutex<Option<JoinHandle<()>>>,
}

impl PeopleIndexer {
    pub fn new(store: Arc<dyn DocumentStore>, settings: SettingsStore) -> Self {
        Self::with_config(store, settings, IndexerConfig::default())
    }

    /// Build with a custom base configuration. Its `include_file` is replaced
    /// by the directory scope.
    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        settings: SettingsStore,
        config: IndexerConfig,
    ) -> Self {
        let directory = Arc::new(RwLock::new(
            settings.current().scope_directory().to_string(),
        ));

        let scope = directory.clone();
        let config = IndexerConfig {
            include_file: Arc::new(move |path: &str| {
                let directory = scope.read().unwrap_or_else(|e| e.into_inner());
                obsidian_fs::is_within_directory(path, &directory)
            }),
            ..config
        };
        let indexer = Arc::new(Indexer::new(store, config));

        let events = Arc::new(EventBus::new());
        let republish = events.clone();
        let translation = indexer.events().subscribe(move |event: IndexerEvent| {
            if let Some(event) = PersonEvent::from_indexer_event(event) {
                republish.emit(event);
            }
        });

        Self {
            indexer,
            settings,
            directory,
            events,
            _translation: translation,
            settings_task: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &Arc<EventBus<PersonEvent>> {
        &self.events
    }

    pub fn indexing_complete(&self) -> watch::Receiver<bool> {
        self.indexer.indexing_complete()
    }

    /// Current scope directory, `""` for the whole vault
    pub fn directory(&self) -> String {
        self.directory.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Scan the people directory and start watching. Idempotent.
    pub async fn start(&self) -> store::Result<()> {
        if self.settings_task.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
            return Ok(());
        }

        // Subscribe before reading the directory so a change made while the
        // initial scan runs is still seen by the settings task
        let settings = self.settings.subscribe();
        let directory = settings.borrow().scope_directory().to_string();
        info!("Indexing people in '{}'", directory);
        *self.directory.write().unwrap_or_else(|e| e.into_inner()) = directory;

        self.indexer.start().await?;

        let mut task = self.settings_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_none() {
            *task = Some(tokio::spawn(watch_directory(
                settings,
                self.directory.clone(),
                self.indexer.clone(),
            )));
        }
        Ok(())
    }

    pub async fn stop(&self) {
        let task = self
            .settings_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.indexer.stop().await;
    }

    /// Full rescan of the people directory
    pub async fn resync(&self) -> store::Result<usize> {
        self.indexer.resync().await
    }
}

impl Drop for PeopleIndexer {
    fn drop(&mut self) {
        if let Some(task) = self
            .settings_task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

/// Resync whenever the configured directory differs from the indexed one.
///
/// The first check runs immediately, so settings changed after `settings` was
/// subscribed but before this task started are not lost.
async fn watch_directory(
    mut settings: watch::Receiver<crate::settings::Settings>,
    directory: Arc<RwLock<String>>,
    indexer: Arc<Indexer>,
) {
    loop {
        let next = settings.borrow_and_update().scope_directory().to_string();
        let changed = {
            let mut current = directory.write().unwrap_or_else(|e| e.into_inner());
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        };
        if changed {
            info!("People directory changed to '{}', resyncing", next);
            if let Err(e) = indexer.resync().await {
                warn!("Resync after directory change failed: {}", e);
            }
        } else {
            debug!("People directory unchanged");
        }

        if settings.changed().await.is_err() {
            break;
        }
    }
}
