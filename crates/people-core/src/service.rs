//! Wires the indexer, cache, reconciler and scheduler together.

use crate::cache::PeopleCache;
use crate::indexer::{IndexerConfig, PeopleIndexer};
use crate::notifications::{NotificationScheduler, Notifier};
use crate::relationship::RelationshipSync;
use crate::settings::SettingsStore;
use crate::store::{self, DocumentStore};
use std::sync::Arc;
use tracing::info;

/// The people manager: every component over one store.
///
/// Subscribers attach before the first scan so they observe every document.
pub struct PeopleService {
    settings: SettingsStore,
    indexer: PeopleIndexer,
    cache: Arc<PeopleCache>,
    relationships: RelationshipSync,
    scheduler: NotificationScheduler,
    enabled: tokio::sync::Mutex<bool>,
}

impl PeopleService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        settings: SettingsStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_indexer_config(store, settings, notifier, IndexerConfig::default())
    }

    pub fn with_indexer_config(
        store: Arc<dyn DocumentStore>,
        settings: SettingsStore,
        notifier: Arc<dyn Notifier>,
        config: IndexerConfig,
    ) -> Self {
        let indexer = PeopleIndexer::with_config(store.clone(), settings.clone(), config);
        let cache = Arc::new(PeopleCache::new(settings.clone()));
        let relationships = RelationshipSync::new(store, settings.clone());
        let scheduler = NotificationScheduler::new(
            cache.clone(),
            settings.clone(),
            notifier,
            indexer.indexing_complete(),
        );

        Self {
            settings,
            indexer,
            cache,
            relationships,
            scheduler,
            enabled: tokio::sync::Mutex::new(false),
        }
    }

    /// Build the service and enable it unless settings disable it.
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        settings: SettingsStore,
        notifier: Arc<dyn Notifier>,
    ) -> store::Result<Self> {
        let service = Self::new(store, settings, notifier);
        if service.settings.current().enabled {
            service.enable().await?;
        } else {
            info!("People manager is disabled in settings");
        }
        Ok(service)
    }

    /// Attach subscribers, scan, then start notifications. Idempotent.
    pub async fn enable(&self) -> store::Result<()> {
        let mut enabled = self.enabled.lock().await;
        if *enabled {
            return Ok(());
        }

        self.cache.attach(self.indexer.events());
        self.relationships.attach(self.indexer.events());
        if let Err(e) = self.indexer.start().await {
            self.relationships.detach();
            self.cache.detach();
            return Err(e);
        }
        self.scheduler.start();

        *enabled = true;
        info!("People manager enabled with {} people", self.cache.len());
        Ok(())
    }

    /// Tear down in reverse order of `enable`.
    pub async fn disable(&self) {
        let mut enabled = self.enabled.lock().await;
        if !*enabled {
            return;
        }

        self.scheduler.shutdown();
        self.indexer.stop().await;
        self.relationships.detach();
        self.cache.detach();

        *enabled = false;
        info!("People manager disabled");
    }

    /// Alias of `disable` for shutdown paths
    pub async fn stop(&self) {
        self.disable().await;
    }

    pub async fn is_enabled(&self) -> bool {
        *self.enabled.lock().await
    }

    pub async fn resync(&self) -> store::Result<usize> {
        self.indexer.resync().await
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn indexer(&self) -> &PeopleIndexer {
        &self.indexer
    }

    pub fn cache(&self) -> &Arc<PeopleCache> {
        &self.cache
    }

    pub fn relationships(&self) -> &RelationshipSync {
        &self.relationships
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.scheduler
    }
}
