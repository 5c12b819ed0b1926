//! Bidirectional relationship reconciliation.
//!
//! When person A's relationship property starts pointing at B, B is updated
//! to point back at A. When A stops pointing at B, B's link is cleared if it
//! still points at A. Writes are guarded per path so the reconciler never
//! reacts to its own in-flight writes.
//!
//! Events published by a full scan are not reconciled, and an event is
//! dropped once the source note has moved on to another relationship.

use crate::events::{EventBus, Subscription};
use crate::guard::SyncGuardSet;
use crate::indexer::{PersonEvent, PersonEventKind};
use crate::settings::SettingsStore;
use crate::store::DocumentStore;
use obsidian_fs::Frontmatter;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use wiki_links::WikiLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not a `PersonChanged` event
    NotAChange,
    /// The event carries no frontmatter diff
    NoDiff,
    /// The relationship property is not in the diff
    RelationshipUnchanged,
    /// The document is being written by the reconciler
    SyncInProgress,
    /// Published by a full scan, which records the vault as found
    Baseline,
    /// The source no longer holds the relationship the event moved to
    Stale,
}

/// Targets actually written while handling one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Target whose link back to the source was cleared
    pub removed_from: Option<String>,
    /// Target now linking back to the source
    pub added_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Synced(SyncReport),
}

/// Relationship values that are not non-empty strings count as absent
fn link_text(value: &JsonValue) -> Option<&str> {
    value.as_str().map(str::trim).filter(|text| !text.is_empty())
}

struct SyncInner {
    store: Arc<dyn DocumentStore>,
    settings: SettingsStore,
    guards: SyncGuardSet,
}

impl SyncInner {
    /// Resolve a relationship value written in `context_path` to a document path
    fn resolve(&self, value: &str, context_path: &str) -> Option<String> {
        let link = WikiLink::parse(value)?;
        self.store.resolve_link(&link.path(), context_path)
    }

    async fn handle_event(&self, event: &PersonEvent) -> SyncOutcome {
        if event.kind != PersonEventKind::PersonChanged {
            return SyncOutcome::Skipped(SkipReason::NotAChange);
        }
        if event.baseline {
            return SyncOutcome::Skipped(SkipReason::Baseline);
        }
        let Some(diff) = &event.frontmatter_diff else {
            return SyncOutcome::Skipped(SkipReason::NoDiff);
        };

        let prop = self.settings.current().props.relationship_prop;
        let Some(change) = diff.get(&prop) else {
            return SyncOutcome::Skipped(SkipReason::RelationshipUnchanged);
        };

        let Some(_source_guard) = self.guards.try_acquire(&event.path) else {
            debug!("Skipping {}: relationship sync already in progress", event.path);
            return SyncOutcome::Skipped(SkipReason::SyncInProgress);
        };

        let old_link = change.old_value.as_ref().and_then(link_text);
        let new_link = change.new_value.as_ref().and_then(link_text);
        debug!(
            "Relationship of {} changed: {:?} -> {:?}",
            event.path, old_link, new_link
        );

        if !self.source_holds(&event.path, &prop, new_link).await {
            debug!("Relationship of {} changed again, skipping outdated event", event.path);
            return SyncOutcome::Skipped(SkipReason::Stale);
        }

        let mut report = SyncReport::default();

        if let Some(old_link) = old_link {
            match self.resolve(old_link, &event.path) {
                Some(target) if target != event.path => {
                    report.removed_from = self.remove_back_link(&target, &event.path, &prop).await;
                }
                Some(_) => debug!("Old relationship of {} was a self-link", event.path),
                None => debug!("Old relationship {} of {} does not resolve", old_link, event.path),
            }
        }

        if let Some(new_link) = new_link {
            if report.removed_from.is_some()
                && !self.source_holds(&event.path, &prop, Some(new_link)).await
            {
                debug!("Relationship of {} changed during sync, not linking back", event.path);
                return SyncOutcome::Synced(report);
            }
            match self.resolve(new_link, &event.path) {
                Some(target) => {
                    report.added_to = self.add_back_link(&target, &event.path, &prop).await;
                }
                None => debug!("Relationship {} of {} does not resolve", new_link, event.path),
            }
        }

        SyncOutcome::Synced(report)
    }

    /// Whether `source` currently has `expected` as its relationship link
    async fn source_holds(&self, source: &str, prop: &str, expected: Option<&str>) -> bool {
        match self.store.read(source).await {
            Ok(document) => document.frontmatter.get(prop).and_then(link_text) == expected,
            Err(e) => {
                debug!("Could not re-read {}: {}", source, e);
                false
            }
        }
    }

    /// Clear `target`'s relationship if it still resolves to `source`
    async fn remove_back_link(&self, target: &str, source: &str, prop: &str) -> Option<String> {
        let Some(_guard) = self.guards.try_acquire(target) else {
            debug!("Skipping removal on {}: sync in progress", target);
            return None;
        };

        let store = &self.store;
        let result = self
            .store
            .process_frontmatter(
                target,
                Box::new(move |frontmatter: &mut Frontmatter| {
                    let points_back = frontmatter
                        .get(prop)
                        .and_then(link_text)
                        .and_then(WikiLink::parse)
                        .and_then(|link| store.resolve_link(&link.path(), target))
                        .is_some_and(|resolved| resolved == source);
                    if points_back {
                        frontmatter.shift_remove(prop);
                    }
                }),
            )
            .await;

        match result {
            Ok(true) => {
                debug!("Removed relationship link from {} to {}", target, source);
                Some(target.to_string())
            }
            Ok(false) => {
                debug!("{} no longer links to {}, nothing to remove", target, source);
                None
            }
            Err(e) => {
                warn!("Failed to remove relationship link from {}: {}", target, e);
                None
            }
        }
    }

    /// Point `target`'s relationship at `source`
    async fn add_back_link(&self, target: &str, source: &str, prop: &str) -> Option<String> {
        let Some(_guard) = self.guards.try_acquire(target) else {
            debug!("Skipping back link on {}: sync in progress", target);
            return None;
        };
        let source_name = obsidian_fs::note_name(source)?;

        let link = WikiLink::to_note(source_name).to_string();
        let result = self
            .store
            .process_frontmatter(
                target,
                Box::new(move |frontmatter: &mut Frontmatter| {
                    frontmatter.insert(prop.to_string(), JsonValue::String(link));
                }),
            )
            .await;

        match result {
            Ok(true) => {
                debug!("Linked {} back to {}", target, source);
                Some(target.to_string())
            }
            Ok(false) => {
                debug!("{} already links to {}", target, source);
                None
            }
            Err(e) => {
                warn!("Failed to add relationship link to {}: {}", target, e);
                None
            }
        }
    }
}

/// Keeps relationship links symmetric between person notes.
pub struct RelationshipSync {
    inner: Arc<SyncInner>,
    subscription: Mutex<Option<Subscription>>,
}

impl RelationshipSync {
    pub fn new(store: Arc<dyn DocumentStore>, settings: SettingsStore) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                store,
                settings,
                guards: SyncGuardSet::new(),
            }),
            subscription: Mutex::new(None),
        }
    }

    pub fn guards(&self) -> &SyncGuardSet {
        &self.inner.guards
    }

    /// Handle every person event on its own task of the current runtime.
    pub fn attach(&self, events: &Arc<EventBus<PersonEvent>>) {
        let inner = self.inner.clone();
        let subscription = events.subscribe(move |event: PersonEvent| {
            if event.kind != PersonEventKind::PersonChanged || event.baseline {
                return;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let inner = inner.clone();
                    handle.spawn(async move {
                        inner.handle_event(&event).await;
                    });
                }
                Err(_) => warn!("No async runtime, relationship change of {} ignored", event.path),
            }
        });
        *self.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);
    }

    /// Stop receiving events. Handlers already running finish on their own.
    pub fn detach(&self) {
        self.subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// Reconcile one event and report what was done.
    pub async fn handle_event(&self, event: &PersonEvent) -> SyncOutcome {
        self.inner.handle_event(event).await
    }
}
