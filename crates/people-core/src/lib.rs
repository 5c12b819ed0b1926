//! Personal CRM over a vault of markdown notes.
//!
//! Person notes are indexed from a directory of the vault, cached in memory,
//! and kept consistent: a relationship link on one person is mirrored on the
//! other. A scheduler turns follow-up dates into notices.
//!
//! Data flows one way: `DocumentStore` changes feed the `Indexer`, whose
//! `PersonEvent`s feed the `PeopleCache` and `RelationshipSync`. The
//! reconciler writes back through the store.

pub mod cache;
pub mod diff;
pub mod events;
pub mod guard;
pub mod indexer;
pub mod notifications;
pub mod person;
pub mod relationship;
pub mod service;
pub mod settings;
pub mod store;

pub use cache::{parse_follow_up_date, PeopleCache, PeopleSnapshot, PeopleStats};
pub use diff::{compute_diff, ChangeType, FrontmatterChange, FrontmatterDiff};
pub use events::{EventBus, Subscription};
pub use guard::{SyncGuard, SyncGuardSet};
pub use indexer::{
    Indexer, IndexerConfig, IndexerEvent, IndexerEventKind, PeopleIndexer, PersonEvent,
    PersonEventKind, PersonSource,
};
pub use notifications::{CheckSummary, Notice, NotificationScheduler, Notifier, TracingNotifier};
pub use obsidian_fs::Frontmatter;
pub use person::{Person, PersonFrontmatter, TextOrBool, TextOrNumber};
pub use relationship::{RelationshipSync, SkipReason, SyncOutcome, SyncReport};
pub use service::PeopleService;
pub use settings::{ConfigError, PropertySettings, Settings, SettingsStore};
pub use store::{
    Document, DocumentStore, FrontmatterMutator, InMemoryStore, StoreChange, StoreChangeKind,
    StoreError,
};
