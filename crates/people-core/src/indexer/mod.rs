//! Document indexing: the generic change detector and the people-scoped indexer.

pub mod generic;
pub mod people;

pub use generic::{
    FileSource, IncludeFile, Indexer, IndexerConfig, IndexerEvent, IndexerEventKind,
    DEFAULT_DEBOUNCE, DEFAULT_SCAN_CONCURRENCY,
};
pub use people::{PeopleIndexer, PersonEvent, PersonEventKind, PersonSource};
