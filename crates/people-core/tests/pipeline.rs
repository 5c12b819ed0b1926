//! End-to-end behaviour of the service over an in-memory vault.

use people_core::{
    IndexerConfig, InMemoryStore, PeopleService, SettingsStore, TracingNotifier,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn fast() -> IndexerConfig {
    IndexerConfig {
        debounce: Duration::ZERO,
        ..IndexerConfig::default()
    }
}

async fn service(store: &Arc<InMemoryStore>, settings: SettingsStore) -> PeopleService {
    let service = PeopleService::with_indexer_config(
        store.clone(),
        settings,
        Arc::new(TracingNotifier),
        fast(),
    );
    service.enable().await.unwrap();
    service
}

/// Poll until `check` holds, failing after about two seconds
async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Let in-flight handlers and echoes settle
async fn settle() {
    sleep(Duration::from_millis(100)).await;
}

fn relationship(store: &InMemoryStore, path: &str) -> Option<JsonValue> {
    store
        .frontmatter(path)
        .and_then(|fm| fm.get("relationship").cloned())
}

#[tokio::test]
async fn linking_writes_one_back_link_and_echo_is_quiet() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "");
    store.insert("People/Bob.md", "# Bob\n");
    let _service = service(&store, SettingsStore::default()).await;

    store.insert("People/Alice.md", "---\nrelationship: \"[[Bob]]\"\n---\n");

    eventually("back link on Bob", || {
        relationship(&store, "People/Bob.md") == Some(json!("[[Alice]]"))
    })
    .await;
    settle().await;

    assert_eq!(store.write_log(), vec!["People/Bob.md".to_string()]);
    let raw = store.raw("People/Bob.md").unwrap();
    assert!(raw.starts_with("---\nrelationship:"));
    assert!(raw.ends_with("---\n# Bob\n"));
}

#[tokio::test]
async fn resync_does_not_repeat_reconciliation() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "");
    store.insert("People/Bob.md", "");
    let service = service(&store, SettingsStore::default()).await;

    store.insert("People/Alice.md", "---\nrelationship: \"[[Bob]]\"\n---\n");
    eventually("back link on Bob", || relationship(&store, "People/Bob.md").is_some()).await;
    settle().await;

    service.resync().await.unwrap();
    settle().await;

    assert_eq!(store.write_log().len(), 1);
}

#[tokio::test]
async fn retargeting_writes_exactly_two_compensations() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "");
    store.insert("People/Bob.md", "");
    store.insert("People/Carol.md", "");
    let _service = service(&store, SettingsStore::default()).await;

    store.insert("People/Alice.md", "---\nrelationship: \"[[Bob]]\"\n---\n");
    eventually("back link on Bob", || relationship(&store, "People/Bob.md").is_some()).await;
    settle().await;

    store.insert("People/Alice.md", "---\nrelationship: \"[[Carol]]\"\n---\n");
    eventually("back link on Carol", || {
        relationship(&store, "People/Carol.md") == Some(json!("[[Alice]]"))
    })
    .await;
    settle().await;

    assert_eq!(relationship(&store, "People/Bob.md"), None);
    assert_eq!(
        relationship(&store, "People/Alice.md"),
        Some(json!("[[Carol]]"))
    );
    assert_eq!(
        store.write_log(),
        vec![
            "People/Bob.md".to_string(),
            "People/Bob.md".to_string(),
            "People/Carol.md".to_string(),
        ]
    );
}

#[tokio::test]
async fn missing_target_gets_no_retroactive_back_link() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "");
    let _service = service(&store, SettingsStore::default()).await;

    store.insert("People/Alice.md", "---\nrelationship: \"[[Carol]]\"\n---\n");
    settle().await;
    store.insert("People/Carol.md", "");
    settle().await;

    assert!(store.write_log().is_empty());
    assert_eq!(relationship(&store, "People/Carol.md"), None);
}

#[tokio::test]
async fn rename_replaces_cache_entry() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "---\nsegment: Gym\n---\n");
    let service = service(&store, SettingsStore::default()).await;
    let cache = service.cache().clone();

    store.rename("People/Alice.md", "People/Alicia.md").unwrap();
    eventually("renamed entry", || cache.get("Alicia").is_some()).await;

    assert!(cache.get("Alice").is_none());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("Alicia").unwrap().path, "People/Alicia.md");
    assert_eq!(cache.by_segment("Gym").len(), 1);
}

#[tokio::test]
async fn moving_out_of_scope_removes_person() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "");
    store.insert("People/Bob.md", "");
    let service = service(&store, SettingsStore::default()).await;
    let cache = service.cache().clone();

    store.rename("People/Bob.md", "Archive/Bob.md").unwrap();
    eventually("Bob removed", || cache.get("Bob").is_none()).await;

    store.remove("People/Alice.md").unwrap();
    eventually("Alice removed", || cache.is_empty()).await;
}

#[tokio::test]
async fn empty_scope_indexes_whole_vault() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("Alice.md", "");
    store.insert("People/Bob.md", "");
    store.insert("Deep/Nested/Carol.md", "");
    store.insert("notes.txt", "");
    let settings = SettingsStore::default();
    settings.update(|s| s.directory = String::new());

    let service = service(&store, settings).await;

    let mut names: Vec<String> = service.cache().all().into_iter().map(|p| p.name).collect();
    names.sort();
    assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
}

#[tokio::test]
async fn changing_scope_resyncs_the_cache() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "");
    store.insert("Team/Bob.md", "");
    let settings = SettingsStore::default();
    let service = service(&store, settings.clone()).await;
    let cache = service.cache().clone();
    assert!(cache.get("Alice").is_some());

    settings.update(|s| s.directory = "Team".to_string());

    eventually("scope switched to Team", || {
        cache.get("Bob").is_some() && cache.get("Alice").is_none()
    })
    .await;
}

#[tokio::test]
async fn follow_up_windows_through_the_service() {
    let store = Arc::new(InMemoryStore::new());
    let now = chrono::Utc::now();
    let soon = (now + chrono::Duration::hours(3)).to_rfc3339();
    let late = (now + chrono::Duration::hours(30)).to_rfc3339();
    store.insert("People/Soon.md", &format!("---\nfollow-up-date-notification: '{soon}'\n---\n"));
    store.insert("People/Late.md", &format!("---\nfollow-up-date-notification: '{late}'\n---\n"));
    store.insert("People/Past.md", "---\nfollow-up-date-notification: 2001-02-03\n---\n");
    store.insert("People/None.md", "");

    let service = service(&store, SettingsStore::default()).await;
    let cache = service.cache();

    let upcoming: Vec<String> = cache.upcoming(24, now).into_iter().map(|p| p.name).collect();
    assert_eq!(upcoming, vec!["Soon"]);
    let overdue: Vec<String> = cache.overdue(now).into_iter().map(|p| p.name).collect();
    assert_eq!(overdue, vec!["Past"]);

    let stats = cache.stats(now);
    assert_eq!((stats.total, stats.upcoming, stats.overdue), (4, 1, 1));

    let summary = service.scheduler().check_at(now);
    assert_eq!((summary.upcoming, summary.overdue), (1, 1));
}

#[tokio::test]
async fn inconsistent_vault_is_indexed_as_found() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "---\nrelationship: \"[[Carol]]\"\n---\n");
    store.insert("People/Bob.md", "---\nrelationship: \"[[Alice]]\"\n---\n");
    store.insert("People/Carol.md", "");
    let service = service(&store, SettingsStore::default()).await;
    settle().await;

    assert!(store.write_log().is_empty());
    assert_eq!(relationship(&store, "People/Carol.md"), None);

    service.resync().await.unwrap();
    settle().await;
    assert!(store.write_log().is_empty());
}

#[tokio::test]
async fn edits_in_inconsistent_vault_settle() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "---\nrelationship: \"[[Carol]]\"\n---\n");
    store.insert("People/Bob.md", "---\nrelationship: \"[[Alice]]\"\n---\n");
    store.insert("People/Carol.md", "");
    let _service = service(&store, SettingsStore::default()).await;

    store.insert("People/Bob.md", "---\nrelationship: \"[[Carol]]\"\n---\n");
    eventually("back link on Carol", || {
        relationship(&store, "People/Carol.md") == Some(json!("[[Bob]]"))
    })
    .await;
    settle().await;
    let writes = store.write_log();
    settle().await;

    assert_eq!(store.write_log(), writes);
    assert_eq!(writes, vec!["People/Carol.md".to_string()]);
    // Alice points at Carol, not Bob, so she keeps her link
    assert_eq!(relationship(&store, "People/Alice.md"), Some(json!("[[Carol]]")));
}

#[tokio::test]
async fn target_with_unparseable_frontmatter_is_not_rewritten() {
    let bob = "---\ncity: Brno\ntags: [a, b\nphone: 123\n---\n# Bob\n";
    let store = Arc::new(InMemoryStore::new());
    store.insert("People/Alice.md", "");
    store.insert("People/Bob.md", bob);
    let service = service(&store, SettingsStore::default()).await;
    assert!(service.cache().get("Bob").is_some());

    store.insert("People/Alice.md", "---\nrelationship: \"[[Bob]]\"\n---\n");
    settle().await;

    assert_eq!(store.raw("People/Bob.md").as_deref(), Some(bob));
    assert!(store.write_log().is_empty());
}
