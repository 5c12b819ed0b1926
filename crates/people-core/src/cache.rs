//! In-memory cache of person records and the queries derived from it.
//!
//! The cache is fed only by `PersonEvent`s. After every mutation it publishes
//! an immutable snapshot through a `watch` channel; queries run over a
//! snapshot and take `now` explicitly.

use crate::events::{EventBus, Subscription};
use crate::indexer::{PersonEvent, PersonEventKind};
use crate::person::Person;
use crate::settings::SettingsStore;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tracing::debug;

/// Hours ahead counted as "upcoming" in [`PeopleCache::stats`]
pub const STATS_UPCOMING_HOURS: u32 = 24;

pub type PeopleSnapshot = Arc<HashMap<String, Person>>;

/// Counts shown by the stats command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeopleStats {
    pub total: usize,
    pub upcoming: usize,
    pub overdue: usize,
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a follow-up date.
///
/// Accepts RFC 3339 timestamps, naive date-times in local time, and plain
/// dates as midnight UTC.
pub fn parse_follow_up_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight))
}

fn follow_up_date(person: &Person, date_prop: &str) -> Option<DateTime<Utc>> {
    person
        .frontmatter
        .get_str(date_prop)
        .as_deref()
        .and_then(parse_follow_up_date)
}

fn sorted_by_name<'a>(people: impl Iterator<Item = &'a Person>) -> Vec<Person> {
    let mut people: Vec<Person> = people.cloned().collect();
    people.sort_by(|a, b| a.name.cmp(&b.name));
    people
}

/// People whose follow-up date falls within `[now, now + hours]`, soonest first
pub fn upcoming_in(
    people: &HashMap<String, Person>,
    date_prop: &str,
    hours: u32,
    now: DateTime<Utc>,
) -> Vec<Person> {
    let until = now + Duration::hours(i64::from(hours));
    let mut matches: Vec<(DateTime<Utc>, &Person)> = people
        .values()
        .filter_map(|person| follow_up_date(person, date_prop).map(|date| (date, person)))
        .filter(|(date, _)| *date >= now && *date <= until)
        .collect();
    matches.sort_by(|(a_date, a), (b_date, b)| a_date.cmp(b_date).then(a.name.cmp(&b.name)));
    matches.into_iter().map(|(_, person)| person.clone()).collect()
}

/// People whose follow-up date is before `now`, oldest first
pub fn overdue_in(
    people: &HashMap<String, Person>,
    date_prop: &str,
    now: DateTime<Utc>,
) -> Vec<Person> {
    let mut matches: Vec<(DateTime<Utc>, &Person)> = people
        .values()
        .filter_map(|person| follow_up_date(person, date_prop).map(|date| (date, person)))
        .filter(|(date, _)| *date < now)
        .collect();
    matches.sort_by(|(a_date, a), (b_date, b)| a_date.cmp(b_date).then(a.name.cmp(&b.name)));
    matches.into_iter().map(|(_, person)| person.clone()).collect()
}

struct CacheInner {
    people: RwLock<HashMap<String, Person>>,
    snapshot: watch::Sender<PeopleSnapshot>,
}

impl CacheInner {
    fn apply(&self, event: PersonEvent) {
        let mut people = self.people.write().unwrap_or_else(|e| e.into_inner());
        match event.kind {
            PersonEventKind::PersonChanged => {
                let Some(source) = event.source else {
                    return;
                };
                let Some(person) = Person::new(&event.path, source.frontmatter, source.mtime_millis)
                else {
                    return;
                };

                if let Some(old_name) = event.old_path.as_deref().and_then(obsidian_fs::note_name) {
                    let old_path = event.old_path.as_deref();
                    if people.get(old_name).map(|p| p.path.as_str()) == old_path {
                        people.remove(old_name);
                    }
                }
                debug!("Cached person {}", person.name);
                people.insert(person.name.clone(), person);
            }
            PersonEventKind::PersonDeleted => {
                let Some(name) = obsidian_fs::note_name(&event.path) else {
                    return;
                };
                // Another note with the same name may own the key
                if people.get(name).is_none_or(|p| p.path != event.path) {
                    return;
                }
                people.remove(name);
                debug!("Evicted person {}", name);
            }
        }
        self.snapshot.send_replace(Arc::new(people.clone()));
    }
}

/// Cache of person records keyed by note name.
pub struct PeopleCache {
    inner: Arc<CacheInner>,
    settings: SettingsStore,
    subscription: Mutex<Option<Subscription>>,
}

impl PeopleCache {
    pub fn new(settings: SettingsStore) -> Self {
        let (snapshot, _rx) = watch::channel(PeopleSnapshot::default());
        Self {
            inner: Arc::new(CacheInner {
                people: RwLock::new(HashMap::new()),
                snapshot,
            }),
            settings,
            subscription: Mutex::new(None),
        }
    }

    /// Start consuming person events. Replaces any previous subscription.
    pub fn attach(&self, events: &Arc<EventBus<PersonEvent>>) {
        let inner = self.inner.clone();
        let subscription = events.subscribe(move |event| inner.apply(event));
        *self.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);
    }

    /// Stop consuming events and clear the cache.
    pub fn detach(&self) {
        self.subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let mut people = self.inner.people.write().unwrap_or_else(|e| e.into_inner());
        people.clear();
        self.inner.snapshot.send_replace(PeopleSnapshot::default());
    }

    /// Follow snapshot updates
    pub fn subscribe(&self) -> watch::Receiver<PeopleSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> PeopleSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Person> {
        self.snapshot().get(name).cloned()
    }

    /// Every person, sorted by name
    pub fn all(&self) -> Vec<Person> {
        sorted_by_name(self.snapshot().values())
    }

    /// People whose frontmatter `key` equals `value`, sorted by name
    pub fn by_field(&self, key: &str, value: &JsonValue) -> Vec<Person> {
        let snapshot = self.snapshot();
        sorted_by_name(
            snapshot
                .values()
                .filter(|person| person.frontmatter.get(key).as_ref() == Some(value)),
        )
    }

    pub fn by_segment(&self, segment: &str) -> Vec<Person> {
        let key = self.settings.current().props.segment_prop;
        self.by_field(&key, &JsonValue::String(segment.to_string()))
    }

    pub fn by_status(&self, status: &str) -> Vec<Person> {
        let key = self.settings.current().props.status_business_prop;
        self.by_field(&key, &JsonValue::String(status.to_string()))
    }

    pub fn upcoming(&self, hours: u32, now: DateTime<Utc>) -> Vec<Person> {
        let date_prop = self.settings.current().props.follow_up_date_prop;
        upcoming_in(&self.snapshot(), &date_prop, hours, now)
    }

    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<Person> {
        let date_prop = self.settings.current().props.follow_up_date_prop;
        overdue_in(&self.snapshot(), &date_prop, now)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> PeopleStats {
        let snapshot = self.snapshot();
        let date_prop = self.settings.current().props.follow_up_date_prop;
        PeopleStats {
            total: snapshot.len(),
            upcoming: upcoming_in(&snapshot, &date_prop, STATS_UPCOMING_HOURS, now).len(),
            overdue: overdue_in(&snapshot, &date_prop, now).len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::PersonSource;
    use crate::person::PersonFrontmatter;
    use obsidian_fs::Frontmatter;
    use serde_json::json;

    fn changed(path: &str, old_path: Option<&str>, fm: JsonValue) -> PersonEvent {
        let raw: Frontmatter = match fm {
            JsonValue::Object(map) => map.into_iter().collect(),
            _ => Frontmatter::new(),
        };
        PersonEvent {
            kind: PersonEventKind::PersonChanged,
            path: path.into(),
            old_path: old_path.map(String::from),
            source: Some(PersonSource {
                path: path.into(),
                frontmatter: PersonFrontmatter::sanitize(&raw),
                mtime_millis: 1,
                folder: obsidian_fs::parent_folder(path).into(),
            }),
            old_frontmatter: None,
            frontmatter_diff: None,
            baseline: false,
        }
    }

    fn deleted(path: &str) -> PersonEvent {
        PersonEvent {
            kind: PersonEventKind::PersonDeleted,
            path: path.into(),
            old_path: None,
            source: None,
            old_frontmatter: None,
            frontmatter_diff: None,
            baseline: false,
        }
    }

    fn attached() -> (Arc<EventBus<PersonEvent>>, PeopleCache) {
        let bus = Arc::new(EventBus::new());
        let cache = PeopleCache::new(SettingsStore::default());
        cache.attach(&bus);
        (bus, cache)
    }

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn changed_then_deleted() {
        let (bus, cache) = attached();
        bus.emit(changed("People/Alice.md", None, json!({"city": "Brno"})));

        let alice = cache.get("Alice").unwrap();
        assert_eq!(alice.path, "People/Alice.md");
        assert_eq!(alice.folder, "People");
        assert_eq!(alice.frontmatter.city.as_deref(), Some("Brno"));

        bus.emit(deleted("People/Alice.md"));
        assert!(cache.get("Alice").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn deleting_unknown_person_is_a_no_op() {
        let (bus, cache) = attached();
        let mut rx = cache.subscribe();
        rx.borrow_and_update();

        bus.emit(deleted("People/Nobody.md"));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn rename_replaces_key_in_one_snapshot() {
        let (bus, cache) = attached();
        bus.emit(changed("People/Alice.md", None, json!({})));

        let mut rx = cache.subscribe();
        rx.borrow_and_update();
        bus.emit(changed("People/Alicia.md", Some("People/Alice.md"), json!({})));

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert!(!snapshot.contains_key("Alice"));
        assert_eq!(snapshot.get("Alicia").unwrap().path, "People/Alicia.md");
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn old_snapshots_are_immutable() {
        let (bus, cache) = attached();
        bus.emit(changed("People/Alice.md", None, json!({})));
        let before = cache.snapshot();

        bus.emit(changed("People/Bob.md", None, json!({})));
        assert_eq!(before.len(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn delete_of_same_named_note_elsewhere_keeps_entry() {
        let (bus, cache) = attached();
        bus.emit(changed("People/Work/Bob.md", None, json!({})));

        bus.emit(deleted("People/Old/Bob.md"));
        assert_eq!(cache.get("Bob").unwrap().path, "People/Work/Bob.md");
    }

    #[test]
    fn detach_clears_and_stops_listening() {
        let (bus, cache) = attached();
        bus.emit(changed("People/Alice.md", None, json!({})));

        cache.detach();
        assert!(cache.is_empty());
        assert_eq!(bus.subscriber_count(), 0);

        bus.emit(changed("People/Bob.md", None, json!({})));
        assert!(cache.is_empty());
    }

    #[test]
    fn field_queries() {
        let (bus, cache) = attached();
        bus.emit(changed("People/Alice.md", None, json!({"segment": "Gym", "status-business": "Prospect"})));
        bus.emit(changed("People/Bob.md", None, json!({"segment": "Gym"})));
        bus.emit(changed("People/Carol.md", None, json!({"segment": "Work", "urgency": 3})));

        let gym: Vec<_> = cache.by_segment("Gym").into_iter().map(|p| p.name).collect();
        assert_eq!(gym, vec!["Alice", "Bob"]);

        let prospects: Vec<_> = cache.by_status("Prospect").into_iter().map(|p| p.name).collect();
        assert_eq!(prospects, vec!["Alice"]);

        assert_eq!(cache.by_field("urgency", &json!(3)).len(), 1);
        assert!(cache.by_field("urgency", &json!("3")).is_empty());
        assert_eq!(cache.all().len(), 3);
    }

    #[test]
    fn configured_property_names_drive_queries() {
        let settings = SettingsStore::default();
        settings.update(|s| s.props.segment_prop = "group".into());
        let bus = Arc::new(EventBus::new());
        let cache = PeopleCache::new(settings);
        cache.attach(&bus);

        bus.emit(changed("People/Alice.md", None, json!({"group": "Gym", "segment": "Work"})));
        assert_eq!(cache.by_segment("Gym").len(), 1);
        assert!(cache.by_segment("Work").is_empty());
    }

    #[test]
    fn time_windows() {
        let (bus, cache) = attached();
        let now = at("2024-06-10T12:00:00Z");

        bus.emit(changed("People/Past.md", None, json!({ "follow-up-date-notification": "2024-06-10T11:59:59Z" })));
        bus.emit(changed("People/Now.md", None, json!({ "follow-up-date-notification": "2024-06-10T12:00:00Z" })));
        bus.emit(changed("People/Edge.md", None, json!({ "follow-up-date-notification": "2024-06-11T12:00:00Z" })));
        bus.emit(changed("People/Later.md", None, json!({ "follow-up-date-notification": "2024-06-11T12:00:01Z" })));
        bus.emit(changed("People/Broken.md", None, json!({ "follow-up-date-notification": "next tuesday" })));
        bus.emit(changed("People/None.md", None, json!({})));

        let upcoming: Vec<_> = cache.upcoming(24, now).into_iter().map(|p| p.name).collect();
        assert_eq!(upcoming, vec!["Now", "Edge"]);

        let overdue: Vec<_> = cache.overdue(now).into_iter().map(|p| p.name).collect();
        assert_eq!(overdue, vec!["Past"]);

        assert_eq!(
            cache.stats(now),
            PeopleStats {
                total: 6,
                upcoming: 2,
                overdue: 1,
            }
        );
    }

    #[test]
    fn zero_hour_window_only_matches_now() {
        let (bus, cache) = attached();
        let now = at("2024-06-10T12:00:00Z");
        bus.emit(changed("People/Now.md", None, json!({"follow-up-date-notification": "2024-06-10T12:00:00Z"})));
        bus.emit(changed("People/Soon.md", None, json!({"follow-up-date-notification": "2024-06-10T12:30:00Z"})));

        let upcoming: Vec<_> = cache.upcoming(0, now).into_iter().map(|p| p.name).collect();
        assert_eq!(upcoming, vec!["Now"]);
    }

    #[test]
    fn parse_date_formats() {
        assert_eq!(
            parse_follow_up_date("2024-06-10T12:00:00+02:00"),
            Some(at("2024-06-10T10:00:00Z"))
        );
        assert_eq!(parse_follow_up_date("2024-06-10"), Some(at("2024-06-10T00:00:00Z")));

        let naive = NaiveDateTime::parse_from_str("2024-06-10 09:30", "%Y-%m-%d %H:%M").unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc));
        assert_eq!(parse_follow_up_date("2024-06-10 09:30"), expected);
        assert_eq!(parse_follow_up_date("2024-06-10T09:30"), expected);

        assert_eq!(parse_follow_up_date("soon"), None);
        assert_eq!(parse_follow_up_date(""), None);
    }
}
