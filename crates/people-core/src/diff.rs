//! Per-key diff between two frontmatter revisions.

use obsidian_fs::Frontmatter;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// Change of a single frontmatter key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontmatterChange {
    pub key: String,
    /// `None` when the key was added
    pub old_value: Option<JsonValue>,
    /// `None` when the key was deleted
    pub new_value: Option<JsonValue>,
    pub change_type: ChangeType,
}

/// Keys that differ between two revisions, sorted by key.
///
/// Keys that do not appear are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrontmatterDiff {
    pub changes: Vec<FrontmatterChange>,
}

impl FrontmatterDiff {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FrontmatterChange> {
        self.changes.iter().find(|change| change.key == key)
    }

    pub fn added(&self) -> impl Iterator<Item = &FrontmatterChange> {
        self.of_type(ChangeType::Added)
    }

    pub fn modified(&self) -> impl Iterator<Item = &FrontmatterChange> {
        self.of_type(ChangeType::Modified)
    }

    pub fn deleted(&self) -> impl Iterator<Item = &FrontmatterChange> {
        self.of_type(ChangeType::Deleted)
    }

    fn of_type(&self, change_type: ChangeType) -> impl Iterator<Item = &FrontmatterChange> {
        self.changes
            .iter()
            .filter(move |change| change.change_type == change_type)
    }
}

/// Compute the diff from `old` to `new`, ignoring `excluded_keys`.
///
/// A missing `old` revision makes every key of `new` an addition. An
/// explicit `null` value is distinct from an absent key.
pub fn compute_diff(
    old: Option<&Frontmatter>,
    new: &Frontmatter,
    excluded_keys: &[String],
) -> FrontmatterDiff {
    let empty = Frontmatter::new();
    let old = old.unwrap_or(&empty);

    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    let changes = keys
        .into_iter()
        .filter(|key| !excluded_keys.iter().any(|excluded| excluded == *key))
        .filter_map(|key| {
            let change_type = match (old.get(key), new.get(key)) {
                (None, Some(_)) => ChangeType::Added,
                (Some(_), None) => ChangeType::Deleted,
                (Some(before), Some(after)) if before != after => ChangeType::Modified,
                _ => return None,
            };
            Some(FrontmatterChange {
                key: key.clone(),
                old_value: old.get(key).cloned(),
                new_value: new.get(key).cloned(),
                change_type,
            })
        })
        .collect();

    FrontmatterDiff { changes }
}
