//! Person records and the typed frontmatter schema of a person note.

use obsidian_fs::Frontmatter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// A value written either as text or as a number (`urgency: 3`, `urgency: high`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrNumber {
    Number(serde_json::Number),
    Text(String),
}

impl TextOrNumber {
    pub fn to_json(&self) -> JsonValue {
        match self {
            TextOrNumber::Number(n) => JsonValue::Number(n.clone()),
            TextOrNumber::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

impl fmt::Display for TextOrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextOrNumber::Number(n) => write!(f, "{}", n),
            TextOrNumber::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A value written either as a boolean or as text (`told-about-business: yes`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrBool {
    Bool(bool),
    Text(String),
}

impl TextOrBool {
    pub fn to_json(&self) -> JsonValue {
        match self {
            TextOrBool::Bool(b) => JsonValue::Bool(*b),
            TextOrBool::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

/// Deserialize a field, dropping it instead of failing when its shape is wrong.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Frontmatter of a person note.
///
/// Recognized keys are typed; every other key is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonFrontmatter {
    // Core identity
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(rename = "original-city", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub original_city: Option<String>,
    #[serde(rename = "born-on", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub born_on: Option<String>,

    // Contact
    #[serde(rename = "first-contact", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub first_contact: Option<String>,
    #[serde(rename = "second-contact", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub second_contact: Option<String>,
    #[serde(rename = "last-contact", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub last_contact: Option<String>,
    #[serde(rename = "contact-channel", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub contact_channel: Option<String>,

    // Business
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "status-business", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status_business: Option<String>,
    #[serde(rename = "told-about-business", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub told_about_business: Option<TextOrBool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub urgency: Option<TextOrNumber>,

    // Relationship metrics
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub likability: Option<TextOrNumber>,
    #[serde(rename = "social-energy", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub social_energy: Option<TextOrNumber>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub reliability: Option<TextOrNumber>,
    #[serde(rename = "relationship-goal", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub relationship_goal: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,

    // Personal attributes
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub ambitions: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub dreams: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub interests: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub values: Option<String>,
    #[serde(rename = "personality-type", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub personality_type: Option<String>,

    // Follow-up
    #[serde(rename = "next-step", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(rename = "follow-up-date-notification", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub follow_up_date_notification: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub dates: Option<String>,

    // Notes
    #[serde(rename = "history-note", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub history_note: Option<String>,

    /// Unrecognized keys, passed through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl PersonFrontmatter {
    /// Validate raw frontmatter field by field.
    ///
    /// A recognized key with a value of the wrong shape is dropped; nothing here fails.
    pub fn sanitize(raw: &Frontmatter) -> Self {
        let object: serde_json::Map<String, JsonValue> =
            raw.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        serde_json::from_value(JsonValue::Object(object)).unwrap_or_default()
    }

    /// Look up a property by its frontmatter key.
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        let text = |value: &Option<String>| value.clone().map(JsonValue::String);
        match key {
            "segment" => text(&self.segment),
            "city" => text(&self.city),
            "original-city" => text(&self.original_city),
            "born-on" => text(&self.born_on),
            "first-contact" => text(&self.first_contact),
            "second-contact" => text(&self.second_contact),
            "last-contact" => text(&self.last_contact),
            "contact-channel" => text(&self.contact_channel),
            "position" => text(&self.position),
            "status" => text(&self.status),
            "status-business" => text(&self.status_business),
            "told-about-business" => self.told_about_business.as_ref().map(TextOrBool::to_json),
            "urgency" => self.urgency.as_ref().map(TextOrNumber::to_json),
            "likability" => self.likability.as_ref().map(TextOrNumber::to_json),
            "social-energy" => self.social_energy.as_ref().map(TextOrNumber::to_json),
            "reliability" => self.reliability.as_ref().map(TextOrNumber::to_json),
            "relationship-goal" => text(&self.relationship_goal),
            "relationship" => text(&self.relationship),
            "ambitions" => text(&self.ambitions),
            "dreams" => text(&self.dreams),
            "interests" => text(&self.interests),
            "values" => text(&self.values),
            "personality-type" => text(&self.personality_type),
            "next-step" => text(&self.next_step),
            "follow-up-date-notification" => text(&self.follow_up_date_notification),
            "dates" => text(&self.dates),
            "history-note" => text(&self.history_note),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// Look up a property holding text
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A person note as held by the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    /// File name without `.md`; the cache key
    pub name: String,
    pub path: String,
    pub frontmatter: PersonFrontmatter,
    /// Modification time in milliseconds since epoch
    pub mtime_millis: u64,
    /// Parent folder, `""` at the vault root
    pub folder: String,
}

impl Person {
    /// Build a record from a document revision. `None` if the path has no note name.
    pub fn new(path: &str, frontmatter: PersonFrontmatter, mtime_millis: u64) -> Option<Self> {
        let name = obsidian_fs::note_name(path)?;
        Some(Self {
            name: name.to_string(),
            path: path.to_string(),
            frontmatter,
            mtime_millis,
            folder: obsidian_fs::parent_folder(path).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: JsonValue) -> Frontmatter {
        match value {
            JsonValue::Object(map) => map.into_iter().collect(),
            _ => Frontmatter::new(),
        }
    }

    #[test]
    fn sanitize_keeps_typed_fields() {
        let fm = PersonFrontmatter::sanitize(&raw(json!({
            "segment": "Gym",
            "urgency": 3,
            "likability": "high",
            "told-about-business": true,
            "relationship": "[[Bob]]",
        })));

        assert_eq!(fm.segment.as_deref(), Some("Gym"));
        assert_eq!(fm.urgency, Some(TextOrNumber::Number(3.into())));
        assert_eq!(fm.likability, Some(TextOrNumber::Text("high".into())));
        assert_eq!(fm.told_about_business, Some(TextOrBool::Bool(true)));
        assert_eq!(fm.relationship.as_deref(), Some("[[Bob]]"));
        assert!(fm.extra.is_empty());
    }

    #[test]
    fn sanitize_drops_wrongly_shaped_fields_only() {
        let fm = PersonFrontmatter::sanitize(&raw(json!({
            "city": 42,
            "urgency": ["a", "b"],
            "segment": "Warm",
        })));

        assert_eq!(fm.city, None);
        assert_eq!(fm.urgency, None);
        assert_eq!(fm.segment.as_deref(), Some("Warm"));
        assert!(fm.extra.is_empty());
    }

    #[test]
    fn unknown_keys_pass_through() {
        let fm = PersonFrontmatter::sanitize(&raw(json!({
            "favorite-food": "pho",
            "tags": ["friend", "climbing"],
        })));

        assert_eq!(fm.extra.get("favorite-food"), Some(&json!("pho")));
        assert_eq!(fm.get("tags"), Some(json!(["friend", "climbing"])));
    }

    #[test]
    fn get_by_frontmatter_key() {
        let fm = PersonFrontmatter::sanitize(&raw(json!({
            "status-business": "Prospect",
            "reliability": 7,
        })));

        assert_eq!(fm.get("status-business"), Some(json!("Prospect")));
        assert_eq!(fm.get("reliability"), Some(json!(7)));
        assert_eq!(fm.get_str("reliability"), None);
        assert_eq!(fm.get("city"), None);
    }

    #[test]
    fn serializes_back_to_frontmatter_keys() {
        let fm = PersonFrontmatter::sanitize(&raw(json!({
            "next-step": "Call",
            "custom": 1,
        })));
        let value = serde_json::to_value(&fm).unwrap();
        assert_eq!(value, json!({"next-step": "Call", "custom": 1}));
    }

    #[test]
    fn person_derives_name_and_folder() {
        let person = Person::new("People/Friends/Alice.md", PersonFrontmatter::default(), 5).unwrap();
        assert_eq!(person.name, "Alice");
        assert_eq!(person.folder, "People/Friends");

        let root = Person::new("Alice.md", PersonFrontmatter::default(), 5).unwrap();
        assert_eq!(root.folder, "");
    }
}
