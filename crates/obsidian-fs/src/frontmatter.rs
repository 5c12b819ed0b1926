//! YAML frontmatter parsing for Obsidian notes
//!
//! Parses the YAML frontmatter block at the start of markdown files:
//! ```markdown
//! ---
//! segment: Gym
//! relationship: "[[Bob]]"
//! ---
//!
//! Note content here...
//! ```

use serde_json::Value as JsonValue;

/// Parsed frontmatter as a map of string keys to JSON values.
///
/// JSON values allow flexible typing (strings, numbers, arrays, objects). Keys
/// keep the order they were written in, so rewriting a note keeps the author's layout.
pub type Frontmatter = serde_json::Map<String, JsonValue>;

/// A parsed note with frontmatter separated from content.
///
/// The `content` field borrows from the raw input to avoid unnecessary allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNote<'a> {
    /// The frontmatter key-value pairs, if present and valid
    pub frontmatter: Option<Frontmatter>,
    /// The note content after the frontmatter (borrows from raw)
    pub content: &'a str,
}

/// Split a note into frontmatter YAML string and content, without parsing the YAML.
///
/// Returns (frontmatter_yaml, content) where frontmatter_yaml is None if
/// no valid frontmatter block was found.
pub fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let Some(after_opening) = raw.strip_prefix("---") else {
        return (None, raw);
    };

    // The opening delimiter must be alone on its line
    let content_start = if let Some(rest) = after_opening.strip_prefix('\n') {
        rest
    } else if let Some(rest) = after_opening.strip_prefix("\r\n") {
        rest
    } else {
        return (None, raw);
    };

    let Some(close_pos) = find_closing_delimiter(content_start) else {
        return (None, raw);
    };

    let yaml = &content_start[..close_pos];
    let after_close = &content_start[close_pos + 3..];
    let content = after_close
        .strip_prefix('\n')
        .or_else(|| after_close.strip_prefix("\r\n"))
        .unwrap_or(after_close);

    (Some(yaml), content)
}

/// Find the position of the closing --- delimiter (must be at start of line)
fn find_closing_delimiter(s: &str) -> Option<usize> {
    let mut pos = 0;
    for line in s.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']);
        if bare == "---" {
            return Some(pos);
        }
        pos += line.len();
    }
    None
}

/// Parse a note's raw content into frontmatter and content.
///
/// YAML that fails to parse, or that is not a mapping, yields `frontmatter: None`.
pub fn parse_frontmatter(raw: &str) -> ParsedNote<'_> {
    let (yaml_str, content) = split_frontmatter(raw);

    let frontmatter = yaml_str.and_then(|yaml| {
        serde_yaml::from_str::<serde_yaml::Value>(yaml)
            .ok()
            .and_then(yaml_to_json_map)
    });

    ParsedNote {
        frontmatter,
        content,
    }
}

/// Serialize frontmatter to a YAML string.
///
/// Returns the YAML content without the surrounding `---` delimiters.
pub fn serialize_frontmatter(frontmatter: &Frontmatter) -> Result<String, FrontmatterError> {
    let yaml_map: serde_yaml::Mapping = frontmatter
        .iter()
        .map(|(k, v)| (serde_yaml::Value::String(k.clone()), json_to_yaml(v)))
        .collect();

    serde_yaml::to_string(&yaml_map).map_err(FrontmatterError::SerializationError)
}

/// Build a complete note with frontmatter and content.
///
/// If frontmatter is empty, returns just the content without frontmatter block.
pub fn build_note_with_frontmatter(
    frontmatter: &Frontmatter,
    content: &str,
) -> Result<String, FrontmatterError> {
    if frontmatter.is_empty() {
        return Ok(content.to_string());
    }

    let yaml = serialize_frontmatter(frontmatter)?;
    Ok(format!("---\n{}---\n{}", yaml, content))
}

/// Error type for frontmatter operations
#[derive(Debug)]
pub enum FrontmatterError {
    SerializationError(serde_yaml::Error),
}

impl std::fmt::Display for FrontmatterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrontmatterError::SerializationError(e) => {
                write!(f, "Failed to serialize frontmatter: {}", e)
            }
        }
    }
}

impl std::error::Error for FrontmatterError {}

/// Convert a JSON value to a YAML value
fn json_to_yaml(json: &JsonValue) -> serde_yaml::Value {
    match json {
        JsonValue::Null => serde_yaml::Value::Null,
        JsonValue::Bool(b) => serde_yaml::Value::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_yaml::Value::Number(i.into())
            } else if let Some(f) = n.as_f64() {
                serde_yaml::Value::Number(f.into())
            } else {
                serde_yaml::Value::Null
            }
        }
        JsonValue::String(s) => serde_yaml::Value::String(s.clone()),
        JsonValue::Array(arr) => serde_yaml::Value::Sequence(arr.iter().map(json_to_yaml).collect()),
        JsonValue::Object(obj) => {
            let map: serde_yaml::Mapping = obj
                .iter()
                .map(|(k, v)| (serde_yaml::Value::String(k.clone()), json_to_yaml(v)))
                .collect();
            serde_yaml::Value::Mapping(map)
        }
    }
}

/// Convert a YAML value to a JSON map (for the top-level frontmatter)
fn yaml_to_json_map(yaml: serde_yaml::Value) -> Option<Frontmatter> {
    match yaml {
        serde_yaml::Value::Mapping(map) => {
            let result: Frontmatter = map
                .into_iter()
                .filter_map(|(k, v)| match k {
                    serde_yaml::Value::String(key) => Some((key, yaml_to_json(v))),
                    _ => None,
                })
                .collect();
            (!result.is_empty()).then_some(result)
        }
        _ => None,
    }
}

/// Convert a YAML value to a JSON value
fn yaml_to_json(yaml: serde_yaml::Value) -> JsonValue {
    match yaml {
        serde_yaml::Value::Null => JsonValue::Null,
        serde_yaml::Value::Bool(b) => JsonValue::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::Number(i.into())
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            } else {
                JsonValue::Null
            }
        }
        serde_yaml::Value::String(s) => JsonValue::String(s),
        serde_yaml::Value::Sequence(seq) => JsonValue::Array(seq.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(map) => {
            let obj: serde_json::Map<String, JsonValue> = map
                .into_iter()
                .filter_map(|(k, v)| match k {
                    serde_yaml::Value::String(key) => Some((key, yaml_to_json(v))),
                    _ => None,
                })
                .collect();
            JsonValue::Object(obj)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_note_with_frontmatter() {
        let raw = "---\nsegment: Gym\n---\n\nContent here";
        let (yaml, content) = split_frontmatter(raw);
        assert_eq!(yaml, Some("segment: Gym\n"));
        assert_eq!(content, "\nContent here");
    }

    #[test]
    fn split_note_with_crlf_line_endings() {
        let raw = "---\r\nsegment: Gym\r\n---\r\nBody";
        let (yaml, content) = split_frontmatter(raw);
        assert_eq!(yaml, Some("segment: Gym\r\n"));
        assert_eq!(content, "Body");
    }

    #[test]
    fn split_note_without_frontmatter() {
        let raw = "Just content, no frontmatter";
        let (yaml, content) = split_frontmatter(raw);
        assert!(yaml.is_none());
        assert_eq!(content, raw);
    }

    #[test]
    fn split_note_with_incomplete_frontmatter() {
        let raw = "---\nsegment: Gym\nNo closing delimiter";
        let (yaml, content) = split_frontmatter(raw);
        assert!(yaml.is_none());
        assert_eq!(content, raw);
    }

    #[test]
    fn parse_typed_values() {
        let raw = "---\nsegment: Gym\nlikability: 8\ntold-about-business: true\nrelationship: \"[[Bob]]\"\n---\nBody";
        let fm = parse_frontmatter(raw).frontmatter.unwrap();

        assert_eq!(fm.get("segment"), Some(&JsonValue::String("Gym".into())));
        assert_eq!(fm.get("likability"), Some(&JsonValue::Number(8.into())));
        assert_eq!(fm.get("told-about-business"), Some(&JsonValue::Bool(true)));
        assert_eq!(fm.get("relationship"), Some(&JsonValue::String("[[Bob]]".into())));
    }

    #[test]
    fn parse_invalid_yaml_as_no_frontmatter() {
        let raw = "---\nsegment: [unclosed\n---\nBody";
        let parsed = parse_frontmatter(raw);

        assert!(parsed.frontmatter.is_none());
        assert_eq!(parsed.content, "Body");
    }

    #[test]
    fn parse_empty_frontmatter() {
        let parsed = parse_frontmatter("---\n---\nContent");

        assert!(parsed.frontmatter.is_none());
        assert_eq!(parsed.content, "Content");
    }

    #[test]
    fn build_and_reparse_preserves_values_and_body() {
        let mut fm = Frontmatter::new();
        fm.insert("city".into(), JsonValue::String("Brno".into()));
        fm.insert("urgency".into(), JsonValue::Number(3.into()));

        let note = build_note_with_frontmatter(&fm, "# Alice\n").unwrap();
        assert!(note.starts_with("---\ncity: Brno\nurgency: 3\n---\n"));

        let parsed = parse_frontmatter(&note);
        assert_eq!(parsed.frontmatter, Some(fm));
        assert_eq!(parsed.content, "# Alice\n");
    }

    #[test]
    fn rebuild_keeps_written_key_order() {
        let raw = "---\nzodiac: Leo\ncity: Brno\nmiddle: 1\n---\nBody";
        let mut fm = parse_frontmatter(raw).frontmatter.unwrap();
        fm.insert("added".into(), JsonValue::Bool(true));
        fm.shift_remove("city");

        let note = build_note_with_frontmatter(&fm, "Body").unwrap();
        assert_eq!(note, "---\nzodiac: Leo\nmiddle: 1\nadded: true\n---\nBody");
    }

    #[test]
    fn build_without_frontmatter_returns_content() {
        let note = build_note_with_frontmatter(&Frontmatter::new(), "Body").unwrap();
        assert_eq!(note, "Body");
    }
}
