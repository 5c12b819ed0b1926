//! Parser for Obsidian-style wiki link references stored in frontmatter values.
//!
//! A frontmatter property such as `relationship: "[[People/Bob|Bobby]]"` holds a
//! single reference rather than free text. This crate turns that value into a
//! [`WikiLink`] and renders links back into the bracket syntax.
//!
//! Supports:
//! - Basic links: `[[Note]]`
//! - Aliases: `[[Note|Display Text]]`
//! - Headers: `[[Note#Header]]`
//! - Block references: `[[Note#^block-id]]`
//! - Paths: `[[folder/Note]]`, `[[folder/Note.md]]`
//! - Bare values without brackets: `Note`, `folder/Note`

use serde::{Deserialize, Serialize};

/// Extension recognized on link targets. Other dots stay part of the name
/// ("Dr. Who" is a note called `Dr. Who`, not `Dr` with extension ` Who`).
const MARKDOWN_EXTENSION: &str = "md";

/// A parsed wiki link reference.
///
/// Field naming follows Rust's `std::path::Path` conventions where applicable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiLink {
    /// The note name without path or extension: "Note"
    pub name: String,
    /// The parent directory path: "People/Friends" or None for a bare name
    pub parent: Option<String>,
    /// Whether the target was written with an explicit `.md` extension
    pub has_extension: bool,
    /// Header reference if present: "Header Section"
    pub header: Option<String>,
    /// Block ID if present: "block-123"
    pub block_id: Option<String>,
    /// Display alias if present: "Bobby"
    pub alias: Option<String>,
}

impl WikiLink {
    /// Parse a single link reference such as a frontmatter value.
    ///
    /// Surrounding whitespace and one pair of `[[ ]]` brackets are stripped.
    /// Returns `None` when nothing remains to name a note.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let inner = trimmed.strip_prefix("[[").unwrap_or(trimmed);
        let inner = inner.strip_suffix("]]").unwrap_or(inner);

        let (target, alias) = match inner.split_once('|') {
            Some((target, alias)) => {
                let alias = alias.trim();
                (target, (!alias.is_empty()).then(|| alias.to_string()))
            }
            None => (inner, None),
        };

        let (path_part, header, block_id) = parse_fragment(target);
        let (parent, name, has_extension) = parse_path(path_part);

        if name.is_empty() {
            return None;
        }

        Some(Self {
            name,
            parent,
            has_extension,
            header,
            block_id,
            alias,
        })
    }

    /// Build a plain link to a note by name: `[[Name]]`.
    pub fn to_note(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            has_extension: false,
            header: None,
            block_id: None,
            alias: None,
        }
    }

    /// Returns the link path used for resolution, without fragment or alias:
    /// "People/Bob" or "Bob". A written `.md` extension is kept.
    pub fn path(&self) -> String {
        let file_name = if self.has_extension {
            format!("{}.{}", self.name, MARKDOWN_EXTENSION)
        } else {
            self.name.clone()
        };
        match &self.parent {
            Some(parent) => format!("{}/{}", parent, file_name),
            None => file_name,
        }
    }

    /// Returns alias if present, otherwise the name
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl std::fmt::Display for WikiLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[[{}", self.path())?;
        if let Some(block_id) = &self.block_id {
            write!(f, "#^{}", block_id)?;
        } else if let Some(header) = &self.header {
            write!(f, "#{}", header)?;
        }
        if let Some(alias) = &self.alias {
            write!(f, "|{}", alias)?;
        }
        write!(f, "]]")
    }
}

/// Parse a target string to extract the path and any fragment (header or block reference)
/// Returns (path_part, header, block_id)
fn parse_fragment(target: &str) -> (&str, Option<String>, Option<String>) {
    if let Some((path_part, block_id)) = target.split_once("#^") {
        return (path_part, None, Some(block_id.trim().to_string()));
    }

    if let Some((path_part, header)) = target.split_once('#') {
        return (path_part, Some(header.trim().to_string()), None);
    }

    (target, None, None)
}

/// Parse a path string into parent, name, and whether a `.md` extension was present
fn parse_path(path: &str) -> (Option<String>, String, bool) {
    let path = path.trim().trim_matches('/');

    let (parent, file_name) = match path.rsplit_once('/') {
        Some((parent, file_name)) => {
            let parent = parent.trim();
            ((!parent.is_empty()).then(|| parent.to_string()), file_name.trim())
        }
        None => (None, path),
    };

    match file_name.strip_suffix(".md") {
        Some(stem) => (parent, stem.to_string(), true),
        None => (parent, file_name.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_link() {
        let link = WikiLink::parse("[[Bob]]").unwrap();

        assert_eq!(link.name, "Bob");
        assert_eq!(link.parent, None);
        assert!(!link.has_extension);
        assert_eq!(link.path(), "Bob");
    }

    #[test]
    fn parse_link_with_alias() {
        let link = WikiLink::parse("[[Bob|Bobby]]").unwrap();

        assert_eq!(link.name, "Bob");
        assert_eq!(link.alias, Some("Bobby".to_string()));
        assert_eq!(link.display_name(), "Bobby");
        assert_eq!(link.path(), "Bob");
    }

    #[test]
    fn parse_link_with_path_and_extension() {
        let link = WikiLink::parse("[[People/Friends/Bob.md]]").unwrap();

        assert_eq!(link.name, "Bob");
        assert_eq!(link.parent, Some("People/Friends".to_string()));
        assert!(link.has_extension);
        assert_eq!(link.path(), "People/Friends/Bob.md");
    }

    #[test]
    fn parse_link_with_header_drops_fragment_from_path() {
        let link = WikiLink::parse("[[Bob#Contact]]").unwrap();

        assert_eq!(link.header, Some("Contact".to_string()));
        assert_eq!(link.path(), "Bob");
    }

    #[test]
    fn parse_link_with_block_reference() {
        let link = WikiLink::parse("[[Bob#^intro]]").unwrap();

        assert_eq!(link.block_id, Some("intro".to_string()));
        assert_eq!(link.header, None);
    }

    #[test]
    fn parse_bare_value_without_brackets() {
        let link = WikiLink::parse("  People/Bob ").unwrap();

        assert_eq!(link.name, "Bob");
        assert_eq!(link.parent, Some("People".to_string()));
    }

    #[test]
    fn dots_in_names_are_not_extensions() {
        let link = WikiLink::parse("[[Dr. Jane Doe]]").unwrap();

        assert_eq!(link.name, "Dr. Jane Doe");
        assert!(!link.has_extension);
    }

    #[test]
    fn empty_references_parse_to_none() {
        assert_eq!(WikiLink::parse(""), None);
        assert_eq!(WikiLink::parse("[[]]"), None);
        assert_eq!(WikiLink::parse("  [[ ]] "), None);
        assert_eq!(WikiLink::parse("[[|Alias]]"), None);
    }

    #[test]
    fn empty_alias_is_ignored() {
        let link = WikiLink::parse("[[Bob|]]").unwrap();
        assert_eq!(link.alias, None);
    }

    #[test]
    fn display_renders_bracket_syntax() {
        assert_eq!(WikiLink::to_note("Alice").to_string(), "[[Alice]]");

        let link = WikiLink::parse("[[People/Bob.md#Notes|Bobby]]").unwrap();
        assert_eq!(link.to_string(), "[[People/Bob.md#Notes|Bobby]]");
    }
}
