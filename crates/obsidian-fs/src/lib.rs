//! Path helpers and frontmatter parsing utilities for Obsidian notes
//!
//! Handles note-name derivation, directory scoping, link-path resolution
//! and YAML frontmatter parsing. These are pure functions with no I/O;
//! stores that own the actual files call into them.

mod frontmatter;

pub use frontmatter::{
    build_note_with_frontmatter, parse_frontmatter, serialize_frontmatter, split_frontmatter,
    Frontmatter, FrontmatterError, ParsedNote,
};

const MARKDOWN_SUFFIX: &str = ".md";

/// Returns the note name for a vault path: the last segment without `.md`.
///
/// `"People/Alice.md"` → `"Alice"`. Returns `None` for an empty name.
pub fn note_name(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let name = file_name.strip_suffix(MARKDOWN_SUFFIX).unwrap_or(file_name);
    (!name.is_empty()).then_some(name)
}

/// Returns the parent folder of a vault path, `""` at the vault root.
pub fn parent_folder(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// Ensure .md extension on note paths
pub fn ensure_markdown_extension(note_path: &str) -> String {
    if note_path.ends_with(MARKDOWN_SUFFIX) {
        note_path.to_string()
    } else {
        format!("{}{}", note_path, MARKDOWN_SUFFIX)
    }
}

/// Normalize a scope directory: surrounding whitespace and slashes are ignored.
pub fn normalize_directory(directory: &str) -> &str {
    directory.trim().trim_matches('/')
}

/// Whether `path` equals `directory` or is nested beneath it.
///
/// An empty directory contains every path. `"People"` contains
/// `"People/Alice.md"` but not `"PeopleArchive/Bob.md"`.
pub fn is_within_directory(path: &str, directory: &str) -> bool {
    let directory = normalize_directory(directory);
    if directory.is_empty() {
        return true;
    }
    match path.strip_prefix(directory) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Priority categories for link resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchPriority {
    /// The link spells out the full vault path
    Exact = 0,
    /// Found relative to the linking note's folder
    SourceFolder = 1,
    /// Matched by trailing path segments elsewhere in the vault
    Other = 2,
}

/// Resolve a link path against a set of known note paths.
///
/// `link_path` is the target part of a wiki link (`"Bob"`, `"People/Bob"`,
/// `"Bob.md"`). Matching is case-insensitive, as in Obsidian. A known path
/// matches when it equals the target or ends with `/<target>`. Among several
/// matches the full-path match wins, then a note next to `source_path`,
/// then the shortest path.
pub fn resolve_link_path<'a, I>(known_paths: I, link_path: &str, source_path: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let link = link_path.trim().trim_start_matches('/');
    if link.is_empty() {
        return None;
    }

    let target = ensure_markdown_extension(link).to_lowercase();
    let suffix = format!("/{}", target);
    let source_folder = parent_folder(source_path).to_lowercase();
    let relative = if source_folder.is_empty() {
        target.clone()
    } else {
        format!("{}/{}", source_folder, target)
    };

    known_paths
        .into_iter()
        .filter_map(|path| {
            let lowered = path.to_lowercase();
            let priority = if lowered == target {
                MatchPriority::Exact
            } else if lowered == relative {
                MatchPriority::SourceFolder
            } else if lowered.ends_with(&suffix) {
                MatchPriority::Other
            } else {
                return None;
            };
            Some((priority, path))
        })
        .min_by(|(a_priority, a), (b_priority, b)| {
            a_priority
                .cmp(b_priority)
                .then(a.len().cmp(&b.len()))
                .then(a.cmp(b))
        })
        .map(|(_, path)| path.to_string())
}

/// Validate that a relative path is safe (no directory traversal)
pub fn validate_relative_path(path: &str) -> Result<String, PathValidationError> {
    let clean_path = path.strip_prefix('/').unwrap_or(path);

    if clean_path.split('/').any(|segment| segment == "..") {
        return Err(PathValidationError::DirectoryTraversal);
    }

    if clean_path.starts_with('/') {
        return Err(PathValidationError::AbsolutePath);
    }

    Ok(clean_path.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathValidationError {
    DirectoryTraversal,
    AbsolutePath,
}

impl std::fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathValidationError::DirectoryTraversal => {
                write!(f, "Path contains directory traversal")
            }
            PathValidationError::AbsolutePath => write!(f, "Path is absolute"),
        }
    }
}

impl std::error::Error for PathValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_name_strips_folder_and_extension() {
        assert_eq!(note_name("People/Alice.md"), Some("Alice"));
        assert_eq!(note_name("Alice.md"), Some("Alice"));
        assert_eq!(note_name("People/Dr. Who.md"), Some("Dr. Who"));
        assert_eq!(note_name("People/.md"), None);
        assert_eq!(note_name(""), None);
    }

    #[test]
    fn parent_folder_of_nested_and_root_paths() {
        assert_eq!(parent_folder("People/Friends/Alice.md"), "People/Friends");
        assert_eq!(parent_folder("Alice.md"), "");
    }

    #[test]
    fn ensure_extension() {
        assert_eq!(ensure_markdown_extension("People/Alice"), "People/Alice.md");
        assert_eq!(ensure_markdown_extension("People/Alice.md"), "People/Alice.md");
    }

    #[test]
    fn directory_containment() {
        assert!(is_within_directory("People/Alice.md", "People"));
        assert!(is_within_directory("People/Friends/Alice.md", "People/"));
        assert!(is_within_directory("People", "People"));
        assert!(!is_within_directory("PeopleArchive/Bob.md", "People"));
        assert!(!is_within_directory("Notes/Alice.md", "People"));
    }

    #[test]
    fn empty_directory_contains_everything() {
        assert!(is_within_directory("Alice.md", ""));
        assert!(is_within_directory("Deep/Nested/Note.md", "  "));
        assert!(is_within_directory("Deep/Nested/Note.md", "/"));
    }

    #[test]
    fn resolve_by_name() {
        let known = ["People/Alice.md", "People/Bob.md", "Notes/Meeting.md"];
        assert_eq!(
            resolve_link_path(known, "Bob", "People/Alice.md"),
            Some("People/Bob.md".to_string())
        );
        assert_eq!(resolve_link_path(known, "Carol", "People/Alice.md"), None);
    }

    #[test]
    fn resolve_full_path_with_or_without_extension() {
        let known = ["People/Bob.md", "Archive/People/Bob.md"];
        assert_eq!(
            resolve_link_path(known, "People/Bob", "Notes/Index.md"),
            Some("People/Bob.md".to_string())
        );
        assert_eq!(
            resolve_link_path(known, "Archive/People/Bob.md", "Notes/Index.md"),
            Some("Archive/People/Bob.md".to_string())
        );
    }

    #[test]
    fn resolve_prefers_source_folder_then_shortest() {
        let known = ["Archive/Old/Bob.md", "Team/Bob.md", "People/Bob.md"];
        assert_eq!(
            resolve_link_path(known, "Bob", "People/Alice.md"),
            Some("People/Bob.md".to_string())
        );
        assert_eq!(
            resolve_link_path(known, "Bob", "Notes/Index.md"),
            Some("Team/Bob.md".to_string())
        );
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let known = ["People/Bob.md"];
        assert_eq!(
            resolve_link_path(known, "bob", "People/Alice.md"),
            Some("People/Bob.md".to_string())
        );
    }

    #[test]
    fn resolve_does_not_match_partial_names() {
        let known = ["People/Bobby.md", "People/Jim Bob.md"];
        assert_eq!(resolve_link_path(known, "Bob", "People/Alice.md"), None);
    }

    #[test]
    fn validate_paths() {
        assert_eq!(validate_relative_path("/People/Alice.md"), Ok("People/Alice.md".to_string()));
        assert_eq!(
            validate_relative_path("People/../../etc/passwd"),
            Err(PathValidationError::DirectoryTraversal)
        );
        assert_eq!(validate_relative_path("People/Mr..md"), Ok("People/Mr..md".to_string()));
    }
}
