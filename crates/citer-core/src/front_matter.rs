//! Bibliography discovery from document front matter
//!
//! A document can name its own bibliography in a YAML block:
//!
//! ```text
//! ---
//! title: Notes
//! bibliography: refs/paper.bib
//! ---
//! ```
//!
//! The block may also be closed by `...`. The path is resolved against the
//! folder of the document (symlinks followed).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref FRONT_MATTER: Regex = Regex::new(r"(?ms)^---$.*?((^---$)|(^\.\.\.$))").unwrap();
    static ref BIBLIOGRAPHY_KEY: Regex = Regex::new(r"(?m)^bibliography:").unwrap();
    static ref FIRST_TOKEN: Regex = Regex::new(r"\S+").unwrap();
}

/// The raw `bibliography:` value of the first front-matter block
pub fn bibliography_value(text: &str) -> Option<&str> {
    let block = FRONT_MATTER.find(text)?.as_str();
    let key = BIBLIOGRAPHY_KEY.find(block)?;
    let token = FIRST_TOKEN.find(&block[key.end()..])?.as_str();
    let token = token.trim_matches(|c| c == '"' || c == '\'');
    (!token.is_empty()).then_some(token)
}

/// Resolve the front-matter bibliography of `document` holding `text`
pub fn discover_bibliography(document: &Path, text: &str) -> Option<PathBuf> {
    let value = bibliography_value(text)?;
    let real = fs::canonicalize(document).unwrap_or_else(|_| document.to_path_buf());
    let folder = real.parent().unwrap_or_else(|| Path::new(""));
    Some(folder.join(value))
}

/// Per-document cache keyed on the document's modification time
#[derive(Debug, Clone, Default)]
pub struct FrontMatterCache {
    entries: HashMap<PathBuf, (Option<SystemTime>, Option<PathBuf>)>,
}

impl FrontMatterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached discovery; rescans `text` only when the document's mtime
    /// moved. Unsaved documents (no mtime) are always rescanned.
    pub fn bibliography_for(&mut self, document: &Path, text: &str) -> Option<PathBuf> {
        let modified = fs::metadata(document).and_then(|m| m.modified()).ok();
        if let Some((seen, bibliography)) = self.entries.get(document) {
            if modified.is_some() && *seen == modified {
                return bibliography.clone();
            }
        }
        let bibliography = discover_bibliography(document, text);
        debug!(
            document = %document.display(),
            bibliography = ?bibliography,
            "front matter scanned"
        );
        self.entries
            .insert(document.to_path_buf(), (modified, bibliography.clone()));
        bibliography
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("---\nbibliography: refs.bib\n---\nbody", Some("refs.bib"))]
    #[case("---\ntitle: x\nbibliography:   a/b.bib extra\n...\n", Some("a/b.bib"))]
    #[case("---\nbibliography: \"q.bib\"\n---\n", Some("q.bib"))]
    #[case("---\ntitle: x\n---\nbibliography: late.bib\n", None)]
    #[case("bibliography: plain.bib\n", None)]
    #[case("---\nbibliography: open.bib\n", None)]
    fn test_bibliography_value(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(bibliography_value(text), expected);
    }

    #[test]
    fn test_discover_relative_to_document() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("paper.md");
        fs::write(&doc, "").unwrap();
        let found = discover_bibliography(&doc, "---\nbibliography: refs.bib\n---\n").unwrap();
        assert_eq!(found, fs::canonicalize(dir.path()).unwrap().join("refs.bib"));
    }

    #[test]
    fn test_cache_reuses_result_until_mtime_moves() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("paper.md");
        let first = "---\nbibliography: one.bib\n---\n";
        fs::write(&doc, first).unwrap();
        let mut cache = FrontMatterCache::new();

        let one = cache.bibliography_for(&doc, first).unwrap();
        assert!(one.ends_with("one.bib"));
        // same mtime: the stale text is not rescanned
        let again = cache.bibliography_for(&doc, "---\nbibliography: two.bib\n---\n");
        assert_eq!(again, Some(one));

        let file = fs::OpenOptions::new().write(true).open(&doc).unwrap();
        file.set_modified(SystemTime::now() + std::time::Duration::from_secs(10))
            .unwrap();
        let two = cache.bibliography_for(&doc, "---\nbibliography: two.bib\n---\n");
        assert!(two.unwrap().ends_with("two.bib"));
    }

    #[test]
    fn test_unsaved_document_always_rescanned() {
        let mut cache = FrontMatterCache::new();
        let doc = Path::new("/nonexistent/draft.md");
        assert!(cache.bibliography_for(doc, "no front matter").is_none());
        assert!(cache
            .bibliography_for(doc, "---\nbibliography: x.bib\n---\n")
            .is_some());
    }
}
