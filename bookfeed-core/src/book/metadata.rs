//! Normalized book metadata shared by every extractor

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Author of a book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    /// Whitespace-normalized display name
    pub name: String,

    /// Lower-cased sort key (last name unless the format declares one)
    pub sortkey: String,
}

/// Series membership
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeriesInfo {
    pub title: String,

    /// Position as written in the source, e.g. "3" or "2.5"
    pub index: Option<String>,
}

/// Metadata extracted from one mirror's local copy
///
/// Every field starts empty and only the setters below fill it, so each
/// format applies the same normalization: strings are trimmed, blank values
/// are dropped, and the title falls back to the mirror identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedBook {
    /// Local temporary copy
    pub path: PathBuf,

    /// Mirror identifier the copy came from
    pub source: String,

    /// Sniffed container type
    pub mimetype: String,

    pub title: String,

    /// HTML summary
    pub description: Option<String>,

    pub authors: Vec<Author>,

    /// Tags in discovery order, duplicates kept
    pub tags: Vec<String>,

    pub series: Option<SeriesInfo>,

    pub language: Option<String>,

    /// Non-fatal notes collected while parsing
    pub issues: Vec<String>,
}

impl ResolvedBook {
    pub fn new(path: impl AsRef<Path>, source: impl Into<String>, mimetype: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            path: path.as_ref().to_path_buf(),
            title: source.clone(),
            source,
            mimetype: mimetype.into(),
            description: None,
            authors: Vec::new(),
            tags: Vec::new(),
            series: None,
            language: None,
            issues: Vec::new(),
        }
    }

    /// Replace the title unless `title` is blank
    pub fn set_title(&mut self, title: &str) {
        let title = title.trim();
        if !title.is_empty() {
            self.title = title.to_string();
        }
    }

    /// Append an author; blank names are ignored
    pub fn add_author(&mut self, name: &str, sortkey: Option<&str>) {
        let name = normalise_string(name);
        if name.is_empty() {
            return;
        }

        let sortkey = sortkey
            .map(normalise_string)
            .filter(|key| !key.is_empty())
            .or_else(|| name.split(' ').last().map(str::to_string))
            .unwrap_or_default()
            .to_lowercase();

        self.authors.push(Author { name, sortkey });
    }

    /// Append a tag; blank tags are ignored
    pub fn add_tag(&mut self, tag: &str) {
        let tag = tag.trim();
        if !tag.is_empty() {
            self.tags.push(tag.to_string());
        }
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = non_blank(description);
    }

    pub fn set_language(&mut self, language: &str) {
        self.language = non_blank(language);
    }

    /// Set series membership; a blank series title clears it
    pub fn set_series(&mut self, title: &str, index: Option<&str>) {
        self.series = non_blank(title).map(|title| SeriesInfo {
            title,
            index: index.and_then(non_blank),
        });
    }

    pub fn add_issue(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }
}

/// Trim and collapse every whitespace run to a single space
pub fn normalise_string(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_blank(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
