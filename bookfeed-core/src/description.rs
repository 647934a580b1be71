//! Catalog description parser
//!
//! The description is a line-oriented file: blank lines and `#` comments are
//! skipped, `[feed]` comes first and holds `key = value` feed attributes, and
//! each following `[book]` lists the mirrors of one book as `url = ...` lines.
//!
//! ```text
//! [feed]
//! id = urn:example:catalog
//! title = Public domain classics
//!
//! [book]
//! url = https://mirror-a.example.org/alice.epub
//! url = https://mirror-b.example.org/alice.epub
//! ```

use crate::error::DescriptionError;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Feed-level attributes, exactly as written in the `[feed]` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedInfo {
    values: BTreeMap<String, String>,
}

impl FeedInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Mirrors of one book, most preferred first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookEntry {
    pub mirrors: Vec<String>,
}

/// A parsed description file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDescription {
    pub feed: FeedInfo,

    /// Book sections that named at least one mirror, in file order
    pub books: Vec<BookEntry>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Feed,
    Book,
}

/// `[name]` section header
#[allow(clippy::expect_used)]
static SECTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(.+)\]$").expect("section pattern is valid"));

/// Parse a description file's contents
pub fn parse_description(content: &str) -> Result<CatalogDescription, DescriptionError> {
    let mut description = CatalogDescription::default();
    let mut section: Option<Section> = None;
    let mut current = BookEntry::default();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(captures) = SECTION_PATTERN.captures(line) {
            let name = &captures[1];
            section = Some(match (section, name) {
                (None, "feed") => Section::Feed,
                (None, _) => return Err(DescriptionError::FirstSectionNotFeed { line: line_no }),
                (Some(_), "feed") => return Err(DescriptionError::DuplicateFeed { line: line_no }),
                (Some(_), "book") => Section::Book,
                (Some(_), _) => {
                    return Err(DescriptionError::UnknownSection {
                        line: line_no,
                        name: name.to_string(),
                    })
                }
            });
            close_entry(&mut description, &mut current);
            continue;
        }

        let (key, value) = match line.split('=').collect::<Vec<_>>().as_slice() {
            [key, value] => (key.trim(), value.trim()),
            _ => return Err(DescriptionError::InvalidLine { line: line_no }),
        };

        match section {
            None => return Err(DescriptionError::FirstSectionNotFeed { line: line_no }),
            Some(Section::Feed) => description.feed.insert(key, value),
            Some(Section::Book) if key == "url" => current.mirrors.push(value.to_string()),
            Some(Section::Book) => {
                return Err(DescriptionError::UnknownBookKey {
                    line: line_no,
                    key: key.to_string(),
                })
            }
        }
    }

    close_entry(&mut description, &mut current);
    Ok(description)
}

fn close_entry(description: &mut CatalogDescription, current: &mut BookEntry) {
    let entry = std::mem::take(current);
    if !entry.mirrors.is_empty() {
        description.books.push(entry);
    }
}
