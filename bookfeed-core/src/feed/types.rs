//! Feed data structures

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// Link relations
pub mod rel {
    /// Open access acquisition
    pub const ACQUISITION_OPEN_ACCESS: &str = "http://opds-spec.org/acquisition/open-access";
    /// Cover image
    pub const COVER: &str = "http://opds-spec.org/cover";
    /// Thumbnail image
    pub const THUMBNAIL: &str = "http://opds-spec.org/thumbnail";
}

// XML namespaces
pub mod ns {
    pub const ATOM: &str = "http://www.w3.org/2005/Atom";
    pub const DC: &str = "http://purl.org/dc/terms/";
    pub const CALIBRE: &str = "http://calibre.kovidgoyal.net/2009/metadata";
}

/// Acquisition feed: header plus one entry per resolved book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFeed {
    /// Last update timestamp
    pub updated: DateTime<FixedOffset>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    /// Icon URL
    pub icon: Option<String>,
    /// Feed author/owner
    pub author: FeedAuthor,
    pub entries: Vec<FeedEntry>,
}

impl CatalogFeed {
    /// Add an entry to the feed
    pub fn add_entry(&mut self, entry: FeedEntry) {
        self.entries.push(entry);
    }
}

/// Feed author information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedAuthor {
    pub name: Option<String>,
    pub uri: Option<String>,
    pub email: Option<String>,
}

impl FeedAuthor {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.uri.is_none() && self.email.is_none()
    }
}

/// One book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// `book:id:{content id}`
    pub id: String,
    pub updated: DateTime<FixedOffset>,
    pub title: String,
    /// Language code
    pub language: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<String>,
    /// HTML summary
    pub summary: Option<String>,
    pub authors: Vec<EntryAuthor>,
    /// Categories/subjects
    pub categories: Vec<String>,
    /// Cover, thumbnail, then one acquisition link per usable mirror
    pub links: Vec<FeedLink>,
}

/// Entry author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAuthor {
    pub name: String,
    /// `author:id:{author id}`
    pub uri: String,
}

/// Atom link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedLink {
    /// Link relation
    pub rel: String,
    /// Target URL
    pub href: String,
    /// MIME type
    pub media_type: String,
}

impl FeedLink {
    /// Create a new link
    pub fn new(rel: impl Into<String>, href: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            media_type: media_type.into(),
        }
    }
}
