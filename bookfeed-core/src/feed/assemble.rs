//! Feed assembly from feed attributes and resolved books

use super::types::{rel, CatalogFeed, EntryAuthor, FeedAuthor, FeedEntry, FeedLink};
use crate::book::ResolvedBook;
use crate::cover::CoverArtifacts;
use crate::description::FeedInfo;
use crate::ids;
use chrono::{DateTime, FixedOffset};

/// Links of one entry besides its metadata
#[derive(Debug, Clone, Default)]
pub struct EntryLinks {
    pub cover: Option<CoverArtifacts>,

    /// `(mirror url, mime type)` of every usable mirror, in description order
    pub acquisitions: Vec<(String, String)>,
}

/// Build the feed header, returning one warning per missing attribute
pub fn build_header(info: &FeedInfo, updated: DateTime<FixedOffset>) -> (CatalogFeed, Vec<String>) {
    let mut warnings = Vec::new();
    let mut lookup = |key: &str, alias: Option<&str>| -> Option<String> {
        let value = info.get(key).or_else(|| alias.and_then(|alias| info.get(alias)));
        if value.is_none() {
            let message = format!("feed \"{}\" attribute is not specified", key);
            tracing::warn!("{}", message);
            warnings.push(message);
        }
        value.map(str::to_string)
    };

    let id = lookup("id", None);
    let title = lookup("title", None);
    let subtitle = lookup("subtitle", Some("description"));
    let icon = lookup("icon", None);
    let author = FeedAuthor {
        name: lookup("author_name", None),
        uri: lookup("author_uri", None),
        email: lookup("author_email", None),
    };

    let feed = CatalogFeed {
        updated,
        id,
        title,
        subtitle,
        icon,
        author,
        entries: Vec::new(),
    };
    (feed, warnings)
}

/// Build the entry of a resolved book
pub fn build_entry(
    book: &ResolvedBook,
    content_id: &str,
    updated: DateTime<FixedOffset>,
    links: &EntryLinks,
) -> FeedEntry {
    let authors = book
        .authors
        .iter()
        .map(|author| EntryAuthor {
            name: author.name.clone(),
            uri: ids::author_uri(&author.name),
        })
        .collect();

    let mut entry_links = Vec::new();
    if let Some(ref artifacts) = links.cover {
        entry_links.push(FeedLink::new(
            rel::COVER,
            &artifacts.cover.href,
            &artifacts.cover.mime_type,
        ));
        entry_links.push(FeedLink::new(
            rel::THUMBNAIL,
            &artifacts.thumbnail.href,
            &artifacts.thumbnail.mime_type,
        ));
    }
    for (location, mime_type) in &links.acquisitions {
        entry_links.push(FeedLink::new(rel::ACQUISITION_OPEN_ACCESS, location, mime_type));
    }

    FeedEntry {
        id: ids::book_uri(content_id),
        updated,
        title: book.title.clone(),
        language: book.language.clone(),
        series: book.series.as_ref().map(|series| series.title.clone()),
        series_index: book.series.as_ref().and_then(|series| series.index.clone()),
        summary: book.description.clone(),
        authors,
        categories: book.tags.clone(),
        links: entry_links,
    }
}
