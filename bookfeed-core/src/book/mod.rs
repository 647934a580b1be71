//! Book metadata extraction
//!
//! One [`Extractor`] exists per supported container format. Callers pick the
//! extractor from the sniffed MIME type and only ever talk to the opened
//! [`BookFile`], so adding a format means adding a variant and a dispatch
//! entry in [`extractor_for_mime_type`].

mod epub;
mod fb2;
mod metadata;
mod mobi;
mod text;

pub use epub::EpubExtractor;
pub use fb2::{Fb2Extractor, Fb2ZipExtractor};
pub use metadata::{normalise_string, Author, ResolvedBook, SeriesInfo};
pub use mobi::MobiExtractor;
pub use text::PlainTextExtractor;

use crate::error::ParseError;
use crate::mime;
use crate::sniff::Sniffer;
use std::collections::BTreeMap;
use std::path::Path;

/// An opened book file
///
/// Holds whatever the format needs (archive handles, decoded headers) until
/// it is dropped.
pub trait BookFile: Send {
    /// Normalized metadata
    fn book(&self) -> &ResolvedBook;

    /// Write the embedded cover into `working_dir` and return its file name
    ///
    /// Best effort: any failure yields `None`.
    fn extract_cover(&mut self, _working_dir: &Path) -> Option<String> {
        None
    }

    /// Encryption capabilities, e.g. `{"method": "..."}`; empty when clear
    fn encryption_info(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Trait for extracting book metadata from one container format
pub trait Extractor: Send + Sync {
    /// Open the file at `path`; `source` is the title fallback
    fn open(&self, path: &Path, source: &str) -> Result<Box<dyn BookFile>, ParseError>;

    /// Fix up the file in place before it is opened
    fn repair(&self, _path: &Path, _working_dir: &Path) -> Result<(), ParseError> {
        Ok(())
    }

    /// MIME types this extractor supports
    fn supported_mime_types(&self) -> &[&str];
}

/// Get the appropriate extractor for a MIME type
pub fn extractor_for_mime_type(mime_type: &str) -> Option<Box<dyn Extractor>> {
    match mime_type {
        mime::EPUB => Some(Box::new(EpubExtractor::new())),
        mime::FB2 => Some(Box::new(Fb2Extractor::new())),
        mime::FB2_ZIP => Some(Box::new(Fb2ZipExtractor::new())),
        mime::MOBI => Some(Box::new(MobiExtractor::new())),
        mime::TEXT => Some(Box::new(PlainTextExtractor::new())),
        _ => None,
    }
}

/// Classify `path`, repair it if its format needs that, and open it
pub fn open_book(
    sniffer: &Sniffer,
    path: &Path,
    source: &str,
    working_dir: &Path,
) -> Result<Box<dyn BookFile>, ParseError> {
    let mimetype = sniffer.classify(path);
    let extractor = extractor_for_mime_type(&mimetype)
        .ok_or_else(|| ParseError::UnsupportedFormat(mimetype.clone()))?;

    extractor.repair(path, working_dir)?;
    let file = extractor.open(path, source)?;
    for issue in &file.book().issues {
        tracing::debug!("{}: {}", source, issue);
    }
    Ok(file)
}

/// Save cover bytes next to the book copy, named after it
pub(crate) fn write_cover(working_dir: &Path, book: &ResolvedBook, data: &[u8]) -> Option<String> {
    let stem = book.path.file_name()?.to_string_lossy();
    let name = format!("{}.cover", stem);
    match std::fs::write(working_dir.join(&name), data) {
        Ok(()) => Some(name),
        Err(e) => {
            tracing::debug!("Cannot save cover of {}: {}", book.source, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_covers_supported_types() {
        for mime_type in [mime::EPUB, mime::FB2, mime::FB2_ZIP, mime::MOBI, mime::TEXT] {
            let extractor = extractor_for_mime_type(mime_type).unwrap();
            assert!(extractor.supported_mime_types().contains(&mime_type));
        }
        assert!(extractor_for_mime_type(mime::ZIP).is_none());
        assert!(extractor_for_mime_type("application/pdf").is_none());
    }

    #[test]
    fn test_open_unsupported_format() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("0");
        std::fs::write(&path, [0x80u8, 0x81, 0x82, 0x83]).unwrap();

        let result = open_book(&Sniffer::default(), &path, "http://x/0", dir.path());
        assert!(matches!(result, Err(ParseError::UnsupportedFormat(_))));
    }
}
