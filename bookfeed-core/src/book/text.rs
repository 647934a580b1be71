//! Plain text files carry no metadata; the mirror identifier is the title

use super::{BookFile, Extractor, ResolvedBook};
use crate::error::ParseError;
use crate::mime;
use std::path::Path;

pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

struct PlainTextFile {
    book: ResolvedBook,
}

impl BookFile for PlainTextFile {
    fn book(&self) -> &ResolvedBook {
        &self.book
    }
}

impl Extractor for PlainTextExtractor {
    fn open(&self, path: &Path, source: &str) -> Result<Box<dyn BookFile>, ParseError> {
        Ok(Box::new(PlainTextFile {
            book: ResolvedBook::new(path, source, mime::TEXT),
        }))
    }

    fn supported_mime_types(&self) -> &[&str] {
        &[mime::TEXT]
    }
}
