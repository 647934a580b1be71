//! EPUB extractor implementation

use super::{write_cover, BookFile, Extractor, ResolvedBook};
use crate::error::ParseError;
use crate::mime;
use epub::doc::EpubDoc;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

const ENCRYPTION_ENTRY: &str = "META-INF/encryption.xml";

/// Font obfuscation algorithms; they protect embedded fonts, not the book
const FONT_OBFUSCATION: &[&str] = &[
    "http://www.idpf.org/2008/embedding",
    "http://ns.adobe.com/pdf/enc#RC",
];

/// Extractor for EPUB 2/3 format
pub struct EpubExtractor;

impl EpubExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Fill `book` from the package metadata
    fn read_metadata(&self, doc: &EpubDoc<BufReader<File>>, book: &mut ResolvedBook) {
        // Helper to get metadata value as string
        let get_meta = |key: &str| -> Option<String> { doc.mdata(key).map(|item| item.value.clone()) };

        // Helper to get all metadata values for a key
        let get_meta_all = |key: &str| -> Vec<String> {
            doc.metadata
                .iter()
                .filter(|item| item.property == key)
                .map(|item| item.value.clone())
                .collect()
        };

        if let Some(title) = get_meta("title") {
            book.set_title(&title);
        }
        for creator in get_meta_all("creator") {
            book.add_author(&creator, None);
        }
        for subject in get_meta_all("subject") {
            book.add_tag(&subject);
        }
        if let Some(description) = get_meta("description") {
            book.set_description(&description);
        }
        if let Some(language) = get_meta("language") {
            book.set_language(&language);
        }

        // calibre writes EPUB 2 <meta name="calibre:series"> pairs; EPUB 3
        // packages declare a collection instead
        if let Some(series) = get_meta("calibre:series").or_else(|| get_meta("belongs-to-collection")) {
            let index = get_meta("calibre:series_index").or_else(|| get_meta("group-position"));
            book.set_series(&series, index.as_deref());
        }
    }
}

impl Default for EpubExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for EpubExtractor {
    fn open(&self, path: &Path, source: &str) -> Result<Box<dyn BookFile>, ParseError> {
        let doc = EpubDoc::new(path).map_err(|e| ParseError::InvalidEpub(e.to_string()))?;

        let mut book = ResolvedBook::new(path, source, mime::EPUB);
        self.read_metadata(&doc, &mut book);

        let encryption = match encryption_method(path) {
            Ok(method) => method,
            Err(e) => {
                book.add_issue(format!("unreadable {}: {}", ENCRYPTION_ENTRY, e));
                None
            }
        };

        Ok(Box::new(EpubFile {
            doc,
            book,
            encryption,
        }))
    }

    fn supported_mime_types(&self) -> &[&str] {
        &[mime::EPUB]
    }
}

struct EpubFile {
    doc: EpubDoc<BufReader<File>>,
    book: ResolvedBook,
    encryption: Option<String>,
}

impl BookFile for EpubFile {
    fn book(&self) -> &ResolvedBook {
        &self.book
    }

    fn extract_cover(&mut self, working_dir: &Path) -> Option<String> {
        let (data, _mime) = self.doc.get_cover()?;
        write_cover(working_dir, &self.book, &data)
    }

    fn encryption_info(&self) -> BTreeMap<String, String> {
        self.encryption
            .iter()
            .map(|method| ("method".to_string(), method.clone()))
            .collect()
    }
}

/// First content encryption algorithm declared by the package, if any
fn encryption_method(path: &Path) -> Result<Option<String>, ParseError> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    let mut declaration = String::new();
    match archive.by_name(ENCRYPTION_ENTRY) {
        Ok(mut entry) => entry.read_to_string(&mut declaration)?,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(declared_algorithm(&declaration))
}

fn declared_algorithm(declaration: &str) -> Option<String> {
    let mut reader = Reader::from_str(declaration);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"EncryptionMethod" =>
            {
                let algorithm = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == b"Algorithm")
                    .and_then(|a| {
                        a.decode_and_unescape_value(reader.decoder())
                            .ok()
                            .map(|v| v.into_owned())
                    });
                if let Some(algorithm) = algorithm {
                    if !FONT_OBFUSCATION.contains(&algorithm.as_str()) {
                        return Some(algorithm);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}
