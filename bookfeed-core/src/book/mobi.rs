//! MOBI/AZW extractor implementation
//!
//! Title and description come from the `mobi` crate. Subjects, every author,
//! language, the cover image and the encryption method are read straight
//! from the Palm database records and the EXTH header, which the crate does
//! not expose.

use super::{write_cover, BookFile, Extractor, ResolvedBook};
use crate::error::ParseError;
use crate::mime;
use mobi::Mobi;
use std::collections::BTreeMap;
use std::path::Path;

/// Palm database header: record count, then 8-byte record entries
const RECORD_COUNT_OFFSET: usize = 76;
const RECORD_LIST_OFFSET: usize = 78;
const RECORD_ENTRY_SIZE: usize = 8;

/// Offsets inside record 0
const ENCRYPTION_OFFSET: usize = 12;
const MOBI_HEADER_OFFSET: usize = 16;
const FIRST_IMAGE_OFFSET: usize = 0x6c;
const EXTH_FLAGS_OFFSET: usize = 0x80;
const EXTH_PRESENT: u32 = 0x40;

/// EXTH record types
const EXTH_AUTHOR: u32 = 100;
const EXTH_SUBJECT: u32 = 105;
const EXTH_COVER_OFFSET: u32 = 201;
const EXTH_LANGUAGE: u32 = 524;

/// Extractor for MOBI/AZW format
pub struct MobiExtractor;

impl MobiExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MobiExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for MobiExtractor {
    fn open(&self, path: &Path, source: &str) -> Result<Box<dyn BookFile>, ParseError> {
        let data = std::fs::read(path)?;

        let mobi = Mobi::new(&data)
            .map_err(|e| ParseError::InvalidMobi(format!("Invalid MOBI file: {:?}", e)))?;

        let mut book = ResolvedBook::new(path, source, mime::MOBI);
        book.set_title(&mobi.title().to_string());
        if let Some(description) = mobi.description().map(|s| s.to_string()) {
            book.set_description(&description);
        }

        let header = match PalmRecords::parse(&data).and_then(|records| MobiHeader::parse(&records)) {
            Some(header) => header,
            None => {
                book.add_issue("MOBI header is incomplete");
                MobiHeader::default()
            }
        };

        let authors = header.exth_strings(EXTH_AUTHOR);
        if authors.is_empty() {
            if let Some(author) = mobi.author().map(|s| s.to_string()) {
                book.add_author(&author, None);
            }
        }
        for author in authors {
            book.add_author(&author, None);
        }
        for subject in header.exth_strings(EXTH_SUBJECT) {
            book.add_tag(&subject);
        }
        if let Some(language) = header.exth_strings(EXTH_LANGUAGE).first() {
            book.set_language(language);
        }

        Ok(Box::new(MobiFile {
            book,
            cover_record: header.cover_record(),
            encryption: header.encryption,
        }))
    }

    fn supported_mime_types(&self) -> &[&str] {
        &[mime::MOBI]
    }
}

struct MobiFile {
    book: ResolvedBook,
    cover_record: Option<usize>,
    encryption: u16,
}

impl BookFile for MobiFile {
    fn book(&self) -> &ResolvedBook {
        &self.book
    }

    fn extract_cover(&mut self, working_dir: &Path) -> Option<String> {
        let index = self.cover_record?;
        let data = std::fs::read(&self.book.path).ok()?;
        let records = PalmRecords::parse(&data)?;
        write_cover(working_dir, &self.book, records.record(index)?)
    }

    fn encryption_info(&self) -> BTreeMap<String, String> {
        let method = match self.encryption {
            0 => return BTreeMap::new(),
            1 => "Old Mobipocket Encryption".to_string(),
            2 => "Mobipocket Encryption".to_string(),
            other => format!("Unknown encryption ({})", other),
        };
        BTreeMap::from([("method".to_string(), method)])
    }
}

fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes(data.get(offset..offset + 2)?.try_into().ok()?))
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_be_bytes(data.get(offset..offset + 4)?.try_into().ok()?))
}

/// Record table of a Palm database
struct PalmRecords<'a> {
    data: &'a [u8],
    offsets: Vec<usize>,
}

impl<'a> PalmRecords<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        let count = be_u16(data, RECORD_COUNT_OFFSET)? as usize;
        let offsets = (0..count)
            .map(|i| be_u32(data, RECORD_LIST_OFFSET + i * RECORD_ENTRY_SIZE).map(|o| o as usize))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { data, offsets })
    }

    fn record(&self, index: usize) -> Option<&'a [u8]> {
        let start = *self.offsets.get(index)?;
        let end = self.offsets.get(index + 1).copied().unwrap_or(self.data.len());
        self.data.get(start..end)
    }
}

/// The parts of record 0 this extractor cares about
#[derive(Debug, Default)]
struct MobiHeader {
    encryption: u16,
    first_image: Option<u32>,
    exth: Vec<(u32, Vec<u8>)>,
}

impl MobiHeader {
    fn parse(records: &PalmRecords) -> Option<Self> {
        let record0 = records.record(0)?;
        let encryption = be_u16(record0, ENCRYPTION_OFFSET)?;

        if record0.get(MOBI_HEADER_OFFSET..MOBI_HEADER_OFFSET + 4)? != b"MOBI" {
            return Some(Self {
                encryption,
                ..Self::default()
            });
        }

        let header_length = be_u32(record0, MOBI_HEADER_OFFSET + 4)? as usize;
        let first_image = be_u32(record0, FIRST_IMAGE_OFFSET).filter(|&i| i != u32::MAX);
        let has_exth = be_u32(record0, EXTH_FLAGS_OFFSET).unwrap_or(0) & EXTH_PRESENT != 0;
        let exth = if has_exth {
            parse_exth(record0.get(MOBI_HEADER_OFFSET + header_length..)?).unwrap_or_default()
        } else {
            Vec::new()
        };

        Some(Self {
            encryption,
            first_image,
            exth,
        })
    }

    fn exth_strings(&self, kind: u32) -> Vec<String> {
        self.exth
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, value)| String::from_utf8_lossy(value).into_owned())
            .collect()
    }

    fn cover_record(&self) -> Option<usize> {
        let offset = self
            .exth
            .iter()
            .find(|(k, _)| *k == EXTH_COVER_OFFSET)
            .and_then(|(_, value)| be_u32(value, 0))?;
        Some(self.first_image? as usize + offset as usize)
    }
}

fn parse_exth(data: &[u8]) -> Option<Vec<(u32, Vec<u8>)>> {
    if data.get(..4)? != b"EXTH" {
        return None;
    }
    let count = be_u32(data, 8)? as usize;
    let mut records = Vec::with_capacity(count.min(256));
    let mut position = 12;
    for _ in 0..count {
        let kind = be_u32(data, position)?;
        let length = be_u32(data, position + 4)? as usize;
        if length < 8 {
            return None;
        }
        let value = data.get(position + 8..position + length)?;
        records.push((kind, value.to_vec()));
        position += length;
    }
    Some(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exth(records: &[(u32, &[u8])]) -> Vec<u8> {
        let body: Vec<u8> = records
            .iter()
            .flat_map(|(kind, value)| {
                let mut record = kind.to_be_bytes().to_vec();
                record.extend_from_slice(&(value.len() as u32 + 8).to_be_bytes());
                record.extend_from_slice(value);
                record
            })
            .collect();
        let mut data = b"EXTH".to_vec();
        data.extend_from_slice(&(body.len() as u32 + 12).to_be_bytes());
        data.extend_from_slice(&(records.len() as u32).to_be_bytes());
        data.extend(body);
        data
    }

    /// Palm database with a MOBI record 0 and one image record
    ///
    /// The record list is followed by the two-byte gap real databases carry,
    /// and the full name sits after the EXTH block.
    fn palm_database(title: &str, exth_data: &[u8], image: &[u8]) -> Vec<u8> {
        let header_length = 0xe8usize;
        let name_offset = MOBI_HEADER_OFFSET + header_length + exth_data.len();
        let mut record0 = vec![0u8; MOBI_HEADER_OFFSET + header_length];
        record0[ENCRYPTION_OFFSET..ENCRYPTION_OFFSET + 2].copy_from_slice(&2u16.to_be_bytes());
        record0[MOBI_HEADER_OFFSET..MOBI_HEADER_OFFSET + 4].copy_from_slice(b"MOBI");
        record0[20..24].copy_from_slice(&(header_length as u32).to_be_bytes());
        record0[0x54..0x58].copy_from_slice(&(name_offset as u32).to_be_bytes());
        record0[0x58..0x5c].copy_from_slice(&(title.len() as u32).to_be_bytes());
        record0[FIRST_IMAGE_OFFSET..FIRST_IMAGE_OFFSET + 4].copy_from_slice(&1u32.to_be_bytes());
        record0[EXTH_FLAGS_OFFSET..EXTH_FLAGS_OFFSET + 4].copy_from_slice(&EXTH_PRESENT.to_be_bytes());
        record0.extend_from_slice(exth_data);
        record0.extend_from_slice(title.as_bytes());

        let mut data = vec![0u8; RECORD_LIST_OFFSET + 2 * RECORD_ENTRY_SIZE + 2];
        data[..4].copy_from_slice(b"book");
        data[60..68].copy_from_slice(b"BOOKMOBI");
        data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 2].copy_from_slice(&2u16.to_be_bytes());
        let first = data.len();
        let second = first + record0.len();
        data[RECORD_LIST_OFFSET..RECORD_LIST_OFFSET + 4].copy_from_slice(&(first as u32).to_be_bytes());
        data[RECORD_LIST_OFFSET + 8..RECORD_LIST_OFFSET + 12]
            .copy_from_slice(&(second as u32).to_be_bytes());
        data.extend(record0);
        data.extend_from_slice(image);
        data
    }

    #[test]
    fn test_reads_exth_records() {
        let exth_data = exth(&[
            (EXTH_AUTHOR, &b"Jules Verne"[..]),
            (EXTH_SUBJECT, &b"Adventure"[..]),
            (EXTH_SUBJECT, &b"Classics"[..]),
            (EXTH_LANGUAGE, &b"fr"[..]),
            (EXTH_COVER_OFFSET, &0u32.to_be_bytes()[..]),
        ]);
        let data = palm_database("Le Tour du monde", &exth_data, b"\xff\xd8cover");
        let records = PalmRecords::parse(&data).unwrap();
        let header = MobiHeader::parse(&records).unwrap();

        assert_eq!(header.encryption, 2);
        assert_eq!(header.exth_strings(EXTH_AUTHOR), vec!["Jules Verne"]);
        assert_eq!(header.exth_strings(EXTH_SUBJECT), vec!["Adventure", "Classics"]);
        assert_eq!(header.exth_strings(EXTH_LANGUAGE), vec!["fr"]);
        assert_eq!(header.cover_record(), Some(1));
        assert_eq!(records.record(1), Some(&b"\xff\xd8cover"[..]));
    }

    #[test]
    fn test_open_reads_title_exth_and_cover() {
        let exth_data = exth(&[
            (EXTH_AUTHOR, &b"Jules Verne"[..]),
            (EXTH_AUTHOR, &b"Michel Verne"[..]),
            (EXTH_SUBJECT, &b"Adventure"[..]),
            (EXTH_LANGUAGE, &b"fr"[..]),
            (EXTH_COVER_OFFSET, &0u32.to_be_bytes()[..]),
        ]);
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("0");
        std::fs::write(&path, palm_database("Le Tour du monde", &exth_data, b"\xff\xd8cover")).unwrap();

        let mut file = MobiExtractor::new().open(&path, "http://x/book.mobi").unwrap();

        let book = file.book();
        assert_eq!(book.title, "Le Tour du monde");
        let authors: Vec<&str> = book.authors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(authors, vec!["Jules Verne", "Michel Verne"]);
        assert_eq!(book.tags, vec!["Adventure"]);
        assert_eq!(book.language.as_deref(), Some("fr"));
        assert!(book.issues.is_empty());
        assert_eq!(
            file.encryption_info().get("method").map(String::as_str),
            Some("Mobipocket Encryption")
        );

        let name = file.extract_cover(dir.path()).unwrap();
        assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), b"\xff\xd8cover");
    }

    #[test]
    fn test_truncated_exth_is_ignored() {
        let mut exth_data = exth(&[(EXTH_SUBJECT, &b"Adventure"[..])]);
        exth_data.truncate(exth_data.len() - 3);
        let data = palm_database("", &exth_data, b"");
        let records = PalmRecords::parse(&data).unwrap();
        let header = MobiHeader::parse(&records).unwrap();

        assert!(header.exth.is_empty());
        assert_eq!(header.cover_record(), None);
    }

    #[test]
    fn test_encryption_info() {
        let file = MobiFile {
            book: ResolvedBook::new("/tmp/0", "http://x/book.mobi", mime::MOBI),
            cover_record: None,
            encryption: 2,
        };
        assert_eq!(
            file.encryption_info().get("method").map(String::as_str),
            Some("Mobipocket Encryption")
        );

        let clear = MobiFile { encryption: 0, ..file };
        assert!(clear.encryption_info().is_empty());
    }

    #[test]
    fn test_short_file_has_no_records() {
        assert!(PalmRecords::parse(&[0u8; 40]).is_none());
    }
}
