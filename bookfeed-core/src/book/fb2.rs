//! FictionBook (FB2) extractors, plain and zipped
//!
//! Metadata comes from `description/title-info`. The cover is the image the
//! `coverpage` element points at, stored as a base64 `binary` after the body.

use super::{write_cover, BookFile, Extractor, ResolvedBook};
use crate::error::ParseError;
use crate::mime;
use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Decoder, Reader};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use zip::ZipArchive;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Decoder for standalone `.fb2` documents
pub struct Fb2Extractor;

impl Fb2Extractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Fb2Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for Fb2Extractor {
    fn open(&self, path: &Path, source: &str) -> Result<Box<dyn BookFile>, ParseError> {
        let mut book = ResolvedBook::new(path, source, mime::FB2);
        let cover_id = read_description(BufReader::new(File::open(path)?), &mut book)?;
        Ok(Box::new(Fb2File {
            book,
            cover_id,
            zipped: false,
        }))
    }

    /// Drop a byte-order mark or stray whitespace ahead of the XML declaration
    fn repair(&self, path: &Path, _working_dir: &Path) -> Result<(), ParseError> {
        let data = std::fs::read(path)?;
        let body = data.strip_prefix(UTF8_BOM).unwrap_or(&data);
        let start = body
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(body.len());
        if start > 0 || body.len() != data.len() {
            std::fs::write(path, &body[start..])?;
        }
        Ok(())
    }

    fn supported_mime_types(&self) -> &[&str] {
        &[mime::FB2]
    }
}

/// Decoder for a zip archive holding exactly one FB2 document
pub struct Fb2ZipExtractor;

impl Fb2ZipExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Fb2ZipExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for Fb2ZipExtractor {
    fn open(&self, path: &Path, source: &str) -> Result<Box<dyn BookFile>, ParseError> {
        let mut book = ResolvedBook::new(path, source, mime::FB2_ZIP);
        let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
        let cover_id = read_description(BufReader::new(single_entry(&mut archive)?), &mut book)?;
        Ok(Box::new(Fb2File {
            book,
            cover_id,
            zipped: true,
        }))
    }

    fn supported_mime_types(&self) -> &[&str] {
        &[mime::FB2_ZIP]
    }
}

fn single_entry<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<zip::read::ZipFile<'_>, ParseError> {
    let name = archive
        .file_names()
        .find(|name| !name.ends_with('/'))
        .map(str::to_string)
        .ok_or_else(|| ParseError::InvalidFb2("empty archive".to_string()))?;
    Ok(archive.by_name(&name)?)
}

struct Fb2File {
    book: ResolvedBook,
    cover_id: Option<String>,
    zipped: bool,
}

impl Fb2File {
    fn cover_bytes(&self, id: &str) -> Result<Option<Vec<u8>>, ParseError> {
        let file = BufReader::new(File::open(&self.book.path)?);
        if self.zipped {
            let mut archive = ZipArchive::new(file)?;
            let entry = single_entry(&mut archive)?;
            read_binary(BufReader::new(entry), id)
        } else {
            read_binary(file, id)
        }
    }
}

impl BookFile for Fb2File {
    fn book(&self) -> &ResolvedBook {
        &self.book
    }

    fn extract_cover(&mut self, working_dir: &Path) -> Option<String> {
        let id = self.cover_id.as_deref()?;
        match self.cover_bytes(id) {
            Ok(Some(data)) => write_cover(working_dir, &self.book, &data),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("Cannot read FB2 cover of {}: {}", self.book.source, e);
                None
            }
        }
    }
}

#[derive(Default)]
struct AuthorParts {
    first: String,
    middle: String,
    last: String,
    nickname: String,
}

impl AuthorParts {
    fn add_to(self, book: &mut ResolvedBook) {
        let name = [self.first.as_str(), self.middle.as_str(), self.last.as_str()]
            .into_iter()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            book.add_author(&self.nickname, None);
        } else {
            book.add_author(&name, Some(self.last.as_str()));
        }
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Attribute value decoded with the document's declared encoding
fn attribute(e: &BytesStart, name: &str, decoder: Decoder) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| a.decode_and_unescape_value(decoder).ok().map(|v| v.into_owned()))
}

/// HTML counterpart of FB2 inline markup inside an annotation
fn html_tag(fb2_tag: &str) -> Option<&'static str> {
    match fb2_tag {
        "p" => Some("p"),
        "emphasis" => Some("em"),
        "strong" => Some("strong"),
        "strikethrough" => Some("s"),
        "sub" => Some("sub"),
        "sup" => Some("sup"),
        "code" => Some("code"),
        _ => None,
    }
}

/// Fill `book` from the `description` block and return the cover binary id
fn read_description<R: BufRead>(
    source: R,
    book: &mut ResolvedBook,
) -> Result<Option<String>, ParseError> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut author = AuthorParts::default();
    let mut annotation: Option<String> = None;
    let mut cover_id = None;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError::InvalidFb2(e.to_string()))?
        {
            Event::Start(e) => {
                let name = local_name(&e);
                if in_title_info(&stack) {
                    if let Some(html) = annotation.as_mut() {
                        if let Some(tag) = html_tag(&name) {
                            html.push_str(&format!("<{}>", tag));
                        }
                    }
                    match name.as_str() {
                        "author" => author = AuthorParts::default(),
                        "annotation" => annotation = Some(String::new()),
                        "sequence" => read_sequence(&e, reader.decoder(), book),
                        _ => {}
                    }
                }
                stack.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if in_title_info(&stack) {
                    match name.as_str() {
                        "sequence" => read_sequence(&e, reader.decoder(), book),
                        "image" if stack.last().map(String::as_str) == Some("coverpage") => {
                            if cover_id.is_none() {
                                cover_id = attribute(&e, "href", reader.decoder())
                                    .map(|href| href.trim_start_matches('#').to_string());
                            }
                        }
                        "empty-line" => {
                            if let Some(html) = annotation.as_mut() {
                                html.push_str("<br/>");
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::Text(e) => {
                let content = e
                    .unescape()
                    .map_err(|e| ParseError::InvalidFb2(e.to_string()))?;
                match annotation.as_mut() {
                    Some(html) => html.push_str(&escape(content.as_ref())),
                    None => text.push_str(&content),
                }
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                let parent = stack.last().map(String::as_str).unwrap_or_default();
                let title_info = in_title_info(&stack);

                match name.as_str() {
                    "description" => break,
                    "annotation" if title_info => {
                        if let Some(html) = annotation.take() {
                            book.set_description(&html);
                        }
                    }
                    _ if title_info && annotation.is_some() => {
                        if let (Some(html), Some(tag)) = (annotation.as_mut(), html_tag(&name)) {
                            html.push_str(&format!("</{}>", tag));
                        }
                    }
                    "book-title" if parent == "title-info" => book.set_title(&text),
                    "genre" if parent == "title-info" => book.add_tag(&text),
                    "lang" if parent == "title-info" => book.set_language(&text),
                    "author" if parent == "title-info" => {
                        std::mem::take(&mut author).add_to(book);
                    }
                    "first-name" if parent == "author" && title_info => author.first = text.clone(),
                    "middle-name" if parent == "author" && title_info => author.middle = text.clone(),
                    "last-name" if parent == "author" && title_info => author.last = text.clone(),
                    "nickname" if parent == "author" && title_info => author.nickname = text.clone(),
                    _ => {}
                }
                text.clear();
            }
            Event::Eof => {
                book.add_issue("document ended before </description>");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(cover_id)
}

fn in_title_info(stack: &[String]) -> bool {
    stack.iter().any(|name| name == "title-info")
}

fn read_sequence(e: &BytesStart, decoder: Decoder, book: &mut ResolvedBook) {
    if book.series.is_some() {
        return;
    }
    if let Some(name) = attribute(e, "name", decoder) {
        book.set_series(&name, attribute(e, "number", decoder).as_deref());
    }
}

/// Decode the base64 `binary` element whose id is `id`
fn read_binary<R: BufRead>(source: R, id: &str) -> Result<Option<Vec<u8>>, ParseError> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut encoded: Option<String> = None;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError::InvalidFb2(e.to_string()))?
        {
            Event::Start(e) if e.local_name().as_ref() == b"binary" => {
                if attribute(&e, "id", reader.decoder()).as_deref() == Some(id) {
                    encoded = Some(String::new());
                }
            }
            Event::Text(e) => {
                if let Some(data) = encoded.as_mut() {
                    let content = e
                        .unescape()
                        .map_err(|e| ParseError::InvalidFb2(e.to_string()))?;
                    data.extend(content.chars().filter(|c| !c.is_whitespace()));
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"binary" => {
                if let Some(data) = encoded.take() {
                    let bytes = STANDARD
                        .decode(data.as_bytes())
                        .map_err(|e| ParseError::InvalidFb2(format!("bad cover binary: {}", e)))?;
                    return Ok(Some(bytes));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
  <description>
    <title-info>
      <genre>sf</genre>
      <genre>adventure</genre>
      <author>
        <first-name>Arkady</first-name>
        <last-name>Strugatsky</last-name>
      </author>
      <author>
        <nickname>  Anonymous   Writer </nickname>
      </author>
      <book-title>  Roadside   Picnic </book-title>
      <annotation><p>A <emphasis>zone</emphasis> &amp; its visitors.</p></annotation>
      <coverpage><l:image l:href="#cover.png"/></coverpage>
      <lang>ru</lang>
      <sequence name="Noon Universe" number="7"/>
    </title-info>
    <src-title-info>
      <book-title>Пикник на обочине</book-title>
    </src-title-info>
  </description>
  <body><section><p>Text</p></section></body>
  <binary id="cover.png" content-type="image/png">aGVs
bG8=</binary>
</FictionBook>"##;

    fn write_sample(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("0");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn test_reads_title_info() {
        let dir = TempDir::new().unwrap();
        let path = write_sample(&dir);
        let file = Fb2Extractor::new().open(&path, "http://x/book.fb2").unwrap();
        let book = file.book();

        assert_eq!(book.title, "Roadside   Picnic");
        assert_eq!(book.tags, vec!["sf", "adventure"]);
        assert_eq!(book.authors.len(), 2);
        assert_eq!(book.authors[0].name, "Arkady Strugatsky");
        assert_eq!(book.authors[0].sortkey, "strugatsky");
        assert_eq!(book.authors[1].name, "Anonymous Writer");
        assert_eq!(book.authors[1].sortkey, "writer");
        assert_eq!(book.language.as_deref(), Some("ru"));
        assert_eq!(book.series.as_ref().unwrap().title, "Noon Universe");
        assert_eq!(book.series.as_ref().unwrap().index.as_deref(), Some("7"));
        assert_eq!(
            book.description.as_deref(),
            Some("<p>A <em>zone</em> &amp; its visitors.</p>")
        );
    }

    #[test]
    fn test_extracts_cover_binary() {
        let dir = TempDir::new().unwrap();
        let path = write_sample(&dir);
        let mut file = Fb2Extractor::new().open(&path, "http://x/book.fb2").unwrap();

        let name = file.extract_cover(dir.path()).unwrap();
        assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), b"hello");
    }

    #[test]
    fn test_zipped_fb2() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("book.fb2", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(SAMPLE.as_bytes()).unwrap();
        writer.finish().unwrap();

        let mut file = Fb2ZipExtractor::new().open(&path, "http://x/book.fb2.zip").unwrap();
        assert_eq!(file.book().mimetype, mime::FB2_ZIP);
        assert_eq!(file.book().authors[0].name, "Arkady Strugatsky");
        assert!(file.extract_cover(dir.path()).is_some());
    }

    #[test]
    fn test_missing_metadata_keeps_fallback_title() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        std::fs::write(&path, "<FictionBook><description/><body/></FictionBook>").unwrap();

        let mut file = Fb2Extractor::new().open(&path, "http://x/untitled.fb2").unwrap();
        assert_eq!(file.book().title, "http://x/untitled.fb2");
        assert!(file.book().authors.is_empty());
        assert!(file.extract_cover(dir.path()).is_none());
    }

    #[test]
    fn test_declared_windows_1251_is_decoded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        let mut doc = b"<?xml version=\"1.0\" encoding=\"windows-1251\"?>\n".to_vec();
        doc.extend_from_slice(b"<FictionBook><description><title-info><genre>sf</genre>");
        // Cyrillic text in cp1251 bytes
        doc.extend_from_slice(b"<author><first-name>\xc0\xf0\xea\xe0\xe4\xe8\xe9</first-name></author>");
        doc.extend_from_slice(b"<book-title>\xcf\xe8\xea\xed\xe8\xea</book-title>");
        doc.extend_from_slice(b"<sequence name=\"\xcf\xee\xeb\xe4\xe5\xed\xfc\" number=\"1\"/>");
        doc.extend_from_slice(b"</title-info></description><body/></FictionBook>");
        std::fs::write(&path, &doc).unwrap();

        let file = crate::book::open_book(
            &crate::sniff::Sniffer::default(),
            &path,
            "http://x/picnic.fb2",
            dir.path(),
        )
        .unwrap();
        let book = file.book();

        assert_eq!(book.mimetype, mime::FB2);
        assert_eq!(book.title, "Пикник");
        assert_eq!(book.authors[0].name, "Аркадий");
        assert_eq!(book.series.as_ref().unwrap().title, "Полдень");
    }

    #[test]
    fn test_malformed_markup_is_unparseable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        std::fs::write(&path, "<FictionBook><description><title-info></genre>").unwrap();

        assert!(Fb2Extractor::new().open(&path, "http://x/bad.fb2").is_err());
    }

    #[test]
    fn test_repair_strips_bom_and_leading_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0");
        std::fs::write(&path, b"\xef\xbb\xbf \n<?xml version=\"1.0\"?><FictionBook/>").unwrap();

        Fb2Extractor::new().repair(&path, dir.path()).unwrap();
        assert!(std::fs::read(&path).unwrap().starts_with(b"<?xml"));
    }
}
