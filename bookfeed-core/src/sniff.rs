//! Format sniffing
//!
//! Classifies a local file by its bytes rather than its name. A generic
//! [`MimeProbe`] gives the first answer; the [`Sniffer`] then refines generic
//! XML, zip and binary results into the e-book types it knows about. Sniffing
//! never fails: when refinement goes wrong the probe's answer is returned.

use crate::error::ParseError;
use crate::mime;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

/// Root element of FictionBook markup
const FB2_ROOT: &str = "FictionBook";

/// Number of leading bytes handed to the byte-signature probe
const PROBE_WINDOW: usize = 8192;

/// Bytes of the zip `mimetype` entry compared against the EPUB type
const MIMETYPE_PREFIX: u64 = 30;

/// Offset and value of the Palm database type/creator identifying Mobipocket
const MOBI_MAGIC_OFFSET: usize = 60;
const MOBI_MAGIC: &[u8; 8] = b"BOOKMOBI";

/// Generic MIME probe collaborator
pub trait MimeProbe: Send + Sync {
    /// Report the MIME type of the file at `path`
    fn probe(&self, path: &Path) -> io::Result<String>;
}

/// Byte-signature probe backed by the `infer` crate, with a text heuristic
/// for files that carry no magic number.
#[derive(Debug, Default, Clone, Copy)]
pub struct InferProbe;

impl MimeProbe for InferProbe {
    fn probe(&self, path: &Path) -> io::Result<String> {
        let mut window = Vec::with_capacity(PROBE_WINDOW);
        File::open(path)?
            .take(PROBE_WINDOW as u64)
            .read_to_end(&mut window)?;
        Ok(probe_bytes(&window).to_string())
    }
}

fn probe_bytes(window: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(window) {
        return kind.mime_type();
    }

    let text = match std::str::from_utf8(window) {
        Ok(text) => text,
        // A multi-byte sequence cut by the window edge is still text
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&window[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return mime::OCTET_STREAM,
    };

    if text.trim_start_matches('\u{feff}').trim_start().starts_with('<') {
        mime::TEXT_XML
    } else {
        mime::TEXT
    }
}

/// Format sniffer service
///
/// Constructed once per run and shared by everything that needs to classify
/// files, so the probe is an explicit dependency rather than global state.
pub struct Sniffer {
    probe: Box<dyn MimeProbe>,
}

impl Sniffer {
    pub fn new(probe: Box<dyn MimeProbe>) -> Self {
        Self { probe }
    }

    /// Classify the file at `path`
    pub fn classify(&self, path: &Path) -> String {
        let probed = match self.probe.probe(path) {
            Ok(mime) => mime,
            Err(e) => {
                tracing::debug!("MIME probe failed for {}: {}", path.display(), e);
                return mime::OCTET_STREAM.to_string();
            }
        };

        match refine(path, &probed) {
            Ok(Some(refined)) => {
                tracing::debug!("{}: {} refined to {}", path.display(), probed, refined);
                refined.to_string()
            }
            Ok(None) => probed,
            Err(e) => {
                tracing::debug!("Could not refine {} ({}): {}", path.display(), probed, e);
                probed
            }
        }
    }
}

impl Default for Sniffer {
    fn default() -> Self {
        Self::new(Box::new(InferProbe))
    }
}

fn refine(path: &Path, probed: &str) -> Result<Option<&'static str>, ParseError> {
    if mime::is_xml(probed) {
        let root = xml_root_tag(BufReader::new(File::open(path)?));
        Ok((root.as_deref() == Some(FB2_ROOT)).then_some(mime::FB2))
    } else if probed == mime::ZIP {
        refine_zip(path)
    } else if probed == mime::OCTET_STREAM {
        let mut header = [0u8; MOBI_MAGIC_OFFSET + MOBI_MAGIC.len()];
        File::open(path)?.read_exact(&mut header)?;
        Ok((&header[MOBI_MAGIC_OFFSET..] == MOBI_MAGIC).then_some(mime::MOBI))
    } else {
        Ok(None)
    }
}

fn refine_zip(path: &Path) -> Result<Option<&'static str>, ParseError> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    verify_archive(&mut archive)?;

    let files: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(str::to_string)
        .collect();

    if files.len() == 1 {
        let entry = archive.by_name(&files[0])?;
        if xml_root_tag(BufReader::new(entry)).as_deref() == Some(FB2_ROOT) {
            return Ok(Some(mime::FB2_ZIP));
        }
    }

    let declared = match archive.by_name("mimetype") {
        Ok(entry) => {
            let mut prefix = Vec::new();
            entry.take(MIMETYPE_PREFIX).read_to_end(&mut prefix)?;
            prefix
        }
        Err(_) => return Ok(None),
    };
    let declared = String::from_utf8_lossy(&declared);
    Ok((declared.trim_end_matches(['\r', '\n']) == mime::EPUB).then_some(mime::EPUB))
}

/// Read every entry to the end so the archive's checksums are verified
pub(crate) fn verify_archive<R: Read + io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<(), ParseError> {
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        io::copy(&mut entry, &mut io::sink())?;
    }
    Ok(())
}

/// Local name of the first element in an XML stream
///
/// Stops at the first start tag; the rest of the document is never read.
pub(crate) fn xml_root_tag<R: BufRead>(source: R) -> Option<String> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
        buf.clear();
    }
}
