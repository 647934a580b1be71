//! MIME types recognized by the sniffer and the extractors

pub const EPUB: &str = "application/epub+zip";
pub const FB2: &str = "application/x-fictionbook+xml";
pub const FB2_ZIP: &str = "application/x-zip-compressed-fb2";
pub const MOBI: &str = "application/x-mobipocket-ebook";

pub const XML: &str = "application/xml";
pub const TEXT_XML: &str = "text/xml";
pub const ZIP: &str = "application/zip";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT: &str = "text/plain";

pub const JPEG: &str = "image/jpeg";

/// Whether `mime` is one of the generic XML types a probe may report
pub fn is_xml(mime: &str) -> bool {
    mime == XML || mime == TEXT_XML
}
