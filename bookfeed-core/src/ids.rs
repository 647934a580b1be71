//! Deterministic identifiers for books and authors

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io;
use std::path::Path;

/// SHA-1 of a file's full contents, hex encoded
///
/// Used as the book identifier and as the stem of cover/thumbnail files.
pub fn content_id(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-1 of the UTF-8 bytes of a normalized author name, hex encoded
///
/// Distinct authors with identical names share an id.
pub fn author_id(name: &str) -> String {
    hex::encode(Sha1::digest(name.as_bytes()))
}

/// Atom id of a book entry
pub fn book_uri(content_id: &str) -> String {
    format!("book:id:{}", content_id)
}

/// Atom uri of an author
pub fn author_uri(name: &str) -> String {
    format!("author:id:{}", author_id(name))
}
