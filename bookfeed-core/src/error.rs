//! Error types for Bookfeed Core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using BookfeedError
pub type Result<T> = std::result::Result<T, BookfeedError>;

/// Top-level error type; every variant is fatal for a catalog build
#[derive(Debug, Error)]
pub enum BookfeedError {
    #[error("{0}")]
    Description(#[from] DescriptionError),

    #[error("{} already exists", .0.display())]
    OutputExists(PathBuf),

    #[error("cannot create output directory {}: {source}", .path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Feed rendering failed: {0}")]
    Render(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Grammar errors in a catalog description file
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptionError {
    #[error("line {line}: first section must be [feed]")]
    FirstSectionNotFeed { line: usize },

    #[error("line {line}: duplicate [feed] section")]
    DuplicateFeed { line: usize },

    #[error("line {line}: unknown [{name}] section")]
    UnknownSection { line: usize, name: String },

    #[error("invalid format in line {line}")]
    InvalidLine { line: usize },

    #[error("line {line}: unknown key \"{key}\" in [book] section")]
    UnknownBookKey { line: usize, key: String },
}

impl DescriptionError {
    /// 1-based line number of the offending line
    pub fn line(&self) -> usize {
        match self {
            DescriptionError::FirstSectionNotFeed { line }
            | DescriptionError::DuplicateFeed { line }
            | DescriptionError::UnknownSection { line, .. }
            | DescriptionError::InvalidLine { line }
            | DescriptionError::UnknownBookKey { line, .. } => *line,
        }
    }
}

/// Errors that occur while extracting metadata from a book file
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("File type '{0}' is not supported, sorry")]
    UnsupportedFormat(String),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Invalid FB2: {0}")]
    InvalidFb2(String),

    #[error("Invalid MOBI: {0}")]
    InvalidMobi(String),

    #[error("Invalid archive: {0}")]
    InvalidArchive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while downloading a mirror
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid location {0}")]
    InvalidLocation(String),

    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while deriving cover and thumbnail images
#[derive(Debug, Error)]
pub enum CoverError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
