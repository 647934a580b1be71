//! Bookfeed Core Library
//!
//! This crate builds OPDS acquisition catalogs. A description file lists the
//! feed attributes and, for every book, one or more mirror locations. Each
//! mirror is downloaded, sniffed and opened by the extractor for its format;
//! the first usable mirror supplies the metadata and cover, and every usable
//! mirror becomes an acquisition link in the Atom feed.

pub mod book;
pub mod builder;
pub mod cover;
pub mod description;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod ids;
pub mod mime;
pub mod resolver;
pub mod sniff;

pub use book::{open_book, Author, BookFile, Extractor, ResolvedBook, SeriesInfo};
pub use builder::{BuildOptions, BuildReport, CatalogBuilder, CATALOG_FILE};
pub use description::{parse_description, BookEntry, CatalogDescription, FeedInfo};
pub use error::{BookfeedError, CoverError, DescriptionError, FetchError, ParseError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use sniff::{InferProbe, MimeProbe, Sniffer};
