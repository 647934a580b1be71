//! OPDS acquisition feed
//!
//! [`assemble`] turns feed attributes and resolved books into a
//! [`CatalogFeed`]; [`xml`] renders it as Atom.

pub mod assemble;
pub mod types;
pub mod xml;

pub use assemble::{build_entry, build_header, EntryLinks};
pub use types::*;
pub use xml::render_feed;
