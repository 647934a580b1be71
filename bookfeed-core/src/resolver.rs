//! Mirror resolution
//!
//! Downloads every mirror of one book entry, opens each download, and keeps
//! the ones that parsed. The first usable mirror in description order is the
//! representative that supplies metadata, the id and the cover.

use crate::book::{open_book, BookFile};
use crate::description::BookEntry;
use crate::error::ParseError;
use crate::fetch::Fetcher;
use crate::sniff::Sniffer;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;

/// A mirror whose download opened as a supported book
pub struct ResolvedMirror {
    pub location: String,
    pub file: Box<dyn BookFile>,
}

/// Outcome of resolving one entry
#[derive(Default)]
pub struct Resolution {
    /// Usable mirrors in description order
    pub mirrors: Vec<ResolvedMirror>,

    /// Skipped mirrors, one message each
    pub warnings: Vec<String>,
}

impl Resolution {
    /// The mirror that supplies the entry's metadata
    pub fn representative(&self) -> Option<&ResolvedMirror> {
        self.mirrors.first()
    }

    /// Consume the resolution, keeping only the representative
    pub fn into_representative(self) -> Option<ResolvedMirror> {
        self.mirrors.into_iter().next()
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Resolves the mirrors of book entries
#[derive(Clone)]
pub struct MirrorResolver {
    fetcher: Arc<dyn Fetcher>,
    sniffer: Arc<Sniffer>,
}

impl MirrorResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, sniffer: Arc<Sniffer>) -> Self {
        Self { fetcher, sniffer }
    }

    /// Resolve `entry`, using `working_dir` for downloads and extracted covers
    ///
    /// Downloads run concurrently but results are consumed in mirror order,
    /// so the representative never depends on which server answered first.
    /// Mirror `i` is stored as `working_dir/i`.
    pub async fn resolve(&self, entry: &BookEntry, working_dir: &Path) -> Resolution {
        let downloads = join_all(entry.mirrors.iter().map(|location| self.fetcher.fetch(location))).await;

        let mut resolution = Resolution::default();
        for (index, (location, download)) in entry.mirrors.iter().zip(downloads).enumerate() {
            let data = match download {
                Ok(data) => data,
                Err(e) => {
                    resolution.warn(format!("cannot download {}, skipping: {}", location, e));
                    continue;
                }
            };

            let path = working_dir.join(index.to_string());
            if let Err(e) = tokio::fs::write(&path, &data).await {
                resolution.warn(format!("cannot download {}, skipping: {}", location, e));
                continue;
            }
            tracing::debug!("Downloaded {} ({} bytes)", location, data.len());

            // Sniffing and parsing are CPU-bound; keep them off the async workers
            let opened = tokio::task::spawn_blocking({
                let sniffer = self.sniffer.clone();
                let source = location.clone();
                let working_dir = working_dir.to_path_buf();
                move || open_book(&sniffer, &path, &source, &working_dir)
            })
            .await
            .unwrap_or_else(|e| Err(ParseError::Io(std::io::Error::other(e))));

            match opened {
                Ok(file) => {
                    let encryption = file.encryption_info();
                    if !encryption.is_empty() {
                        tracing::debug!("{} is encrypted: {:?}", location, encryption);
                    }
                    resolution.mirrors.push(ResolvedMirror {
                        location: location.clone(),
                        file,
                    });
                }
                Err(e) => {
                    resolution.warn(format!("cannot parse file {}, skipping: {}", location, e));
                }
            }
        }

        if resolution.mirrors.is_empty() {
            let first = entry.mirrors.first().map(String::as_str).unwrap_or_default();
            resolution.warn(format!("no usable mirror for book {}, entry dropped", first));
        }

        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::mime;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct MapFetcher(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
            self.0
                .get(location)
                .cloned()
                .ok_or_else(|| FetchError::InvalidLocation(location.to_string()))
        }
    }

    fn fb2(title: &str) -> Vec<u8> {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <FictionBook><description><title-info>\
             <book-title>{}</book-title>\
             </title-info></description></FictionBook>",
            title
        )
        .into_bytes()
    }

    fn resolver(files: &[(&str, Vec<u8>)]) -> MirrorResolver {
        let map = files
            .iter()
            .map(|(location, data)| (location.to_string(), data.clone()))
            .collect();
        MirrorResolver::new(Arc::new(MapFetcher(map)), Arc::new(Sniffer::default()))
    }

    fn entry(mirrors: &[&str]) -> BookEntry {
        BookEntry {
            mirrors: mirrors.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_first_usable_mirror_is_representative() {
        let resolver = resolver(&[
            ("http://a/1", vec![0x80, 0x81, 0x82, 0x83]),
            ("http://b/1", fb2("Second")),
            ("http://c/1", fb2("Third")),
        ]);
        let dir = TempDir::new().unwrap();

        let resolution = resolver
            .resolve(&entry(&["http://missing/1", "http://a/1", "http://b/1", "http://c/1"]), dir.path())
            .await;

        assert_eq!(resolution.mirrors.len(), 2);
        let representative = resolution.representative().unwrap();
        assert_eq!(representative.location, "http://b/1");
        assert_eq!(representative.file.book().title, "Second");
        assert_eq!(representative.file.book().mimetype, mime::FB2);
        assert_eq!(resolution.mirrors[1].location, "http://c/1");

        assert_eq!(resolution.warnings.len(), 2);
        assert!(resolution.warnings[0].starts_with("cannot download http://missing/1"));
        assert!(resolution.warnings[1].starts_with("cannot parse file http://a/1"));
        assert!(!dir.path().join("0").exists());
        assert!(dir.path().join("2").exists());
    }

    #[tokio::test]
    async fn test_entry_without_usable_mirror() {
        let resolver = resolver(&[("http://a/1", vec![0x80, 0x81])]);
        let dir = TempDir::new().unwrap();

        let resolution = resolver.resolve(&entry(&["http://a/1"]), dir.path()).await;

        assert!(resolution.representative().is_none());
        assert_eq!(resolution.warnings.len(), 2);
        assert!(resolution.warnings[1].contains("entry dropped"));
    }
}
