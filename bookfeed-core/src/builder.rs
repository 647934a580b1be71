//! Catalog build pipeline
//!
//! Parses the description, prepares the output directory, resolves entries
//! with bounded concurrency, derives covers and writes `catalog.xml`.
//! Everything downloaded lives in one scratch directory inside the output
//! directory that is removed on every exit path.

use crate::cover::CoverPublisher;
use crate::description::{parse_description, CatalogDescription};
use crate::error::{BookfeedError, Result};
use crate::feed::{build_entry, build_header, render_feed, EntryLinks, FeedEntry};
use crate::fetch::Fetcher;
use crate::ids;
use crate::resolver::{MirrorResolver, Resolution};
use crate::sniff::Sniffer;
use chrono::{DateTime, FixedOffset, Local};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the feed document inside the output directory
pub const CATALOG_FILE: &str = "catalog.xml";

pub const DEFAULT_JOBS: usize = 4;

/// Options for a catalog build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub output_dir: PathBuf,

    /// Remove a pre-existing output directory instead of failing
    pub override_existing: bool,

    /// Book entries resolved concurrently
    pub jobs: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("opds"),
            override_existing: false,
            jobs: DEFAULT_JOBS,
        }
    }
}

/// Summary of a finished build
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub catalog_path: PathBuf,

    /// Entries written to the catalog
    pub entries: usize,

    /// Entries without a usable mirror
    pub dropped: usize,

    /// Every warning, in the order it was raised
    pub warnings: Vec<String>,
}

impl BuildReport {
    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Builds a catalog from a description file
pub struct CatalogBuilder {
    options: BuildOptions,
    fetcher: Arc<dyn Fetcher>,
    sniffer: Arc<Sniffer>,
    updated: Option<DateTime<FixedOffset>>,
}

impl CatalogBuilder {
    pub fn new(options: BuildOptions, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            options,
            fetcher,
            sniffer: Arc::new(Sniffer::default()),
            updated: None,
        }
    }

    /// Use a different sniffer
    pub fn with_sniffer(mut self, sniffer: Sniffer) -> Self {
        self.sniffer = Arc::new(sniffer);
        self
    }

    /// Stamp the feed and every entry with `updated` instead of the current time
    pub fn with_timestamp(mut self, updated: DateTime<FixedOffset>) -> Self {
        self.updated = Some(updated);
        self
    }

    /// Build the catalog described by the file at `description_path`
    pub async fn build(&self, description_path: &Path) -> Result<BuildReport> {
        let content = tokio::fs::read_to_string(description_path).await?;
        let description = parse_description(&content)?;
        self.build_from(&description).await
    }

    /// Build the catalog for an already parsed description
    pub async fn build_from(&self, description: &CatalogDescription) -> Result<BuildReport> {
        let output_dir = self.options.output_dir.as_path();
        prepare_output_dir(output_dir, self.options.override_existing)?;

        let scratch = tempfile::Builder::new()
            .prefix(".bookfeed-")
            .tempdir_in(output_dir)?;
        tracing::debug!("Working in {}", scratch.path().display());

        let updated = self.updated.unwrap_or_else(|| Local::now().fixed_offset());
        let mut report = BuildReport {
            catalog_path: output_dir.join(CATALOG_FILE),
            ..BuildReport::default()
        };

        let (mut feed, warnings) = build_header(&description.feed, updated);
        report.warnings.extend(warnings);

        // Each entry resolves in its own task so downloads keep progressing
        // while earlier entries are assembled
        let resolver = MirrorResolver::new(self.fetcher.clone(), self.sniffer.clone());
        let scratch_root = scratch.path().to_path_buf();
        let mut resolutions = stream::iter(description.books.iter().cloned().enumerate())
            .map(|(index, entry)| {
                let resolver = resolver.clone();
                let working_dir = scratch_root.join(index.to_string());
                tokio::spawn(async move {
                    tokio::fs::create_dir(&working_dir).await?;
                    let resolution = resolver.resolve(&entry, &working_dir).await;
                    Ok::<_, std::io::Error>((working_dir, resolution))
                })
            })
            .buffered(self.options.jobs.max(1));

        while let Some(resolved) = resolutions.next().await {
            let (working_dir, mut resolution) = resolved.map_err(std::io::Error::other)??;
            report.warnings.append(&mut resolution.warnings);

            let mirrors = resolution.mirrors.len();
            match self.assemble_entry(resolution, &working_dir, updated, &mut report).await {
                Some(entry) => {
                    tracing::info!("Added \"{}\" from {} mirror(s)", entry.title, mirrors);
                    feed.add_entry(entry);
                    report.entries += 1;
                }
                None => report.dropped += 1,
            }

            if let Err(e) = tokio::fs::remove_dir_all(&working_dir).await {
                tracing::debug!("Cannot remove {}: {}", working_dir.display(), e);
            }
        }
        drop(resolutions);

        let xml = render_feed(&feed)?;
        tokio::fs::write(&report.catalog_path, xml).await?;
        scratch.close()?;

        tracing::info!(
            "Wrote {} with {} entries ({} dropped, {} warnings)",
            report.catalog_path.display(),
            report.entries,
            report.dropped,
            report.warnings.len()
        );
        Ok(report)
    }

    /// Turn a resolution into a feed entry; `None` when it has no usable mirror
    ///
    /// Hashing and cover derivation run on the blocking pool. Covers are
    /// published one entry at a time, so entries sharing a content id never
    /// write the same side-file concurrently.
    async fn assemble_entry(
        &self,
        resolution: Resolution,
        working_dir: &Path,
        updated: DateTime<FixedOffset>,
        report: &mut BuildReport,
    ) -> Option<FeedEntry> {
        let acquisitions = resolution
            .mirrors
            .iter()
            .map(|mirror| (mirror.location.clone(), mirror.file.book().mimetype.clone()))
            .collect();
        let mut representative = resolution.into_representative()?;
        let location = representative.location.clone();

        let derived = tokio::task::spawn_blocking({
            let sniffer = self.sniffer.clone();
            let output_dir = self.options.output_dir.clone();
            let working_dir = working_dir.to_path_buf();
            move || {
                let content_id = ids::content_id(&representative.file.book().path)?;
                let cover = CoverPublisher::new(&sniffer, &output_dir).publish(
                    representative.file.as_mut(),
                    &content_id,
                    &working_dir,
                );
                Ok::<_, std::io::Error>((representative, content_id, cover))
            }
        })
        .await
        .unwrap_or_else(|e| Err(std::io::Error::other(e)));

        let (representative, content_id, cover) = match derived {
            Ok(derived) => derived,
            Err(e) => {
                report.warn(format!("cannot read {}, skipping: {}", location, e));
                return None;
            }
        };

        let cover = match cover {
            Ok(cover) => cover,
            Err(e) => {
                report.warn(format!("cannot derive cover of {}: {}", location, e));
                None
            }
        };

        let links = EntryLinks {
            cover,
            acquisitions,
        };
        Some(build_entry(representative.file.book(), &content_id, updated, &links))
    }
}

/// Create the output directory, removing an existing one only when allowed
fn prepare_output_dir(path: &Path, override_existing: bool) -> Result<()> {
    let create_error = |source: std::io::Error| BookfeedError::CreateOutput {
        path: path.to_path_buf(),
        source,
    };

    if path.exists() {
        if !override_existing {
            return Err(BookfeedError::OutputExists(path.to_path_buf()));
        }
        tracing::info!("Removing existing {}", path.display());
        if path.is_dir() {
            std::fs::remove_dir_all(path).map_err(create_error)?;
        } else {
            std::fs::remove_file(path).map_err(create_error)?;
        }
    }

    std::fs::create_dir_all(path).map_err(create_error)
}
