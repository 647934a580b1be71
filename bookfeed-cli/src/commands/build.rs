//! Build command implementation

use anyhow::{Context, Result};
use bookfeed_core::{BuildOptions, CatalogBuilder, HttpFetcher};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Build a catalog from a description file
pub async fn build(
    description: &str,
    output: &str,
    force: bool,
    jobs: usize,
    timeout: u64,
    user_agent: &str,
) -> Result<()> {
    let fetcher = HttpFetcher::new(Duration::from_secs(timeout), user_agent)
        .context("Failed to set up the mirror client")?;

    tracing::debug!(
        "Resolving up to {} book(s) at a time, {}s mirror timeout, User-Agent {:?}",
        jobs,
        timeout,
        user_agent
    );

    let options = BuildOptions {
        output_dir: PathBuf::from(output),
        override_existing: force,
        jobs,
    };

    // Set up progress spinner
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Building catalog from {}...", description));

    let result = CatalogBuilder::new(options, Arc::new(fetcher))
        .build(Path::new(description))
        .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e).with_context(|| format!("Failed to build catalog from {}", description));
        }
    };

    pb.finish_with_message(format!(
        "Wrote {} ({} entries, {} dropped, {} warnings)",
        report.catalog_path.display(),
        report.entries,
        report.dropped,
        report.warnings.len()
    ));

    Ok(())
}
