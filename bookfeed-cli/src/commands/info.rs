//! Info command implementation

use anyhow::{Context, Result};
use bookfeed_core::{open_book, Sniffer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Book info output
#[derive(Serialize)]
struct BookInfo {
    title: String,
    mimetype: String,
    authors: Vec<String>,
    tags: Vec<String>,
    series: Option<String>,
    series_index: Option<String>,
    language: Option<String>,
    description: Option<String>,
    encryption: BTreeMap<String, String>,
    issues: Vec<String>,
}

/// Display the metadata extracted from an ebook
pub fn info(input: &str, json: bool) -> Result<()> {
    let input_path = Path::new(input);

    // Extractors may repair the file in place, so work on a copy
    let scratch = tempfile::TempDir::new().context("Failed to create a scratch directory")?;
    let copy = scratch.path().join("0");
    std::fs::copy(input_path, &copy).with_context(|| format!("Failed to open input file: {}", input))?;

    let file = open_book(&Sniffer::default(), &copy, input, scratch.path())
        .with_context(|| format!("Failed to read {}", input))?;
    let book = file.book();
    tracing::debug!("{} opened as {}", input, book.mimetype);

    let info = BookInfo {
        title: book.title.clone(),
        mimetype: book.mimetype.clone(),
        authors: book.authors.iter().map(|a| a.name.clone()).collect(),
        tags: book.tags.clone(),
        series: book.series.as_ref().map(|s| s.title.clone()),
        series_index: book.series.as_ref().and_then(|s| s.index.clone()),
        language: book.language.clone(),
        description: book.description.clone(),
        encryption: file.encryption_info(),
        issues: book.issues.clone(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Title:       {}", info.title);
        println!("Format:      {}", info.mimetype);
        if !info.authors.is_empty() {
            println!("Authors:     {}", info.authors.join(", "));
        }
        if !info.tags.is_empty() {
            println!("Tags:        {}", info.tags.join(", "));
        }
        if let Some(series) = &info.series {
            match &info.series_index {
                Some(index) => println!("Series:      {} #{}", series, index),
                None => println!("Series:      {}", series),
            }
        }
        if let Some(language) = &info.language {
            println!("Language:    {}", language);
        }
        if let Some(desc) = &info.description {
            println!("Description: {}", desc);
        }
        for (key, value) in &info.encryption {
            println!("Encryption:  {} = {}", key, value);
        }
        for issue in &info.issues {
            println!("Issue:       {}", issue);
        }
    }

    Ok(())
}
