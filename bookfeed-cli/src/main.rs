//! Bookfeed CLI - Build OPDS catalogs from mirror lists

mod commands;

use anyhow::Result;
use bookfeed_core::fetch::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Parse and validate jobs argument (must be at least 1)
fn parse_jobs(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if n < 1 {
        Err("jobs must be at least 1".to_string())
    } else {
        Ok(n)
    }
}

#[derive(Parser)]
#[command(name = "bookfeed")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an OPDS catalog from a description file
    Build {
        /// Description file listing the feed attributes and book mirrors
        description: String,

        /// Output directory
        #[arg(short, long, default_value = "./opds")]
        output: String,

        /// Replace the output directory if it already exists
        #[arg(short, long)]
        force: bool,

        /// Number of books resolved in parallel (must be at least 1)
        #[arg(short, long, default_value = "4", value_parser = parse_jobs)]
        jobs: usize,

        /// Timeout for each mirror download, in seconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout: u64,

        /// User-Agent header sent to mirrors
        #[arg(long, default_value = DEFAULT_USER_AGENT)]
        user_agent: String,
    },

    /// Display the metadata extracted from an ebook
    Info {
        /// Input file path
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG takes precedence
    let filter = if cli.verbose {
        "bookfeed_cli=debug,bookfeed_core=debug"
    } else {
        "bookfeed_cli=info,bookfeed_core=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Build {
            description,
            output,
            force,
            jobs,
            timeout,
            user_agent,
        } => commands::build(&description, &output, force, jobs, timeout, &user_agent).await,

        Commands::Info { input, json } => commands::info(&input, json),
    }
}
