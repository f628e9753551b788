//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fetch pages and bulk-download files under rate and concurrency bounds.
#[derive(Parser, Debug)]
#[command(name = "fetchkit")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch page content for one or more URLs
    Fetch(FetchArgs),
    /// Download files listed as `url<TAB>destination` lines
    Download(DownloadArgs),
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// URLs to fetch (reads stdin when omitted)
    pub urls: Vec<String>,

    /// Base URL for site validation and relative-link resolution
    #[arg(short, long)]
    pub base_url: String,

    /// Maximum concurrent requests (1-100)
    #[arg(short = 'c', long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Fetch attempts per page (1-10)
    #[arg(short = 'r', long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub retries: u8,

    /// Request rate in requests per second
    #[arg(long, default_value_t = 1.0)]
    pub rate: f64,

    /// Base backoff delay between attempts, in seconds
    #[arg(long, default_value_t = 1)]
    pub delay: u64,

    /// Number of URLs handed to each processing round
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub batch_size: u16,

    /// Pacing delay between processing rounds, in seconds
    #[arg(long, default_value_t = 0)]
    pub batch_delay: u64,

    /// Print links extracted from fetched pages instead of page bodies
    #[arg(long)]
    pub links: bool,

    /// Save fetched bodies (and link records) into this directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// Input file of `url<TAB>destination` lines (reads stdin when omitted)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory for bare-URL lines without an explicit destination
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Download attempts per file (1-10)
    #[arg(short = 'r', long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub retries: u8,

    /// Base backoff delay between attempts, in seconds
    #[arg(long, default_value_t = 1)]
    pub delay: u64,
}
