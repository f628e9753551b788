//! CLI entry point for the fetchkit tool.

use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use fetchkit::batch::BatchProcessor;
use fetchkit::crawl::{CrawlError, CrawlOptions, Crawler};
use fetchkit::download::{DownloadOptions, DownloadRecord, Downloader};
use fetchkit::{extract_links, fsio};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

mod cli;

use cli::{Args, Command, DownloadArgs, FetchArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Fetch(fetch_args) => run_fetch(fetch_args, args.quiet).await,
        Command::Download(download_args) => run_download(download_args, args.quiet).await,
    }
}

/// Fetches page content for the given URLs through one crawl session,
/// draining them in batches so interrupted runs keep their pending work.
async fn run_fetch(args: FetchArgs, quiet: bool) -> Result<()> {
    let urls = if args.urls.is_empty() {
        read_stdin_lines()?
    } else {
        args.urls.clone()
    };
    if urls.is_empty() {
        info!("No URLs provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/' | fetchkit fetch -b https://example.com/");
        return Ok(());
    }

    if let Some(dir) = &args.output_dir {
        fsio::ensure_dir(dir).await?;
    }

    let options = CrawlOptions {
        concurrency: usize::from(args.concurrency),
        requests_per_second: args.rate,
        ..CrawlOptions::default()
    };
    let crawler = Crawler::new(&args.base_url, options)?;
    crawler.start();

    let show_progress = !quiet && io::stderr().is_terminal();
    let processor = BatchProcessor::new(
        usize::from(args.batch_size),
        Duration::from_secs(args.batch_delay),
    )
    .with_progress_bar(show_progress);
    processor.add_items(urls).await;

    // Ctrl-C cancels the run; the in-flight batch is requeued first.
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let retries = u32::from(args.retries);
    let base_delay = Duration::from_secs(args.delay);
    let fetched = AtomicUsize::new(0);
    let missed = AtomicUsize::new(0);

    let crawler_ref = &crawler;
    let args_ref = &args;
    let fetched_ref = &fetched;
    let missed_ref = &missed;

    let outcome = processor
        .process_batches(&cancel, move |batch| async move {
            for url in batch {
                let Some(normalized) = crawler_ref.normalize_url(&url, None) else {
                    warn!(url = %url, "skipping unparseable URL");
                    continue;
                };
                if !crawler_ref.mark_visited(&normalized) {
                    debug!(url = %normalized, "already visited");
                    continue;
                }

                match crawler_ref
                    .fetch_page(&normalized, retries, base_delay)
                    .await?
                {
                    Some(body) => {
                        fetched_ref.fetch_add(1, Ordering::SeqCst);
                        emit_page(crawler_ref, args_ref, &normalized, &body).await;
                    }
                    None => {
                        missed_ref.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
            Ok::<(), CrawlError>(())
        })
        .await;

    crawler.stop();

    if outcome.is_err() {
        warn!(
            pending = processor.len().await,
            "fetch cancelled; pending URLs were requeued"
        );
    }
    info!(
        fetched = fetched.load(Ordering::SeqCst),
        missed = missed.load(Ordering::SeqCst),
        errors = crawler.error_tracker().total(),
        "fetch complete"
    );

    Ok(())
}

/// Prints or persists one fetched page per the fetch flags.
async fn emit_page(crawler: &Crawler, args: &FetchArgs, url: &str, body: &str) {
    let page_base = Url::parse(url).ok();

    if args.links {
        for link in extract_links(body, page_base.as_ref(), None) {
            println!("{}", link.url);
        }
    }

    let Some(dir) = &args.output_dir else {
        if !args.links {
            println!("{body}");
        }
        return;
    };

    let name = fsio::clean_filename(url, crawler.domain());
    let name = if name.is_empty() {
        "index.html".to_string()
    } else {
        name
    };

    if let Err(e) = fsio::write_text(&dir.join(&name), body).await {
        warn!(url, error = %e, "failed to save page body");
    }
    if args.links {
        let links = extract_links(body, page_base.as_ref(), None);
        if let Err(e) = fsio::write_json(&dir.join(format!("{name}.links.json")), &links).await {
            warn!(url, error = %e, "failed to save link record");
        }
    }
}

/// Bulk-downloads `url<TAB>destination` records and saves a failure record
/// when any item ends in failure.
async fn run_download(args: DownloadArgs, quiet: bool) -> Result<()> {
    let lines = match &args.input {
        Some(path) => fsio::read_lines(path).await?,
        None => read_stdin_lines()?,
    };

    let records: Vec<DownloadRecord> = lines
        .iter()
        .filter_map(|line| parse_record(line, &args.output_dir))
        .collect();
    if records.is_empty() {
        info!("No download records found in input.");
        info!("Expected one `url<TAB>destination` or bare-URL line per record.");
        return Ok(());
    }

    fsio::ensure_dir(&args.output_dir).await?;

    let options = DownloadOptions {
        concurrency: usize::from(args.concurrency),
        max_retries: u32::from(args.retries),
        base_delay: Duration::from_secs(args.delay),
        ..DownloadOptions::default()
    };
    let show_progress = !quiet && io::stderr().is_terminal();
    let downloader = Downloader::new(options)?.with_progress_bar(show_progress);

    let results = downloader.download_batch(&records).await;
    let failed = results.iter().filter(|ok| !**ok).count();

    if failed > 0
        && let Some(path) = downloader.save_failed_downloads(&args.output_dir).await
    {
        info!(path = %path.display(), "failed-download record saved");
    }

    info!(
        completed = downloader.completed(),
        failed,
        total = results.len(),
        "download complete"
    );

    Ok(())
}

/// Parses one input line into a download record.
///
/// Lines are `url<TAB>destination`; a bare URL gets a destination inside
/// `output_dir` named after its last path segment.
fn parse_record(line: &str, output_dir: &Path) -> Option<DownloadRecord> {
    let (url, dest) = match line.split_once('\t') {
        Some((url, dest)) => (url.trim(), output_dir.join(dest.trim())),
        None => {
            let url = line.trim();
            let name = url
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or("download");
            (url, output_dir.join(name))
        }
    };
    if url.is_empty() {
        return None;
    }
    Some(DownloadRecord::new(url, dest))
}

/// Reads trimmed, non-empty lines from stdin, or nothing when stdin is a
/// terminal.
fn read_stdin_lines() -> Result<Vec<String>> {
    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_tab_separated() {
        let record = parse_record(
            "https://example.com/a.pdf\tpapers/a.pdf",
            Path::new("out"),
        )
        .unwrap();
        assert_eq!(record.url, "https://example.com/a.pdf");
        assert_eq!(record.dest, Path::new("out/papers/a.pdf"));
    }

    #[test]
    fn test_parse_record_bare_url_uses_last_segment() {
        let record = parse_record("https://example.com/docs/b.pdf", Path::new("out")).unwrap();
        assert_eq!(record.dest, Path::new("out/b.pdf"));
    }

    #[test]
    fn test_parse_record_trailing_slash_falls_back() {
        let record = parse_record("https://example.com/docs/", Path::new("out")).unwrap();
        assert_eq!(record.dest, Path::new("out/download"));
    }

    #[test]
    fn test_parse_record_empty_line_skipped() {
        assert!(parse_record("", Path::new("out")).is_none());
        assert!(parse_record("\t", Path::new("out")).is_none());
    }
}
