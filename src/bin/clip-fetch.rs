//! Download a single link with the relay's extractor and keep the file.
//!
//! ```text
//! clip-fetch https://example.com/v/123 -o downloads
//! clip-fetch https://www.instagram.com/reel/xyz/ -c cookies.txt
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use clip_relay::downloader::{DownloadRequest, ExtractorOptions, MediaExtractor, YtDlpExtractor};
use clip_relay::scratch::Scratch;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clip-fetch")]
#[command(about = "Download one video with yt-dlp the way the bot does", long_about = None)]
#[command(version)]
struct Cli {
    /// Page or media URL
    url: String,

    /// Netscape-format cookie file for authenticated sources
    #[arg(short, long)]
    cookies: Option<PathBuf>,

    /// Directory the file is saved in
    #[arg(short, long, default_value = "downloads")]
    output: PathBuf,

    /// Refuse files larger than this many MiB
    #[arg(long)]
    max_size_mb: Option<u64>,

    /// yt-dlp executable
    #[arg(long, default_value = "yt-dlp")]
    ytdlp_path: String,
}

fn run(cli: Cli) -> Result<()> {
    if let Some(ref cookies) = cli.cookies {
        if !cookies.is_file() {
            bail!("cookie file {} does not exist", cookies.display());
        }
    }

    let options = cli
        .max_size_mb
        .map_or_else(ExtractorOptions::default, |mb| {
            ExtractorOptions::with_max_filesize(mb.saturating_mul(1024 * 1024))
        });
    let extractor = YtDlpExtractor::new(cli.ytdlp_path, options);

    let scratch = Scratch::open(&cli.output)
        .with_context(|| format!("cannot use output directory {}", cli.output.display()))?;
    let slot = scratch.allocate();

    let request = DownloadRequest::new(cli.url).with_cookies(cli.cookies);
    let result = extractor
        .fetch(&request, &slot.target())
        .with_context(|| format!("failed to download {}", request.url))?;

    // Keep the download; the slot guard would delete it otherwise
    let _ = slot.persist();

    println!("Saved: {}", result.path.display());
    println!("Title: {}", result.title);
    Ok(())
}

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
