//! CLI entry point for the image search crawler.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use imagecapture_core::{
    BaiduCapture, BaiduSite, BingCapture, BingSite, CaptureConfig, DownloaderConfig, ImageCapture,
    Rule, RuleSet,
};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::FileConfig;
use cli::{Args, Engine};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

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

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load_config(args.config.as_deref())?.unwrap_or_default();
    debug!(?file_config, "configuration loaded");

    let config = capture_config(&args, &file_config);
    let capture: Box<dyn ImageCapture> = match args.engine {
        Engine::Baidu => Box::new(
            BaiduCapture::new(BaiduSite::new(), config).context("Failed to set up Baidu search")?,
        ),
        Engine::Bing => Box::new(
            BingCapture::new(BingSite::new(), config).context("Failed to set up Bing search")?,
        ),
    };

    info!(keyword = %args.keyword, engine = ?args.engine, count = args.count, "searching");
    let urls = capture
        .search(&args.keyword, args.count, &args.search_options())
        .await
        .context("Search failed")?;
    info!(found = urls.len(), "search complete");
    if urls.len() < args.count {
        warn!(found = urls.len(), requested = args.count, "fewer results than requested");
    }

    let output_dir: Option<PathBuf> = args.output.clone().or(file_config.output_dir.clone());
    let Some(dir) = output_dir else {
        for url in &urls {
            println!("{url}");
        }
        capture.shutdown();
        return Ok(());
    };

    let hash_naming = args.hash_naming || file_config.hash_naming.unwrap_or(false);
    let paths = capture
        .batch_download(&urls, &dir, hash_naming)
        .await
        .with_context(|| format!("Failed to download into '{}'", dir.display()))?;
    for path in &paths {
        println!("{}", path.display());
    }
    info!(
        saved = paths.len(),
        failed = urls.len() - paths.len(),
        dir = %dir.display(),
        "download complete"
    );

    capture.shutdown();
    Ok(())
}

/// Merges file config under CLI flags.
fn capture_config(args: &Args, file: &FileConfig) -> CaptureConfig {
    let mut config = CaptureConfig::default();
    if let Some(concurrency) = args.concurrency.or(file.concurrency) {
        config.concurrency = usize::from(concurrency);
    }
    if let Some(secs) = file.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if !file.excluded_domains.is_empty() {
        config.rules = config
            .rules
            .with_rule(Rule::new("config", file.excluded_domains.iter().cloned()));
    }

    let mut downloader = DownloaderConfig::default();
    if let Some(concurrency) = file.download_concurrency {
        downloader.concurrency = usize::from(concurrency);
    }
    if let Some(secs) = file.download_timeout_secs {
        downloader.download_timeout = Duration::from_secs(secs);
    }
    config.downloader = downloader;
    config
}
