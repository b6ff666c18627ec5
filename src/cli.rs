//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use imagecapture_core::{ImageSize, SearchOption};

/// Default number of URLs to collect.
const DEFAULT_COUNT: usize = 30;

/// Search image engines for a keyword and optionally download the results.
///
/// Without `--output` the collected image URLs are printed one per line;
/// with it, the images are downloaded and the saved paths printed instead.
#[derive(Parser, Debug)]
#[command(name = "imagecapture")]
#[command(author, version, about)]
pub struct Args {
    /// Keyword to search for
    pub keyword: String,

    /// Maximum number of image URLs to collect (1-10000)
    #[arg(short = 'n', long, default_value_t = DEFAULT_COUNT, value_parser = parse_count)]
    pub count: usize,

    /// Search engine to query
    #[arg(short = 'e', long, value_enum, default_value_t = Engine::Baidu)]
    pub engine: Engine,

    /// Concurrent page requests (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Restrict results to a size class
    #[arg(long, value_enum)]
    pub size: Option<SizeArg>,

    /// Only recent images
    #[arg(long)]
    pub latest: bool,

    /// Only animated images
    #[arg(long)]
    pub animated: bool,

    /// Only high-definition images (Baidu only)
    #[arg(long)]
    pub hd: bool,

    /// Only copyright-filtered images (Baidu only)
    #[arg(long)]
    pub copyright: bool,

    /// Download the images into this directory
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Name downloaded files after their SHA-256 content hash
    #[arg(long, requires = "output")]
    pub hash_naming: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/imagecapture/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Supported search engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    Baidu,
    Bing,
}

/// Size classes accepted by `--size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SizeArg {
    Small,
    Medium,
    Large,
    Enormous,
}

impl From<SizeArg> for ImageSize {
    fn from(size: SizeArg) -> Self {
        match size {
            SizeArg::Small => Self::Small,
            SizeArg::Medium => Self::Medium,
            SizeArg::Large => Self::Large,
            SizeArg::Enormous => Self::Enormous,
        }
    }
}

impl Args {
    /// Search options selected by the flags, in a stable order.
    #[must_use]
    pub fn search_options(&self) -> Vec<SearchOption> {
        let mut options = Vec::new();
        if let Some(size) = self.size {
            options.push(SearchOption::Size(size.into()));
        }
        if self.latest {
            options.push(SearchOption::Latest);
        }
        if self.animated {
            options.push(SearchOption::Animated);
        }
        if self.hd {
            options.push(SearchOption::HighDefinition);
        }
        if self.copyright {
            options.push(SearchOption::Copyright);
        }
        options
    }
}

fn parse_count(raw: &str) -> Result<usize, String> {
    let count: usize = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a whole number"))?;
    if (1..=10_000).contains(&count) {
        Ok(count)
    } else {
        Err(format!("{count} is not in 1..=10000"))
    }
}
