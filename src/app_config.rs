//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// TOML-backed file configuration. Every key is optional; CLI flags win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Concurrent page requests (same range as the CLI).
    pub concurrency: Option<u8>,
    /// Concurrent downloads in a batch.
    pub download_concurrency: Option<u8>,
    /// Deadline for one search page request, in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Deadline for one image download, in seconds.
    pub download_timeout_secs: Option<u64>,
    /// Download directory used when `--output` is not given.
    pub output_dir: Option<PathBuf>,
    /// Name downloads after their content hash.
    pub hash_naming: Option<bool>,
    /// Extra host suffixes to exclude, added as one rule group.
    #[serde(default)]
    pub excluded_domains: Vec<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_concurrency("concurrency", self.concurrency)?;
        validate_concurrency("download_concurrency", self.download_concurrency)?;
        validate_timeout_secs("request_timeout_secs", self.request_timeout_secs)?;
        validate_timeout_secs("download_timeout_secs", self.download_timeout_secs)?;

        if let Some(domain) = self
            .excluded_domains
            .iter()
            .find(|domain| domain.trim().is_empty() || domain.contains('/'))
        {
            bail!(
                "Invalid config value in `excluded_domains`: '{domain}'. Expected a bare host suffix"
            );
        }
        Ok(())
    }
}

fn validate_concurrency(field: &str, value: Option<u8>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=100).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=100");
    }
    Ok(())
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/imagecapture/config.toml`
/// 2. `$HOME/.config/imagecapture/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("imagecapture")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("imagecapture")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config from `explicit` if given, otherwise from the default
/// path when a file exists there.
///
/// A missing explicit file is an error; a missing default file is not.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return load_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}
