//! Configuration file loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// TOML-backed defaults for the `batchfetch` CLI. Flags override every field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default concurrency (same range as the CLI).
    pub concurrency: Option<usize>,
    /// Requests admitted per rate-limit cycle.
    pub rate: Option<usize>,
    /// Rate-limit cycle length in milliseconds.
    pub cycle_ms: Option<u64>,
    /// Defer admissions instead of sleeping when the quota is spent.
    pub non_blocking: Option<bool>,
    /// Adaptive pacing coefficient.
    pub pacing: Option<f64>,
    /// Base URL for relative inputs.
    pub base_url: Option<String>,
    /// Capture response headers.
    pub headers: Option<bool>,
    /// Spool bodies to temporary files.
    pub temp_files: Option<bool>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// `User-Agent` header value.
    pub user_agent: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=1000).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=1000");
        }

        if let Some(rate) = self.rate
            && rate == 0
        {
            bail!("Invalid config value for `rate`: 0. Expected at least 1");
        }

        if let Some(cycle_ms) = self.cycle_ms
            && !(1..=3_600_000).contains(&cycle_ms)
        {
            bail!("Invalid config value for `cycle_ms`: {cycle_ms}. Expected range: 1..=3600000");
        }

        if let Some(pacing) = self.pacing
            && !(pacing.is_finite() && pacing >= 0.0)
        {
            bail!("Invalid config value for `pacing`: {pacing}. Expected a non-negative number");
        }

        if let Some(timeout) = self.timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 1..=3600");
        }

        if let Some(base_url) = &self.base_url {
            url::Url::parse(base_url)
                .with_context(|| format!("Invalid config value for `base_url`: '{base_url}'"))?;
        }

        Ok(())
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/batchfetch/config.toml`
/// 2. `$HOME/.config/batchfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("batchfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("batchfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit`, or from the default path if present.
///
/// An explicit path must exist; a missing default file is not an error.
pub fn load_file_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = read_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path) if path.exists() => Some(read_config(path)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn read_config(path: &Path) -> Result<FileConfig> {
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
