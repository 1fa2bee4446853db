use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::disk_space::DEFAULT_MARGIN_PERCENT;

/// Retry policy parameters (`[retry]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per download (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Jitter fraction applied to each delay (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Base delay as a `Duration`; out-of-range values fall back to 1s.
    pub fn base_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.base_delay_secs).unwrap_or(Duration::from_secs(1))
    }
}

/// Connection parameters (`[network]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub connect_timeout_secs: u64,
    /// Upper bound for one whole attempt.
    pub timeout_secs: u64,
    pub max_redirects: u32,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            timeout_secs: 300,
            max_redirects: 5,
            user_agent: format!("rdm/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Destination volume checks (`[disk]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Extra space required on top of the bytes still to be written.
    pub safety_margin_percent: u8,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            safety_margin_percent: DEFAULT_MARGIN_PERCENT,
        }
    }
}

/// Global configuration loaded from `~/.config/rdm/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdmConfig {
    pub retry: RetryConfig,
    pub network: NetworkConfig,
    pub disk: DiskConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Read and parse a config file. Missing sections and keys take defaults.
pub fn load_from(path: &Path) -> Result<RdmConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let cfg: RdmConfig = toml::from_str(&data)
        .with_context(|| format!("malformed config file {}", path.display()))?;
    Ok(cfg)
}

/// Write `cfg` to `path`, creating parent directories.
pub fn write_to(path: &Path, cfg: &RdmConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml)?;
    Ok(())
}

/// Load configuration from disk, creating a default file if none exists.
///
/// A default file that cannot be written is only logged; an existing file
/// that cannot be read or parsed is an error.
pub fn load_or_init() -> Result<RdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RdmConfig::default();
        match write_to(&path, &default_cfg) {
            Ok(()) => tracing::info!("created default config at {}", path.display()),
            Err(e) => tracing::warn!("could not write default config to {}: {:#}", path.display(), e),
        }
        return Ok(default_cfg);
    }
    load_from(&path)
}
