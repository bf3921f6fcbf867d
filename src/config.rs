//! Configuration loaded from `~/.config/marquee/config.toml`.
//!
//! Every key is optional; a missing file is the default configuration.
//!
//! ```toml
//! [http]
//! timeout_secs = 30
//!
//! [plugins]
//! enabled = true
//! dir = "/home/me/.config/marquee/plugins"
//! each_errors = "swallow"   # or "propagate"
//!
//! [providers.flixhq]
//! enabled = true
//! base_url = "https://flixhq.to"
//!
//! [providers.sflix]
//! enabled = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::plugin::EachErrors;

/// Environment variable that replaces the config directory.
pub const CONFIG_HOME_ENV: &str = "MARQUEE_CONFIG_HOME";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub plugins: PluginsConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub enabled: bool,
    /// Defaults to `<config dir>/plugins`.
    pub dir: Option<PathBuf>,
    pub each_errors: EachErrors,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            each_errors: EachErrors::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub flixhq: SiteConfig,
    pub sflix: SiteConfig,
}

/// One native adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub enabled: bool,
    /// Mirror to use instead of the built-in domain.
    pub base_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
        }
    }
}

impl Config {
    /// Load `<config dir>/config.toml`.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir().join(CONFIG_FILE))
    }

    /// Load a specific file. Returns defaults if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Configured plugin directory (a leading `~` is the home directory),
    /// else `<config dir>/plugins`.
    pub fn plugin_dir(&self) -> PathBuf {
        match &self.plugins.dir {
            Some(dir) => expand_home(dir),
            None => config_dir().join("plugins"),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

/// `$MARQUEE_CONFIG_HOME`, else the platform config directory plus `marquee`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_HOME_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marquee")
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
