//! Plugin discovery: every `*.js` file directly inside one directory.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::host::HostCapabilities;
use super::runner::PluginProvider;
use crate::error::{ProviderError, Result};

/// File extension of plugin scripts.
pub const PLUGIN_EXTENSION: &str = "js";

/// Outcome of scanning a plugin directory.
#[derive(Debug, Default)]
pub struct PluginSet {
    pub loaded: Vec<PluginProvider>,
    /// Files that failed to load, with the reason. Not fatal.
    pub failed: Vec<(PathBuf, ProviderError)>,
}

/// Plugin script paths in `dir`, sorted by file name. A missing directory
/// has no plugins.
pub fn plugin_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "Plugin directory does not exist");
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().is_some_and(|ext| ext == PLUGIN_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

/// Load every plugin in `dir`. Each file gets its own runtime; one bad file
/// is recorded in [`PluginSet::failed`] and skipped.
pub async fn discover(dir: &Path, host: &HostCapabilities) -> Result<PluginSet> {
    let mut set = PluginSet::default();
    for path in plugin_files(dir)? {
        match PluginProvider::load(path.clone(), host.clone()).await {
            Ok(plugin) => set.loaded.push(plugin),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load plugin");
                set.failed.push((path, e));
            }
        }
    }
    debug!(
        loaded = set.loaded.len(),
        failed = set.failed.len(),
        "Plugin discovery finished"
    );
    Ok(set)
}
