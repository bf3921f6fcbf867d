//! Every provider the process knows about, by name.
//!
//! Native adapters are registered first, then plugins in file-name order,
//! so a plugin can never shadow a built-in site.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ProviderError, Result};
use crate::extract::ExtractorRegistry;
use crate::http_client::BrowserClient;
use crate::plugin::{self, HostCapabilities};
use crate::provider::Provider;
use crate::sites::{FlixHq, SFlix};

#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
    failed_plugins: Vec<(PathBuf, ProviderError)>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry described by `config`: enabled native adapters,
    /// then every plugin in the plugin directory.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let client = BrowserClient::with_timeout(config.timeout())?;
        let extractors = ExtractorRegistry::with_defaults(client.clone());
        let mut registry = Self::new();

        let flixhq = &config.providers.flixhq;
        if flixhq.enabled {
            let mut site = FlixHq::new(client.clone(), extractors.clone());
            if let Some(base) = &flixhq.base_url {
                site = site.with_base_url(base.clone());
            }
            registry.register(Arc::new(site));
        }

        let sflix = &config.providers.sflix;
        if sflix.enabled {
            let mut site = SFlix::new(client.clone(), extractors.clone());
            if let Some(base) = &sflix.base_url {
                site = site.with_base_url(base.clone());
            }
            registry.register(Arc::new(site));
        }

        if config.plugins.enabled {
            let host = HostCapabilities::new(client, extractors)
                .with_each_errors(config.plugins.each_errors);
            let dir = config.plugin_dir();
            let set = plugin::discover(&dir, &host).await?;
            for loaded in set.loaded {
                registry.register(Arc::new(loaded));
            }
            registry.failed_plugins = set.failed;
        }

        info!(
            providers = registry.providers.len(),
            failed_plugins = registry.failed_plugins.len(),
            "Provider registry ready"
        );
        Ok(registry)
    }

    /// Add a provider. A name already taken (ignoring case) is skipped and
    /// `false` returned.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> bool {
        if self.get(provider.name()).is_some() {
            warn!(name = provider.name(), "Provider name already registered, skipping");
            return false;
        }
        debug!(name = provider.name(), kind = %provider.kind(), "Registered provider");
        self.providers.push(provider);
        true
    }

    /// Provider by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Plugin files that failed to load, with the reason.
    pub fn failed_plugins(&self) -> &[(PathBuf, ProviderError)] {
        &self.failed_plugins
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Health-check every provider concurrently, in registration order.
    pub async fn health_check_all(&self) -> Vec<(String, Result<()>)> {
        let checks = self.providers.iter().map(|p| async move {
            let result = p.health_check().await;
            if let Err(e) = &result {
                debug!(name = p.name(), error = %e, "Health check failed");
            }
            (p.name().to_string(), result)
        });
        join_all(checks).await
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("failed_plugins", &self.failed_plugins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PluginsConfig, ProvidersConfig, SiteConfig};
    use crate::media::{Episode, Media, MediaDetails, MediaKind, Quality, Season, StreamUrl};
    use async_trait::async_trait;

    struct Stub {
        name: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl Provider for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn kind(&self) -> MediaKind {
            MediaKind::Movie
        }
        async fn search(&self, _query: &str) -> Result<Vec<Media>> {
            Ok(Vec::new())
        }
        async fn get_trending(&self) -> Result<Vec<Media>> {
            Err(ProviderError::Unsupported("trending"))
        }
        async fn get_recent(&self) -> Result<Vec<Media>> {
            Err(ProviderError::Unsupported("recent"))
        }
        async fn get_media_details(&self, _id: &str) -> Result<MediaDetails> {
            Err(ProviderError::Unsupported("details"))
        }
        async fn get_seasons(&self, _media_id: &str) -> Result<Vec<Season>> {
            Ok(Vec::new())
        }
        async fn get_episodes(&self, _season_id: &str) -> Result<Vec<Episode>> {
            Ok(Vec::new())
        }
        async fn get_stream_url(&self, _episode_id: &str, _quality: &Quality) -> Result<StreamUrl> {
            Err(ProviderError::NoSources)
        }
        async fn get_available_qualities(&self, _episode_id: &str) -> Result<Vec<Quality>> {
            Ok(Vec::new())
        }
        async fn health_check(&self) -> Result<()> {
            if self.healthy {
                Ok(())
            } else {
                Err(ProviderError::Unhealthy(format!("{} is down", self.name)))
            }
        }
    }

    fn stub(name: &'static str, healthy: bool) -> Arc<dyn Provider> {
        Arc::new(Stub { name, healthy })
    }

    #[test]
    fn duplicate_names_are_skipped() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.register(stub("Alpha", true)));
        assert!(!registry.register(stub("alpha", false)));
        assert!(registry.register(stub("Beta", true)));
        assert_eq!(registry.names(), vec!["Alpha", "Beta"]);
    }

    #[test]
    fn lookup_ignores_case() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub("FlixHQ", true));
        assert!(registry.get("flixhq").is_some());
        assert!(registry.get("sflix").is_none());
    }

    #[tokio::test]
    async fn health_checks_keep_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub("up", true));
        registry.register(stub("down", false));
        let results = registry.health_check_all().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "up");
        assert!(results[0].1.is_ok());
        assert!(results[1].1.as_ref().unwrap_err().to_string().contains("down"));
    }

    #[tokio::test]
    async fn natives_then_plugins_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.js"),
            r#"function get_name() { return "flixhq"; }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.js"),
            r#"function get_name() { return "Local"; }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("c.js"), "function (").unwrap();

        let config = Config {
            plugins: PluginsConfig {
                dir: Some(dir.path().to_path_buf()),
                ..PluginsConfig::default()
            },
            providers: ProvidersConfig {
                flixhq: SiteConfig::default(),
                sflix: SiteConfig {
                    enabled: false,
                    base_url: None,
                },
            },
            ..Config::default()
        };

        let registry = ProviderRegistry::from_config(&config).await.unwrap();
        assert_eq!(registry.names(), vec!["flixhq", "Local"]);
        assert_eq!(registry.failed_plugins().len(), 1);
        assert!(registry.failed_plugins()[0].0.ends_with("c.js"));
    }

    #[tokio::test]
    async fn plugins_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.js"), r#"function get_name() { return "P"; }"#).unwrap();
        let config = Config {
            plugins: PluginsConfig {
                enabled: false,
                dir: Some(dir.path().to_path_buf()),
                ..PluginsConfig::default()
            },
            ..Config::default()
        };
        let registry = ProviderRegistry::from_config(&config).await.unwrap();
        assert_eq!(registry.names(), vec!["flixhq", "sflix"]);
    }
}
