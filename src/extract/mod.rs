//! Extractors: embed page URL → concrete sources and subtitles.
//!
//! The registry is fixed at construction. Hints are matched by
//! case-insensitive substring, so a server called "UpCloud HD" still finds
//! the `upcloud` extractor. An unmatched hint is not an error here; callers
//! decide whether that is fatal (the native adapters treat it as a
//! per-server failure, plugins get an empty result).

mod embed;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::http_client::BrowserClient;
use crate::media::VideoSources;

pub use embed::{EmbedExtractor, EmbedLayout};

/// Turns one embed URL into playable sources.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, embed_url: &str) -> Result<VideoSources>;
}

/// Fixed, ordered set of extractors keyed by hint substring.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    entries: Vec<(&'static str, Arc<dyn Extractor>)>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in set: `vidcloud`, `upcloud` and `megacloud`.
    pub fn with_defaults(client: BrowserClient) -> Self {
        let ajax: Arc<dyn Extractor> =
            Arc::new(EmbedExtractor::new("vidcloud", EmbedLayout::AjaxPrefix, client.clone()));
        let nested: Arc<dyn Extractor> =
            Arc::new(EmbedExtractor::new("megacloud", EmbedLayout::NestedAjax, client));

        let mut registry = Self::new();
        registry.register("vidcloud", Arc::clone(&ajax));
        registry.register("upcloud", ajax);
        registry.register("megacloud", nested);
        registry
    }

    /// Add an extractor. Earlier registrations win on overlapping hints.
    pub fn register(&mut self, key: &'static str, extractor: Arc<dyn Extractor>) {
        self.entries.push((key, extractor));
    }

    /// First extractor whose key occurs in `hint`, ignoring case.
    pub fn lookup(&self, hint: &str) -> Option<Arc<dyn Extractor>> {
        let hint = hint.to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| hint.contains(key))
            .map(|(_, extractor)| Arc::clone(extractor))
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}
