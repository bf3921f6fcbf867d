//! `marquee` - one provider contract over streaming sites and script plugins
//!
//! # Features
//!
//! - **Uniform providers**: native scrapers and JavaScript plugins behind one [`Provider`] trait
//! - **Plugins**: sandboxed `QuickJS` contexts with HTTP, HTML query, JSON and extractor capabilities
//! - **Resolution**: ordered multi-server fallback with cancellation and quality selection
//! - **Browser identity**: realistic Chrome/Firefox/Safari headers on every request
//!
//! # Example
//!
//! ```rust,no_run
//! use marquee::{Config, Provider, ProviderRegistry, Quality};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = ProviderRegistry::from_config(&Config::load()?).await?;
//!     let flixhq = registry.get("flixhq").expect("built in");
//!     let hits = flixhq.search("inception").await?;
//!     let seasons = flixhq.get_seasons(&hits[0].id).await?;
//!     let episodes = flixhq.get_episodes(&seasons[0].id).await?;
//!     let stream = flixhq.get_stream_url(&episodes[0].id, &Quality::auto()).await?;
//!     println!("{}", stream.url);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod http_client;
pub mod media;
pub mod plugin;
pub mod provider;
pub mod registry;
pub mod resolve;
pub mod sites;

pub use config::Config;
pub use error::{ProviderError, Result};
pub use extract::{Extractor, ExtractorRegistry};
pub use fingerprint::{chrome_profile, firefox_profile, random_profile, safari_profile, BrowserProfile};
pub use http_client::BrowserClient;
pub use media::{
    Episode, EpisodeRef, Media, MediaDetails, MediaKind, Quality, Season, SeasonRef, Server, Source,
    StreamType, StreamUrl, Subtitle, VideoSources,
};
pub use plugin::{HostCapabilities, PluginProvider};
pub use provider::Provider;
pub use registry::ProviderRegistry;
pub use resolve::{resolve, resolve_with, ResolveStrategy, ServerSource};
pub use sites::{FlixHq, SFlix};

/// Version of marquee
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
