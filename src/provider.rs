//! The uniform provider contract.
//!
//! A [`Provider`] is any media source: a native scraper under
//! [`crate::sites`] or a loaded script under [`crate::plugin`]. Callers
//! (the CLI, or any front-end embedding the library) only ever see this
//! trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::media::{Episode, Media, MediaDetails, MediaKind, Quality, Season, StreamUrl};

/// Trait for media providers.
///
/// Implementors normalise whatever their upstream returns into the types of
/// [`crate::media`]. Stream resolution goes through
/// [`crate::resolve`] so that every provider shares the same fallback
/// behaviour.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Display name, unique within a registry.
    fn name(&self) -> &str;

    /// What this provider serves.
    fn kind(&self) -> MediaKind;

    async fn search(&self, query: &str) -> Result<Vec<Media>>;

    async fn get_trending(&self) -> Result<Vec<Media>>;

    async fn get_recent(&self) -> Result<Vec<Media>>;

    async fn get_media_details(&self, id: &str) -> Result<MediaDetails>;

    async fn get_seasons(&self, media_id: &str) -> Result<Vec<Season>>;

    async fn get_episodes(&self, season_id: &str) -> Result<Vec<Episode>>;

    /// Resolve one playable stream. Never cached.
    async fn get_stream_url(&self, episode_id: &str, quality: &Quality) -> Result<StreamUrl>;

    async fn get_available_qualities(&self, episode_id: &str) -> Result<Vec<Quality>>;

    /// `Ok(())` when the upstream is reachable.
    async fn health_check(&self) -> Result<()>;

    /// Free-form metadata record. Defaults to the serialised details.
    async fn get_info(&self, id: &str) -> Result<serde_json::Value> {
        let details = self.get_media_details(id).await?;
        Ok(serde_json::to_value(details)?)
    }
}
