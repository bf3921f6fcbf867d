//! SFlix scraper.
//!
//! Ids keep their `movie/` or `tv/` prefix, and episode ids carry the media
//! id (`episodeID|mediaID`) so that server discovery knows which endpoint
//! to use. TV episodes are not on the title page; they come from a season
//! list plus one request per season.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{
    element_text, extract_server, first_attr, first_text, selector, MetadataCache, SiteEpisode,
    SiteInfo,
};
use crate::error::{ProviderError, Result};
use crate::extract::ExtractorRegistry;
use crate::http_client::BrowserClient;
use crate::media::{
    Episode, EpisodeRef, Media, MediaDetails, MediaKind, Quality, Season, SeasonRef, Server,
    StreamUrl, VideoSources,
};
use crate::provider::Provider;
use crate::resolve::{self, ServerSource};

/// SFlix provider.
pub struct SFlix {
    base_url: String,
    client: BrowserClient,
    extractors: ExtractorRegistry,
    search_cache: MetadataCache<Vec<Media>>,
    info_cache: MetadataCache<SiteInfo>,
}

/// A season entry from `/ajax/season/list/{id}`.
#[derive(Debug, PartialEq, Eq)]
struct SeasonEntry {
    data_id: String,
    number: u32,
}

impl SFlix {
    pub const NAME: &'static str = "sflix";
    pub const DEFAULT_BASE_URL: &'static str = "https://sflix.ps";

    pub fn new(client: BrowserClient, extractors: ExtractorRegistry) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            client,
            extractors,
            search_cache: MetadataCache::new(),
            info_cache: MetadataCache::new(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn slug(query: &str) -> String {
        urlencoding::encode(&query.replace(' ', "-")).into_owned()
    }

    /// Scraped title page plus episodes, cached by the id as given.
    pub async fn info(&self, id: &str) -> Result<Arc<SiteInfo>> {
        self.info_cache
            .get_or_try_insert_with(id, || self.fetch_info(id))
            .await
    }

    async fn fetch_info(&self, id: &str) -> Result<SiteInfo> {
        let (kind, media_id, html, url) = if id.starts_with("movie/") || id.starts_with("tv/") {
            let kind = if id.starts_with("tv/") { MediaKind::Tv } else { MediaKind::Movie };
            let url = format!("{}/{id}", self.base_url);
            let html = self.client.get_page(&url, Some(&self.base_url)).await?;
            (kind, id.to_string(), html, url)
        } else {
            // Bare id: try the movie page, then the TV page.
            let movie_url = format!("{}/movie/{id}", self.base_url);
            match self.client.get_page(&movie_url, Some(&self.base_url)).await {
                Ok(html) => (MediaKind::Movie, format!("movie/{id}"), html, movie_url),
                Err(e) => {
                    debug!(id, error = %e, "No movie page; trying TV");
                    let tv_url = format!("{}/tv/{id}", self.base_url);
                    let html = self.client.get_page(&tv_url, Some(&self.base_url)).await?;
                    (MediaKind::Tv, format!("tv/{id}"), html, tv_url)
                }
            }
        };

        let (mut info, data_id) = parse_info(&media_id, kind, url, &html)?;
        let Some(data_id) = data_id else {
            return Ok(info);
        };

        match kind {
            MediaKind::Tv => match self.fetch_episodes(&data_id).await {
                Ok(mut episodes) => {
                    for ep in &mut episodes {
                        ep.media_id = Some(media_id.clone());
                    }
                    info.episodes = episodes;
                }
                Err(e) => warn!(id, error = %e, "Failed to fetch SFlix episode list"),
            },
            _ => info.episodes.push(SiteEpisode {
                id: data_id,
                number: 1,
                season: 1,
                title: info.title.clone(),
                media_id: Some(media_id),
            }),
        }
        Ok(info)
    }

    /// Season list, then each season's episodes. A season that fails to
    /// load is skipped.
    async fn fetch_episodes(&self, show_id: &str) -> Result<Vec<SiteEpisode>> {
        let url = format!("{}/ajax/season/list/{show_id}", self.base_url);
        let body = self.client.get_xhr(&url, Some(&self.base_url)).await?;
        let seasons = parse_seasons(&body)?;

        let mut episodes = Vec::new();
        for season in seasons {
            let url = format!("{}/ajax/season/episodes/{}", self.base_url, season.data_id);
            match self.client.get_xhr(&url, Some(&self.base_url)).await {
                Ok(body) => episodes.extend(parse_episodes(&body, season.number)?),
                Err(e) => warn!(season = season.number, error = %e, "Skipping season"),
            }
        }
        Ok(episodes)
    }

    fn parse_search(html: &str) -> Result<Vec<Media>> {
        let doc = Html::parse_document(html);
        let item_sel = selector("div.flw-item")?;
        let link_sel = selector("h2.film-name a")?;
        let img_sel = selector("img")?;
        let info_sel = selector(".fdi-item")?;

        let mut results = Vec::new();
        for item in doc.select(&item_sel) {
            let Some(href) = first_attr(item, &link_sel, "href").filter(|h| !h.is_empty()) else {
                continue;
            };
            let parts: Vec<&str> = href.trim_start_matches('/').split('/').collect();
            let (id, kind) = match parts.as_slice() {
                [prefix, slug, ..] => (
                    format!("{prefix}/{slug}"),
                    if *prefix == "tv" { MediaKind::Tv } else { MediaKind::Movie },
                ),
                [only] => ((*only).to_string(), MediaKind::Movie),
                [] => continue,
            };

            let year = item
                .select(&info_sel)
                .map(element_text)
                .filter(|t| t.len() == 4)
                .filter_map(|t| t.parse::<u32>().ok())
                .last();

            results.push(Media {
                id,
                title: first_text(item, &link_sel),
                kind,
                poster_url: first_attr(item, &img_sel, "data-src").unwrap_or_default(),
                year,
                status: String::new(),
            });
        }
        Ok(results)
    }

    /// Movies list servers at `/ajax/episode/list`, episodes at
    /// `/ajax/episode/servers`.
    fn servers_url(&self, episode: &EpisodeRef) -> String {
        let endpoint = if episode.is_movie() { "list" } else { "servers" };
        format!("{}/ajax/episode/{endpoint}/{}", self.base_url, episode.episode_id)
    }

    fn parse_servers(&self, html: &str) -> Result<Vec<Server>> {
        let doc = Html::parse_document(html);
        let a_sel = selector("a")?;
        let name_sel = selector("a span")?;
        Ok(doc
            .select(&selector(".ulclear > li")?)
            .filter_map(|li| {
                let data_id = first_attr(li, &a_sel, "data-id")?;
                let name = first_text(li, &name_sel);
                (!name.is_empty()).then(|| {
                    Server::new(
                        name.to_lowercase(),
                        format!("{}/ajax/episode/sources/{data_id}", self.base_url),
                    )
                })
            })
            .collect())
    }
}

/// Title page fields plus the watch `data-id`, if any.
fn parse_info(
    media_id: &str,
    kind: MediaKind,
    url: String,
    html: &str,
) -> Result<(SiteInfo, Option<String>)> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    let a_sel = selector("a")?;

    let rating = first_text(root, &selector("span.imdb")?);
    let mut info = SiteInfo {
        id: media_id.to_string(),
        url,
        title: first_text(root, &selector("h2.heading-name")?),
        kind,
        poster_url: first_attr(root, &selector("img.film-poster-img")?, "src").unwrap_or_default(),
        description: first_text(root, &selector("div.description")?),
        rating: rating.trim_start_matches("IMDB:").trim().to_string(),
        ..SiteInfo::default()
    };

    for row in doc.select(&selector("div.elements .row-line")?) {
        let text = row.text().collect::<String>();
        if let Some((_, released)) = text.split_once("Released:") {
            info.released = released.trim().to_string();
        }
        if text.contains("Genre:") {
            info.genres.extend(
                row.select(&a_sel)
                    .map(element_text)
                    .filter(|g| !g.is_empty() && !g.to_lowercase().contains("http")),
            );
        }
    }

    let watch_sel = selector("#watch")?;
    let data_id = first_attr(root, &selector(".detail_page-watch")?, "data-id")
        .or_else(|| first_attr(root, &watch_sel, "data-id"))
        .filter(|d| !d.is_empty());

    Ok((info, data_id))
}

/// `.ss-item[data-id]` entries. "Season N" text gives the number, else the
/// position.
fn parse_seasons(html: &str) -> Result<Vec<SeasonEntry>> {
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&selector(".ss-item")?)
        .enumerate()
        .filter_map(|(i, item)| {
            let data_id = item.value().attr("data-id")?.to_string();
            let position = u32::try_from(i + 1).unwrap_or(u32::MAX);
            let number = element_text(item)
                .split_once("Season ")
                .and_then(|(_, n)| n.trim().parse().ok())
                .unwrap_or(position);
            Some(SeasonEntry { data_id, number })
        })
        .collect())
}

/// `.eps-item[data-id]` entries of one season.
fn parse_episodes(html: &str, season: u32) -> Result<Vec<SiteEpisode>> {
    let doc = Html::parse_document(html);
    let number_sel = selector(".episode-number")?;
    let title_sel = selector(".film-name a")?;
    Ok(doc
        .select(&selector(".eps-item")?)
        .enumerate()
        .filter_map(|(i, item)| {
            let id = item.value().attr("data-id")?.to_string();
            let number = first_text(item, &number_sel)
                .trim_start_matches("Episode ")
                .trim_end_matches(':')
                .trim()
                .parse()
                .unwrap_or_else(|_| u32::try_from(i + 1).unwrap_or(u32::MAX));
            Some(SiteEpisode {
                id,
                number,
                season,
                title: first_text(item, &title_sel),
                media_id: None,
            })
        })
        .collect())
}

#[async_trait]
impl ServerSource for SFlix {
    async fn discover(&self, episode_id: &str) -> Result<Vec<Server>> {
        let episode = EpisodeRef::parse(episode_id);
        let body = self
            .client
            .get_xhr(&self.servers_url(&episode), Some(&self.base_url))
            .await?;
        self.parse_servers(&body)
    }

    async fn extract(&self, server: &Server) -> Result<VideoSources> {
        extract_server(&self.client, &self.extractors, &self.base_url, server).await
    }
}

#[async_trait]
impl Provider for SFlix {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> MediaKind {
        MediaKind::MovieOrTv
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<Media>> {
        let results = self
            .search_cache
            .get_or_try_insert_with(query, || async {
                let url = format!("{}/search/{}", self.base_url, Self::slug(query));
                let html = self.client.get_page(&url, Some(&self.base_url)).await?;
                Self::parse_search(&html)
            })
            .await?;
        Ok(results.as_ref().clone())
    }

    async fn get_trending(&self) -> Result<Vec<Media>> {
        Err(ProviderError::Unsupported("sflix trending"))
    }

    async fn get_recent(&self) -> Result<Vec<Media>> {
        Err(ProviderError::Unsupported("sflix recent"))
    }

    async fn get_media_details(&self, id: &str) -> Result<MediaDetails> {
        Ok(self.info(id).await?.details(id))
    }

    async fn get_seasons(&self, media_id: &str) -> Result<Vec<Season>> {
        Ok(self.info(media_id).await?.seasons(media_id))
    }

    async fn get_episodes(&self, season_id: &str) -> Result<Vec<Episode>> {
        let season = SeasonRef::parse(season_id);
        Ok(self.info(&season.media_id).await?.episodes(&season))
    }

    #[instrument(skip(self))]
    async fn get_stream_url(&self, episode_id: &str, quality: &Quality) -> Result<StreamUrl> {
        let found = resolve::resolve(self, episode_id, &CancellationToken::new()).await?;
        resolve::into_stream_url(found, quality)
    }

    async fn get_available_qualities(&self, episode_id: &str) -> Result<Vec<Quality>> {
        let found = resolve::resolve(self, episode_id, &CancellationToken::new()).await?;
        Ok(resolve::qualities(&found))
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .get_page(&self.base_url, None)
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::Unhealthy(format!("{}: {e}", Self::NAME)))
    }

    async fn get_info(&self, id: &str) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.info(id).await?.as_ref())?)
    }
}
