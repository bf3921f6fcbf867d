//! FlixHQ scraper.
//!
//! Movie pages carry their watch id on `.watch_block`; TV pages list every
//! episode inline under `.ss-list`. Server lists come from one of two AJAX
//! endpoints depending on whether the id is a movie or an episode.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{
    element_text, extract_server, first_attr, first_text, selector, MetadataCache, SiteEpisode,
    SiteInfo,
};
use crate::error::{ProviderError, Result};
use crate::extract::ExtractorRegistry;
use crate::http_client::BrowserClient;
use crate::media::{
    Episode, Media, MediaDetails, MediaKind, Quality, Season, SeasonRef, Server, StreamUrl,
    VideoSources,
};
use crate::provider::Provider;
use crate::resolve::{self, ServerSource};

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\W_]+").expect("valid regex"));
static SERVER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(\d+)$").expect("valid regex"));

/// FlixHQ provider.
pub struct FlixHq {
    base_url: String,
    client: BrowserClient,
    extractors: ExtractorRegistry,
    search_cache: MetadataCache<Vec<Media>>,
    info_cache: MetadataCache<SiteInfo>,
}

impl FlixHq {
    pub const NAME: &'static str = "flixhq";
    pub const DEFAULT_BASE_URL: &'static str = "https://flixhq.to";

    pub fn new(client: BrowserClient, extractors: ExtractorRegistry) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            client,
            extractors,
            search_cache: MetadataCache::new(),
            info_cache: MetadataCache::new(),
        }
    }

    /// Point at a mirror (or a test server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Search slug: runs of non-word characters become `-`.
    fn slug(query: &str) -> String {
        NON_WORD.replace_all(query, "-").into_owned()
    }

    fn sources_url(&self, server_id: &str) -> String {
        format!("{}/ajax/episode/sources/{server_id}", self.base_url)
    }

    /// Scraped title page, cached by id.
    pub async fn info(&self, id: &str) -> Result<Arc<SiteInfo>> {
        self.info_cache
            .get_or_try_insert_with(id, || async {
                let url = format!("{}/{}", self.base_url, id.trim_start_matches('/'));
                let html = self.client.get_page(&url, Some(&self.base_url)).await?;
                self.parse_info(id, url, &html)
            })
            .await
    }

    fn parse_search(&self, html: &str) -> Result<Vec<Media>> {
        let doc = Html::parse_document(html);
        let item_sel = selector(".film_list-wrap > div.flw-item")?;
        let title_sel = selector(".film-detail .film-name a")?;
        let link_sel = selector(".film-poster a")?;
        let img_sel = selector(".film-poster img")?;
        let info_sel = selector(".film-detail .fd-infor .fdi-item")?;

        let mut results = Vec::new();
        for item in doc.select(&item_sel) {
            let title = first_text(item, &title_sel);
            let Some(href) = first_attr(item, &link_sel, "href").filter(|h| !h.is_empty()) else {
                continue;
            };
            if title.is_empty() {
                continue;
            }

            let mut kind = MediaKind::Movie;
            let mut released = String::new();
            for info in item.select(&info_sel) {
                let text = element_text(info);
                if text.contains("TV") {
                    kind = MediaKind::Tv;
                } else if text.contains("Movie") {
                    kind = MediaKind::Movie;
                }
                if text.parse::<u32>().is_ok_and(|y| y > 1900 && y < 2100) {
                    released = text;
                }
            }

            results.push(Media {
                id: href.trim_start_matches('/').to_string(),
                title,
                kind,
                poster_url: first_attr(item, &img_sel, "data-src").unwrap_or_default(),
                year: super::year_prefix(&released),
                status: released,
            });
        }
        Ok(results)
    }

    fn parse_info(&self, id: &str, url: String, html: &str) -> Result<SiteInfo> {
        let doc = Html::parse_document(html);
        let root = doc.root_element();
        let row_sel = selector(".row-line")?;
        let strong_sel = selector("strong")?;
        let a_sel = selector("a")?;

        let mut info = SiteInfo {
            id: id.to_string(),
            url,
            title: first_text(root, &selector(".heading-name a")?),
            poster_url: first_attr(root, &selector(".m_i-d-poster img")?, "src").unwrap_or_default(),
            description: first_text(root, &selector(".description")?),
            ..SiteInfo::default()
        };

        for row in doc.select(&row_sel) {
            let label = first_text(row, &strong_sel);
            if label.contains("Released") {
                info.released = first_text(row, &a_sel);
            } else if label.contains("Genre") {
                info.genres.extend(
                    row.select(&a_sel)
                        .map(element_text)
                        .filter(|g| !g.is_empty()),
                );
            }
        }

        let is_tv = info.title.to_lowercase().contains("season")
            || doc.select(&selector("#episodes-content")?).next().is_some();

        if is_tv {
            info.kind = MediaKind::Tv;
            let ep_sel = selector(".ss-list a.ssl-item.ep-item")?;
            let order_sel = selector(".ssli-order")?;
            let name_sel = selector(".ssli-detail .ep-name")?;
            info.episodes = doc
                .select(&ep_sel)
                .enumerate()
                .map(|(i, ep)| SiteEpisode {
                    id: ep.value().attr("data-id").unwrap_or_default().to_string(),
                    number: first_text(ep, &order_sel)
                        .parse()
                        .unwrap_or_else(|_| u32::try_from(i + 1).unwrap_or(u32::MAX)),
                    season: 0,
                    title: first_text(ep, &name_sel),
                    media_id: None,
                })
                .collect();
        } else {
            info.kind = MediaKind::Movie;
            if let Some(watch_id) = first_attr(root, &selector(".watch_block")?, "data-id") {
                info.episodes.push(SiteEpisode {
                    id: watch_id,
                    number: 1,
                    season: 1,
                    title: info.title.clone(),
                    media_id: None,
                });
            }
        }

        debug!(id, kind = %info.kind, episodes = info.episodes.len(), "Parsed FlixHQ info");
        Ok(info)
    }

    /// `/ajax/movie/episodes/{id}`: `<a title="Vidcloud" href="/watch-movie/...-19764.1613445">`.
    fn parse_movie_servers(&self, html: &str) -> Result<Vec<Server>> {
        let doc = Html::parse_document(html);
        Ok(doc
            .select(&selector("a")?)
            .filter_map(|a| {
                let name = a.value().attr("title").filter(|t| !t.is_empty())?;
                let href = a.value().attr("href")?;
                let id = SERVER_ID.captures(href)?.get(1)?.as_str();
                Some(Server::new(name.to_lowercase(), self.sources_url(id)))
            })
            .collect())
    }

    /// `/ajax/v2/episode/servers/{id}`: `.nav-item a[data-id]`, sometimes
    /// wrapped in `{"html": "..."}`.
    fn parse_episode_servers(&self, body: &str) -> Result<Vec<Server>> {
        let html = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("html").and_then(|h| h.as_str()).map(str::to_string))
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| body.to_string());

        let doc = Html::parse_document(&html);
        Ok(doc
            .select(&selector(".nav-item a")?)
            .filter_map(|a| {
                let name = element_text(a);
                let id = a.value().attr("data-id")?;
                (!name.is_empty()).then(|| Server::new(name.to_lowercase(), self.sources_url(id)))
            })
            .collect())
    }
}

#[async_trait]
impl ServerSource for FlixHq {
    async fn discover(&self, episode_id: &str) -> Result<Vec<Server>> {
        let movie_url = format!("{}/ajax/movie/episodes/{episode_id}", self.base_url);
        match self.client.get_xhr(&movie_url, Some(&self.base_url)).await {
            Ok(body) => {
                let servers = self.parse_movie_servers(&body)?;
                if !servers.is_empty() {
                    return Ok(servers);
                }
            }
            Err(e) => debug!(error = %e, "Movie server list unavailable; trying episode endpoint"),
        }

        let tv_url = format!("{}/ajax/v2/episode/servers/{episode_id}", self.base_url);
        let body = self.client.get_xhr(&tv_url, Some(&self.base_url)).await?;
        self.parse_episode_servers(&body)
    }

    async fn extract(&self, server: &Server) -> Result<VideoSources> {
        extract_server(&self.client, &self.extractors, &self.base_url, server).await
    }
}

#[async_trait]
impl Provider for FlixHq {
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
                self.parse_search(&html)
            })
            .await?;
        Ok(results.as_ref().clone())
    }

    async fn get_trending(&self) -> Result<Vec<Media>> {
        Err(ProviderError::Unsupported("flixhq trending"))
    }

    async fn get_recent(&self) -> Result<Vec<Media>> {
        Err(ProviderError::Unsupported("flixhq recent"))
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
