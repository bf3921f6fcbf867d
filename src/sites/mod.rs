//! Native adapters: streaming sites scraped directly.
//!
//! Both adapters share the same page model ([`SiteInfo`]), the same
//! metadata cache and the same per-server extraction step; only URLs and
//! selectors differ.
//!
//! ```text
//! search ──► /search/{slug}            cached by query
//! info   ──► /{id} (+ AJAX episodes)   cached by media id
//! stream ──► servers ──► /ajax/episode/sources/{server} ──► embed ──► extractor
//! ```

pub mod cache;
pub mod flixhq;
pub mod sflix;

use scraper::{ElementRef, Selector};
use serde::Serialize;

use crate::error::{ProviderError, Result};
use crate::extract::ExtractorRegistry;
use crate::http_client::BrowserClient;
use crate::media::{
    Episode, EpisodeRef, Media, MediaDetails, MediaKind, Season, SeasonRef, Server, VideoSources,
};

pub use cache::MetadataCache;
pub use flixhq::FlixHq;
pub use sflix::SFlix;

/// Everything scraped from one title page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteInfo {
    pub id: String,
    pub url: String,
    pub title: String,
    pub kind: MediaKind,
    pub poster_url: String,
    pub description: String,
    pub released: String,
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rating: String,
    pub episodes: Vec<SiteEpisode>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteEpisode {
    pub id: String,
    pub number: u32,
    /// 0 when the page does not say; treated as season 1.
    pub season: u32,
    pub title: String,
    /// Parent media id, carried into the episode id when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
}

impl SiteEpisode {
    fn season_number(&self) -> u32 {
        self.season.max(1)
    }
}

impl SiteInfo {
    fn year(&self) -> Option<u32> {
        year_prefix(&self.released)
    }

    pub fn details(&self, id: &str) -> MediaDetails {
        MediaDetails {
            media: Media {
                id: id.to_string(),
                title: self.title.clone(),
                kind: self.kind,
                poster_url: self.poster_url.clone(),
                year: self.year(),
                status: self.released.clone(),
            },
            synopsis: self.description.clone(),
            genres: self.genres.clone(),
            seasons: self.seasons(id),
        }
    }

    /// Distinct seasons in ascending order. No episodes at all means one
    /// season addressed by the bare media id.
    pub fn seasons(&self, media_id: &str) -> Vec<Season> {
        if self.episodes.is_empty() {
            return vec![Season {
                id: media_id.to_string(),
                number: 1,
                title: "Season 1".to_string(),
            }];
        }

        let mut numbers: Vec<u32> = self.episodes.iter().map(SiteEpisode::season_number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
            .into_iter()
            .map(|n| Season {
                id: SeasonRef::new(media_id, n).to_string(),
                number: n,
                title: format!("Season {n}"),
            })
            .collect()
    }

    /// Episodes of one season. A page without episodes yields one synthetic
    /// episode for season 1.
    pub fn episodes(&self, season: &SeasonRef) -> Vec<Episode> {
        if self.episodes.is_empty() {
            return if season.number == 1 {
                vec![Episode {
                    id: self.id.clone(),
                    number: 1,
                    title: self.title.clone(),
                    season: 1,
                }]
            } else {
                Vec::new()
            };
        }

        self.episodes
            .iter()
            .filter(|ep| ep.season_number() == season.number)
            .map(|ep| Episode {
                id: EpisodeRef {
                    episode_id: ep.id.clone(),
                    media_id: ep.media_id.clone().filter(|m| *m != ep.id),
                }
                .to_string(),
                number: ep.number,
                title: ep.title.clone(),
                season: ep.season_number(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Scraping helpers
// ---------------------------------------------------------------------------

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ProviderError::Parse(format!("selector {css}: {e:?}")))
}

/// Trimmed text of the first match under `el`.
pub(crate) fn first_text(el: ElementRef<'_>, sel: &Selector) -> String {
    el.select(sel).next().map(element_text).unwrap_or_default()
}

pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Attribute of the first match under `el`.
pub(crate) fn first_attr(el: ElementRef<'_>, sel: &Selector, name: &str) -> Option<String> {
    el.select(sel)
        .next()
        .and_then(|m| m.value().attr(name))
        .map(str::to_string)
}

/// Leading four-digit year of a date like `2010-07-16`.
pub(crate) fn year_prefix(text: &str) -> Option<u32> {
    text.get(..4)
        .and_then(|y| y.parse().ok())
        .filter(|y| (1900..2100).contains(y))
}

/// Embed URL from a `/ajax/episode/sources/{id}` response.
pub(crate) fn embed_link(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let direct = ["link", "embed", "url"]
        .iter()
        .find_map(|k| json.get(k).and_then(|v| v.as_str()));
    let nested = || {
        let result = json.get("result")?;
        ["url", "link"]
            .iter()
            .find_map(|k| result.get(k).and_then(|v| v.as_str()))
    };
    direct
        .or_else(nested)
        .filter(|link| !link.is_empty())
        .map(str::to_string)
}

/// One server attempt: locator → embed URL → extractor.
pub(crate) async fn extract_server(
    client: &BrowserClient,
    extractors: &ExtractorRegistry,
    referer: &str,
    server: &Server,
) -> Result<VideoSources> {
    let body = client.get_xhr(&server.locator, Some(referer)).await?;
    let embed = embed_link(&body).ok_or_else(|| {
        ProviderError::Parse(format!("no embed URL found in response from {}", server.locator))
    })?;
    let extractor = extractors
        .lookup(&server.name)
        .ok_or_else(|| ProviderError::NoExtractor(server.name.clone()))?;
    extractor.extract(&embed).await
}
