//! Embed hosts that expose a `getSources` JSON endpoint next to the player.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::Extractor;
use crate::error::{ProviderError, Result};
use crate::http_client::BrowserClient;
use crate::media::{Quality, Source, Subtitle, VideoSources};

/// Where the `getSources` endpoint lives relative to the embed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedLayout {
    /// `/embed-4/{id}` → `/ajax/embed-4/getSources?id={id}`
    AjaxPrefix,
    /// `/embed-2/e-1/{id}` → `/embed-2/ajax/e-1/getSources?id={id}`
    NestedAjax,
}

impl EmbedLayout {
    fn sources_url(self, embed: &Url) -> Result<Url> {
        let segments: Vec<&str> = embed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let path = match (self, segments.as_slice()) {
            (Self::AjaxPrefix, [dir @ .., id]) if !dir.is_empty() => {
                format!("/ajax/{}/getSources?id={id}", dir.join("/"))
            }
            (Self::NestedAjax, [dir, sub @ .., id]) if !sub.is_empty() => {
                format!("/{dir}/ajax/{}/getSources?id={id}", sub.join("/"))
            }
            _ => {
                return Err(ProviderError::Parse(format!(
                    "unrecognised embed path: {}",
                    embed.path()
                )))
            }
        };

        embed
            .join(&path)
            .map_err(|e| ProviderError::Parse(format!("bad sources URL {path}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct SourcesResponse {
    #[serde(default)]
    sources: Option<RawSources>,
    #[serde(default)]
    tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSources {
    Plain(Vec<RawSource>),
    Encrypted(String),
}

#[derive(Debug, Deserialize)]
struct RawSource {
    file: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    file: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    kind: String,
}

/// Extractor for `getSources`-style embed hosts.
pub struct EmbedExtractor {
    name: &'static str,
    layout: EmbedLayout,
    client: BrowserClient,
}

impl EmbedExtractor {
    pub fn new(name: &'static str, layout: EmbedLayout, client: BrowserClient) -> Self {
        Self {
            name,
            layout,
            client,
        }
    }
}

#[async_trait]
impl Extractor for EmbedExtractor {
    fn name(&self) -> &'static str {
        self.name
    }

    #[instrument(skip(self), fields(extractor = self.name))]
    async fn extract(&self, embed_url: &str) -> Result<VideoSources> {
        let embed = Url::parse(embed_url)
            .map_err(|e| ProviderError::Parse(format!("bad embed URL {embed_url}: {e}")))?;
        let sources_url = self.layout.sources_url(&embed)?;
        let referer = format!("{}/", embed.origin().ascii_serialization());

        debug!(url = %sources_url, "Requesting embed sources");
        let body = self
            .client
            .get_xhr(sources_url.as_str(), Some(embed_url))
            .await?;
        let response: SourcesResponse = serde_json::from_str(&body)?;

        let sources = match response.sources {
            Some(RawSources::Plain(list)) => list,
            Some(RawSources::Encrypted(_)) => {
                return Err(ProviderError::Parse(format!(
                    "{} returned encrypted sources",
                    self.name
                )))
            }
            None => Vec::new(),
        };

        let sources = sources
            .into_iter()
            .filter(|s| !s.file.is_empty())
            .map(|s| Source {
                is_m3u8: s.kind.eq_ignore_ascii_case("hls") || s.file.contains(".m3u8"),
                url: s.file,
                quality: Quality::AUTO.to_string(),
                referer: referer.clone(),
            })
            .collect();

        let subtitles = response
            .tracks
            .into_iter()
            .filter(|t| matches!(t.kind.as_str(), "captions" | "subtitles"))
            .map(|t| Subtitle {
                url: t.file,
                lang: t.label,
            })
            .collect();

        Ok(VideoSources { sources, subtitles })
    }
}
