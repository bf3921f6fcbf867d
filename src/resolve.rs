//! Multi-server stream resolution.
//!
//! ```text
//! discover servers ──► [s1, s2, ... sN]
//!                          │
//!        for each (cancellation checked first):
//!            extract(s) ──► Err   → record, warn, next
//!                       ──► empty → next
//!                       ──► sources → done (FirstSuccess)
//!                          │
//!        exhausted ──► any Err?  → AllServersFailed(last error)
//!                  ──► otherwise → empty VideoSources
//! ```
//!
//! An empty result is "nothing playable", not a failure. Callers that need
//! exactly one URL go through [`into_stream_url`], which turns empty into
//! [`ProviderError::NoSources`].

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ProviderError, Result};
use crate::media::{Quality, Server, Source, StreamType, StreamUrl, VideoSources};

/// Where servers come from and how a single server is turned into sources.
///
/// Native adapters implement this over their AJAX endpoints; the plugin
/// adapter implements it over a plugin's `get_servers` plus the host's
/// extractor registry.
#[async_trait]
pub trait ServerSource: Send + Sync {
    /// Ordered candidate servers for an episode.
    async fn discover(&self, episode_id: &str) -> Result<Vec<Server>>;

    /// Run the extractor for one server.
    async fn extract(&self, server: &Server) -> Result<VideoSources>;
}

/// Score function over a non-empty result. Higher wins.
pub type ScoreFn = fn(&VideoSources) -> i64;

/// How to choose between servers that produced sources.
#[derive(Clone, Copy, Default)]
pub enum ResolveStrategy {
    /// Stop at the first server with a playable source.
    #[default]
    FirstSuccess,
    /// Try every server and keep the best scoring result. Ties keep the
    /// earlier server.
    Ranked(ScoreFn),
}

impl fmt::Debug for ResolveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstSuccess => f.write_str("FirstSuccess"),
            Self::Ranked(_) => f.write_str("Ranked(..)"),
        }
    }
}

/// Resolve with the default first-success strategy.
pub async fn resolve(
    source: &dyn ServerSource,
    episode_id: &str,
    cancel: &CancellationToken,
) -> Result<VideoSources> {
    resolve_with(source, episode_id, ResolveStrategy::FirstSuccess, cancel).await
}

/// Run the pipeline for one episode.
pub async fn resolve_with(
    source: &dyn ServerSource,
    episode_id: &str,
    strategy: ResolveStrategy,
    cancel: &CancellationToken,
) -> Result<VideoSources> {
    let servers = source
        .discover(episode_id)
        .await
        .map_err(|e| ProviderError::Discovery(Box::new(e)))?;

    if servers.is_empty() {
        debug!(episode_id, "No servers listed");
        return Ok(VideoSources::default());
    }
    debug!(episode_id, count = servers.len(), "Servers discovered");

    let mut last_error: Option<ProviderError> = None;
    let mut best: Option<(i64, VideoSources)> = None;

    for server in &servers {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        match source.extract(server).await {
            Ok(found) if found.has_playable() => match strategy {
                ResolveStrategy::FirstSuccess => {
                    debug!(server = %server.name, sources = found.sources.len(), "Server resolved");
                    return Ok(found);
                }
                ResolveStrategy::Ranked(score) => {
                    let s = score(&found);
                    debug!(server = %server.name, score = s, "Server scored");
                    if best.as_ref().map_or(true, |(b, _)| s > *b) {
                        best = Some((s, found));
                    }
                }
            },
            Ok(_) => debug!(server = %server.name, "Server returned no sources"),
            Err(e) => {
                warn!(server = %server.name, error = %e, "Server extraction failed");
                last_error = Some(ProviderError::Server {
                    server: server.name.clone(),
                    source: Box::new(e),
                });
            }
        }
    }

    if let Some((_, found)) = best {
        return Ok(found);
    }

    match last_error {
        Some(last) => Err(ProviderError::AllServersFailed {
            attempts: servers.len(),
            last: Box::new(last),
        }),
        None => Ok(VideoSources::default()),
    }
}

/// Pick the source matching `quality`, case-insensitively. `auto` matches a
/// source labelled `auto`. No match falls back to the first source. Sources
/// without a URL are never picked.
pub fn select_source<'a>(sources: &'a [Source], quality: &Quality) -> Option<&'a Source> {
    let wanted = if quality.is_auto() {
        Quality::AUTO
    } else {
        quality.as_str()
    };
    let mut playable = sources.iter().filter(|s| !s.url.is_empty());
    let first = playable.clone().next();
    playable
        .find(|s| s.quality.eq_ignore_ascii_case(wanted))
        .or(first)
}

/// Collapse resolved sources into the single stream handed to a player.
pub fn into_stream_url(found: VideoSources, quality: &Quality) -> Result<StreamUrl> {
    let chosen = select_source(&found.sources, quality).ok_or(ProviderError::NoSources)?;

    let stream_type = if chosen.is_m3u8 || chosen.url.contains(".m3u8") {
        StreamType::Hls
    } else {
        StreamType::Mp4
    };
    let mut headers = HashMap::new();
    if !chosen.referer.is_empty() {
        headers.insert("Referer".to_string(), chosen.referer.clone());
    }
    let quality = if chosen.quality.is_empty() {
        Quality::auto()
    } else {
        Quality::new(chosen.quality.clone())
    };

    Ok(StreamUrl {
        url: chosen.url.clone(),
        quality,
        stream_type,
        referer: chosen.referer.clone(),
        headers,
        subtitles: found.subtitles,
    })
}

/// Distinct source qualities in list order.
pub fn qualities(found: &VideoSources) -> Vec<Quality> {
    let mut out: Vec<Quality> = Vec::new();
    for source in &found.sources {
        let label = if source.quality.is_empty() {
            Quality::AUTO
        } else {
            source.quality.as_str()
        };
        if !out.iter().any(|q| q.matches(label)) {
            out.push(Quality::new(label));
        }
    }
    out
}

/// Prefers HLS, then the highest numeric resolution in the label.
pub fn score_by_resolution(found: &VideoSources) -> i64 {
    found
        .sources
        .iter()
        .map(|s| {
            let height: i64 = s
                .quality
                .trim_end_matches(|c: char| !c.is_ascii_digit())
                .parse()
                .unwrap_or(0);
            height + if s.is_m3u8 { 10_000 } else { 0 }
        })
        .max()
        .unwrap_or(0)
}
