//! Uniform media model shared by native adapters and plugins.
//!
//! Catalogue data ([`Media`], [`MediaDetails`], [`Season`], [`Episode`]) may
//! be cached for the lifetime of a provider. Stream data ([`Source`],
//! [`VideoSources`], [`StreamUrl`]) carries time-limited upstream tokens and
//! must never outlive the call that resolved it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a provider (or a single title) serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Tv,
    MovieOrTv,
    Anime,
    Manga,
    /// Sentinel for providers that could not report a kind.
    #[default]
    Unknown,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
            Self::MovieOrTv => "movie_or_tv",
            Self::Anime => "anime",
            Self::Manga => "manga",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = std::convert::Infallible;

    /// Lenient: anything unrecognised maps to [`MediaKind::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" | "film" => Self::Movie,
            "tv" | "series" | "tv series" | "show" => Self::Tv,
            "movie_or_tv" | "movie_tv" | "movies_and_tv" | "movietv" => Self::MovieOrTv,
            "anime" => Self::Anime,
            "manga" => Self::Manga,
            _ => Self::Unknown,
        };
        Ok(kind)
    }
}

/// A search or listing hit. Identity is `id`, namespaced by provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Media {
    pub id: String,
    pub title: String,
    pub kind: MediaKind,
    pub poster_url: String,
    pub year: Option<u32>,
    pub status: String,
}

/// Full metadata for one title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MediaDetails {
    #[serde(flatten)]
    pub media: Media,
    pub synopsis: String,
    pub genres: Vec<String>,
    pub seasons: Vec<Season>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Season {
    pub id: String,
    pub number: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Episode {
    pub id: String,
    pub number: u32,
    pub title: String,
    pub season: u32,
}

/// One candidate upstream host for an episode.
///
/// `name` selects the extractor (case-insensitive); `locator` is opaque to
/// everything except the adapter that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub name: String,
    pub locator: String,
}

impl Server {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }
}

/// Open quality label. `auto` is distinguished; everything else is
/// provider-specific and has no cross-provider ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(String);

impl Quality {
    pub const AUTO: &'static str = "auto";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn auto() -> Self {
        Self(Self::AUTO.to_string())
    }

    pub fn is_auto(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::AUTO)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive label comparison.
    pub fn matches(&self, label: &str) -> bool {
        self.0.eq_ignore_ascii_case(label)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::auto()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Quality {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Source {
    pub url: String,
    pub quality: String,
    /// Segmented (HLS) stream rather than a progressive file.
    pub is_m3u8: bool,
    pub referer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Subtitle {
    pub url: String,
    pub lang: String,
}

/// Result of one extractor run. Empty is a valid, non-error outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VideoSources {
    pub sources: Vec<Source>,
    pub subtitles: Vec<Subtitle>,
}

impl VideoSources {
    /// `true` when at least one source has a usable URL.
    pub fn has_playable(&self) -> bool {
        self.sources.iter().any(|s| !s.url.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Hls,
    Mp4,
}

/// A single playable choice handed to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUrl {
    pub url: String,
    pub quality: Quality,
    pub stream_type: StreamType,
    pub referer: String,
    pub headers: HashMap<String, String>,
    pub subtitles: Vec<Subtitle>,
}

// ---------------------------------------------------------------------------
// Composite identifiers
// ---------------------------------------------------------------------------

/// Season identity synthesised from a media id. Encoded `mediaID|number`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRef {
    pub media_id: String,
    pub number: u32,
}

impl SeasonRef {
    pub fn new(media_id: impl Into<String>, number: u32) -> Self {
        Self {
            media_id: media_id.into(),
            number,
        }
    }

    /// Decode a season id. A bare media id (or an unparsable suffix) is
    /// season 1.
    pub fn parse(encoded: &str) -> Self {
        match encoded.split_once('|') {
            Some((media_id, number)) => Self {
                media_id: media_id.to_string(),
                number: number.trim().parse().unwrap_or(1),
            },
            None => Self::new(encoded, 1),
        }
    }
}

impl fmt::Display for SeasonRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.media_id, self.number)
    }
}

/// Episode identity that carries its parent media id, so server discovery
/// can tell movies from series without extra state. Encoded
/// `episodeID|mediaID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRef {
    pub episode_id: String,
    pub media_id: Option<String>,
}

impl EpisodeRef {
    pub fn parse(encoded: &str) -> Self {
        match encoded.split_once('|') {
            Some((episode_id, media_id)) if !media_id.is_empty() => Self {
                episode_id: episode_id.to_string(),
                media_id: Some(media_id.to_string()),
            },
            Some((episode_id, _)) => Self {
                episode_id: episode_id.to_string(),
                media_id: None,
            },
            None => Self {
                episode_id: encoded.to_string(),
                media_id: None,
            },
        }
    }

    /// Kind hint carried by the media id prefix (`movie/...`, `tv/...`).
    pub fn is_movie(&self) -> bool {
        self.media_id.as_deref().is_some_and(|m| m.contains("movie"))
    }
}

impl fmt::Display for EpisodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.media_id {
            Some(media_id) => write!(f, "{}|{}", self.episode_id, media_id),
            None => f.write_str(&self.episode_id),
        }
    }
}
