//! Plugin adapter: one script behind the [`Provider`] contract.
//!
//! Every call goes through `spawn_blocking` and takes the plugin's lock for
//! its whole duration, so a script never sees two calls at once. Host
//! capabilities called from inside the script run their I/O on the ambient
//! tokio runtime (see [`super::host`]).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::engine::PluginEngine;
use super::host::HostCapabilities;
use super::value::{shape, PluginValue};
use crate::error::{ProviderError, Result};
use crate::extract::ExtractorRegistry;
use crate::media::{
    Episode, Media, MediaDetails, MediaKind, Quality, Season, Server, Source, StreamType,
    StreamUrl, Subtitle, VideoSources,
};
use crate::provider::Provider;
use crate::resolve::{self, ServerSource};

/// Name reported by a plugin whose `get_name` is missing or fails.
pub const UNKNOWN_NAME: &str = "Unknown";

/// A loaded plugin script.
pub struct PluginProvider {
    name: String,
    kind: MediaKind,
    path: PathBuf,
    /// Defines `get_servers` but not `get_stream_url`.
    server_based: bool,
    engine: Arc<Mutex<PluginEngine>>,
    extractors: ExtractorRegistry,
}

impl PluginProvider {
    /// Load and evaluate the script at `path`. Load failures are returned
    /// here rather than on first call.
    pub async fn load(path: impl Into<PathBuf>, host: HostCapabilities) -> Result<Self> {
        let path = path.into();
        let extractors = host.extractors().clone();

        let task_path = path.clone();
        let (engine, name, kind, server_based) = tokio::task::spawn_blocking(move || {
            let engine = PluginEngine::load(&task_path, &host)?;

            let name = engine
                .call("get_name", &[])
                .map(|v| v.as_text())
                .ok()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_NAME.to_string());
            let kind = engine
                .call("get_type", &[])
                .map(|v| v.as_text().parse::<MediaKind>().unwrap_or_default())
                .unwrap_or_default();
            let server_based =
                engine.has_function("get_servers") && !engine.has_function("get_stream_url");

            Ok::<_, ProviderError>((engine, name, kind, server_based))
        })
        .await
        .map_err(|e| ProviderError::PluginLoad {
            path: path.clone(),
            message: format!("load task panicked: {e}"),
        })??;

        debug!(plugin = %name, kind = %kind, path = %path.display(), "Plugin loaded");
        Ok(Self {
            name,
            kind,
            path,
            server_based,
            engine: Arc::new(Mutex::new(engine)),
            extractors,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run one plugin function under the plugin's lock.
    async fn call(&self, function: &'static str, args: Vec<PluginValue>) -> Result<PluginValue> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
            engine.call(function, &args)
        })
        .await
        .map_err(|e| ProviderError::plugin_call(function, format!("task panicked: {e}")))?
    }

    async fn resolve_servers(&self, episode_id: &str) -> Result<VideoSources> {
        let servers = PluginServers { provider: self };
        resolve::resolve(&servers, episode_id, &CancellationToken::new()).await
    }
}

impl std::fmt::Debug for PluginProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginProvider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for PluginProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    #[instrument(skip(self), fields(plugin = %self.name))]
    async fn search(&self, query: &str) -> Result<Vec<Media>> {
        let out = self.call("search", vec![query.into()]).await?;
        media_list("search", &out)
    }

    async fn get_trending(&self) -> Result<Vec<Media>> {
        let out = self.call("get_trending", Vec::new()).await?;
        media_list("get_trending", &out)
    }

    async fn get_recent(&self) -> Result<Vec<Media>> {
        let out = self.call("get_recent", Vec::new()).await?;
        media_list("get_recent", &out)
    }

    async fn get_media_details(&self, id: &str) -> Result<MediaDetails> {
        let out = self.call("get_media_details", vec![id.into()]).await?;
        media_details("get_media_details", id, &out)
    }

    async fn get_seasons(&self, media_id: &str) -> Result<Vec<Season>> {
        let out = self.call("get_seasons", vec![media_id.into()]).await?;
        season_list("get_seasons", &out)
    }

    async fn get_episodes(&self, season_id: &str) -> Result<Vec<Episode>> {
        let out = self.call("get_episodes", vec![season_id.into()]).await?;
        episode_list("get_episodes", &out)
    }

    #[instrument(skip(self), fields(plugin = %self.name))]
    async fn get_stream_url(&self, episode_id: &str, quality: &Quality) -> Result<StreamUrl> {
        if self.server_based {
            let found = self.resolve_servers(episode_id).await?;
            return resolve::into_stream_url(found, quality);
        }
        let out = self
            .call(
                "get_stream_url",
                vec![episode_id.into(), quality.as_str().into()],
            )
            .await?;
        stream_url("get_stream_url", &out, quality)
    }

    async fn get_available_qualities(&self, episode_id: &str) -> Result<Vec<Quality>> {
        if self.server_based {
            let found = self.resolve_servers(episode_id).await?;
            return Ok(resolve::qualities(&found));
        }
        let out = self.call("get_qualities", vec![episode_id.into()]).await?;
        quality_list("get_qualities", &out)
    }

    async fn health_check(&self) -> Result<()> {
        match self.call("health_check", Vec::new()).await {
            Ok(PluginValue::Bool(false)) => Err(ProviderError::Unhealthy(format!(
                "{} reported unhealthy",
                self.name
            ))),
            Ok(_) => Ok(()),
            Err(e @ ProviderError::FunctionNotFound(_)) => Err(e),
            Err(e) => Err(ProviderError::Unhealthy(e.to_string())),
        }
    }

    async fn get_info(&self, id: &str) -> Result<serde_json::Value> {
        let out = self.call("get_info", vec![id.into()]).await?;
        Ok(out.to_json())
    }
}

/// Pipeline view of a plugin's `get_servers` plus the host extractors.
struct PluginServers<'a> {
    provider: &'a PluginProvider,
}

#[async_trait]
impl ServerSource for PluginServers<'_> {
    async fn discover(&self, episode_id: &str) -> Result<Vec<Server>> {
        let out = self
            .provider
            .call("get_servers", vec![episode_id.into()])
            .await?;
        let servers = objects("get_servers", &out)?
            .map(|item| {
                item.map(|s| {
                    Server::new(
                        s.get_any(&["name", "server"]).as_text(),
                        s.get_any(&["url", "embed", "link"]).as_text(),
                    )
                })
            })
            .collect();
        servers
    }

    async fn extract(&self, server: &Server) -> Result<VideoSources> {
        let extractor = self
            .provider
            .extractors
            .lookup(&server.name)
            .ok_or_else(|| ProviderError::NoExtractor(server.name.clone()))?;
        extractor.extract(&server.locator).await
    }
}

// ---------------------------------------------------------------------------
// Return-value decoding
// ---------------------------------------------------------------------------

/// Elements of a list result, each of which must be an object.
fn objects<'a>(
    function: &'a str,
    value: &'a PluginValue,
) -> Result<impl Iterator<Item = Result<&'a PluginValue>> + 'a> {
    Ok(value.expect_list(function)?.iter().map(move |item| match item {
        PluginValue::Map(_) => Ok(item),
        other => Err(shape(function, "object", other)),
    }))
}

fn media_from(value: &PluginValue) -> Media {
    let year = value.get_any(&["year", "release_year"]).as_u32();
    Media {
        id: value.get("id").as_text(),
        title: value.get_any(&["title", "name"]).as_text(),
        kind: value
            .get_any(&["type", "kind"])
            .as_text()
            .parse()
            .unwrap_or_default(),
        poster_url: value
            .get_any(&["poster_url", "posterUrl", "poster", "image"])
            .as_text(),
        year: (year > 0).then_some(year),
        status: value.get("status").as_text(),
    }
}

fn media_list(function: &str, value: &PluginValue) -> Result<Vec<Media>> {
    objects(function, value)?
        .map(|item| item.map(media_from))
        .collect()
}

fn media_details(
    function: &str,
    requested_id: &str,
    value: &PluginValue,
) -> Result<MediaDetails> {
    value.expect_map(function)?;
    let mut media = media_from(value);
    if media.id.is_empty() {
        media.id = requested_id.to_string();
    }
    Ok(MediaDetails {
        media,
        synopsis: value.get_any(&["synopsis", "description"]).as_text(),
        genres: value.get("genres").text_list(),
        seasons: season_list(function, value.get("seasons"))?,
    })
}

fn season_list(function: &str, value: &PluginValue) -> Result<Vec<Season>> {
    objects(function, value)?
        .map(|item| {
            item.map(|s| Season {
                id: s.get("id").as_text(),
                number: s.get_any(&["number", "season"]).as_u32(),
                title: s.get_any(&["title", "name"]).as_text(),
            })
        })
        .collect()
}

fn episode_list(function: &str, value: &PluginValue) -> Result<Vec<Episode>> {
    objects(function, value)?
        .map(|item| {
            item.map(|e| Episode {
                id: e.get("id").as_text(),
                number: e.get_any(&["number", "episode"]).as_u32(),
                title: e.get_any(&["title", "name"]).as_text(),
                season: e.get_any(&["season", "season_number"]).as_u32(),
            })
        })
        .collect()
}

fn quality_list(function: &str, value: &PluginValue) -> Result<Vec<Quality>> {
    Ok(value
        .expect_list(function)?
        .iter()
        .map(|q| match q {
            PluginValue::Map(_) => q.get_any(&["quality", "label"]).as_text(),
            other => other.as_text(),
        })
        .filter(|label| !label.is_empty())
        .map(Quality::new)
        .collect())
}

fn video_sources(value: &PluginValue) -> VideoSources {
    let sources = value
        .get("sources")
        .items()
        .iter()
        .map(|s| {
            let url = s.get_any(&["url", "file"]).as_text();
            Source {
                is_m3u8: s.get_any(&["is_m3u8", "isM3U8"]).as_bool() || url.contains(".m3u8"),
                quality: s.get("quality").as_text(),
                referer: s.get("referer").as_text(),
                url,
            }
        })
        .filter(|s| !s.url.is_empty())
        .collect();
    VideoSources {
        sources,
        subtitles: subtitles(value.get("subtitles")),
    }
}

fn subtitles(value: &PluginValue) -> Vec<Subtitle> {
    value
        .items()
        .iter()
        .map(|s| Subtitle {
            url: s.get_any(&["url", "file"]).as_text(),
            lang: s.get_any(&["lang", "language", "label"]).as_text(),
        })
        .filter(|s| !s.url.is_empty())
        .collect()
}

fn stream_type_for(url: &str) -> StreamType {
    if url.contains(".m3u8") {
        StreamType::Hls
    } else {
        StreamType::Mp4
    }
}

/// Accepts a bare URL, a stream object, or a sources object.
fn stream_url(
    function: &str,
    value: &PluginValue,
    requested: &Quality,
) -> Result<StreamUrl> {
    match value {
        PluginValue::Nil => Err(ProviderError::NoSources),
        PluginValue::String(url) if url.is_empty() => Err(ProviderError::NoSources),
        PluginValue::String(url) => Ok(StreamUrl {
            stream_type: stream_type_for(url),
            url: url.clone(),
            quality: requested.clone(),
            referer: String::new(),
            headers: HashMap::new(),
            subtitles: Vec::new(),
        }),
        PluginValue::Map(_) if !value.get("sources").is_nil() => {
            resolve::into_stream_url(video_sources(value), requested)
        }
        PluginValue::Map(_) => {
            let url = value.get("url").as_text();
            if url.is_empty() {
                return Err(ProviderError::NoSources);
            }
            let quality = match value.get("quality").as_text() {
                q if q.is_empty() => requested.clone(),
                q => Quality::new(q),
            };
            let declared = value.get_any(&["stream_type", "type"]).as_text().to_lowercase();
            let stream_type = match declared.as_str() {
                "hls" | "m3u8" => StreamType::Hls,
                "mp4" => StreamType::Mp4,
                _ => stream_type_for(&url),
            };
            let referer = value.get("referer").as_text();
            let mut headers: HashMap<String, String> =
                value.get("headers").text_map().into_iter().collect();
            if !referer.is_empty() {
                headers
                    .entry("Referer".to_string())
                    .or_insert_with(|| referer.clone());
            }
            Ok(StreamUrl {
                url,
                quality,
                stream_type,
                referer,
                headers,
                subtitles: subtitles(value.get("subtitles")),
            })
        }
        other => Err(shape(function, "string or object", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Extractor;
    use crate::http_client::BrowserClient;
    use std::io::Write;

    fn host_with(extractors: ExtractorRegistry) -> HostCapabilities {
        HostCapabilities::new(BrowserClient::new().unwrap(), extractors)
    }

    fn host() -> HostCapabilities {
        host_with(ExtractorRegistry::with_defaults(BrowserClient::new().unwrap()))
    }

    fn script(source: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
        file.write_all(source.as_bytes()).unwrap();
        file
    }

    async fn load(source: &str) -> (PluginProvider, tempfile::NamedTempFile) {
        let file = script(source);
        let provider = PluginProvider::load(file.path(), host()).await.unwrap();
        (provider, file)
    }

    const CATALOG: &str = r#"
        function get_name() { return "Catalog"; }
        function get_type() { return "tv"; }
        function search(q) {
            var doc = htmlParse('<div class="c"><a href="/tv/1">One</a><i>2019</i></div>' +
                                '<div class="c"><a href="/tv/2">Two</a></div>');
            var out = [];
            doc.find("div.c").each(function(i, el) {
                out.push({ id: el.find("a").attr("href"), title: el.find("a").text() + " " + q,
                           type: "tv", year: el.find("i").text() });
            });
            return out;
        }
        function get_trending() { return null; }
        function get_recent() { return "oops"; }
        function get_media_details(id) {
            return { title: "One", description: "Pilot", genres: ["Drama", 7],
                     seasons: [{ id: id + "|1", number: 1, title: "Season 1" }] };
        }
        function get_seasons(id) { return [{ id: id + "|1", number: "1" }]; }
        function get_episodes(sid) { return [{ id: "e1", number: 1, title: "Pilot", season: 1 }, "bad"]; }
        function get_stream_url(id, quality) {
            return { sources: [
                { url: "https://cdn.example/720.m3u8", quality: "720p" },
                { url: "https://cdn.example/1080.m3u8", quality: "1080p" }
            ], subtitles: [{ url: "https://cdn.example/en.vtt", lang: "en" }] };
        }
        function get_qualities(id) { return ["720p", { quality: "1080p" }, ""]; }
        function health_check() { return false; }
        function get_info(id) { return { id: id, nested: { ok: true } }; }
    "#;

    #[tokio::test]
    async fn only_get_name_defined() {
        let (provider, _file) = load(r#"function get_name() { return "Test"; }"#).await;
        assert_eq!(provider.name(), "Test");
        assert_eq!(provider.kind(), MediaKind::Unknown);
        let err = provider.search("anything").await.unwrap_err();
        assert_eq!(err.to_string(), "function not found: search");
    }

    #[tokio::test]
    async fn broken_name_and_type_fall_back_to_sentinels() {
        let (provider, _file) = load(
            r#"function get_name() { throw new Error("nope"); }
               function get_type() { return 42; }"#,
        )
        .await;
        assert_eq!(provider.name(), UNKNOWN_NAME);
        assert_eq!(provider.kind(), MediaKind::Unknown);
    }

    #[tokio::test]
    async fn load_failure_is_immediate() {
        let file = script("this is not javascript (");
        let err = PluginProvider::load(file.path(), host()).await.unwrap_err();
        assert!(matches!(err, ProviderError::PluginLoad { .. }));
    }

    #[tokio::test]
    async fn search_runs_document_queries_inside_the_plugin() {
        let (provider, _file) = load(CATALOG).await;
        assert_eq!(provider.name(), "Catalog");
        assert_eq!(provider.kind(), MediaKind::Tv);

        let results = provider.search("x").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "/tv/1");
        assert_eq!(results[0].title, "One x");
        assert_eq!(results[0].year, Some(2019));
        assert_eq!(results[1].year, None);
    }

    #[tokio::test]
    async fn list_results_are_strict_about_containers() {
        let (provider, _file) = load(CATALOG).await;
        assert!(provider.get_trending().await.unwrap().is_empty());

        let err = provider.get_recent().await.unwrap_err();
        assert!(matches!(err, ProviderError::Shape { expected: "list", .. }));

        let err = provider.get_episodes("s").await.unwrap_err();
        assert_eq!(err.to_string(), "get_episodes returned string, expected object");
    }

    #[tokio::test]
    async fn details_fill_missing_id_and_coerce_fields() {
        let (provider, _file) = load(CATALOG).await;
        let details = provider.get_media_details("tv/1").await.unwrap();
        assert_eq!(details.media.id, "tv/1");
        assert_eq!(details.synopsis, "Pilot");
        assert_eq!(details.genres, vec!["Drama", "7"]);
        assert_eq!(details.seasons[0].id, "tv/1|1");

        let seasons = provider.get_seasons("tv/1").await.unwrap();
        assert_eq!(seasons[0].number, 1);
        assert_eq!(seasons[0].title, "");
    }

    #[tokio::test]
    async fn stream_url_applies_quality_selection() {
        let (provider, _file) = load(CATALOG).await;
        let stream = provider
            .get_stream_url("e1", &Quality::new("1080P"))
            .await
            .unwrap();
        assert_eq!(stream.url, "https://cdn.example/1080.m3u8");
        assert_eq!(stream.stream_type, StreamType::Hls);
        assert_eq!(stream.subtitles.len(), 1);

        let fallback = provider.get_stream_url("e1", &Quality::auto()).await.unwrap();
        assert_eq!(fallback.url, "https://cdn.example/720.m3u8");
    }

    #[tokio::test]
    async fn qualities_health_and_info() {
        let (provider, _file) = load(CATALOG).await;
        let qualities = provider.get_available_qualities("e1").await.unwrap();
        assert_eq!(qualities, vec![Quality::new("720p"), Quality::new("1080p")]);

        let err = provider.health_check().await.unwrap_err();
        assert!(matches!(err, ProviderError::Unhealthy(_)));

        let info = provider.get_info("abc").await.unwrap();
        assert_eq!(info["id"], "abc");
        assert_eq!(info["nested"]["ok"], true);
    }

    #[tokio::test]
    async fn concurrent_calls_are_serialised() {
        let (provider, _file) = load(
            r#"var depth = 0;
               function search(q) {
                   depth += 1;
                   var seen = depth;
                   for (var i = 0; i < 10000; i++) {}
                   depth -= 1;
                   return [{ id: q, title: String(seen) }];
               }"#,
        )
        .await;
        let queries: Vec<String> = (0..8).map(|i| i.to_string()).collect();
        let results = futures::future::join_all(queries.iter().map(|q| provider.search(q))).await;
        for r in results {
            assert_eq!(r.unwrap()[0].title, "1");
        }
    }

    #[tokio::test]
    async fn search_fetches_pages_through_the_host_client() {
        use wiremock::matchers::{header, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "dark"))
            .and(header("referer", format!("{base}/").as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<div class="c"><a href="/tv/dark">Dark</a></div>"#)
                    .insert_header("x-status", "Ongoing"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (provider, _file) = load(&format!(
            r#"var BASE = "{base}";
               function search(q) {{
                   var r = httpGet(BASE + "/search?q=" + q, {{ Referer: BASE + "/" }});
                   if (r.statusCode !== 200) {{ return []; }}
                   var a = htmlParse(r.body).find("a");
                   return [{{ id: a.attr("href"), title: a.text(), status: r.headers["x-status"] }}];
               }}"#
        ))
        .await;

        let results = provider.search("dark").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "/tv/dark");
        assert_eq!(results[0].title, "Dark");
        assert_eq!(results[0].status, "Ongoing");
    }

    struct FakeExtractor;

    #[async_trait]
    impl Extractor for FakeExtractor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn extract(&self, embed_url: &str) -> Result<VideoSources> {
            if embed_url.contains("broken") {
                return Err(ProviderError::Parse("bad embed".into()));
            }
            Ok(VideoSources {
                sources: vec![Source {
                    url: format!("{embed_url}/master.m3u8"),
                    quality: "auto".into(),
                    is_m3u8: true,
                    referer: String::new(),
                }],
                subtitles: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn get_servers_goes_through_the_pipeline() {
        let mut extractors = ExtractorRegistry::new();
        extractors.register("fake", Arc::new(FakeExtractor));
        let file = script(
            r#"function get_name() { return "Servers"; }
               function get_servers(id) {
                   return [
                       { name: "Unknown Host", url: "https://x.example/1" },
                       { name: "Fake", url: "https://fake.example/broken" },
                       { name: "FAKE backup", url: "https://fake.example/" + id }
                   ];
               }"#,
        );
        let provider = PluginProvider::load(file.path(), host_with(extractors))
            .await
            .unwrap();

        let stream = provider.get_stream_url("ep9", &Quality::auto()).await.unwrap();
        assert_eq!(stream.url, "https://fake.example/ep9/master.m3u8");
        assert_eq!(stream.stream_type, StreamType::Hls);

        let qualities = provider.get_available_qualities("ep9").await.unwrap();
        assert_eq!(qualities, vec![Quality::auto()]);
    }

    #[test]
    fn stream_shapes() {
        let q = Quality::auto();
        let bare = stream_url("f", &"https://cdn.example/a.mp4".into(), &q).unwrap();
        assert_eq!(bare.stream_type, StreamType::Mp4);

        let object = PluginValue::from(serde_json::json!({
            "url": "https://cdn.example/a", "type": "hls", "referer": "https://site.example/"
        }));
        let stream = stream_url("f", &object, &q).unwrap();
        assert_eq!(stream.stream_type, StreamType::Hls);
        assert_eq!(stream.headers["Referer"], "https://site.example/");

        assert!(stream_url("f", &PluginValue::Nil, &q).unwrap_err().is_no_sources());
        assert!(matches!(
            stream_url("f", &PluginValue::Number(1.0), &q),
            Err(ProviderError::Shape { .. })
        ));
        let empty = PluginValue::from(serde_json::json!({ "sources": [] }));
        assert!(stream_url("f", &empty, &q).unwrap_err().is_no_sources());

        let blank_first = PluginValue::from(serde_json::json!({ "sources": [
            { "url": "", "quality": "720p" },
            { "url": "https://cdn.example/1080.m3u8", "quality": "1080p" }
        ]}));
        let stream = stream_url("f", &blank_first, &Quality::new("480p")).unwrap();
        assert_eq!(stream.url, "https://cdn.example/1080.m3u8");

        let all_blank = PluginValue::from(serde_json::json!({ "sources": [{ "url": "" }] }));
        assert!(stream_url("f", &all_blank, &q).unwrap_err().is_no_sources());
    }
}
