//! Native adapters against a mock site and mock embed hosts.
//!
//! One `wiremock` server plays the streaming site, its AJAX endpoints and
//! the embed host, so the whole browse → resolve path runs offline.

use marquee::{
    BrowserClient, ExtractorRegistry, FlixHq, MediaKind, Provider, ProviderError, Quality, SFlix,
    StreamType,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PAGE: &str = r#"
<div class="film_list-wrap">
  <div class="flw-item">
    <div class="film-poster">
      <img data-src="https://img.test/tdk.jpg">
      <a href="/movie/watch-the-dark-knight-19752"></a>
    </div>
    <div class="film-detail">
      <h2 class="film-name"><a href="/movie/watch-the-dark-knight-19752">The Dark Knight</a></h2>
      <div class="fd-infor"><span class="fdi-item">2008</span><span class="fdi-item">Movie</span></div>
    </div>
  </div>
</div>
"#;

const MOVIE_PAGE: &str = r#"
<h2 class="heading-name"><a href="/movie/watch-inception-19764">Inception</a></h2>
<div class="m_i-d-poster"><img src="https://img.test/inception.jpg"></div>
<div class="description">A thief who steals corporate secrets.</div>
<div class="row-line"><strong>Released: </strong><a>2010-07-16</a></div>
<div class="row-line"><strong>Genre: </strong><a>Action</a>, <a>Sci-Fi</a></div>
<div class="watch_block" data-id="19764"></div>
"#;

fn client() -> BrowserClient {
    BrowserClient::new().unwrap()
}

fn flixhq(server: &MockServer) -> FlixHq {
    let client = client();
    FlixHq::new(client.clone(), ExtractorRegistry::with_defaults(client)).with_base_url(server.uri())
}

fn sflix(server: &MockServer) -> SFlix {
    let client = client();
    SFlix::new(client.clone(), ExtractorRegistry::with_defaults(client)).with_base_url(server.uri())
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body)
}

async fn mount_megacloud(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path("/embed-2/ajax/e-1/getSources"))
        .and(query_param("id", id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sources": [{"file": "https://cdn.test/hls/master.m3u8", "type": "hls"}],
            "tracks": [{"file": "https://cdn.test/en.vtt", "label": "English", "kind": "captions"}]
        })))
        .mount(server)
        .await;
}

// ─── FlixHQ ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn flixhq_search_hits_the_site_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/the-dark-knight"))
        .respond_with(html(SEARCH_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let site = flixhq(&server);
    for _ in 0..2 {
        let hits = assert_ok!(site.search("the dark knight").await);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "movie/watch-the-dark-knight-19752");
        assert_eq!(hits[0].title, "The Dark Knight");
        assert_eq!(hits[0].kind, MediaKind::Movie);
        assert_eq!(hits[0].year, Some(2008));
    }
}

#[tokio::test]
async fn flixhq_search_errors_are_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/dune"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/dune"))
        .respond_with(html(SEARCH_PAGE))
        .mount(&server)
        .await;

    let site = flixhq(&server);
    let err = assert_err!(site.search("dune").await);
    assert!(matches!(err, ProviderError::Status { status: 503, .. }));
    assert_eq!(site.search("dune").await.unwrap().len(), 1);
}

#[tokio::test]
async fn flixhq_movie_browse_and_resolve_with_fallback() {
    let server = MockServer::start().await;
    let media_id = "movie/watch-inception-19764";

    Mock::given(method("GET"))
        .and(path(format!("/{media_id}")))
        .respond_with(html(MOVIE_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/movie/episodes/19764"))
        .respond_with(html(
            r#"<a title="UpCloud" href="/watch-movie/watch-inception-19764.111"></a>
               <a title="MegaCloud" href="/watch-movie/watch-inception-19764.222"></a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/episode/sources/111"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/episode/sources/222"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "iframe",
            "link": format!("{}/embed-2/e-1/XyZ?k=1", server.uri())
        })))
        .mount(&server)
        .await;
    mount_megacloud(&server, "XyZ").await;

    let site = flixhq(&server);

    let details = site.get_media_details(media_id).await.unwrap();
    assert_eq!(details.media.title, "Inception");
    assert_eq!(details.media.year, Some(2010));
    assert_eq!(details.genres, vec!["Action", "Sci-Fi"]);

    let seasons = site.get_seasons(media_id).await.unwrap();
    assert_eq!(seasons.len(), 1);
    let episodes = site.get_episodes(&seasons[0].id).await.unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].id, "19764");

    let stream = site
        .get_stream_url(&episodes[0].id, &Quality::auto())
        .await
        .unwrap();
    assert_eq!(stream.url, "https://cdn.test/hls/master.m3u8");
    assert_eq!(stream.stream_type, StreamType::Hls);
    assert_eq!(stream.referer, format!("{}/", server.uri()));
    assert_eq!(stream.subtitles.len(), 1);
    assert_eq!(stream.subtitles[0].lang, "English");
}

#[tokio::test]
async fn flixhq_episode_servers_from_v2_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/movie/episodes/555"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/v2/episode/servers/555"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "html": r#"<ul><li class="nav-item"><a data-id="777"><span>MegaCloud</span></a></li></ul>"#
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/episode/sources/777"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "link": format!("{}/embed-2/e-1/Ep5", server.uri())
        })))
        .mount(&server)
        .await;
    mount_megacloud(&server, "Ep5").await;

    let qualities = flixhq(&server).get_available_qualities("555").await.unwrap();
    assert_eq!(qualities, vec![Quality::auto()]);
}

#[tokio::test]
async fn flixhq_every_server_failing_reports_the_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/movie/episodes/1"))
        .respond_with(html(r#"<a title="Vidcloud" href="/watch-movie/x-1.9"></a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/episode/sources/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"link": ""})))
        .mount(&server)
        .await;

    let err = flixhq(&server)
        .get_stream_url("1", &Quality::auto())
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("all 1 servers"), "{msg}");
    assert!(msg.contains("vidcloud"), "{msg}");
    assert!(msg.contains("no embed URL"), "{msg}");
}

#[tokio::test]
async fn flixhq_no_servers_is_no_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/movie/episodes/2"))
        .respond_with(html("<div></div>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/v2/episode/servers/2"))
        .respond_with(html("<div></div>"))
        .mount(&server)
        .await;

    let err = flixhq(&server)
        .get_stream_url("2", &Quality::auto())
        .await
        .unwrap_err();
    assert!(err.is_no_sources());
}

#[tokio::test]
async fn flixhq_health_follows_base_url() {
    let up = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html></html>"))
        .mount(&up)
        .await;
    assert_ok!(flixhq(&up).health_check().await);

    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;
    let err = flixhq(&down).health_check().await.unwrap_err();
    assert!(matches!(err, ProviderError::Unhealthy(_)));
}

// ─── SFlix ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sflix_tv_seasons_episodes_and_stream() {
    let server = MockServer::start().await;
    let media_id = "tv/watch-show-123";

    Mock::given(method("GET"))
        .and(path(format!("/{media_id}")))
        .respond_with(html(
            r#"<h2 class="heading-name">Show</h2>
               <div class="detail_page-watch" data-id="123"></div>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/season/list/123"))
        .respond_with(html(
            r#"<a class="ss-item" data-id="s1">Season 1</a>
               <a class="ss-item" data-id="s2">Season 2</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/season/episodes/s1"))
        .respond_with(html(
            r#"<div class="eps-item" data-id="e11">
                 <div class="episode-number">Episode 1:</div>
                 <h3 class="film-name"><a>Pilot</a></h3>
               </div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/season/episodes/s2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/episode/servers/e11"))
        .respond_with(html(
            r#"<ul class="ulclear"><li><a data-id="900"><span>Vidcloud</span></a></li></ul>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/episode/sources/900"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "link": format!("{}/embed-4/AbC", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/embed-4/getSources"))
        .and(query_param("id", "AbC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sources": [{"file": "https://cdn.test/show/e11.mp4", "type": "mp4"}]
        })))
        .mount(&server)
        .await;

    let site = sflix(&server);

    let seasons = site.get_seasons(media_id).await.unwrap();
    let ids: Vec<_> = seasons.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["tv/watch-show-123|1"]);

    let episodes = site.get_episodes(&seasons[0].id).await.unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].id, "e11|tv/watch-show-123");
    assert_eq!(episodes[0].title, "Pilot");

    let stream = site
        .get_stream_url(&episodes[0].id, &Quality::auto())
        .await
        .unwrap();
    assert_eq!(stream.url, "https://cdn.test/show/e11.mp4");
    assert_eq!(stream.stream_type, StreamType::Mp4);
}

#[tokio::test]
async fn sflix_bare_id_falls_back_to_tv_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/watch-show-9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tv/watch-show-9"))
        .respond_with(html(r#"<h2 class="heading-name">Nine</h2>"#))
        .mount(&server)
        .await;

    let details = sflix(&server).get_media_details("watch-show-9").await.unwrap();
    assert_eq!(details.media.title, "Nine");
    assert_eq!(details.media.kind, MediaKind::Tv);
    // No watch id: one season addressed by the id as given.
    assert_eq!(details.seasons.len(), 1);
    assert_eq!(details.seasons[0].id, "watch-show-9");
}

#[tokio::test]
async fn sflix_movie_servers_use_list_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/episode/list/42"))
        .respond_with(html(
            r#"<ul class="ulclear"><li><a data-id="7"><span>MegaCloud</span></a></li></ul>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/episode/sources/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"url": format!("{}/embed-2/e-1/M42", server.uri())}
        })))
        .mount(&server)
        .await;
    mount_megacloud(&server, "M42").await;

    let stream = sflix(&server)
        .get_stream_url("42|movie/watch-film-42", &Quality::new("1080"))
        .await
        .unwrap();
    // No 1080 label: first source wins.
    assert_eq!(stream.url, "https://cdn.test/hls/master.m3u8");
}
