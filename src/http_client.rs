//! Shared HTTP client for adapters, extractors and plugins.
//!
//! Features:
//! - HTTP/2 with fallback to HTTP/1.1
//! - Brotli, Zstd, Gzip compression (auto-negotiated)
//! - Connection pooling with keep-alive
//! - Cookie jar (streaming sites set session cookies on first hit)
//! - Realistic browser fingerprinting
//!
//! There is no retry here. A failed request is reported once, wrapped with
//! the URL that failed.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{ProviderError, Result};
use crate::fingerprint::{random_profile, BrowserProfile};

/// Default whole-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw response for callers that want to inspect the status themselves.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

/// HTTP client that looks like a desktop browser.
///
/// Cheap to clone; clones share the connection pool and cookie jar.
#[derive(Debug, Clone)]
pub struct BrowserClient {
    client: Client,
    profile: BrowserProfile,
}

impl BrowserClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with a random profile and the given request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::with_profile(random_profile(), timeout)
    }

    pub fn with_profile(profile: BrowserProfile, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            // Don't assume HTTP/2 - let server negotiate
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .zstd(true)
            .gzip(true)
            .deflate(true)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .build()
            .map_err(|e| ProviderError::http("failed to build HTTP client", e))?;

        Ok(Self { client, profile })
    }

    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    /// Fetch a page as a navigating browser would. Non-2xx is an error.
    pub async fn get_page(&self, url: &str, referer: Option<&str>) -> Result<String> {
        let mut headers = self.profile.to_headers();
        set_referer(&mut headers, referer);
        self.get_checked(url, headers).await
    }

    /// Fetch an AJAX endpoint (`X-Requested-With`, CORS fetch metadata).
    /// Non-2xx is an error.
    pub async fn get_xhr(&self, url: &str, referer: Option<&str>) -> Result<String> {
        let mut headers = self.profile.xhr_headers();
        set_referer(&mut headers, referer);
        self.get_checked(url, headers).await
    }

    /// Fetch an AJAX endpoint and decode its JSON body.
    pub async fn get_json(&self, url: &str, referer: Option<&str>) -> Result<serde_json::Value> {
        let body = self.get_xhr(url, referer).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Plain GET with caller-supplied headers layered over the profile.
    /// Any status is returned as-is.
    #[instrument(skip(self, extra), fields(url = %url))]
    pub async fn fetch(&self, url: &str, extra: &BTreeMap<String, String>) -> Result<RawResponse> {
        let mut headers = self.profile.to_headers();
        for (name, value) in extra {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => debug!(header = %name, "Skipping invalid header"),
            }
        }

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProviderError::http(format!("GET {url}"), e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::http(format!("reading body of {url}"), e))?;

        debug!(status, bytes = body.len(), "Response received");
        Ok(RawResponse {
            status,
            body,
            headers,
        })
    }

    #[instrument(skip(self, headers), fields(url = %url))]
    async fn get_checked(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProviderError::http(format!("GET {url}"), e))?;

        let status = response.status();
        debug!(status = %status, version = ?response.version(), "Response received");
        if !status.is_success() {
            return Err(ProviderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::http(format!("reading body of {url}"), e))
    }

    /// Get the underlying reqwest client
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

fn set_referer(headers: &mut HeaderMap, referer: Option<&str>) {
    if let Some(value) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
        headers.insert(REFERER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_xhr_sends_ajax_headers_and_referer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/thing"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(header("referer", "https://site.example/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = BrowserClient::new().unwrap();
        let body = client
            .get_xhr(
                &format!("{}/ajax/thing", server.uri()),
                Some("https://site.example/"),
            )
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = BrowserClient::new().unwrap();
        let err = client.get_page(&server.uri(), None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn raw_fetch_keeps_status_and_custom_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-token", "abc"))
            .respond_with(
                ResponseTemplate::new(418)
                    .insert_header("x-served-by", "mock")
                    .set_body_string("teapot"),
            )
            .mount(&server)
            .await;

        let client = BrowserClient::new().unwrap();
        let extra = BTreeMap::from([("X-Token".to_string(), "abc".to_string())]);
        let response = client.fetch(&server.uri(), &extra).await.unwrap();
        assert_eq!(response.status, 418);
        assert_eq!(response.body, "teapot");
        assert_eq!(response.headers.get("x-served-by").map(String::as_str), Some("mock"));
    }
}
