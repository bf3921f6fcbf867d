//! Browser identity for scraping requests.
//!
//! Streaming sites reject obvious bots, so every request carries a
//! realistic desktop browser header set. Page loads and AJAX calls differ in
//! their `Sec-Fetch-*` headers; see [`BrowserProfile::to_headers`] and
//! [`BrowserProfile::xhr_headers`].

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT,
};

/// Chrome `(major, full)` pairs.
const CHROME_VERSIONS: &[(&str, &str)] = &[
    ("131", "131.0.6778.204"),
    ("132", "132.0.6834.110"),
    ("133", "133.0.6943.126"),
];

const FIREFOX_VERSIONS: &[&str] = &["133.0", "134.0", "135.0"];

/// Safari `(version, webkit)` pairs.
const SAFARI_VERSIONS: &[(&str, &str)] = &[("17.6", "605.1.15"), ("18.2", "605.1.15")];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.9,de;q=0.8",
    "en-US,en;q=0.9,es;q=0.8",
];

/// Browser profile with realistic fingerprint
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_platform: String,
}

#[derive(Debug, Clone, Copy)]
enum Platform {
    MacOS,
    Windows,
    Linux,
}

impl Platform {
    fn random() -> Self {
        // Windows 65%, macOS 20%, Linux 15%
        let roll: f32 = rand::thread_rng().gen();
        if roll < 0.65 {
            Platform::Windows
        } else if roll < 0.85 {
            Platform::MacOS
        } else {
            Platform::Linux
        }
    }

    fn os_string(self) -> &'static str {
        match self {
            Platform::MacOS => "Macintosh; Intel Mac OS X 10_15_7",
            Platform::Windows => "Windows NT 10.0; Win64; x64",
            Platform::Linux => "X11; Linux x86_64",
        }
    }

    fn sec_ch_platform(self) -> &'static str {
        match self {
            Platform::MacOS => "\"macOS\"",
            Platform::Windows => "\"Windows\"",
            Platform::Linux => "\"Linux\"",
        }
    }
}

fn pick<'a, T>(items: &'a [T], fallback: &'a T) -> &'a T {
    items.choose(&mut rand::thread_rng()).unwrap_or(fallback)
}

fn random_accept_language() -> String {
    pick(ACCEPT_LANGUAGES, &"en-US,en;q=0.9").to_string()
}

#[must_use]
pub fn chrome_profile() -> BrowserProfile {
    let platform = Platform::random();
    let (major, full) = pick(CHROME_VERSIONS, &("131", "131.0.6778.204"));

    BrowserProfile {
        user_agent: format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{full} Safari/537.36",
            platform.os_string()
        ),
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8".to_string(),
        accept_language: random_accept_language(),
        accept_encoding: "gzip, deflate, br, zstd".to_string(),
        sec_ch_ua: format!(
            "\"Google Chrome\";v=\"{major}\", \"Chromium\";v=\"{major}\", \"Not_A Brand\";v=\"24\""
        ),
        sec_ch_ua_platform: platform.sec_ch_platform().to_string(),
    }
}

#[must_use]
pub fn firefox_profile() -> BrowserProfile {
    let platform = Platform::random();
    let version = pick(FIREFOX_VERSIONS, &"133.0");

    BrowserProfile {
        user_agent: format!(
            "Mozilla/5.0 ({}; rv:{version}) Gecko/20100101 Firefox/{version}",
            platform.os_string()
        ),
        accept:
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string(),
        accept_language: random_accept_language(),
        accept_encoding: "gzip, deflate, br, zstd".to_string(),
        // Firefox doesn't send client hints
        sec_ch_ua: String::new(),
        sec_ch_ua_platform: String::new(),
    }
}

#[must_use]
pub fn safari_profile() -> BrowserProfile {
    let (version, webkit) = pick(SAFARI_VERSIONS, &("17.6", "605.1.15"));

    BrowserProfile {
        user_agent: format!(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/{webkit} (KHTML, like Gecko) Version/{version} Safari/{webkit}"
        ),
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        accept_language: random_accept_language(),
        accept_encoding: "gzip, deflate, br".to_string(),
        sec_ch_ua: String::new(),
        sec_ch_ua_platform: String::new(),
    }
}

/// Random profile weighted by desktop market share.
#[must_use]
pub fn random_profile() -> BrowserProfile {
    let roll: f32 = rand::thread_rng().gen();
    if roll < 0.65 {
        chrome_profile()
    } else if roll < 0.85 {
        safari_profile()
    } else {
        firefox_profile()
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if value.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

impl BrowserProfile {
    /// Headers for a top-level page navigation.
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = self.identity_headers();
        insert(&mut headers, ACCEPT, &self.accept);
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
        headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        headers
    }

    /// Headers for a same-origin AJAX request, the way site scripts send
    /// them.
    pub fn xhr_headers(&self) -> HeaderMap {
        let mut headers = self.identity_headers();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
        headers
    }

    fn identity_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert(&mut headers, USER_AGENT, &self.user_agent);
        insert(&mut headers, ACCEPT_LANGUAGE, &self.accept_language);
        insert(&mut headers, ACCEPT_ENCODING, &self.accept_encoding);
        if !self.sec_ch_ua.is_empty() {
            insert(&mut headers, HeaderName::from_static("sec-ch-ua"), &self.sec_ch_ua);
            headers.insert("Sec-CH-UA-Mobile", HeaderValue::from_static("?0"));
            insert(
                &mut headers,
                HeaderName::from_static("sec-ch-ua-platform"),
                &self.sec_ch_ua_platform,
            );
        }
        headers
    }
}
