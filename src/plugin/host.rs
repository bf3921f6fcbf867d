//! Host capabilities exposed to plugin scripts.
//!
//! ```text
//! JavaScript:  httpGet(url, headers)
//!      ↓       native function (runs on a blocking thread)
//! Rust:        runtime handle → BrowserClient::fetch(...).await
//!      ↓       shared cookie jar, browser fingerprint, timeout
//! JavaScript:  { body, statusCode, headers }
//! ```
//!
//! | global            | alias             | returns                                  |
//! |-------------------|-------------------|------------------------------------------|
//! | `httpGet`         | `http_get`        | `{body, statusCode, headers}`, throws on transport failure |
//! | `htmlParse`       | `html_parse`      | document wrapper, or `null` for non-string input |
//! | `jsonParse`       | `json_parse`      | `[value, null]` or `[null, error]`       |
//! | `extractSources`  | `extract_sources` | `[{sources, subtitles}, null]`, `[null, error]`, or `[null, null]` for an unknown server |
//!
//! Plus a `console` object whose methods log through `tracing`.

use std::future::Future;

use rquickjs::function::Opt;
use rquickjs::{Array, Ctx, Exception, Function, Object, Value};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::document::{EachErrors, Selection};
use super::value::PluginValue;
use crate::error::{ProviderError, Result};
use crate::extract::ExtractorRegistry;
use crate::http_client::BrowserClient;

/// Everything one plugin may reach on the host side.
#[derive(Clone, Debug)]
pub struct HostCapabilities {
    client: BrowserClient,
    extractors: ExtractorRegistry,
    each_errors: EachErrors,
}

impl HostCapabilities {
    pub fn new(client: BrowserClient, extractors: ExtractorRegistry) -> Self {
        Self {
            client,
            extractors,
            each_errors: EachErrors::default(),
        }
    }

    #[must_use]
    pub fn with_each_errors(mut self, each_errors: EachErrors) -> Self {
        self.each_errors = each_errors;
        self
    }

    pub fn extractors(&self) -> &ExtractorRegistry {
        &self.extractors
    }

    /// Define the capability globals in `ctx`.
    pub fn install<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        let globals = ctx.globals();

        let client = self.client.clone();
        let http_get = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, url: String, headers: Opt<Value<'js>>| {
                http_get(&ctx, &client, url, headers.0)
            },
        )?;
        globals.set("httpGet", http_get.clone())?;
        globals.set("http_get", http_get)?;

        let each_errors = self.each_errors;
        let html_parse = Function::new(ctx.clone(), move |ctx: Ctx<'js>, html: Value<'js>| {
            match html.as_string() {
                Some(text) => Selection::parse(&text.to_string()?)
                    .into_object(&ctx, each_errors)
                    .map(Object::into_value),
                None => Ok(Value::new_null(ctx)),
            }
        })?;
        globals.set("htmlParse", html_parse.clone())?;
        globals.set("html_parse", html_parse)?;

        let json_parse = Function::new(ctx.clone(), |ctx: Ctx<'js>, text: Value<'js>| {
            let parsed = match text.as_string() {
                Some(text) => serde_json::from_str::<serde_json::Value>(&text.to_string()?)
                    .map(PluginValue::from)
                    .map_err(|e| e.to_string()),
                None => Err("jsonParse expects a string".to_string()),
            };
            pair(&ctx, parsed)
        })?;
        globals.set("jsonParse", json_parse.clone())?;
        globals.set("json_parse", json_parse)?;

        let extractors = self.extractors.clone();
        let extract_sources = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, url: String, hint: Opt<String>| {
                extract_sources(&ctx, &extractors, url, hint.0.unwrap_or_default())
            },
        )?;
        globals.set("extractSources", extract_sources.clone())?;
        globals.set("extract_sources", extract_sources)?;

        install_console(ctx)
    }
}

fn http_get<'js>(
    ctx: &Ctx<'js>,
    client: &BrowserClient,
    url: String,
    headers: Option<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let headers = match headers {
        Some(h) => PluginValue::from_js(&h)?.text_map(),
        None => Default::default(),
    };
    debug!(url = %url, "Plugin httpGet");

    let client = client.clone();
    let response = block_on(async move { client.fetch(&url, &headers).await })
        .and_then(|r| r)
        .map_err(|e| Exception::throw_message(ctx, &e.to_string()))?;

    let object = Object::new(ctx.clone())?;
    object.set("body", response.body)?;
    object.set("statusCode", i32::from(response.status))?;
    object.set("headers", PluginValue::from_serialize(&response.headers).to_js(ctx)?)?;
    Ok(object.into_value())
}

fn extract_sources<'js>(
    ctx: &Ctx<'js>,
    extractors: &ExtractorRegistry,
    url: String,
    hint: String,
) -> rquickjs::Result<Value<'js>> {
    let Some(extractor) = extractors.lookup(&hint) else {
        debug!(hint = %hint, "No extractor for server hint");
        return pair(ctx, Ok(PluginValue::Nil));
    };

    let result = block_on(async move { extractor.extract(&url).await })
        .and_then(|r| r)
        .map(|found| PluginValue::from_serialize(&found))
        .map_err(|e| e.to_string());
    pair(ctx, result)
}

/// Two-value return as a JavaScript array: `[value, null]` or
/// `[null, message]`.
fn pair<'js>(
    ctx: &Ctx<'js>,
    result: std::result::Result<PluginValue, String>,
) -> rquickjs::Result<Value<'js>> {
    let array = Array::new(ctx.clone())?;
    match result {
        Ok(value) => {
            array.set(0, value.to_js(ctx)?)?;
            array.set(1, Value::new_null(ctx.clone()))?;
        }
        Err(message) => {
            array.set(0, Value::new_null(ctx.clone()))?;
            array.set(1, message)?;
        }
    }
    Ok(array.into_value())
}

fn install_console(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;
    console.set(
        "log",
        Function::new(ctx.clone(), |msg: Opt<String>| {
            info!(target: "plugin", "{}", msg.0.unwrap_or_default());
        })?,
    )?;
    console.set(
        "debug",
        Function::new(ctx.clone(), |msg: Opt<String>| {
            debug!(target: "plugin", "{}", msg.0.unwrap_or_default());
        })?,
    )?;
    let warn_fn = Function::new(ctx.clone(), |msg: Opt<String>| {
        warn!(target: "plugin", "{}", msg.0.unwrap_or_default());
    })?;
    console.set("warn", warn_fn.clone())?;
    console.set("error", warn_fn)?;
    ctx.globals().set("console", console)
}

/// Drive a host future to completion from a plugin call.
///
/// Plugin calls run on tokio's blocking pool, so the future is spawned onto
/// the ambient runtime and this thread waits for it.
fn block_on<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = Handle::try_current().map_err(|_| ProviderError::NoRuntime)?;
    futures::executor::block_on(handle.spawn(fut))
        .map_err(|e| ProviderError::plugin_call("host", e))
}
