//! JavaScript plugins as providers.
//!
//! A plugin is a single `.js` file in the plugin directory. It is evaluated
//! once, in its own QuickJS runtime, and must define some of:
//!
//! ```js
//! function get_name() { return "My Site"; }
//! function get_type() { return "movie"; }
//! function search(query) {
//!     var res = httpGet("https://example.com/search?q=" + encodeURIComponent(query));
//!     var doc = htmlParse(res.body);
//!     var out = [];
//!     doc.find(".item").each(function (i, el) {
//!         out.push({ id: el.attr("data-id"), title: el.find("a").text(), type: "movie" });
//!     });
//!     return out;
//! }
//! function get_stream_url(id, quality) { /* URL string or {sources: [...]} */ }
//! ```
//!
//! Missing functions fail the corresponding call with "function not found".
//! A plugin that defines `get_servers(id)` (a list of `{name, url}` embeds)
//! instead of `get_stream_url` is resolved with the host extractors.

pub mod document;
pub mod engine;
pub mod host;
pub mod registry;
pub mod runner;
pub mod value;

pub use document::EachErrors;
pub use host::HostCapabilities;
pub use registry::{discover, PluginSet};
pub use runner::PluginProvider;
pub use value::PluginValue;
