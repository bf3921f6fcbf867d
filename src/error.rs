//! Error taxonomy shared by every provider.
//!
//! Transport failures, parse failures and plugin contract violations are
//! all fatal to the single call that hit them. The resolution pipeline is
//! the one place that tolerates per-server failure; see
//! [`crate::resolve`].

use std::path::PathBuf;

use thiserror::Error;

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("plugin call {function} failed: {message}")]
    PluginCall { function: String, message: String },

    #[error("{function} returned {found}, expected {expected}")]
    Shape {
        function: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("failed to load plugin {}: {message}", path.display())]
    PluginLoad { path: PathBuf, message: String },

    #[error("no extractor registered for server '{0}'")]
    NoExtractor(String),

    #[error("server {server}: {source}")]
    Server {
        server: String,
        #[source]
        source: Box<ProviderError>,
    },

    #[error("failed to fetch servers: {0}")]
    Discovery(#[source] Box<ProviderError>),

    #[error("failed to extract sources from all {attempts} servers: {last}")]
    AllServersFailed {
        attempts: usize,
        #[source]
        last: Box<ProviderError>,
    },

    #[error("no sources found")]
    NoSources,

    #[error("resolution cancelled")]
    Cancelled,

    #[error("not implemented: {0}")]
    Unsupported(&'static str),

    #[error("provider unhealthy: {0}")]
    Unhealthy(String),

    #[error("script engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("host capability needs a tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Wrap a reqwest failure with the operation that was in flight.
    pub fn http(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            context: context.into(),
            source,
        }
    }

    /// Wrap a script-side failure with the plugin function name.
    pub fn plugin_call(function: impl Into<String>, message: impl ToString) -> Self {
        Self::PluginCall {
            function: function.into(),
            message: message.to_string(),
        }
    }

    /// `true` for "nothing playable" as opposed to "something broke".
    pub fn is_no_sources(&self) -> bool {
        matches!(self, Self::NoSources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_not_found_message_names_function() {
        let err = ProviderError::FunctionNotFound("search".into());
        assert_eq!(err.to_string(), "function not found: search");
    }

    #[test]
    fn all_servers_failed_keeps_last_error() {
        let last = ProviderError::Server {
            server: "megacloud".into(),
            source: Box::new(ProviderError::Status {
                url: "https://example.com/x".into(),
                status: 503,
            }),
        };
        let err = ProviderError::AllServersFailed {
            attempts: 2,
            last: Box::new(last),
        };
        let msg = err.to_string();
        assert!(msg.contains("all 2 servers"));
        assert!(msg.contains("megacloud"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn no_sources_is_distinguishable() {
        assert!(ProviderError::NoSources.is_no_sources());
        assert!(!ProviderError::Cancelled.is_no_sources());
    }
}
