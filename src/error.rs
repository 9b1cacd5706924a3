//! Error taxonomy for a single relay run.
//!
//! Each pipeline stage owns one error type. [`RunError`] wraps them so `main`
//! can report the failing stage and exit non-zero. Malformed individual
//! records are not errors at all; the normalizer drops them.

use thiserror::Error;

/// Pre-flight configuration problems. Nothing has been fetched or sent yet.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("state at {path} was written under the {stored} policy but this run uses {configured}")]
    PolicyMismatch {
        path: String,
        stored: String,
        configured: String,
    },
}

/// Failure to obtain the raw batch from a source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Carries no URL; source URLs may hold API keys.
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("source returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid CSS selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}

/// Durable seen-state could not be written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("state encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The message sink rejected a message or could not be reached.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Carries no URL; the endpoint path holds the bot token.
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("cannot build endpoint from base URL {0}")]
    Endpoint(String),

    #[error("sink rejected message with {status}: {body}")]
    Rejected { status: u16, body: String },
}

// reqwest renders the request URL in its Display output.
impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e.without_url())
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        SinkError::Http(e.without_url())
    }
}

/// A failure inside the delivery loop: either the send or the commit that
/// follows it.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level failure of one run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("delivery stopped after {sent}/{total} units: {source}")]
    Delivery {
        sent: usize,
        total: usize,
        #[source]
        source: DeliveryError,
    },

    #[error("post-delivery cleanup failed: {0}")]
    Cleanup(FetchError),
}
