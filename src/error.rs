//! Error types shared by the channel, the feed parser and the completers.
//!
//! Transport failures have their own [`FetchError`] so that the fetch
//! capability can be implemented (or faked) without pulling in the rest of
//! the crate's failure modes. Everything else funnels into [`NewsError`].

use crate::news::ItemId;
use thiserror::Error;

/// Failure reported by a [`NetworkFetch`](crate::fetch::NetworkFetch) stream.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum NewsError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    // Feed errors
    #[error("Error parsing rss document: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Error parsing rss document: {0}")]
    FeedStructure(String),

    // Persisted document errors
    #[error("Unknown role in stored document: {0}")]
    UnknownRole(String),

    #[error("Malformed stored document: {0}")]
    MalformedDocument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Model errors
    #[error("No news item with id {0}")]
    UnknownItem(ItemId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NewsResult<T> = Result<T, NewsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_errors_read_like_parse_failures() {
        let e = NewsError::FeedStructure("expected <rss>".into());
        assert_eq!(e.to_string(), "Error parsing rss document: expected <rss>");
    }

    #[test]
    fn test_fetch_error_wraps_into_network() {
        let e: NewsError = FetchError::Transport("connection reset".into()).into();
        assert_eq!(e.to_string(), "Network error: connection reset");
    }
}
