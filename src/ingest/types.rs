// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::FeedConfig;

/// One feed item, from a polled feed or an RSS webhook body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedArticle {
    #[serde(alias = "id")]
    pub guid: Option<String>,
    pub title: String,
    pub link: String,
    #[serde(alias = "summary")]
    pub description: String,
    pub author: Option<String>,
    /// As written by the publisher.
    pub published: Option<String>,
    #[serde(skip_deserializing)]
    pub published_at: Option<DateTime<Utc>>,
    pub feed_title: String,
    pub feed_url: String,
}

impl FeedArticle {
    /// Provider GUID if present, else SHA-256 hex of `link + "\n" + title` (trimmed, whitespace collapsed).
    pub fn entry_id(&self) -> String {
        if let Some(guid) = self.guid.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            return guid.to_string();
        }
        let title = self.title.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut h = Sha256::new();
        h.update(self.link.trim().as_bytes());
        h.update(b"\n");
        h.update(title.as_bytes());
        hex::encode(h.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed feed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Raw feed document.
    async fn fetch(&self, feed: &FeedConfig) -> Result<String, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_prefers_guid() {
        let a = FeedArticle {
            guid: Some("  urn:1 ".into()),
            title: "T".into(),
            link: "https://x/1".into(),
            ..Default::default()
        };
        assert_eq!(a.entry_id(), "urn:1");
    }

    #[test]
    fn entry_id_hash_ignores_whitespace_noise() {
        let a = FeedArticle {
            title: "Hello   world".into(),
            link: " https://x/1 ".into(),
            ..Default::default()
        };
        let b = FeedArticle {
            guid: Some(String::new()),
            title: "Hello world".into(),
            link: "https://x/1".into(),
            description: "changed".into(),
            ..Default::default()
        };
        assert_eq!(a.entry_id(), b.entry_id());
        assert_eq!(a.entry_id().len(), 64);
    }
}
