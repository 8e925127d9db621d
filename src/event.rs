// src/event.rs
//! The canonical unit flowing from the normalizer through the scheduler to fan-out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    GitPush,
    DeploymentStatus,
    RssEntry,
    Generic,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::GitPush => "git-push",
            Source::DeploymentStatus => "deployment-status",
            Source::RssEntry => "rss-entry",
            Source::Generic => "generic",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable once built; only the normalizer constructs it.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRequest {
    source: Source,
    title: String,
    body: String,
    origin_metadata: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
    dispatch_at: DateTime<Utc>,
}

impl NotificationRequest {
    pub(crate) fn new(
        source: Source,
        title: String,
        body: String,
        origin_metadata: BTreeMap<String, String>,
        created_at: DateTime<Utc>,
        dispatch_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            title,
            body,
            origin_metadata,
            created_at,
            dispatch_at,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn origin_metadata(&self) -> &BTreeMap<String, String> {
        &self.origin_metadata
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.origin_metadata.get(key).map(String::as_str)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn dispatch_at(&self) -> DateTime<Utc> {
        self.dispatch_at
    }

    /// Title and body as one plain-text message, for chat-style channels.
    pub fn as_message_text(&self) -> String {
        if self.body.is_empty() {
            return self.title.clone();
        }
        format!("{}\n\n{}", self.title, self.body)
    }
}
