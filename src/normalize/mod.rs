// src/normalize/mod.rs
//! Verified payloads into [`NotificationRequest`]s.
//!
//! Classification (`classify_*`) runs first and decides whether a payload is
//! worth a notification at all. Normalization itself is total: shapes the
//! renderers do not recognize fall back to the generic `key: value` rendering.

pub mod deploy;
pub mod generic;
pub mod git;
pub mod rss;

pub use deploy::classify_deployment;
pub use git::classify_git;

use chrono::Duration as ChronoDuration;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::event::{NotificationRequest, Source};
use crate::ingest::types::FeedArticle;
use crate::verify::Provider;

/// Payload that passed verification, tagged by how it should be rendered.
#[derive(Debug, Clone)]
pub enum VerifiedPayload {
    GitPush { provider: Provider, payload: Value },
    Deployment { provider: Provider, payload: Value },
    RssEntry(FeedArticle),
    RssBatch { articles: Vec<FeedArticle> },
    Generic(Value),
}

impl VerifiedPayload {
    pub fn source(&self) -> Source {
        match self {
            VerifiedPayload::GitPush { .. } => Source::GitPush,
            VerifiedPayload::Deployment { .. } => Source::DeploymentStatus,
            VerifiedPayload::RssEntry(_) | VerifiedPayload::RssBatch { .. } => Source::RssEntry,
            VerifiedPayload::Generic(_) => Source::Generic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Notify,
    Ignore(String),
}

/// Title, body and audit fields produced by one renderer.
#[derive(Debug, Clone, Default)]
pub(crate) struct Rendered {
    pub title: String,
    pub body: String,
    pub metadata: BTreeMap<String, String>,
}

impl Rendered {
    pub(crate) fn meta(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.metadata.insert(key.to_string(), value);
        }
    }
}

/// Appends `Label: value` lines, skipping empty values.
#[derive(Debug, Default)]
pub(crate) struct BodyLines(Vec<String>);

impl BodyLines {
    pub(crate) fn push(&mut self, label: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.0.push(format!("{label}: {value}"));
        }
    }

    pub(crate) fn raw(&mut self, line: String) {
        self.0.push(line);
    }

    pub(crate) fn finish(self) -> String {
        self.0.join("\n")
    }
}

pub(crate) fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub struct Normalizer {
    delay: ChronoDuration,
    clock: Arc<dyn Clock>,
}

impl Normalizer {
    pub fn new(delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            delay: ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero()),
            clock,
        }
    }

    pub fn delay(&self) -> ChronoDuration {
        self.delay
    }

    pub fn normalize(&self, payload: VerifiedPayload) -> NotificationRequest {
        let source = payload.source();
        let rendered = match &payload {
            VerifiedPayload::GitPush { provider, payload } => git::render_push(*provider, payload)
                .unwrap_or_else(|| generic::render_fallback(provider.label(), "push", payload)),
            VerifiedPayload::Deployment { provider, payload } => deploy::render(*provider, payload)
                .unwrap_or_else(|| {
                    generic::render_fallback(provider.label(), "deployment", payload)
                }),
            VerifiedPayload::RssEntry(article) => rss::render_entry(article),
            VerifiedPayload::RssBatch { articles } => rss::render_batch(articles),
            VerifiedPayload::Generic(value) => generic::render(value),
        };

        let created_at = self.clock.now();
        let dispatch_at = created_at + self.delay;
        NotificationRequest::new(
            source,
            rendered.title,
            rendered.body,
            rendered.metadata,
            created_at,
            dispatch_at,
        )
    }
}
