// src/api/mod.rs
pub mod payload;
pub mod webhook;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::config::Secrets;
use crate::dedup::FeedDedupStore;
use crate::dispatch::SchedulerHandle;
use crate::normalize::Normalizer;
use crate::verify::UnsignedPolicy;

pub use webhook::{Ack, AckStatus, IngestError};

/// Shared handles for the webhook handlers; cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub secrets: Arc<Secrets>,
    pub unsigned: UnsignedPolicy,
    pub normalizer: Arc<Normalizer>,
    pub scheduler: SchedulerHandle,
    pub store: Arc<FeedDedupStore>,
    pub clock: Arc<dyn Clock>,
}

pub fn router(state: AppState) -> Router {
    crate::metrics::ensure_metrics_described();
    Router::new()
        .route("/", get(webhook::root))
        .route("/health", get(|| async { "ok" }))
        .route("/webhook/git", post(webhook::git_webhook))
        .route("/webhook/netlify", post(webhook::netlify_webhook))
        .route("/webhook/rss", post(webhook::rss_webhook))
        .route("/webhook/generic", post(webhook::generic_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
