//! Webhook endpoint handlers.
//!
//! Every handler runs the same steps: verify over the raw body bytes, decode,
//! classify, normalize, enqueue. Enqueue is the last step; nothing here waits
//! on delivery.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::payload::decode_payload;
use super::AppState;
use crate::ingest::types::FeedArticle;
use crate::normalize::{classify_deployment, classify_git, Disposition, VerifiedPayload};
use crate::verify::{
    detect_git_provider, verify, Credentials, Provider, Verification, VerificationContext,
    VerificationFailure,
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationFailure),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("empty request body")]
    EmptyBody,

    #[error("unrecognized provider: no known event header")]
    UnknownProvider,
}

impl IngestError {
    fn outcome(&self) -> &'static str {
        match self {
            IngestError::Verification(_) => "unauthorized",
            _ => "bad_request",
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestError::Verification(_) => StatusCode::UNAUTHORIZED,
            IngestError::MalformedPayload(_)
            | IngestError::EmptyBody
            | IngestError::UnknownProvider => StatusCode::BAD_REQUEST,
        };
        let body = json!({ "status": "rejected", "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// 202 body for accepted webhooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    pub status: AckStatus,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Scheduled,
    Ignored,
}

type AckResult = Result<(StatusCode, Json<Ack>), IngestError>;

fn ignored(detail: impl Into<String>) -> AckResult {
    Ok((
        StatusCode::ACCEPTED,
        Json(Ack {
            status: AckStatus::Ignored,
            detail: detail.into(),
            dispatch_at: None,
        }),
    ))
}

fn track(endpoint: &'static str, result: AckResult) -> AckResult {
    let outcome = match &result {
        Ok((_, Json(ack))) => match ack.status {
            AckStatus::Scheduled => "scheduled",
            AckStatus::Ignored => "ignored",
        },
        Err(e) => {
            warn!(endpoint, error = %e, "webhook rejected");
            e.outcome()
        }
    };
    counter!("webhook_requests_total", "endpoint" => endpoint, "outcome" => outcome).increment(1);
    result
}

fn check(
    state: &AppState,
    provider: Provider,
    headers: &HeaderMap,
    query: Option<&HashMap<String, String>>,
    body: &[u8],
) -> Result<Verification, IngestError> {
    let ctx = VerificationContext {
        provider,
        raw_body: body,
        credentials: Credentials::new(headers, query),
        secret: state.secrets.for_provider(provider),
        unsigned: state.unsigned,
    };
    let verification = verify(&ctx)?;
    debug!(provider = %provider, ?verification, "webhook verified");
    Ok(verification)
}

impl AppState {
    fn schedule(&self, payload: VerifiedPayload, detail: String) -> AckResult {
        let request = self.normalizer.normalize(payload);
        let dispatch_at = request.dispatch_at();
        info!(
            source = %request.source(),
            title = request.title(),
            %dispatch_at,
            "notification scheduled"
        );
        self.scheduler.enqueue(request);
        Ok((
            StatusCode::ACCEPTED,
            Json(Ack {
                status: AckStatus::Scheduled,
                detail,
                dispatch_at: Some(dispatch_at),
            }),
        ))
    }
}

/// GitHub, GitLab, Gitea and Gogs pushes. The provider comes from its event header.
pub async fn git_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AckResult {
    track("git", handle_git(&state, &headers, &body))
}

fn handle_git(state: &AppState, headers: &HeaderMap, body: &[u8]) -> AckResult {
    if body.is_empty() {
        return Err(IngestError::EmptyBody);
    }
    let provider = detect_git_provider(headers).ok_or(IngestError::UnknownProvider)?;
    check(state, provider, headers, None, body)?;
    let payload = decode_payload(headers, body)?;

    let event = provider
        .event_header()
        .and_then(|h| headers.get(h))
        .and_then(|v| v.to_str().ok());
    if let Disposition::Ignore(reason) = classify_git(provider, event, &payload) {
        info!(provider = %provider, reason = %reason, "git event ignored");
        return ignored(reason);
    }
    state.schedule(
        VerifiedPayload::GitPush { provider, payload },
        format!("{provider} push accepted"),
    )
}

pub async fn netlify_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AckResult {
    track("netlify", handle_netlify(&state, &headers, &body))
}

fn handle_netlify(state: &AppState, headers: &HeaderMap, body: &[u8]) -> AckResult {
    if body.is_empty() {
        return Err(IngestError::EmptyBody);
    }
    check(state, Provider::Netlify, headers, None, body)?;
    let payload = decode_payload(headers, body)?;
    if let Disposition::Ignore(reason) = classify_deployment(&payload) {
        info!(reason = %reason, "deploy event ignored");
        return ignored(reason);
    }
    state.schedule(
        VerifiedPayload::Deployment {
            provider: Provider::Netlify,
            payload,
        },
        "deploy status accepted".to_string(),
    )
}

pub async fn generic_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AckResult {
    track("generic", handle_generic(&state, &headers, &body))
}

fn handle_generic(state: &AppState, headers: &HeaderMap, body: &[u8]) -> AckResult {
    if body.is_empty() {
        return Err(IngestError::EmptyBody);
    }
    check(state, Provider::Generic, headers, None, body)?;
    let payload = decode_payload(headers, body)?;
    state.schedule(VerifiedPayload::Generic(payload), "webhook accepted".to_string())
}

#[derive(Debug, Deserialize)]
struct RssWebhookBody {
    article: Option<FeedArticle>,
    articles: Option<Vec<FeedArticle>>,
}

/// Feed id under which webhook-delivered articles are deduplicated.
pub fn webhook_feed_id(article: &FeedArticle) -> String {
    let title = article.feed_title.trim();
    format!("webhook:{}", if title.is_empty() { "unknown" } else { title })
}

/// `{"article": {...}}` or `{"articles": [...]}`; token from `X-RSS-Token` or `?token=`.
pub async fn rss_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> AckResult {
    let result = handle_rss(&state, &headers, &query, &body);
    if matches!(&result, Ok((_, Json(ack))) if ack.status == AckStatus::Scheduled) {
        let store = state.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.flush().await {
                warn!("dedup flush failed: {e:#}");
            }
        });
    }
    track("rss", result)
}

fn handle_rss(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    body: &[u8],
) -> AckResult {
    if body.is_empty() {
        return Err(IngestError::EmptyBody);
    }
    check(state, Provider::RssWebhook, headers, Some(query), body)?;
    let value = decode_payload(headers, body)?;
    let parsed: RssWebhookBody = serde_json::from_value(value)
        .map_err(|e| IngestError::MalformedPayload(format!("unexpected RSS payload: {e}")))?;

    let articles = match (parsed.articles, parsed.article) {
        (Some(list), _) => list,
        (None, Some(one)) => vec![one],
        (None, None) => {
            return Err(IngestError::MalformedPayload(
                "expected an 'article' object or an 'articles' array".into(),
            ))
        }
    };
    if articles.is_empty() {
        return ignored("no articles in payload");
    }

    let now = state.clock.now();
    // One batch per feed so the cap never evicts ids from this payload.
    let mut by_feed: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, a) in articles.iter().enumerate() {
        by_feed.entry(webhook_feed_id(a)).or_default().push(i);
    }
    let mut is_new = vec![false; articles.len()];
    for (feed_id, idx) in &by_feed {
        let ids: Vec<String> = idx.iter().map(|&i| articles[i].entry_id()).collect();
        let flags = state
            .store
            .record_batch(feed_id, ids.iter().map(String::as_str), now);
        for (&i, new) in idx.iter().zip(flags) {
            is_new[i] = new;
        }
    }
    let mut fresh: Vec<FeedArticle> = articles
        .into_iter()
        .zip(is_new)
        .filter_map(|(a, new)| new.then_some(a))
        .collect();

    let count = fresh.len();
    if count == 0 {
        return ignored("all articles already seen");
    }
    let payload = if count == 1 {
        VerifiedPayload::RssEntry(fresh.swap_remove(0))
    } else {
        VerifiedPayload::RssBatch { articles: fresh }
    };
    let noun = if count == 1 { "article" } else { "articles" };
    state.schedule(payload, format!("{count} new {noun}"))
}

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "webhook-notifier",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "git_webhook": "/webhook/git",
            "netlify_webhook": "/webhook/netlify",
            "rss_webhook": "/webhook/rss",
            "generic_webhook": "/webhook/generic",
            "health": "/health",
            "metrics": "/metrics"
        }
    }))
}
