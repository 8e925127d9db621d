// src/verify/mod.rs
//! Inbound webhook authentication.
//!
//! Every provider maps to one [`VerificationStrategy`]. Digests are always
//! computed over the raw request bytes as received; re-serializing parsed
//! JSON would silently diverge from what the provider signed.
//!
//! A provider without a configured secret is accepted as
//! [`Verification::Unauthenticated`] unless the context carries
//! [`UnsignedPolicy::Reject`]. Running without secrets is an operator choice
//! for trusted networks, so the permissive default is kept.

pub mod strategy;

pub use strategy::{
    compute_hmac, constant_time_eq, Algorithm, HmacStrategy, SignatureHeader, TokenStrategy,
    VerificationStrategy,
};

use axum::http::HeaderMap;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    GitHub,
    GitLab,
    Gitea,
    Gogs,
    Netlify,
    Generic,
    RssWebhook,
}

impl Provider {
    pub fn label(&self) -> &'static str {
        match self {
            Provider::GitHub => "GitHub",
            Provider::GitLab => "GitLab",
            Provider::Gitea => "Gitea",
            Provider::Gogs => "Gogs",
            Provider::Netlify => "Netlify",
            Provider::Generic => "Generic",
            Provider::RssWebhook => "RSS",
        }
    }

    /// Header naming the event type, for Git hosts.
    pub fn event_header(&self) -> Option<&'static str> {
        match self {
            Provider::GitHub => Some("x-github-event"),
            Provider::GitLab => Some("x-gitlab-event"),
            Provider::Gitea => Some("x-gitea-event"),
            Provider::Gogs => Some("x-gogs-event"),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identify the Git host from its event header.
///
/// Gitea also sends `X-Gogs-Event` and `X-GitHub-Event`, and Gogs sends nothing
/// Gitea-specific, so the most specific header is checked first.
pub fn detect_git_provider(headers: &HeaderMap) -> Option<Provider> {
    [
        Provider::Gitea,
        Provider::Gogs,
        Provider::GitLab,
        Provider::GitHub,
    ]
    .into_iter()
    .find(|p| p.event_header().is_some_and(|h| headers.contains_key(h)))
}

const GITHUB_HEADERS: &[SignatureHeader] = &[
    SignatureHeader {
        name: "x-hub-signature-256",
        algorithm: Algorithm::Sha256,
        prefix: Some("sha256="),
    },
    SignatureHeader {
        name: "x-hub-signature",
        algorithm: Algorithm::Sha1,
        prefix: Some("sha1="),
    },
];
const GITEA_HEADERS: &[SignatureHeader] = &[SignatureHeader {
    name: "x-gitea-signature",
    algorithm: Algorithm::Sha256,
    prefix: None,
}];
const GOGS_HEADERS: &[SignatureHeader] = &[SignatureHeader {
    name: "x-gogs-signature",
    algorithm: Algorithm::Sha256,
    prefix: None,
}];
const NETLIFY_HEADERS: &[SignatureHeader] = &[SignatureHeader {
    name: "x-webhook-signature",
    algorithm: Algorithm::Sha256,
    prefix: None,
}];
const GENERIC_HEADERS: &[SignatureHeader] = &[
    SignatureHeader {
        name: "x-hub-signature-256",
        algorithm: Algorithm::Sha256,
        prefix: Some("sha256="),
    },
    SignatureHeader {
        name: "x-signature",
        algorithm: Algorithm::Sha256,
        prefix: Some("sha256="),
    },
];

static GITHUB: HmacStrategy = HmacStrategy::new(GITHUB_HEADERS);
static GITEA: HmacStrategy = HmacStrategy::new(GITEA_HEADERS);
static GOGS: HmacStrategy = HmacStrategy::new(GOGS_HEADERS);
static NETLIFY: HmacStrategy = HmacStrategy::new(NETLIFY_HEADERS);
static GENERIC: HmacStrategy = HmacStrategy::new(GENERIC_HEADERS);
static GITLAB: TokenStrategy = TokenStrategy::new("x-gitlab-token", None);
static RSS: TokenStrategy = TokenStrategy::new("x-rss-token", Some("token"));

pub fn strategy_for(provider: Provider) -> &'static dyn VerificationStrategy {
    match provider {
        Provider::GitHub => &GITHUB,
        Provider::GitLab => &GITLAB,
        Provider::Gitea => &GITEA,
        Provider::Gogs => &GOGS,
        Provider::Netlify => &NETLIFY,
        Provider::Generic => &GENERIC,
        Provider::RssWebhook => &RSS,
    }
}

/// Where claimed signatures and tokens are looked up.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    headers: &'a HeaderMap,
    query: Option<&'a HashMap<String, String>>,
}

impl<'a> Credentials<'a> {
    pub fn new(headers: &'a HeaderMap, query: Option<&'a HashMap<String, String>>) -> Self {
        Self { headers, query }
    }

    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn query(&self, name: &str) -> Option<&'a str> {
        self.query
            .and_then(|q| q.get(name))
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnsignedPolicy {
    #[default]
    Accept,
    Reject,
}

/// Everything one verification needs; lives for one request.
#[derive(Debug, Clone, Copy)]
pub struct VerificationContext<'a> {
    pub provider: Provider,
    pub raw_body: &'a [u8],
    pub credentials: Credentials<'a>,
    pub secret: Option<&'a str>,
    pub unsigned: UnsignedPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Authenticated,
    /// No secret configured; accepted by operator policy.
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    #[error("missing signature header: {0}")]
    MissingSignatureHeader(&'static str),
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("no secret configured and unsigned requests are rejected")]
    SecretRequired,
}

pub fn verify(ctx: &VerificationContext<'_>) -> Result<Verification, VerificationFailure> {
    let Some(secret) = ctx.secret.filter(|s| !s.is_empty()) else {
        return match ctx.unsigned {
            UnsignedPolicy::Accept => {
                tracing::warn!(
                    provider = %ctx.provider,
                    "no secret configured, accepting unauthenticated webhook"
                );
                Ok(Verification::Unauthenticated)
            }
            UnsignedPolicy::Reject => Err(VerificationFailure::SecretRequired),
        };
    };

    strategy_for(ctx.provider).check(ctx.raw_body, &ctx.credentials, secret)?;
    Ok(Verification::Authenticated)
}
