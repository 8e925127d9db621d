// src/notify/mod.rs
//! Channel fan-out: one request to every enabled channel, concurrently, each
//! under its own timeout. There is no overall verdict, only per-channel outcomes.

pub mod chunk;
pub mod email;
pub mod http;
pub mod napcat;
pub mod telegram;

use anyhow::{bail, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::AppConfig;
use crate::dispatch::{DispatchReport, DispatchSink};
use crate::event::NotificationRequest;

pub use email::EmailChannel;
pub use napcat::{NapcatChannel, NapcatTarget};
pub use telegram::TelegramChannel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rejected by API: {0}")]
    Rejected(String),
    #[error("sent {sent} of {total} chunks: {cause}")]
    Partial {
        sent: usize,
        total: usize,
        cause: Box<DeliveryFailure>,
    },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("misconfigured: {0}")]
    Misconfigured(String),
}

/// One configured destination.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable key in the outcome map, e.g. `telegram` or `napcat.group`.
    fn name(&self) -> &str;
    async fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryFailure>;
}

pub struct FanOut {
    channels: Vec<Arc<dyn Channel>>,
    timeout: Duration,
}

impl FanOut {
    pub fn new(channels: Vec<Arc<dyn Channel>>, timeout: Duration) -> Self {
        crate::metrics::ensure_metrics_described();
        Self { channels, timeout }
    }

    /// Every enabled channel from config. Napcat targets without an id are skipped with a warning.
    pub fn from_config(cfg: &AppConfig, client: reqwest::Client) -> Result<Self> {
        let global = &cfg.global;
        let mut channels: Vec<Arc<dyn Channel>> = Vec::new();

        if cfg.telegram.enabled {
            if cfg.telegram.bot_token.trim().is_empty() || cfg.telegram.chat_id.trim().is_empty() {
                bail!("telegram is enabled but bot_token or chat_id is empty");
            }
            channels.push(Arc::new(TelegramChannel::new(
                client.clone(),
                &cfg.telegram,
                global.max_retries,
            )));
        }

        if cfg.email.enabled {
            channels.push(Arc::new(EmailChannel::from_config(&cfg.email, global)?));
        }

        if cfg.napcat.enabled {
            if cfg.napcat.base_url.is_empty() {
                bail!("napcat is enabled but base_url is empty");
            }
            let mode = cfg.napcat.send_mode;
            let mut targets = Vec::new();
            if mode.includes_private() {
                match cfg.napcat.user_id {
                    Some(id) => targets.push(NapcatTarget::Private(id)),
                    None => tracing::warn!("napcat send_mode includes private but user_id is not set"),
                }
            }
            if mode.includes_group() {
                match cfg.napcat.group_id {
                    Some(id) => targets.push(NapcatTarget::Group(id)),
                    None => tracing::warn!("napcat send_mode includes group but group_id is not set"),
                }
            }
            for target in targets {
                channels.push(Arc::new(NapcatChannel::new(
                    client.clone(),
                    &cfg.napcat,
                    target,
                    global.max_retries,
                )));
            }
        }

        let fan = Self::new(channels, global.delivery_timeout());
        if fan.is_empty() {
            tracing::warn!("no notification channels enabled; notifications will be dropped");
        } else {
            tracing::info!(channels = ?fan.channel_names(), "notification channels ready");
        }
        Ok(fan)
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub async fn deliver(&self, request: Arc<NotificationRequest>) -> DispatchReport {
        let mut set = JoinSet::new();
        let mut names = HashMap::new();

        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let request = Arc::clone(&request);
            let limit = self.timeout;
            let name = channel.name().to_string();
            let handle = set.spawn(async move {
                let result = match tokio::time::timeout(limit, channel.deliver(&request)).await {
                    Ok(r) => r,
                    Err(_) => Err(DeliveryFailure::Timeout(limit)),
                };
                (channel.name().to_string(), result)
            });
            names.insert(handle.id(), name);
        }

        let mut report = BTreeMap::new();
        while let Some(joined) = set.join_next_with_id().await {
            let (name, outcome) = match joined {
                Ok((_, (name, Ok(())))) => {
                    tracing::info!(channel = %name, outcome = "delivered", "notification delivered");
                    (name, DeliveryOutcome::Delivered)
                }
                Ok((_, (name, Err(e)))) => {
                    tracing::warn!(channel = %name, outcome = "failed", error = %e, "notification delivery failed");
                    (
                        name,
                        DeliveryOutcome::Failed {
                            reason: e.to_string(),
                        },
                    )
                }
                Err(e) => {
                    let name = names.get(&e.id()).cloned().unwrap_or_else(|| "unknown".into());
                    tracing::error!(channel = %name, error = %e, "delivery task aborted");
                    (
                        name,
                        DeliveryOutcome::Failed {
                            reason: format!("delivery task aborted: {e}"),
                        },
                    )
                }
            };
            counter!("deliveries_total", "channel" => name.clone(), "outcome" => outcome.label())
                .increment(1);
            report.insert(name, outcome);
        }
        report
    }
}

#[async_trait]
impl DispatchSink for FanOut {
    async fn dispatch(&self, request: Arc<NotificationRequest>) -> DispatchReport {
        self.deliver(request).await
    }
}
