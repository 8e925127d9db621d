// src/notify/napcat.rs
//! Napcat speaks the OneBot v11 HTTP API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::http::post_json_with_retry;
use super::{Channel, DeliveryFailure};
use crate::config::NapcatConfig;
use crate::event::NotificationRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NapcatTarget {
    Private(i64),
    Group(i64),
}

impl NapcatTarget {
    fn channel_name(&self) -> &'static str {
        match self {
            NapcatTarget::Private(_) => "napcat.private",
            NapcatTarget::Group(_) => "napcat.group",
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            NapcatTarget::Private(_) => "send_private_msg",
            NapcatTarget::Group(_) => "send_group_msg",
        }
    }

    fn payload(&self, message: &str) -> Value {
        match self {
            NapcatTarget::Private(id) => json!({ "user_id": id, "message": message }),
            NapcatTarget::Group(id) => json!({ "group_id": id, "message": message }),
        }
    }
}

#[derive(Clone)]
pub struct NapcatChannel {
    client: Client,
    base_url: String,
    target: NapcatTarget,
    access_token: Option<String>,
    max_retries: u8,
}

impl NapcatChannel {
    pub fn new(client: Client, cfg: &NapcatConfig, target: NapcatTarget, max_retries: u8) -> Self {
        Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            target,
            access_token: cfg.access_token.clone(),
            max_retries,
        }
    }
}

/// `status: "failed"` or a non-zero `retcode` means the bot refused the message.
fn check_onebot_response(resp: &Value) -> Result<(), DeliveryFailure> {
    let failed = resp.get("status").and_then(Value::as_str) == Some("failed");
    let retcode = resp.get("retcode").and_then(Value::as_i64).unwrap_or(0);
    if failed || retcode != 0 {
        let msg = resp
            .get("wording")
            .or_else(|| resp.get("message"))
            .or_else(|| resp.get("msg"))
            .and_then(Value::as_str)
            .unwrap_or("no message");
        return Err(DeliveryFailure::Rejected(format!("retcode {retcode}: {msg}")));
    }
    Ok(())
}

#[async_trait]
impl Channel for NapcatChannel {
    fn name(&self) -> &str {
        self.target.channel_name()
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryFailure> {
        let url = format!("{}/{}", self.base_url, self.target.endpoint());
        let payload = self.target.payload(&request.as_message_text());
        let resp = post_json_with_retry(
            &self.client,
            &url,
            &payload,
            self.access_token.as_deref(),
            self.max_retries,
        )
        .await?;
        check_onebot_response(&resp)
    }
}
