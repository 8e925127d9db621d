// src/notify/telegram.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::chunk::chunk_message;
use super::http::post_json_with_retry;
use super::{Channel, DeliveryFailure};
use crate::config::TelegramConfig;
use crate::event::NotificationRequest;

#[derive(Clone)]
pub struct TelegramChannel {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    max_chars: usize,
    parse_mode: Option<String>,
    max_retries: u8,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}

impl TelegramChannel {
    pub fn new(client: Client, cfg: &TelegramConfig, max_retries: u8) -> Self {
        Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            bot_token: cfg.bot_token.clone(),
            chat_id: cfg.chat_id.clone(),
            max_chars: cfg.max_message_chars,
            parse_mode: cfg.parse_mode.clone().filter(|m| !m.trim().is_empty()),
            max_retries,
        }
    }

    async fn send_chunk(&self, text: &str) -> Result<(), DeliveryFailure> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: self.parse_mode.as_deref(),
            disable_web_page_preview: true,
        };
        let resp = post_json_with_retry(&self.client, &url, &payload, None, self.max_retries).await?;

        // Bot API wraps every answer in {"ok": bool, "description"?: ...}.
        if resp.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            let desc = resp
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("response without ok=true");
            Err(DeliveryFailure::Rejected(desc.to_string()))
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryFailure> {
        let chunks = chunk_message(&request.as_message_text(), self.max_chars);
        let total = chunks.len();
        for (sent, chunk) in chunks.iter().enumerate() {
            if let Err(cause) = self.send_chunk(chunk).await {
                if total == 1 {
                    return Err(cause);
                }
                return Err(DeliveryFailure::Partial {
                    sent,
                    total,
                    cause: Box::new(cause),
                });
            }
        }
        tracing::debug!(chunks = total, "telegram message sent");
        Ok(())
    }
}
