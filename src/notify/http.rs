// src/notify/http.rs
//! Shared outbound HTTP: one proxy-aware client and a JSON POST with retries.

use anyhow::{Context, Result};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::DeliveryFailure;
use crate::config::{GlobalConfig, ProxyConfig};

/// - `enabled = false`: no proxy at all (env/system proxies ignored)
/// - `enabled = true` + `url`: explicit HTTP, HTTPS or SOCKS5 proxy
/// - `enabled = true` without `url`: reqwest's default env/system proxy lookup
pub fn apply_proxy_config(builder: ClientBuilder, proxy: &ProxyConfig) -> Result<ClientBuilder> {
    if !proxy.enabled {
        return Ok(builder.no_proxy());
    }
    match proxy.url.as_deref() {
        Some(url) => {
            let p = reqwest::Proxy::all(url).with_context(|| format!("invalid proxy URL {url}"))?;
            Ok(builder.proxy(p))
        }
        None => Ok(builder),
    }
}

/// The client every feed fetch and HTTP channel shares; its timeout bounds each call.
pub fn build_client(global: &GlobalConfig) -> Result<Client> {
    let builder = Client::builder()
        .timeout(global.request_timeout())
        .user_agent(concat!("webhook-notifier/", env!("CARGO_PKG_VERSION")));
    apply_proxy_config(builder, &global.proxy)?
        .build()
        .context("building HTTP client")
}

fn retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500u64 << (attempt - 1).min(6))
}

/// URLs may carry credentials (Telegram bot tokens), so they never reach error text.
fn transport(e: reqwest::Error) -> DeliveryFailure {
    DeliveryFailure::Transport(e.without_url().to_string())
}

/// POST `body` as JSON. Retries transport errors, 429 and 5xx up to `max_retries`
/// times with 500ms·2^(n-1) backoff. Returns the parsed JSON response (or `Null`).
pub async fn post_json_with_retry<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    body: &B,
    bearer: Option<&str>,
    max_retries: u8,
) -> Result<Value, DeliveryFailure> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let mut req = client.post(url).json(body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let can_retry = attempt <= u32::from(max_retries);

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                if can_retry {
                    tracing::debug!(attempt, error = %e.without_url(), "transport error, retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                return Err(transport(e));
            }
        };

        let status = resp.status();
        if retryable(status) && can_retry {
            tracing::debug!(attempt, status = status.as_u16(), "retryable status, retrying");
            tokio::time::sleep(backoff(attempt)).await;
            continue;
        }

        let text = resp.text().await.map_err(transport)?;
        if !status.is_success() {
            let mut body: String = text.chars().take(300).collect();
            if let Ok(v) = serde_json::from_str::<Value>(&text) {
                if let Some(desc) = v.get("description").and_then(Value::as_str) {
                    body = desc.to_string();
                }
            }
            return Err(DeliveryFailure::Status {
                status: status.as_u16(),
                body,
            });
        }
        return Ok(serde_json::from_str(&text).unwrap_or(Value::Null));
    }
}
