// src/config/settings.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::verify::Provider;

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_true() -> bool {
    true
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_delivery_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u8 {
    3
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_check_interval_minutes() -> u64 {
    30
}
fn default_backoff_max_minutes() -> u64 {
    240
}
fn default_state_path() -> PathBuf {
    PathBuf::from("state/rss_seen.json")
}
fn default_max_entries_per_feed() -> usize {
    1000
}
fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_max_message_chars() -> usize {
    4000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub global: GlobalConfig,
    pub secrets: Secrets,
    pub rss: RssConfig,
    pub telegram: TelegramConfig,
    pub email: EmailConfig,
    pub napcat: NapcatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Expose `/metrics` (Prometheus text format).
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Delay between normalization and delivery. 0 delivers immediately.
    #[serde(default)]
    pub notification_delay_seconds: u64,
    /// Bound for every outbound HTTP call (feeds, Telegram, Napcat) and the SMTP session.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bound for one channel's whole delivery of one request (all chunks, all retries).
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// When false (default) a provider without a configured secret is accepted unauthenticated.
    #[serde(default)]
    pub require_signatures: bool,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            notification_delay_seconds: 0,
            request_timeout_secs: default_request_timeout_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            max_retries: default_max_retries(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            require_signatures: false,
            proxy: ProxyConfig::default(),
        }
    }
}

impl GlobalConfig {
    pub fn notification_delay(&self) -> Duration {
        Duration::from_secs(self.notification_delay_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// `enabled = false`: direct connections. `enabled` without `url`: system proxy
/// from the environment. `url` may be `http://`, `https://` or `socks5://`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Secrets {
    pub github: Option<String>,
    pub gitlab: Option<String>,
    pub gitea: Option<String>,
    pub gogs: Option<String>,
    pub netlify: Option<String>,
    pub generic: Option<String>,
    pub rss: Option<String>,
}

impl Secrets {
    pub fn for_provider(&self, provider: Provider) -> Option<&str> {
        let slot = match provider {
            Provider::GitHub => &self.github,
            Provider::GitLab => &self.gitlab,
            Provider::Gitea => &self.gitea,
            Provider::Gogs => &self.gogs,
            Provider::Netlify => &self.netlify,
            Provider::Generic => &self.generic,
            Provider::RssWebhook => &self.rss,
        };
        slot.as_deref().filter(|s| !s.is_empty())
    }

    pub(crate) fn slots_mut(&mut self) -> [(&'static str, &mut Option<String>); 7] {
        [
            ("NOTIFIER_GITHUB_SECRET", &mut self.github),
            ("NOTIFIER_GITLAB_SECRET", &mut self.gitlab),
            ("NOTIFIER_GITEA_SECRET", &mut self.gitea),
            ("NOTIFIER_GOGS_SECRET", &mut self.gogs),
            ("NOTIFIER_NETLIFY_SECRET", &mut self.netlify),
            ("NOTIFIER_GENERIC_SECRET", &mut self.generic),
            ("NOTIFIER_RSS_SECRET", &mut self.rss),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_check_interval_minutes")]
    pub check_interval_minutes: u64,
    #[serde(default = "default_backoff_max_minutes")]
    pub backoff_max_minutes: u64,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// 0 keeps every record forever.
    #[serde(default = "default_max_entries_per_feed")]
    pub max_entries_per_feed: usize,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval_minutes: default_check_interval_minutes(),
            backoff_max_minutes: default_backoff_max_minutes(),
            state_path: default_state_path(),
            max_entries_per_feed: default_max_entries_per_feed(),
            feeds: Vec::new(),
        }
    }
}

impl RssConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes * 60)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_minutes * 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Also the feed id in the dedup store; must be unique.
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    /// Telegram caps messages at 4096; keep headroom.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    /// Unset sends plain text. "Markdown" or "HTML" makes Telegram parse entities,
    /// and a message with unbalanced markup is then rejected.
    #[serde(default)]
    pub parse_mode: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_telegram_api_base(),
            max_message_chars: default_max_message_chars(),
            parse_mode: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub sender_email: String,
    #[serde(default)]
    pub recipient_emails: Vec<String>,
    /// Implicit TLS (usually port 465). Takes precedence over `use_tls`.
    #[serde(default)]
    pub use_ssl: bool,
    /// STARTTLS upgrade (usually port 587).
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: None,
            smtp_username: String::new(),
            smtp_password: String::new(),
            sender_email: String::new(),
            recipient_emails: Vec::new(),
            use_ssl: false,
            use_tls: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    Private,
    Group,
    #[default]
    #[serde(alias = "both")]
    All,
}

impl SendMode {
    pub fn includes_private(&self) -> bool {
        matches!(self, SendMode::Private | SendMode::All)
    }

    pub fn includes_group(&self) -> bool {
        matches!(self, SendMode::Group | SendMode::All)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NapcatConfig {
    pub enabled: bool,
    pub base_url: String,
    pub send_mode: SendMode,
    pub user_id: Option<i64>,
    pub group_id: Option<i64>,
    pub access_token: Option<String>,
}
