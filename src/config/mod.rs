// src/config/mod.rs
//! Service configuration: file discovery, TOML/JSON parsing, `"ENV"` secret
//! resolution and sanitizing.

pub mod settings;

pub use settings::{
    AppConfig, EmailConfig, FeedConfig, GlobalConfig, NapcatConfig, ProxyConfig, RssConfig,
    Secrets, SendMode, ServerConfig, TelegramConfig,
};

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const ENV_CONFIG_PATH: &str = "NOTIFIER_CONFIG";
pub const DEFAULT_TOML_PATH: &str = "config/notifier.toml";
pub const DEFAULT_JSON_PATH: &str = "config/notifier.json";

/// Load configuration using env var + fallbacks:
/// 1) $NOTIFIER_CONFIG
/// 2) config/notifier.toml
/// 3) config/notifier.json
pub fn load_config_default() -> Result<AppConfig> {
    if let Ok(p) = env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        return AppConfig::load_from_file(&pb);
    }
    for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return AppConfig::load_from_file(&pb);
        }
    }
    Err(anyhow!(
        "no configuration found (set {ENV_CONFIG_PATH} or create {DEFAULT_TOML_PATH})"
    ))
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = Self::parse(&content, &ext)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.resolve_env()?;
        cfg.sanitize()?;
        Ok(cfg)
    }

    /// Parse without touching the environment or validating; `hint_ext` is "toml" or "json".
    pub fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        if hint_ext == "json" {
            return serde_json::from_str(s).context("invalid JSON config");
        }
        toml::from_str(s).context("invalid TOML config")
    }

    /// Replace every credential whose value is `"ENV"` with the matching environment variable.
    pub fn resolve_env(&mut self) -> Result<()> {
        for (var, slot) in self.secrets.slots_mut() {
            resolve_opt(slot, var)?;
        }
        resolve(&mut self.telegram.bot_token, "NOTIFIER_TELEGRAM_BOT_TOKEN")?;
        resolve(&mut self.email.smtp_password, "NOTIFIER_SMTP_PASSWORD")?;
        resolve_opt(&mut self.napcat.access_token, "NOTIFIER_NAPCAT_ACCESS_TOKEN")?;
        Ok(())
    }

    /// Normalize empty values to "unset", clamp intervals, reject ambiguous feed lists.
    pub fn sanitize(&mut self) -> Result<()> {
        for (_, slot) in self.secrets.slots_mut() {
            blank_to_none(slot);
        }
        blank_to_none(&mut self.napcat.access_token);
        if let Some(url) = self.global.proxy.url.as_mut() {
            *url = url.trim().to_string();
        }
        blank_to_none(&mut self.global.proxy.url);

        self.global.request_timeout_secs = self.global.request_timeout_secs.max(1);
        self.global.delivery_timeout_secs = self
            .global
            .delivery_timeout_secs
            .max(self.global.request_timeout_secs);
        self.rss.check_interval_minutes = self.rss.check_interval_minutes.max(1);
        self.rss.backoff_max_minutes = self
            .rss
            .backoff_max_minutes
            .max(self.rss.check_interval_minutes);
        self.telegram.max_message_chars = self.telegram.max_message_chars.clamp(64, 4096);
        self.napcat.base_url = self.napcat.base_url.trim_end_matches('/').to_string();
        self.telegram.api_base = self.telegram.api_base.trim_end_matches('/').to_string();

        let mut names = HashSet::new();
        for feed in &mut self.rss.feeds {
            feed.name = feed.name.trim().to_string();
            feed.url = feed.url.trim().to_string();
            if feed.name.is_empty() {
                bail!("rss feed with url '{}' has no name", feed.url);
            }
            if !names.insert(feed.name.clone()) {
                bail!("duplicate rss feed name '{}'", feed.name);
            }
        }
        Ok(())
    }
}

fn is_env_marker(v: &str) -> bool {
    v.trim().eq_ignore_ascii_case("env")
}

fn resolve(value: &mut String, var: &str) -> Result<()> {
    if is_env_marker(value) {
        *value = env::var(var).map_err(|_| anyhow!("Missing {var} env var"))?;
    }
    Ok(())
}

fn resolve_opt(value: &mut Option<String>, var: &str) -> Result<()> {
    if let Some(v) = value.as_mut() {
        resolve(v, var)?;
    }
    Ok(())
}

fn blank_to_none(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::Provider;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = AppConfig::parse("", "toml").unwrap();
        assert_eq!(cfg.global.notification_delay_seconds, 0);
        assert_eq!(cfg.global.request_timeout_secs, 10);
        assert_eq!(cfg.rss.check_interval_minutes, 30);
        assert_eq!(cfg.telegram.max_message_chars, 4000);
        assert!(cfg.email.use_tls);
        assert_eq!(cfg.napcat.send_mode, SendMode::All);
    }

    #[test]
    fn blank_secrets_mean_unset() {
        let mut cfg = AppConfig::parse(
            r#"
[secrets]
github = ""
gitlab = "tok"
"#,
            "toml",
        )
        .unwrap();
        cfg.sanitize().unwrap();
        assert_eq!(cfg.secrets.for_provider(Provider::GitHub), None);
        assert_eq!(cfg.secrets.for_provider(Provider::GitLab), Some("tok"));
    }

    #[test]
    fn duplicate_feed_names_rejected() {
        let mut cfg = AppConfig::parse(
            r#"
[[rss.feeds]]
name = "blog"
url = "https://a.example/feed"

[[rss.feeds]]
name = " blog "
url = "https://b.example/feed"
"#,
            "toml",
        )
        .unwrap();
        assert!(cfg.sanitize().is_err());
    }

    #[test]
    fn json_config_parses() {
        let cfg = AppConfig::parse(
            r#"{"global": {"notification_delay_seconds": 5}, "napcat": {"send_mode": "both"}}"#,
            "json",
        )
        .unwrap();
        assert_eq!(cfg.global.notification_delay_seconds, 5);
        assert_eq!(cfg.napcat.send_mode, SendMode::All);
    }

    #[serial_test::serial]
    #[test]
    fn env_marker_reads_variable() {
        env::set_var("NOTIFIER_GITEA_SECRET", "from-env");
        let mut cfg = AppConfig::parse("[secrets]\ngitea = \"ENV\"\n", "toml").unwrap();
        cfg.resolve_env().unwrap();
        assert_eq!(cfg.secrets.for_provider(Provider::Gitea), Some("from-env"));
        env::remove_var("NOTIFIER_GITEA_SECRET");

        let mut missing = AppConfig::parse("[secrets]\ngogs = \"env\"\n", "toml").unwrap();
        env::remove_var("NOTIFIER_GOGS_SECRET");
        assert!(missing.resolve_env().is_err());
    }
}
