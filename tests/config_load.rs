// tests/config_load.rs
use serial_test::serial;
use std::env;
use std::fs;

use webhook_notifier::config::{load_config_default, AppConfig, SendMode, ENV_CONFIG_PATH};
use webhook_notifier::verify::Provider;

const EXAMPLE: &str = include_str!("../config/notifier.example.toml");

#[test]
#[serial]
fn example_config_loads_via_env_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notifier.toml");
    fs::write(&path, EXAMPLE).unwrap();

    env::set_var("NOTIFIER_GITHUB_SECRET", "gh-from-env");
    env::set_var("NOTIFIER_TELEGRAM_BOT_TOKEN", "bot-from-env");
    env::set_var("NOTIFIER_SMTP_PASSWORD", "smtp-from-env");
    env::set_var(ENV_CONFIG_PATH, &path);

    let cfg = load_config_default().expect("example config should load");

    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var("NOTIFIER_GITHUB_SECRET");
    env::remove_var("NOTIFIER_TELEGRAM_BOT_TOKEN");
    env::remove_var("NOTIFIER_SMTP_PASSWORD");

    assert_eq!(cfg.global.notification_delay_seconds, 60);
    assert_eq!(cfg.secrets.for_provider(Provider::GitHub), Some("gh-from-env"));
    assert_eq!(cfg.secrets.for_provider(Provider::GitLab), None, "blank means unset");
    assert_eq!(cfg.telegram.bot_token, "bot-from-env");
    assert_eq!(cfg.email.smtp_password, "smtp-from-env");
    assert_eq!(cfg.napcat.send_mode, SendMode::All);
    assert_eq!(cfg.napcat.access_token, None);
    assert_eq!(cfg.rss.feeds.len(), 2);
    assert!(!cfg.rss.feeds[1].enabled);
}

#[test]
#[serial]
fn missing_env_path_is_an_error() {
    env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
    let err = load_config_default().unwrap_err();
    env::remove_var(ENV_CONFIG_PATH);
    assert!(err.to_string().contains(ENV_CONFIG_PATH));
}

#[test]
#[serial]
fn unset_env_marker_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notifier.toml");
    fs::write(&path, "[telegram]\nenabled = true\nbot_token = \"ENV\"\nchat_id = \"1\"\n").unwrap();
    env::remove_var("NOTIFIER_TELEGRAM_BOT_TOKEN");

    let err = AppConfig::load_from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("NOTIFIER_TELEGRAM_BOT_TOKEN"));
}

#[test]
fn json_config_is_clamped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notifier.json");
    fs::write(
        &path,
        r#"{
            "global": { "request_timeout_secs": 0, "delivery_timeout_secs": 1 },
            "rss": { "check_interval_minutes": 0, "backoff_max_minutes": 0 },
            "telegram": { "api_base": "https://api.telegram.org/", "max_message_chars": 99999 }
        }"#,
    )
    .unwrap();

    let cfg = AppConfig::load_from_file(&path).unwrap();
    assert_eq!(cfg.global.request_timeout_secs, 1);
    assert_eq!(cfg.rss.check_interval_minutes, 1);
    assert_eq!(cfg.rss.backoff_max_minutes, 1);
    assert_eq!(cfg.telegram.max_message_chars, 4096);
    assert_eq!(cfg.telegram.api_base, "https://api.telegram.org");
}
