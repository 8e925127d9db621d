// src/notify/email.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Channel, DeliveryFailure};
use crate::config::{EmailConfig, GlobalConfig};
use crate::event::NotificationRequest;

pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    /// `use_ssl`: implicit TLS; else `use_tls`: STARTTLS; else plain SMTP.
    pub fn from_config(cfg: &EmailConfig, global: &GlobalConfig) -> Result<Self> {
        let host = cfg.smtp_server.trim();
        if host.is_empty() {
            bail!("email is enabled but smtp_server is empty");
        }
        if cfg.recipient_emails.is_empty() {
            bail!("email is enabled but recipient_emails is empty");
        }

        let mut builder = if cfg.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .with_context(|| format!("invalid SMTP host {host}"))?
        } else if cfg.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .with_context(|| format!("invalid SMTP host {host}"))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        if let Some(port) = cfg.smtp_port {
            builder = builder.port(port);
        }
        if !cfg.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.smtp_username.clone(),
                cfg.smtp_password.clone(),
            ));
        }
        let mailer = builder.timeout(Some(global.request_timeout())).build();

        if global.proxy.enabled {
            tracing::warn!("SMTP does not support proxies; email connects directly");
        }

        let from: Mailbox = cfg
            .sender_email
            .parse()
            .with_context(|| format!("invalid sender_email '{}'", cfg.sender_email))?;
        let to = cfg
            .recipient_emails
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .with_context(|| format!("invalid recipient '{addr}'"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { mailer, from, to })
    }

    fn build_message(&self, request: &NotificationRequest) -> Result<Message, DeliveryFailure> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(request.title())
            .header(header::ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        let body = if request.body().is_empty() {
            request.title().to_string()
        } else {
            request.body().to_string()
        };
        builder
            .body(body)
            .map_err(|e| DeliveryFailure::Misconfigured(format!("build email: {e}")))
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), DeliveryFailure> {
        let msg = self.build_message(request)?;
        self.mailer
            .send(msg)
            .await
            .map_err(|e| DeliveryFailure::Transport(format!("smtp: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_server: "smtp.example.com".into(),
            smtp_port: Some(2525),
            sender_email: "Notifier <bot@example.com>".into(),
            recipient_emails: vec!["ops@example.com".into(), "dev@example.com".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn builds_for_each_transport_mode() {
        let global = GlobalConfig::default();
        let mut c = cfg();
        assert!(EmailChannel::from_config(&c, &global).is_ok());
        c.use_ssl = true;
        assert!(EmailChannel::from_config(&c, &global).is_ok());
        c.use_ssl = false;
        c.use_tls = false;
        assert!(EmailChannel::from_config(&c, &global).is_ok());
    }

    #[tokio::test]
    async fn bad_recipient_rejected() {
        let mut c = cfg();
        c.recipient_emails.push("not-an-address".into());
        assert!(EmailChannel::from_config(&c, &GlobalConfig::default()).is_err());
    }
}
