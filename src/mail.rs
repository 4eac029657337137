//! Outgoing mail.
//!
//! `SmtpMailer` delivers through an SMTP relay; `LogMailer` is used when no
//! relay is configured and only writes the message to the log. Delivery is
//! awaited by the caller so a transport failure surfaces as a request error.

use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .with_context(|| format!("smtp relay {}", cfg.host))?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        let from = cfg
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("invalid SMTP_FROM address {}", cfg.from))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        let to = message
            .to
            .parse::<Mailbox>()
            .with_context(|| format!("invalid recipient {}", message.to))?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject)
            .multipart(MultiPart::alternative_plain_html(message.text, message.html))
            .context("build email")?;
        self.transport.send(email).await.context("smtp send")?;
        Ok(())
    }
}

/// Local dev mailer that logs the message instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        info!(to = %message.to, subject = %message.subject, body = %message.text, "mail not sent (no SMTP configured)");
        Ok(())
    }
}

/// Keeps every message in memory so tests can read the mailed link back.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: std::sync::Mutex<Vec<EmailMessage>>,
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mailer mutex poisoned"))?
            .push(message);
        Ok(())
    }
}

pub fn password_reset_email(to: &str, link: &str, ttl_minutes: i64) -> EmailMessage {
    let text = format!(
        "We received a request to reset your password.\n\n\
         Open this link to choose a new one (valid for {ttl_minutes} minutes):\n{link}\n\n\
         If you did not request a password reset, please ignore this email."
    );
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Reset your password</title></head>
<body style="font-family: Arial, sans-serif; background-color: #f4f4f4; margin: 0; padding: 0;">
  <div style="max-width: 600px; margin: 0 auto; background-color: #ffffff; padding: 20px;">
    <h1 style="background-color: #007bff; color: #ffffff; padding: 10px 0; text-align: center;">Reset Your Password</h1>
    <p style="text-align: center;">We received a request to reset your password. Click the button below to reset it.</p>
    <p style="text-align: center;">
      <a href="{link}" style="display: inline-block; padding: 10px 20px; background-color: #007bff; color: #ffffff; text-decoration: none; border-radius: 5px;">Reset Password</a>
    </p>
    <p style="text-align: center;">This link expires in {ttl_minutes} minutes. If you did not request a password reset, please ignore this email.</p>
  </div>
</body>
</html>
"#
    );
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your password".into(),
        text,
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_email_embeds_link_in_both_parts() {
        let link = "http://localhost:8080/api/users/reset-password/abc123";
        let msg = password_reset_email("alice@example.com", link, 15);
        assert_eq!(msg.to, "alice@example.com");
        assert!(msg.text.contains(link));
        assert!(msg.html.contains(&format!("href=\"{link}\"")));
        assert!(msg.text.contains("15 minutes"));
    }

    #[tokio::test]
    async fn recording_mailer_keeps_messages() {
        let mailer = RecordingMailer::default();
        mailer
            .send(password_reset_email("bob@example.com", "http://x/1", 15))
            .await
            .unwrap();
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }
}
