use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::{header::ContentType, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::Mutex;

use crate::config::EmailConfig;
use crate::domain::Channel;
use crate::error::AppResult;

use super::{ChannelAdapter, ChannelCapabilities, DeliveryContext, DeliveryResult};

/// SMTP-backed adapter. Connection setup mirrors the transport-construction
/// pattern used for the notification system's own SMTP client: STARTTLS when
/// configured, otherwise a TLS-wrapped relay, with credentials. The
/// transport is rebuilt behind a mutex on first-use failure rather than
/// trusted blindly, since a stale connection is a common SMTP failure mode.
pub struct EmailAdapter {
    config: EmailConfig,
    transport: Mutex<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailAdapter {
    pub async fn new(config: EmailConfig) -> AppResult<Self> {
        let transport = Self::build_transport(&config)?;
        Ok(Self {
            config,
            transport: Mutex::new(transport),
        })
    }

    fn build_transport(config: &EmailConfig) -> AppResult<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| crate::error::AppError::Email(format!("smtp relay setup: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        Ok(builder.port(config.smtp_port).credentials(creds).build())
    }

    fn from_mailbox(&self) -> AppResult<lettre::message::Mailbox> {
        format!("{} <{}>", self.config.from_name, self.config.from_address)
            .parse()
            .map_err(|e| crate::error::AppError::Email(format!("invalid from address: {e}")))
    }

    /// Substitutes `{token}` placeholders in a template string using the
    /// recipient's user context, falling back to leaving unknown tokens
    /// literal rather than erroring.
    fn personalize(template: &str, ctx: &DeliveryContext) -> String {
        let mut out = template.to_string();
        let user_name = ctx.user_context.get("user_name").and_then(|v| v.as_str()).unwrap_or("");
        let user_email = ctx.user_context.get("user_email").and_then(|v| v.as_str()).unwrap_or("");
        out = out.replace("{user_name}", user_name);
        out = out.replace("{user_email}", user_email);
        out = out.replace("{notification_title}", &ctx.title);
        out = out.replace("{user_id}", &ctx.recipient_id.to_string());
        out
    }

    async fn reconnect_with_backoff(&self) -> AppResult<()> {
        let mut wait = Duration::from_millis(250);
        let mut last_err = None;
        for _ in 0..3 {
            match Self::build_transport(&self.config) {
                Ok(fresh) => {
                    *self.transport.lock().await = fresh;
                    return Ok(());
                }
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(wait).await;
                    wait *= 2;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| crate::error::AppError::Email("smtp reconnect failed".to_string())))
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn channel_type(&self) -> Channel {
        Channel::Email
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_rich_format: true,
            supports_attachments: false,
            supports_personalization: true,
            max_body_len: Some(self.config.max_body_len),
        }
    }

    async fn initialize(&self) -> AppResult<()> {
        if !self.transport.lock().await.test_connection().await.unwrap_or(false) {
            self.reconnect_with_backoff().await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self.transport.lock().await.test_connection().await.unwrap_or(false))
    }

    async fn send(&self, ctx: &DeliveryContext) -> DeliveryResult {
        let started_at = Utc::now();
        let recipient_email = match ctx.user_context.get("email").and_then(|v| v.as_str()) {
            Some(e) => e,
            None => {
                return DeliveryResult::failed(
                    self.channel_type(),
                    ctx.recipient_id,
                    "recipient has no email address on file".to_string(),
                    false,
                )
            }
        };

        let from = match self.from_mailbox() {
            Ok(f) => f,
            Err(e) => {
                return DeliveryResult::failed(self.channel_type(), ctx.recipient_id, e.to_string(), false)
            }
        };
        let to = match recipient_email.parse() {
            Ok(m) => m,
            Err(e) => {
                return DeliveryResult::failed(
                    self.channel_type(),
                    ctx.recipient_id,
                    format!("invalid recipient mailbox: {e}"),
                    false,
                )
            }
        };

        let subject = Self::personalize(&ctx.title, ctx);
        let plain_body = Self::personalize(&ctx.body, ctx);

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(subject.clone())
            .message_id(Some(format!("<{}@notification-engine>", ctx.notification_id)));

        let message = if let Some(rich) = &ctx.rich_body {
            let html_body = Self::personalize(rich, ctx);
            builder
                .multipart(
                    MultiPart::alternative()
                        .singlepart(SinglePart::plain(plain_body.clone()))
                        .singlepart(SinglePart::html(html_body)),
                )
                .unwrap_or_else(|_| {
                    Message::builder()
                        .from(self.from_mailbox().expect("validated above"))
                        .to(recipient_email.parse().expect("validated above"))
                        .subject(subject.clone())
                        .header(ContentType::TEXT_PLAIN)
                        .body(plain_body.clone())
                        .expect("plain body always builds")
                })
        } else {
            builder
                .header(ContentType::TEXT_PLAIN)
                .body(plain_body)
                .expect("plain body always builds")
        };

        let result = match self.transport.lock().await.send(message).await {
            Ok(_) => DeliveryResult::delivered(self.channel_type(), ctx.recipient_id),
            Err(e) => {
                let retryable = e.is_transient() || e.is_timeout();
                DeliveryResult::failed(self.channel_type(), ctx.recipient_id, e.to_string(), retryable)
            }
        };
        result.with_timing(started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn personalize_substitutes_known_tokens() {
        let ctx = DeliveryContext {
            notification_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            correlation_id: None,
            notification_type: crate::domain::NotificationType::SystemAlert,
            title: "Build failed".to_string(),
            body: "Hi {user_name}, see {notification_title}".to_string(),
            rich_body: None,
            priority: crate::domain::Priority::High,
            attempt_number: 1,
            max_attempts: 3,
            user_context: serde_json::json!({"user_name": "Dana", "email": "dana@example.com"}),
            metadata: serde_json::Value::Null,
        };
        let result = EmailAdapter::personalize(&ctx.body, &ctx);
        assert_eq!(result, "Hi Dana, see Build failed");
    }

    #[test]
    fn personalize_leaves_unknown_tokens_literal() {
        let ctx = DeliveryContext {
            notification_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            correlation_id: None,
            notification_type: crate::domain::NotificationType::SystemAlert,
            title: "t".to_string(),
            body: "value: {unknown_token}".to_string(),
            rich_body: None,
            priority: crate::domain::Priority::Low,
            attempt_number: 1,
            max_attempts: 3,
            user_context: serde_json::Value::Null,
            metadata: serde_json::Value::Null,
        };
        assert_eq!(EmailAdapter::personalize(&ctx.body, &ctx), "value: {unknown_token}");
    }
}
