//! Outbound email — SMTP via lettre, wrapped by a quota-enforcing
//! orchestrator.
//!
//! A booking send is never retried automatically: delivery is user-visible
//! and idempotency cannot be assumed, so a failure surfaces to the user
//! instead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::error::EmailError;
use crate::store::{EmailAttemptStatus, PendingStore};

/// Sent/failed attempts allowed per actor inside the rolling window.
pub const MAX_EMAIL_ATTEMPTS_PER_24H: u64 = 3;
/// Rolling audit window for the send quota.
pub const EMAIL_WINDOW_HOURS: i64 = 24;

/// One outbound email, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailSendPayload {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub reply_to: Option<String>,
}

/// Email delivery collaborator. Returns a message id on success.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, payload: &EmailSendPayload) -> Result<String, EmailError>;
}

/// SMTP sender backed by lettre.
pub struct SmtpEmailSender {
    config: SmtpConfig,
}

impl SmtpEmailSender {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, payload: &EmailSendPayload) -> Result<String, EmailError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| EmailError::Transport {
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        let mut builder = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| EmailError::InvalidAddress {
                        field: "from".to_string(),
                        reason: format!("{e}"),
                    })?,
            )
            .to(payload.to.parse().map_err(|e| EmailError::InvalidAddress {
                field: "to".to_string(),
                reason: format!("{e}"),
            })?)
            .subject(&payload.subject);

        if let Some(reply_to) = &payload.reply_to {
            builder = builder.reply_to(reply_to.parse().map_err(|e| EmailError::InvalidAddress {
                field: "reply_to".to_string(),
                reason: format!("{e}"),
            })?);
        }

        let email = builder
            .body(payload.body.clone())
            .map_err(|e| EmailError::Transport {
                reason: format!("Failed to build message: {e}"),
            })?;

        transport.send(&email).map_err(|e| EmailError::Transport {
            reason: format!("{e}"),
        })?;

        // SMTP accepted the message; synthesize a local delivery id.
        let message_id = Uuid::new_v4().to_string();
        info!(to = %payload.to, message_id, "Email sent via SMTP");
        Ok(message_id)
    }
}

/// Sender used when SMTP is not configured; every call fails with
/// [`EmailError::NotConfigured`], which the booking agent surfaces to the
/// user.
pub struct DisabledEmailSender;

#[async_trait]
impl EmailSender for DisabledEmailSender {
    async fn send(&self, _payload: &EmailSendPayload) -> Result<String, EmailError> {
        Err(EmailError::NotConfigured)
    }
}

/// Quota-enforcing wrapper around an [`EmailSender`].
///
/// Every attempt is recorded in the audit log, including blocked ones.
pub struct EmailOrchestrator {
    sender: Arc<dyn EmailSender>,
    store: Arc<dyn PendingStore>,
}

impl EmailOrchestrator {
    pub fn new(sender: Arc<dyn EmailSender>, store: Arc<dyn PendingStore>) -> Self {
        Self { sender, store }
    }

    async fn record(
        &self,
        actor_key: &str,
        payload: &EmailSendPayload,
        status: EmailAttemptStatus,
        error: Option<&str>,
    ) {
        if let Err(e) = self
            .store
            .record_email_attempt(actor_key, &payload.to, &payload.subject, status, error)
            .await
        {
            warn!(actor_key, "Failed to record email attempt: {e}");
        }
    }

    /// Send one email for this actor, enforcing the rolling-window quota.
    /// The send itself is attempted at most once.
    pub async fn send_for_actor(
        &self,
        actor_key: &str,
        payload: &EmailSendPayload,
        now: DateTime<Utc>,
    ) -> Result<String, EmailError> {
        let cutoff = now - Duration::hours(EMAIL_WINDOW_HOURS);
        let attempts = self
            .store
            .email_attempt_count_since(actor_key, cutoff)
            .await
            .map_err(|e| EmailError::Audit(e.to_string()))?;

        if attempts >= MAX_EMAIL_ATTEMPTS_PER_24H {
            self.record(actor_key, payload, EmailAttemptStatus::Blocked, Some("rate_limit_exceeded"))
                .await;
            info!(actor_key, attempts, "Email send blocked by quota");
            return Err(EmailError::QuotaExceeded {
                max_attempts: MAX_EMAIL_ATTEMPTS_PER_24H as u32,
                window_hours: EMAIL_WINDOW_HOURS as u32,
            });
        }

        match self.sender.send(payload).await {
            Ok(message_id) => {
                self.record(actor_key, payload, EmailAttemptStatus::Sent, None).await;
                info!(actor_key, to = %payload.to, "Booking email sent");
                Ok(message_id)
            }
            Err(e) => {
                self.record(actor_key, payload, EmailAttemptStatus::Failed, Some(&e.to_string()))
                    .await;
                info!(actor_key, to = %payload.to, "Booking email failed: {e}");
                Err(e)
            }
        }
    }
}
