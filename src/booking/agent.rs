//! Booking email agent — a turn-based state machine over pending state.
//!
//! States: no pending → pending incomplete → pending complete → sent /
//! cancelled / expired. Pending state is always cleared after a terminal
//! yes/no regardless of send outcome, so a failed send can never wedge the
//! conversation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::booking::extract::{
    extract_booking_data, is_affirmative, is_booking_intent, is_confirmation_only_message,
    is_negative,
};
use crate::booking::payload::{
    BOOKING_ACTION_TYPE, BOOKING_TTL_MINUTES, BookingPayload, build_booking_email_content,
};
use crate::email::{EmailOrchestrator, EmailSendPayload};
use crate::error::StoreError;
use crate::response::ChatResponse;
use crate::session::UserProfile;
use crate::store::{PendingAction, PendingStore};

pub struct BookingEmailAgent {
    store: Arc<dyn PendingStore>,
    orchestrator: Arc<EmailOrchestrator>,
}

impl BookingEmailAgent {
    pub fn new(store: Arc<dyn PendingStore>, orchestrator: Arc<EmailOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    fn ttl() -> Duration {
        Duration::minutes(BOOKING_TTL_MINUTES)
    }

    /// Persist a payload as the actor's single pending action, with a fresh
    /// TTL.
    async fn save(
        &self,
        actor_key: &str,
        payload: BookingPayload,
        now: DateTime<Utc>,
    ) -> Result<PendingAction, StoreError> {
        self.store
            .create_pending(actor_key, BOOKING_ACTION_TYPE, &payload.stamp(), now, Self::ttl())
            .await
    }

    fn proposal_response(
        pending: &PendingAction,
        intro: &str,
        actor_key: &str,
    ) -> Result<ChatResponse, StoreError> {
        let proposal = pending
            .payload
            .proposal(pending.expires_at)
            .ok_or_else(|| StoreError::NotFound {
                entity: "complete booking payload".to_string(),
                key: actor_key.to_string(),
            })?;
        Ok(ChatResponse {
            coach_message: format!(
                "{intro} to {} for {}. Reply YES to send or NO to cancel.",
                proposal.therapist_email, proposal.requested_time
            ),
            booking_proposal: Some(proposal),
            requires_confirmation: Some(true),
            ..Default::default()
        })
    }

    /// One booking turn. Returns `None` when the message is not booking
    /// business at all, letting the caller fall through to coaching.
    pub async fn handle(
        &self,
        user: Option<&UserProfile>,
        actor_key: &str,
        message: &str,
        pending_action: Option<PendingAction>,
        pending_expired: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ChatResponse>, StoreError> {
        if let Some(pending) = pending_action {
            return self.handle_pending(user, actor_key, message, pending, now).await.map(Some);
        }

        if pending_expired && (is_affirmative(message) || is_negative(message)) {
            info!(actor_key, "Confirmation arrived after booking expiry");
            return Ok(Some(ChatResponse {
                requires_confirmation: Some(false),
                ..ChatResponse::message(format!(
                    "Your pending booking request expired after {BOOKING_TTL_MINUTES} minutes. \
                     Please start again with therapist email and time."
                ))
            }));
        }

        if is_confirmation_only_message(message) {
            return Ok(Some(ChatResponse {
                requires_confirmation: Some(false),
                ..ChatResponse::message(
                    "No pending booking request to confirm. Please provide therapist email + time.",
                )
            }));
        }

        if !is_booking_intent(message) {
            return Ok(None);
        }

        let extracted = extract_booking_data(message, now);

        if let (Some(email), Some(requested)) =
            (&extracted.therapist_email, extracted.requested_datetime)
        {
            let payload = build_booking_email_content(
                user,
                email,
                requested.fixed_offset(),
                extracted.sender_name.as_deref(),
                None,
            );
            let saved = self.save(actor_key, payload, now).await?;
            info!(actor_key, to = %email, "Booking proposal created");
            return Self::proposal_response(&saved, "I prepared an appointment email", actor_key)
                .map(Some);
        }

        let payload = BookingPayload::from_extraction(&extracted, user);
        let ask = payload.missing_fields_message(extracted.clarification.as_deref());
        let saved = self.save(actor_key, payload, now).await?;
        info!(
            actor_key,
            missing = saved.payload.missing_fields().join(","),
            "Incomplete booking draft created"
        );
        Ok(Some(ChatResponse {
            requires_confirmation: Some(false),
            ..ChatResponse::message(ask)
        }))
    }

    async fn handle_pending(
        &self,
        user: Option<&UserProfile>,
        actor_key: &str,
        message: &str,
        pending: PendingAction,
        now: DateTime<Utc>,
    ) -> Result<ChatResponse, StoreError> {
        if is_negative(message) {
            self.store.delete_pending(pending.id).await?;
            info!(actor_key, "Pending booking cancelled");
            return Ok(ChatResponse {
                requires_confirmation: Some(false),
                ..ChatResponse::message("Okay, I cancelled the pending booking email request.")
            });
        }

        if is_affirmative(message) {
            if !pending.payload.is_complete() {
                return Ok(ChatResponse::message(pending.payload.missing_fields_message(None)));
            }
            let email_payload = EmailSendPayload {
                to: pending.payload.therapist_email.clone().unwrap_or_default(),
                subject: pending.payload.subject.clone().unwrap_or_default(),
                body: pending.payload.body.clone().unwrap_or_default(),
                reply_to: pending.payload.reply_to.clone(),
            };
            let coach_message = match self
                .orchestrator
                .send_for_actor(actor_key, &email_payload, now)
                .await
            {
                Ok(_) => {
                    info!(actor_key, to = %email_payload.to, "Booking email sent");
                    "Email sent successfully. I have cleared the pending booking request."
                        .to_string()
                }
                Err(e) => {
                    info!(actor_key, "Booking email failed: {e}");
                    format!("I could not send the email: {e}")
                }
            };
            // Cleared after either outcome so state never lingers.
            self.store.delete_pending(pending.id).await?;
            return Ok(ChatResponse {
                requires_confirmation: Some(false),
                ..ChatResponse::message(coach_message)
            });
        }

        let update = extract_booking_data(message, now);
        let mut payload = pending.payload.clone();
        let changed = payload.merge_extraction(&update);

        if payload.is_complete() {
            return Self::proposal_response(&pending, "Please confirm sending this request", actor_key);
        }

        if changed && payload.therapist_email.is_some() && payload.requested_datetime.is_some() {
            let complete = build_booking_email_content(
                user,
                payload.therapist_email.as_deref().unwrap_or_default(),
                payload.requested_datetime.unwrap_or_else(|| now.fixed_offset()),
                payload.sender_name.as_deref(),
                payload.reply_to.as_deref(),
            );
            let saved = self.save(actor_key, complete, now).await?;
            info!(actor_key, "Booking draft completed by follow-up");
            return Self::proposal_response(&saved, "I prepared the email", actor_key);
        }

        if changed {
            let saved = self.save(actor_key, payload.clone(), now).await?;
            info!(
                actor_key,
                missing = saved.payload.missing_fields().join(","),
                "Booking draft updated"
            );
        }

        Ok(ChatResponse::message(
            payload.missing_fields_message(update.clarification.as_deref()),
        ))
    }
}
