//! Typed pending-booking payload and its derived projections.
//!
//! The payload is a struct with optional fields rather than a loose map;
//! completeness and the missing-field list are derived from the type.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::extract::{BookingExtraction, TARGET_TZ, TARGET_TZ_LABEL, requested_time_display};
use crate::response::BookingProposal;
use crate::session::UserProfile;

/// Action type under which pending bookings are persisted.
pub const BOOKING_ACTION_TYPE: &str = "booking_email";
/// How long a pending booking survives without confirmation.
pub const BOOKING_TTL_MINUTES: i64 = 15;

/// In-flight booking-email draft, persisted between turns.
///
/// `requested_datetime` carries an explicit offset so the stored form stays
/// unambiguous; display always converts to Europe/Stockholm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingPayload {
    pub therapist_email: Option<String>,
    pub requested_datetime: Option<DateTime<FixedOffset>>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub reply_to: Option<String>,
    pub sender_name: Option<String>,
    pub timezone: String,
    /// Derived snapshot of `missing_fields()`, stamped at persist time so
    /// the stored JSON is self-describing.
    pub missing_fields: Vec<String>,
}

impl Default for BookingPayload {
    fn default() -> Self {
        Self {
            therapist_email: None,
            requested_datetime: None,
            subject: None,
            body: None,
            reply_to: None,
            sender_name: None,
            timezone: TARGET_TZ_LABEL.to_string(),
            missing_fields: Vec::new(),
        }
    }
}

impl BookingPayload {
    /// Seed a payload from the first booking message.
    pub fn from_extraction(extraction: &BookingExtraction, user: Option<&UserProfile>) -> Self {
        Self {
            therapist_email: extraction.therapist_email.clone(),
            requested_datetime: extraction.requested_datetime.map(|dt| dt.fixed_offset()),
            reply_to: user.and_then(|u| u.email.clone()),
            sender_name: extraction
                .sender_name
                .clone()
                .or_else(|| user.and_then(|u| u.name.clone())),
            ..Default::default()
        }
    }

    /// Required user-supplied fields still absent.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.therapist_email.is_none() {
            missing.push("therapist_email".to_string());
        }
        if self.requested_datetime.is_none() {
            missing.push("requested_datetime".to_string());
        }
        missing
    }

    /// All four required fields present, ready for confirmation.
    pub fn is_complete(&self) -> bool {
        self.therapist_email.is_some()
            && self.requested_datetime.is_some()
            && self.subject.is_some()
            && self.body.is_some()
    }

    /// Refresh the derived fields before persisting.
    pub fn stamp(mut self) -> Self {
        self.timezone = TARGET_TZ_LABEL.to_string();
        self.missing_fields = self.missing_fields();
        self
    }

    /// Merge newly-extracted fields in, never overwriting a known one.
    /// Returns whether anything changed.
    pub fn merge_extraction(&mut self, update: &BookingExtraction) -> bool {
        let mut changed = false;
        if self.therapist_email.is_none() {
            if let Some(email) = &update.therapist_email {
                self.therapist_email = Some(email.clone());
                changed = true;
            }
        }
        if self.requested_datetime.is_none() {
            if let Some(dt) = update.requested_datetime {
                self.requested_datetime = Some(dt.fixed_offset());
                changed = true;
            }
        }
        if self.sender_name.is_none() {
            if let Some(name) = &update.sender_name {
                self.sender_name = Some(name.clone());
                changed = true;
            }
        }
        changed
    }

    /// Ask for whatever is still missing, preferring the extractor's own
    /// clarification text when it produced one.
    pub fn missing_fields_message(&self, clarification: Option<&str>) -> String {
        if let Some(text) = clarification {
            return text.to_string();
        }
        let email_missing = self.therapist_email.is_none();
        let datetime_missing = self.requested_datetime.is_none();
        if email_missing && datetime_missing {
            return format!(
                "Please share the therapist email and requested date/time in {TARGET_TZ_LABEL} \
                 (for example: therapist@example.com, 2026-02-14 15:00)."
            );
        }
        if email_missing {
            return "Please provide the therapist email address.".to_string();
        }
        format!("Please provide the requested appointment date/time in {TARGET_TZ_LABEL}.")
    }

    /// Display projection shown for confirmation. `None` until complete.
    pub fn proposal(&self, expires_at: DateTime<Utc>) -> Option<BookingProposal> {
        if !self.is_complete() {
            return None;
        }
        let requested = self.requested_datetime?;
        Some(BookingProposal {
            therapist_email: self.therapist_email.clone()?,
            requested_time: requested_time_display(&requested),
            subject: self.subject.clone()?,
            body: self.body.clone()?,
            expires_at: expires_at.with_timezone(&TARGET_TZ).to_rfc3339(),
        })
    }
}

/// Fill in subject, body, and sender details for a payload whose email and
/// datetime are both known.
pub fn build_booking_email_content(
    user: Option<&UserProfile>,
    therapist_email: &str,
    requested_datetime: DateTime<FixedOffset>,
    sender_name: Option<&str>,
    sender_email: Option<&str>,
) -> BookingPayload {
    let resolved_name = sender_name
        .map(str::to_string)
        .or_else(|| user.and_then(|u| u.name.clone()))
        .unwrap_or_else(|| "A client".to_string());
    let resolved_email = sender_email
        .map(str::to_string)
        .or_else(|| user.and_then(|u| u.email.clone()));

    let local = requested_datetime.with_timezone(&TARGET_TZ);
    let timestamp = local.format("%Y-%m-%d %H:%M");
    let subject = format!("Appointment request - {timestamp} ({TARGET_TZ_LABEL})");
    let signature = match &resolved_email {
        Some(email) => format!("{resolved_name}\n{email}"),
        None => resolved_name.clone(),
    };
    let body = format!(
        "Hello,\n\n\
         I would like to request an appointment on {timestamp} ({TARGET_TZ_LABEL}).\n\n\
         Best regards,\n{signature}"
    );

    BookingPayload {
        therapist_email: Some(therapist_email.to_string()),
        requested_datetime: Some(local.fixed_offset()),
        subject: Some(subject),
        body: Some(body),
        reply_to: resolved_email,
        sender_name: Some(resolved_name),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn sample_datetime() -> DateTime<FixedOffset> {
        TARGET_TZ
            .with_ymd_and_hms(2026, 2, 14, 15, 0, 0)
            .unwrap()
            .fixed_offset()
    }

    fn sample_user() -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            email: Some("me@example.com".to_string()),
            name: Some("Anna".to_string()),
            is_premium: true,
        }
    }

    #[test]
    fn missing_fields_derivation() {
        let payload = BookingPayload::default();
        assert_eq!(payload.missing_fields(), vec!["therapist_email", "requested_datetime"]);

        let payload = BookingPayload {
            therapist_email: Some("t@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(payload.missing_fields(), vec!["requested_datetime"]);
    }

    #[test]
    fn complete_requires_all_four_fields() {
        let mut payload = BookingPayload {
            therapist_email: Some("t@example.com".to_string()),
            requested_datetime: Some(sample_datetime()),
            ..Default::default()
        };
        assert!(!payload.is_complete());
        payload.subject = Some("s".to_string());
        payload.body = Some("b".to_string());
        assert!(payload.is_complete());
    }

    #[test]
    fn merge_never_overwrites() {
        let mut payload = BookingPayload {
            therapist_email: Some("first@example.com".to_string()),
            ..Default::default()
        };
        let update = BookingExtraction {
            therapist_email: Some("second@example.com".to_string()),
            requested_datetime: Some(sample_datetime().with_timezone(&TARGET_TZ)),
            ..Default::default()
        };
        assert!(payload.merge_extraction(&update));
        assert_eq!(payload.therapist_email.as_deref(), Some("first@example.com"));
        assert!(payload.requested_datetime.is_some());
    }

    #[test]
    fn merge_reports_no_change() {
        let mut payload = BookingPayload {
            therapist_email: Some("t@example.com".to_string()),
            requested_datetime: Some(sample_datetime()),
            ..Default::default()
        };
        let update = BookingExtraction::default();
        assert!(!payload.merge_extraction(&update));
    }

    #[test]
    fn email_content_template() {
        let user = sample_user();
        let payload = build_booking_email_content(
            Some(&user),
            "therapist@example.com",
            sample_datetime(),
            None,
            None,
        );
        assert_eq!(
            payload.subject.as_deref(),
            Some("Appointment request - 2026-02-14 15:00 (Europe/Stockholm)")
        );
        assert!(payload.is_complete());
        let body = payload.body.unwrap();
        assert!(body.contains("appointment on 2026-02-14 15:00 (Europe/Stockholm)"));
        assert!(body.contains("Anna\nme@example.com"));
        assert_eq!(payload.reply_to.as_deref(), Some("me@example.com"));
    }

    #[test]
    fn email_content_without_user_falls_back() {
        let payload =
            build_booking_email_content(None, "therapist@example.com", sample_datetime(), None, None);
        assert!(payload.body.unwrap().contains("Best regards,\nA client"));
        assert!(payload.reply_to.is_none());
    }

    #[test]
    fn proposal_only_when_complete() {
        let expires = Utc::now();
        let incomplete = BookingPayload {
            therapist_email: Some("t@example.com".to_string()),
            ..Default::default()
        };
        assert!(incomplete.proposal(expires).is_none());

        let user = sample_user();
        let complete =
            build_booking_email_content(Some(&user), "t@example.com", sample_datetime(), None, None);
        let proposal = complete.proposal(expires).unwrap();
        assert_eq!(proposal.therapist_email, "t@example.com");
        assert_eq!(proposal.requested_time, "2026-02-14 15:00 Europe/Stockholm");
    }

    #[test]
    fn stamp_records_missing_fields_in_json() {
        let payload = BookingPayload {
            therapist_email: Some("t@example.com".to_string()),
            ..Default::default()
        }
        .stamp();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["timezone"], "Europe/Stockholm");
        assert_eq!(json["missing_fields"][0], "requested_datetime");
    }

    #[test]
    fn missing_message_prefers_clarification() {
        let payload = BookingPayload::default();
        assert_eq!(
            payload.missing_fields_message(Some("Please include a time with the date.")),
            "Please include a time with the date."
        );
        assert!(payload.missing_fields_message(None).contains("therapist email and requested"));
    }
}
