//! Response types returned to the chat surface.
//!
//! The transport layer (whatever serves `/chat`) serializes these as-is;
//! optional sections are omitted from the JSON when absent.

use serde::{Deserialize, Serialize};

/// A guided coping exercise attached to a coaching reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(rename = "type")]
    pub kind: String,
    pub steps: Vec<String>,
    pub duration_seconds: u32,
}

/// A linked support resource (hotline, directory, care portal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Resource {
    pub fn new(title: &str, url: &str) -> Self {
        Self {
            title: title.to_string(),
            url: url.to_string(),
            description: None,
        }
    }
}

/// Upsell hint shown when a gated feature was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiumCta {
    pub enabled: bool,
    pub message: String,
}

/// A single provider returned by therapist search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapistResult {
    pub name: String,
    pub address: String,
    pub url: String,
    pub phone: String,
    pub distance_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Display projection of a complete pending booking, shown for confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingProposal {
    pub therapist_email: String,
    pub requested_time: String,
    pub subject: String,
    pub body: String,
    pub expires_at: String,
}

/// The unified chat reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub coach_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<Exercise>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<Resource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_cta: Option<PremiumCta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub therapists: Option<Vec<TherapistResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_proposal: Option<BookingProposal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_confirmation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
}

impl ChatResponse {
    /// A plain coach message with no attachments.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            coach_message: text.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omits_absent_sections() {
        let response = ChatResponse::message("hello");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["coach_message"], "hello");
        assert!(json.get("exercise").is_none());
        assert!(json.get("therapists").is_none());
        assert!(json.get("risk_level").is_none());
    }

    #[test]
    fn serializes_exercise_type_field() {
        let response = ChatResponse {
            exercise: Some(Exercise {
                kind: "box breathing".into(),
                steps: vec!["Inhale for 4".into()],
                duration_seconds: 60,
            }),
            ..ChatResponse::message("try this")
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["exercise"]["type"], "box breathing");
        assert_eq!(json["exercise"]["duration_seconds"], 60);
    }
}
