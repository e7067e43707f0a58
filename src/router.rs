//! Intent router — a pure decision function over the message plus
//! pending-state flags.
//!
//! Pending state always wins over keyword matching so a multi-turn
//! conversation stays coherent; short bare-location replies are
//! special-cased because they carry no keyword signal at all.

use tracing::debug;

use crate::booking::extract::{extract_email, is_booking_intent};
use crate::safety::{Intent, classify_intent};
use crate::therapist::looks_like_location_reply;

const THERAPIST_SEARCH_KEYWORDS: &[&str] = &[
    "find therapist",
    "find a therapist",
    "therapist near",
    "therapists near",
    "clinic near",
    "provider near",
    "psychiatry",
    "psychiatrist",
    "psychiatry clinic",
    "bup",
    "mottagning",
    "mental health clinic",
    "find clinic",
];

const EMAIL_INTENT_KEYWORDS: &[&str] = &[
    "send email",
    "email",
    "appointment",
    "schedule",
    "book",
    "contact therapist",
    "draft email",
];

/// Where a message is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRoute {
    TherapistSearch,
    BookingEmail,
    Coach,
}

/// Routing input: the message plus the pending-state flags the agents own.
#[derive(Debug, Clone)]
pub struct RouterInput<'a> {
    pub message: &'a str,
    pub has_pending_booking: bool,
    pub has_pending_therapist_location: bool,
}

/// Last-resort classifier hook; may override to any route.
pub type FallbackClassifier = Box<dyn Fn(&str) -> Option<ChatRoute> + Send + Sync>;

fn is_confirmation_only_message(message: &str) -> bool {
    let tokens: Vec<String> = message
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphabetic() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return false;
    }
    tokens.iter().all(|t| {
        matches!(
            t.as_str(),
            "yes" | "confirm" | "confirmed" | "ok" | "okay" | "y" | "no" | "cancel" | "n"
        )
    })
}

fn has_strong_email_intent(message: &str) -> bool {
    if extract_email(message).is_some() {
        return true;
    }
    let lower = message.to_lowercase();
    EMAIL_INTENT_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn is_therapist_search_intent(message: &str) -> bool {
    let lower = message.to_lowercase();
    if THERAPIST_SEARCH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return true;
    }
    classify_intent(message) == Intent::TherapistSearch
}

/// Ordered first-match-wins router.
#[derive(Default)]
pub struct ChatRouter {
    llm_fallback: Option<FallbackClassifier>,
}

impl ChatRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: FallbackClassifier) -> Self {
        Self {
            llm_fallback: Some(fallback),
        }
    }

    pub fn route(&self, input: &RouterInput<'_>) -> ChatRoute {
        let message = input.message.trim();

        // A booking conversation, once started, owns every turn until it
        // resolves or expires.
        if input.has_pending_booking {
            return ChatRoute::BookingEmail;
        }

        if input.has_pending_therapist_location && looks_like_location_reply(message) {
            return ChatRoute::TherapistSearch;
        }

        if has_strong_email_intent(message) {
            return ChatRoute::BookingEmail;
        }

        if is_therapist_search_intent(message) {
            return ChatRoute::TherapistSearch;
        }

        if is_booking_intent(message) {
            return ChatRoute::BookingEmail;
        }

        // A stray confirmation still reaches the booking agent, which
        // answers "nothing to confirm".
        if is_confirmation_only_message(message) {
            return ChatRoute::BookingEmail;
        }

        if let Some(fallback) = &self.llm_fallback {
            if let Some(route) = fallback(message) {
                debug!(?route, "Router fallback classifier override");
                return route;
            }
        }

        ChatRoute::Coach
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(message: &str, pending_booking: bool, pending_location: bool) -> ChatRoute {
        ChatRouter::new().route(&RouterInput {
            message,
            has_pending_booking: pending_booking,
            has_pending_therapist_location: pending_location,
        })
    }

    #[test]
    fn pending_booking_wins_regardless_of_content() {
        // Idempotent: same inputs, same route, any message content.
        for message in ["find a therapist near Lund", "what is the weather", "YES", ""] {
            assert_eq!(route(message, true, false), ChatRoute::BookingEmail);
            assert_eq!(route(message, true, false), ChatRoute::BookingEmail);
        }
    }

    #[test]
    fn pending_location_with_short_reply_routes_to_search() {
        assert_eq!(route("Uppsala", false, true), ChatRoute::TherapistSearch);
        assert_eq!(route("111 29 Stockholm", false, true), ChatRoute::TherapistSearch);
    }

    #[test]
    fn pending_location_with_long_message_does_not_shortcut() {
        assert_eq!(
            route("actually I changed my mind about all of this", false, true),
            ChatRoute::Coach
        );
    }

    #[test]
    fn email_address_is_strong_email_intent() {
        assert_eq!(
            route("reach out to therapist@example.com", false, false),
            ChatRoute::BookingEmail
        );
    }

    #[test]
    fn booking_vocabulary_is_strong_email_intent() {
        assert_eq!(route("I want to schedule something", false, false), ChatRoute::BookingEmail);
        assert_eq!(
            route("help me draft email to my therapist", false, false),
            ChatRoute::BookingEmail
        );
    }

    #[test]
    fn therapist_keywords_route_to_search() {
        assert_eq!(
            route("can you find a therapist in my city", false, false),
            ChatRoute::TherapistSearch
        );
        assert_eq!(route("is there a psychiatrist nearby", false, false), ChatRoute::TherapistSearch);
    }

    #[test]
    fn fallback_classifier_catches_provider_search_phrasing() {
        assert_eq!(
            route("I'm looking for counselors close to Malmö", false, false),
            ChatRoute::TherapistSearch
        );
    }

    #[test]
    fn bare_confirmation_routes_to_booking_even_without_pending() {
        // Kept on purpose: the agent answers "nothing to confirm".
        assert_eq!(route("YES", false, false), ChatRoute::BookingEmail);
        assert_eq!(route("ok", false, false), ChatRoute::BookingEmail);
        assert_eq!(route("cancel", false, false), ChatRoute::BookingEmail);
    }

    #[test]
    fn llm_fallback_can_override_default() {
        let router = ChatRouter::with_fallback(Box::new(|_| Some(ChatRoute::TherapistSearch)));
        let result = router.route(&RouterInput {
            message: "something ambiguous about finding help",
            has_pending_booking: false,
            has_pending_therapist_location: false,
        });
        assert_eq!(result, ChatRoute::TherapistSearch);
    }

    #[test]
    fn default_route_is_coach() {
        assert_eq!(route("I feel anxious today", false, false), ChatRoute::Coach);
        assert_eq!(route("I'm stressed about work", false, false), ChatRoute::Coach);
    }
}
