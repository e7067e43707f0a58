//! Therapist search — message parsing, ordered fallback retries, and
//! session location memory.
//!
//! The retry ladder prefers precision: exact request first, then drop the
//! specialty, then widen the radius, always reporting which relaxation
//! produced the results.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SearchError;
use crate::response::{ChatResponse, PremiumCta, TherapistResult};
use crate::search::SearchBackend;
use crate::session::{ActorIdentity, SessionMap, SessionStore};

pub const DEFAULT_RADIUS_KM: u32 = 25;
pub const MAX_RADIUS_KM: u32 = 50;
pub const DEFAULT_LIMIT: u32 = 10;

static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:near|in|around|at)\s+(.+)").expect("location pattern"));

static LOCATION_BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwithin\s+\d+\s*(?:km|kilometers?|kilometres?)?\b|\bfor\b|[,.!?]")
        .expect("location boundary pattern")
});

static RADIUS_WITHIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwithin\s+(\d{1,3})(?:\s*(?:km|kilometers?|kilometres?))?\b")
        .expect("radius within pattern")
});

static RADIUS_BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(?:km|kilometers?|kilometres?)\b").expect("radius pattern")
});

static SPECIALTY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfor\s+(.+)").expect("specialty pattern"));

static SPECIALTY_BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwithin\s+\d+\s*(?:km|kilometers?|kilometres?)?\b|\b(?:near|in|around|at)\b|[,.!?]")
        .expect("specialty boundary pattern")
});

static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*(?:therapists?|clinics?|providers?)\b").expect("limit pattern")
});

static CITY_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-\s]{2,40}$").expect("city token pattern"));

static ANY_DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").expect("digit pattern"));

fn is_self_reference(text: &str) -> bool {
    matches!(text.to_lowercase().as_str(), "me" | "here" | "my area")
}

fn before_boundary<'a>(boundary: &Regex, text: &'a str) -> &'a str {
    boundary.splitn(text, 2).next().unwrap_or(text)
}

/// "near/in/around/at X", stopping at a radius clause, "for", or punctuation.
pub fn extract_location(message: &str) -> Option<String> {
    let captures = LOCATION_RE.captures(message)?;
    let tail = before_boundary(&LOCATION_BOUNDARY_RE, captures.get(1)?.as_str());
    let location = tail.trim_matches([' ', '.', '?']);
    if location.is_empty() || is_self_reference(location) {
        return None;
    }
    Some(location.to_string())
}

/// The whole message treated as a location, for short follow-up replies.
pub fn extract_location_from_short_reply(message: &str) -> Option<String> {
    let tail = before_boundary(&LOCATION_BOUNDARY_RE, message);
    let location = tail.trim_matches([' ', '.', '?']);
    if location.is_empty() || is_self_reference(location) {
        return None;
    }
    Some(location.to_string())
}

/// "within N km" or "N km", clamped to [1, 50].
pub fn extract_radius_km(message: &str) -> Option<u32> {
    let captures = RADIUS_WITHIN_RE
        .captures(message)
        .or_else(|| RADIUS_BARE_RE.captures(message))?;
    let radius: u32 = captures[1].parse().ok()?;
    Some(radius.clamp(1, MAX_RADIUS_KM))
}

/// "for X", stopping at a radius clause, a location preposition, or
/// punctuation.
pub fn extract_specialty(message: &str) -> Option<String> {
    let captures = SPECIALTY_RE.captures(message)?;
    let candidate = before_boundary(&SPECIALTY_BOUNDARY_RE, captures.get(1)?.as_str())
        .trim_matches([' ', '.', '?']);
    if candidate.is_empty() || is_self_reference(candidate) {
        return None;
    }
    Some(candidate.to_string())
}

/// "N therapists/clinics/providers", clamped to [1, 10], default 10.
pub fn extract_limit(message: &str) -> u32 {
    LIMIT_RE
        .captures(message)
        .and_then(|c| c[1].parse::<u32>().ok())
        .map(|n| n.clamp(1, DEFAULT_LIMIT))
        .unwrap_or(DEFAULT_LIMIT)
}

/// Trimmed, empty collapsed to `None`.
pub fn normalize_specialty(specialty: Option<&str>) -> Option<String> {
    let normalized = specialty?.trim();
    if normalized.is_empty() {
        return None;
    }
    Some(normalized.to_string())
}

/// Short (<= 4 token) message shaped like a bare city/postcode reply.
pub fn looks_like_location_reply(message: &str) -> bool {
    let cleaned = message.trim();
    if cleaned.is_empty() || cleaned.split_whitespace().count() > 4 {
        return false;
    }
    CITY_TOKEN_RE.is_match(cleaned)
}

/// Per-call search parameters parsed from one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapistSearchParams {
    pub location_text: Option<String>,
    pub radius_km: u32,
    pub specialty: Option<String>,
    pub limit: u32,
}

/// Which constraint was relaxed to produce non-empty results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Specialty,
    Radius,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::Specialty => "specialty",
            FallbackReason::Radius => "radius",
        }
    }
}

/// Therapist search agent with session memory and entitlement gating.
pub struct TherapistSearchAgent {
    backend: Arc<dyn SearchBackend>,
    sessions: Arc<dyn SessionStore>,
    dev_mode: bool,
}

impl TherapistSearchAgent {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        sessions: Arc<dyn SessionStore>,
        dev_mode: bool,
    ) -> Self {
        Self {
            backend,
            sessions,
            dev_mode,
        }
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Whether this caller may run searches at all.
    pub fn search_available(&self, identity: &ActorIdentity) -> bool {
        self.dev_mode || identity.user.as_ref().is_some_and(|u| u.is_premium)
    }

    pub fn parse_message(&self, message: &str) -> TherapistSearchParams {
        TherapistSearchParams {
            location_text: extract_location(message),
            radius_km: extract_radius_km(message).unwrap_or(DEFAULT_RADIUS_KM),
            specialty: normalize_specialty(extract_specialty(message).as_deref()),
            limit: extract_limit(message),
        }
    }

    pub fn remember_location(&self, session_key: &str, location: &str) {
        let normalized = location.trim();
        if normalized.is_empty() {
            return;
        }
        self.sessions
            .set(SessionMap::RememberedLocation, session_key, normalized.to_string());
    }

    pub fn get_remembered_location(&self, session_key: &str) -> Option<String> {
        self.sessions.get(SessionMap::RememberedLocation, session_key)
    }

    pub fn clear_remembered_location(&self, session_key: &str) {
        self.sessions.remove(SessionMap::RememberedLocation, session_key);
    }

    pub fn has_pending_location_request(&self, session_key: &str) -> bool {
        self.sessions
            .get(SessionMap::PendingTherapistQuery, session_key)
            .is_some()
    }

    fn get_pending_query(&self, session_key: &str) -> Option<TherapistSearchParams> {
        let raw = self.sessions.get(SessionMap::PendingTherapistQuery, session_key)?;
        match serde_json::from_str(&raw) {
            Ok(params) => Some(params),
            Err(e) => {
                warn!(session_key, "Unparseable pending query dropped: {e}");
                self.sessions.remove(SessionMap::PendingTherapistQuery, session_key);
                None
            }
        }
    }

    fn set_pending_query(&self, session_key: &str, query: &TherapistSearchParams) {
        if let Ok(raw) = serde_json::to_string(query) {
            self.sessions.set(SessionMap::PendingTherapistQuery, session_key, raw);
        }
    }

    fn clear_pending_query(&self, session_key: &str) {
        self.sessions.remove(SessionMap::PendingTherapistQuery, session_key);
    }

    /// Ordered fallback search: exact request, then specialty dropped, then
    /// radius widened to the default (only when narrower). Identical
    /// (radius, specialty) attempts are deduplicated; the first non-empty
    /// result set wins.
    pub async fn search_with_retries(
        &self,
        location: &str,
        radius_km: Option<u32>,
        specialty: Option<&str>,
        limit: Option<u32>,
    ) -> Result<(Vec<TherapistResult>, Option<FallbackReason>), SearchError> {
        let requested_radius = radius_km.unwrap_or(DEFAULT_RADIUS_KM).clamp(1, MAX_RADIUS_KM);
        let normalized_specialty = normalize_specialty(specialty);
        let requested_limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, DEFAULT_LIMIT);

        let mut attempts: Vec<(u32, Option<String>, Option<FallbackReason>)> =
            vec![(requested_radius, normalized_specialty.clone(), None)];
        if normalized_specialty.is_some() {
            attempts.push((requested_radius, None, Some(FallbackReason::Specialty)));
        }
        if requested_radius < DEFAULT_RADIUS_KM {
            attempts.push((DEFAULT_RADIUS_KM, None, Some(FallbackReason::Radius)));
        }

        let mut seen: Vec<(u32, Option<String>)> = Vec::new();
        for (attempt_radius, attempt_specialty, reason) in attempts {
            let dedupe_key = (attempt_radius, attempt_specialty.clone());
            if seen.contains(&dedupe_key) {
                continue;
            }
            seen.push(dedupe_key);

            let results = self
                .backend
                .search(location, attempt_radius, attempt_specialty.as_deref(), requested_limit)
                .await?;
            if !results.is_empty() {
                debug!(
                    location,
                    radius = attempt_radius,
                    reason = reason.map(|r| r.as_str()),
                    "Search attempt returned results"
                );
                return Ok((results, reason));
            }
        }
        Ok((Vec::new(), None))
    }

    /// Full agent turn: entitlement gate, pending-query continuation,
    /// search, and session-memory updates.
    pub async fn handle(&self, identity: &ActorIdentity, message: &str) -> ChatResponse {
        if identity.user.is_none() && !self.dev_mode {
            return ChatResponse {
                premium_cta: Some(PremiumCta {
                    enabled: true,
                    message: "Sign in and upgrade to premium to unlock therapist search."
                        .to_string(),
                }),
                ..ChatResponse::message("Please sign in to use therapist search.")
            };
        }
        if let Some(user) = &identity.user {
            if !user.is_premium && !self.dev_mode {
                return ChatResponse {
                    premium_cta: Some(PremiumCta {
                        enabled: true,
                        message: "Unlock therapist search to see local providers.".to_string(),
                    }),
                    ..ChatResponse::message("Therapist search is available with premium access.")
                };
            }
        }

        let session_key = identity.session_key();
        let mut parsed = self.parse_message(message);
        let pending_query = self.get_pending_query(&session_key);

        if parsed.location_text.is_none() {
            if let Some(pending) = pending_query {
                if looks_like_location_reply(message) {
                    parsed = TherapistSearchParams {
                        location_text: extract_location_from_short_reply(message),
                        radius_km: extract_radius_km(message).unwrap_or(pending.radius_km),
                        specialty: normalize_specialty(extract_specialty(message).as_deref())
                            .or(pending.specialty),
                        limit: if ANY_DIGIT_RE.is_match(message) {
                            extract_limit(message)
                        } else {
                            pending.limit
                        },
                    };
                }
            }
        }

        let Some(location) = parsed.location_text.clone() else {
            // A fresh search request must not inherit stale context.
            self.clear_remembered_location(&session_key);
            self.clear_pending_query(&session_key);
            self.set_pending_query(&session_key, &parsed);
            return ChatResponse {
                therapists: Some(Vec::new()),
                ..ChatResponse::message(
                    "Please share a city or postcode so I can search nearby providers.",
                )
            };
        };
        self.clear_pending_query(&session_key);

        let (results, fallback_reason) = match self
            .search_with_retries(&location, Some(parsed.radius_km), parsed.specialty.as_deref(), Some(parsed.limit))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                // Search failure never blocks the conversation.
                warn!(location, "Therapist search failed, degrading to empty: {e}");
                (Vec::new(), None)
            }
        };

        if results.is_empty() {
            return ChatResponse {
                therapists: Some(Vec::new()),
                ..ChatResponse::message(format!(
                    "No providers found near {location} within {} km. \
                     Try a larger radius or nearby area.",
                    parsed.radius_km
                ))
            };
        }

        self.remember_location(&session_key, &location);
        info!(
            location,
            count = results.len(),
            fallback = fallback_reason.map(|r| r.as_str()),
            "Therapist search returned providers"
        );

        let coach_message = match fallback_reason {
            Some(FallbackReason::Specialty) => {
                "No exact specialty match; showing nearby providers.".to_string()
            }
            Some(FallbackReason::Radius) => {
                "No providers found in the requested radius; showing nearby providers.".to_string()
            }
            None => format!("Here are therapist options near {location}."),
        };
        ChatResponse {
            therapists: Some(results),
            ..ChatResponse::message(coach_message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::session::InMemorySessionStore;

    #[test]
    fn location_stops_at_radius_clause() {
        assert_eq!(
            extract_location("find therapists near Uppsala within 10 km").as_deref(),
            Some("Uppsala")
        );
        assert_eq!(
            extract_location("clinics in Malmö, please").as_deref(),
            Some("Malmö")
        );
        assert_eq!(extract_location("therapists near me"), None);
        assert_eq!(extract_location("I need help"), None);
    }

    #[test]
    fn location_stops_at_for_clause() {
        assert_eq!(
            extract_location("therapists in Lund for anxiety").as_deref(),
            Some("Lund")
        );
    }

    #[test]
    fn short_reply_extraction() {
        assert_eq!(extract_location_from_short_reply("Göteborg").as_deref(), Some("Göteborg"));
        assert_eq!(extract_location_from_short_reply("here"), None);
    }

    #[test]
    fn radius_parses_and_clamps() {
        assert_eq!(extract_radius_km("within 10 km"), Some(10));
        assert_eq!(extract_radius_km("30km away"), Some(30));
        assert_eq!(extract_radius_km("within 999"), Some(50));
        assert_eq!(extract_radius_km("no distance here"), None);
    }

    #[test]
    fn specialty_stops_at_location() {
        assert_eq!(
            extract_specialty("therapist for anxiety near Stockholm").as_deref(),
            Some("anxiety")
        );
        assert_eq!(extract_specialty("therapist near Stockholm"), None);
    }

    #[test]
    fn limit_parses_and_clamps() {
        assert_eq!(extract_limit("show me 3 therapists"), 3);
        assert_eq!(extract_limit("99 clinics"), 10);
        assert_eq!(extract_limit("therapists please"), 10);
    }

    #[test]
    fn location_reply_shape() {
        assert!(looks_like_location_reply("Stockholm"));
        assert!(looks_like_location_reply("111 29 Stockholm"));
        assert!(!looks_like_location_reply("I live in Stockholm and need a therapist soon"));
        assert!(!looks_like_location_reply(""));
    }

    // ── search_with_retries ─────────────────────────────────────────

    struct ScriptedBackend {
        /// (radius, specialty) pairs that return a result.
        hits: Vec<(u32, Option<String>)>,
        calls: Mutex<Vec<(u32, Option<String>)>>,
    }

    impl ScriptedBackend {
        fn new(hits: Vec<(u32, Option<&str>)>) -> Self {
            Self {
                hits: hits
                    .into_iter()
                    .map(|(r, s)| (r, s.map(str::to_string)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(
            &self,
            _location: &str,
            radius_km: u32,
            specialty: Option<&str>,
            _limit: u32,
        ) -> Result<Vec<TherapistResult>, SearchError> {
            let key = (radius_km, specialty.map(str::to_string));
            self.calls.lock().unwrap().push(key.clone());
            if self.hits.contains(&key) {
                Ok(vec![TherapistResult {
                    name: "Dr. Example".to_string(),
                    address: "Street 1".to_string(),
                    url: "https://example.com".to_string(),
                    phone: "123".to_string(),
                    distance_km: 1.0,
                    email: None,
                    source_url: None,
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn agent_with(backend: ScriptedBackend) -> TherapistSearchAgent {
        TherapistSearchAgent::new(
            Arc::new(backend),
            Arc::new(InMemorySessionStore::new()),
            true,
        )
    }

    #[tokio::test]
    async fn specialty_dropped_before_radius_widened() {
        let agent = agent_with(ScriptedBackend::new(vec![(10, None)]));
        let (results, reason) = agent
            .search_with_retries("Uppsala", Some(10), Some("anxiety"), None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(reason, Some(FallbackReason::Specialty));
    }

    #[tokio::test]
    async fn radius_widened_as_last_resort() {
        let agent = agent_with(ScriptedBackend::new(vec![(25, None)]));
        let (results, reason) = agent
            .search_with_retries("Uppsala", Some(10), Some("anxiety"), None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(reason, Some(FallbackReason::Radius));
    }

    #[tokio::test]
    async fn exact_hit_reports_no_fallback() {
        let agent = agent_with(ScriptedBackend::new(vec![(10, Some("anxiety"))]));
        let (_, reason) = agent
            .search_with_retries("Uppsala", Some(10), Some("anxiety"), None)
            .await
            .unwrap();
        assert_eq!(reason, None);
    }

    #[tokio::test]
    async fn duplicate_attempts_are_skipped() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let agent = TherapistSearchAgent::new(
            backend.clone(),
            Arc::new(InMemorySessionStore::new()),
            true,
        );
        // Radius already at default and no specialty: a single attempt only.
        let (results, reason) = agent
            .search_with_retries("Uppsala", Some(25), None, None)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(reason, None);
        assert_eq!(backend.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn widen_attempt_not_duplicated_when_radius_default() {
        let backend = ScriptedBackend::new(vec![]);
        let calls_view = Arc::new(backend);
        let agent = TherapistSearchAgent::new(
            calls_view.clone(),
            Arc::new(InMemorySessionStore::new()),
            true,
        );
        agent
            .search_with_retries("Uppsala", Some(25), Some("anxiety"), None)
            .await
            .unwrap();
        let calls = calls_view.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                (25, Some("anxiety".to_string())),
                (25, None),
            ]
        );
    }

    // ── handle ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_location_sets_pending_query() {
        let agent = agent_with(ScriptedBackend::new(vec![]));
        let identity = ActorIdentity::anonymous("host", "agent");
        let response = agent.handle(&identity, "find a therapist for anxiety").await;
        assert!(response.coach_message.contains("city or postcode"));
        assert!(agent.has_pending_location_request(&identity.session_key()));
    }

    #[tokio::test]
    async fn short_location_reply_completes_pending_query() {
        let agent = agent_with(ScriptedBackend::new(vec![(25, None)]));
        let identity = ActorIdentity::anonymous("host", "agent");
        agent.handle(&identity, "find a therapist").await;

        let response = agent.handle(&identity, "Uppsala").await;
        assert_eq!(response.therapists.as_ref().map(Vec::len), Some(1));
        assert!(!agent.has_pending_location_request(&identity.session_key()));
        assert_eq!(
            agent.get_remembered_location(&identity.session_key()).as_deref(),
            Some("Uppsala")
        );
    }

    #[tokio::test]
    async fn anonymous_without_dev_mode_is_gated() {
        let agent = TherapistSearchAgent::new(
            Arc::new(ScriptedBackend::new(vec![])),
            Arc::new(InMemorySessionStore::new()),
            false,
        );
        let identity = ActorIdentity::anonymous("host", "agent");
        let response = agent.handle(&identity, "therapists near Uppsala").await;
        assert!(response.coach_message.contains("sign in"));
        assert!(response.premium_cta.is_some());
        assert!(response.therapists.is_none());
    }

    #[tokio::test]
    async fn empty_results_do_not_remember_location() {
        let agent = agent_with(ScriptedBackend::new(vec![]));
        let identity = ActorIdentity::anonymous("host", "agent");
        let response = agent.handle(&identity, "therapists near Kiruna").await;
        assert!(response.coach_message.contains("No providers found near Kiruna"));
        assert!(agent.get_remembered_location(&identity.session_key()).is_none());
    }
}
