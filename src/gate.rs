//! Crisis safety gate — the crisis classifier composed with the therapist
//! agent.
//!
//! The crisis body (hotlines, emergency numbers) is always returned and is
//! never gated by entitlement or search success; entitlement only gates the
//! optional nearby-provider enrichment, and any search failure collapses to
//! "no results" so the crisis response is never blocked on it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::response::{ChatResponse, Resource, TherapistResult};
use crate::safety::is_crisis;
use crate::session::ActorIdentity;
use crate::therapist::TherapistSearchAgent;

pub struct SafetyGate {
    therapist_agent: Arc<TherapistSearchAgent>,
}

impl SafetyGate {
    pub fn new(therapist_agent: Arc<TherapistSearchAgent>) -> Self {
        Self { therapist_agent }
    }

    /// Crisis response for this message, or `None` when it is not a crisis.
    pub async fn handle(&self, identity: &ActorIdentity, message: &str) -> Option<ChatResponse> {
        if !is_crisis(message) {
            return None;
        }
        info!("Crisis message detected, building crisis response");

        let session_key = identity.session_key();
        let parsed = self.therapist_agent.parse_message(message);
        let location = parsed
            .location_text
            .clone()
            .or_else(|| self.therapist_agent.get_remembered_location(&session_key));

        let mut therapists: Option<Vec<TherapistResult>> = None;
        if let Some(location) = &location {
            if self.therapist_agent.search_available(identity) {
                match self
                    .therapist_agent
                    .search_with_retries(location, Some(parsed.radius_km), parsed.specialty.as_deref(), None)
                    .await
                {
                    Ok((results, _)) if !results.is_empty() => {
                        self.therapist_agent.remember_location(&session_key, location);
                        therapists = Some(results);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Enrichment only; the crisis reply goes out regardless.
                        warn!(location, "Crisis provider lookup failed: {e}");
                    }
                }
            }
        }

        let search_hint = if therapists.is_some() {
            "I have also included nearby providers below in case contacting one feels possible."
        } else if location.is_some() {
            "If you want, I can keep helping you find nearby providers in the app."
        } else {
            "If you share your city or postcode, I can help find nearby therapists/clinics in the app."
        };

        Some(ChatResponse {
            coach_message: format!(
                "I am really sorry you are feeling this way. You deserve immediate support right now. \
                 If you are in immediate danger or think you might act on these thoughts, call emergency \
                 services now (in Sweden: 112). You can also contact Mind Självmordslinjen (90101) for \
                 urgent support, and 1177 Vårdguiden for healthcare guidance. If you are outside Sweden, \
                 please call your local emergency number or local crisis hotline now. {search_hint}"
            ),
            resources: Some(vec![
                Resource::new("Emergency services (Sweden) - 112", "https://www.112.se/"),
                Resource::new(
                    "Mind Självmordslinjen (90101)",
                    "https://mind.se/hitta-hjalp/sjalvmordslinjen/",
                ),
                Resource::new("1177 Vårdguiden", "https://www.1177.se/"),
                Resource::new(
                    "Find an international crisis line",
                    "https://www.opencounseling.com/suicide-hotlines",
                ),
            ]),
            therapists,
            risk_level: Some("crisis".to_string()),
            ..Default::default()
        })
    }
}
