//! Chat engine — the ordering contract around the agents.
//!
//! Per message: rate limit, then the crisis gate before anything else, then
//! jailbreak / scope / prescription refusals, then the router over pending
//! state, then dispatch. The crisis check runs before pending state is even
//! read, so a crisis message can never create or touch a booking draft.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::booking::{BOOKING_ACTION_TYPE, BookingEmailAgent};
use crate::coach::CoachResponder;
use crate::error::Result;
use crate::gate::SafetyGate;
use crate::llm::ChatTurn;
use crate::ratelimit::RateLimiter;
use crate::response::ChatResponse;
use crate::router::{ChatRoute, ChatRouter, RouterInput};
use crate::safety::{
    contains_jailbreak_attempt, is_prescription_request, jailbreak_refusal, out_of_scope_refusal,
    prescription_refusal, scope_check,
};
use crate::session::{ActorIdentity, SessionMap, SessionStore};
use crate::store::PendingStore;
use crate::therapist::TherapistSearchAgent;

/// Everything the engine dispatches to.
pub struct ChatEngineDeps {
    pub router: ChatRouter,
    pub gate: SafetyGate,
    pub booking: BookingEmailAgent,
    pub therapist: Arc<TherapistSearchAgent>,
    pub coach: CoachResponder,
    pub store: Arc<dyn PendingStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub limiter: RateLimiter,
    /// User+assistant turn pairs kept per session.
    pub history_max_turns: usize,
}

pub struct ChatEngine {
    deps: ChatEngineDeps,
}

impl ChatEngine {
    pub fn new(deps: ChatEngineDeps) -> Self {
        Self { deps }
    }

    fn load_history(&self, session_key: &str) -> Vec<ChatTurn> {
        self.deps
            .sessions
            .get(SessionMap::ConversationHistory, session_key)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn append_history(&self, session_key: &str, message: &str, reply: &str) {
        let mut turns = self.load_history(session_key);
        turns.push(ChatTurn::user(message));
        turns.push(ChatTurn::assistant(reply));
        let cap = self.deps.history_max_turns * 2;
        if turns.len() > cap {
            turns.drain(..turns.len() - cap);
        }
        if let Ok(raw) = serde_json::to_string(&turns) {
            self.deps
                .sessions
                .set(SessionMap::ConversationHistory, session_key, raw);
        }
    }

    fn finish(&self, session_key: &str, message: &str, response: ChatResponse) -> ChatResponse {
        self.append_history(session_key, message, &response.coach_message);
        response
    }

    async fn coach_turn(&self, session_key: &str, message: &str) -> ChatResponse {
        let history = self.load_history(session_key);
        self.deps.coach.respond(message, &history).await
    }

    /// One full chat turn for this identity.
    pub async fn handle_message(
        &self,
        identity: &mut ActorIdentity,
        message: &str,
    ) -> Result<ChatResponse> {
        let session_key = identity.session_key();
        self.deps.limiter.check(&session_key)?;

        // Crisis overrides everything, including jailbreak and scope, and
        // runs before pending booking state is read.
        if let Some(crisis) = self.deps.gate.handle(identity, message).await {
            info!(session_key, "Crisis response returned");
            return Ok(self.finish(&session_key, message, crisis));
        }

        if contains_jailbreak_attempt(message) {
            warn!(session_key, "Jailbreak attempt refused");
            return Ok(self.finish(&session_key, message, jailbreak_refusal()));
        }

        if !scope_check(message) {
            debug!(session_key, "Out-of-scope message refused");
            return Ok(self.finish(&session_key, message, out_of_scope_refusal()));
        }

        if is_prescription_request(message) {
            info!(session_key, "Prescription request refused");
            return Ok(self.finish(&session_key, message, prescription_refusal()));
        }

        let now = Utc::now();
        let (pending, pending_expired) = match identity.booking_actor_key() {
            Some(actor_key) => {
                self.deps
                    .store
                    .load_latest(&actor_key, BOOKING_ACTION_TYPE, now)
                    .await?
            }
            None => (None, false),
        };

        let route = self.deps.router.route(&RouterInput {
            message,
            has_pending_booking: pending.is_some(),
            has_pending_therapist_location: self
                .deps
                .therapist
                .has_pending_location_request(&session_key),
        });
        debug!(session_key, ?route, "Message routed");

        let response = match route {
            ChatRoute::TherapistSearch => self.deps.therapist.handle(identity, message).await,
            ChatRoute::BookingEmail => {
                let actor_key = identity.ensure_booking_actor_key();
                let handled = self
                    .deps
                    .booking
                    .handle(
                        identity.user.as_ref(),
                        &actor_key,
                        message,
                        pending,
                        pending_expired,
                        now,
                    )
                    .await?;
                match handled {
                    Some(response) => response,
                    // Not booking business after all.
                    None => self.coach_turn(&session_key, message).await,
                }
            }
            ChatRoute::Coach => self.coach_turn(&session_key, message).await,
        };

        Ok(self.finish(&session_key, message, response))
    }
}
