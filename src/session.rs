//! Session-scoped key-value state and actor identity.
//!
//! Remembered locations, pending therapist queries, and conversation history
//! are all session-keyed maps behind an injected [`SessionStore`] so tests
//! substitute an in-memory fake and production can substitute a shared cache.
//! The maps are independent: clearing one never touches another.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which session map a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMap {
    RememberedLocation,
    PendingTherapistQuery,
    ConversationHistory,
}

/// Injected session state. Values are opaque strings (JSON where needed).
pub trait SessionStore: Send + Sync {
    fn get(&self, map: SessionMap, key: &str) -> Option<String>;
    fn set(&self, map: SessionMap, key: &str, value: String);
    fn remove(&self, map: SessionMap, key: &str);
}

/// Process-local store guarded by a mutex. Resets on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    maps: Mutex<HashMap<(SessionMap, String), String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, map: SessionMap, key: &str) -> Option<String> {
        self.maps
            .lock()
            .expect("session store poisoned")
            .get(&(map, key.to_string()))
            .cloned()
    }

    fn set(&self, map: SessionMap, key: &str, value: String) {
        self.maps
            .lock()
            .expect("session store poisoned")
            .insert((map, key.to_string()), value);
    }

    fn remove(&self, map: SessionMap, key: &str) {
        self.maps
            .lock()
            .expect("session store poisoned")
            .remove(&(map, key.to_string()));
    }
}

/// Authenticated user profile resolved by the (external) auth layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub is_premium: bool,
}

/// Who is talking: an authenticated user, a cookie session, or an anonymous
/// client identified by host + truncated user agent.
#[derive(Debug, Clone, Default)]
pub struct ActorIdentity {
    pub user: Option<UserProfile>,
    pub session_token: Option<String>,
    pub client_host: String,
    pub user_agent: String,
}

impl ActorIdentity {
    pub fn anonymous(client_host: &str, user_agent: &str) -> Self {
        Self {
            user: None,
            session_token: None,
            client_host: client_host.to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    /// Key for session-scoped maps (location memory, history).
    pub fn session_key(&self) -> String {
        if let Some(user) = &self.user {
            return format!("user:{}", user.id);
        }
        if let Some(token) = &self.session_token {
            return format!("session:{token}");
        }
        let ua: String = self.user_agent.trim().chars().take(40).collect();
        format!("anon:{}:{ua}", self.client_host)
    }

    /// Key that scopes pending booking state, if one exists yet.
    ///
    /// Anonymous clients get no booking key until a token is minted, so a
    /// drive-by message can never read another client's pending state.
    pub fn booking_actor_key(&self) -> Option<String> {
        if let Some(user) = &self.user {
            return Some(user.id.to_string());
        }
        let token = self.session_token.as_ref()?.trim();
        if token.is_empty() {
            return None;
        }
        Some(format!("anon:{token}"))
    }

    /// Return the booking key, minting an anonymous session token if needed.
    pub fn ensure_booking_actor_key(&mut self) -> String {
        if let Some(key) = self.booking_actor_key() {
            return key;
        }
        let token = Uuid::new_v4().simple().to_string();
        self.session_token = Some(token.clone());
        format!("anon:{token}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_are_independent() {
        let store = InMemorySessionStore::new();
        store.set(SessionMap::RememberedLocation, "user:1", "Stockholm".into());
        store.set(SessionMap::PendingTherapistQuery, "user:1", "{}".into());

        store.remove(SessionMap::PendingTherapistQuery, "user:1");

        assert_eq!(
            store.get(SessionMap::RememberedLocation, "user:1").as_deref(),
            Some("Stockholm")
        );
        assert!(store.get(SessionMap::PendingTherapistQuery, "user:1").is_none());
    }

    #[test]
    fn session_key_prefers_user_then_token_then_anon() {
        let user_id = Uuid::new_v4();
        let identity = ActorIdentity {
            user: Some(UserProfile {
                id: user_id,
                email: None,
                name: None,
                is_premium: false,
            }),
            session_token: Some("tok".into()),
            client_host: "10.0.0.1".into(),
            user_agent: "test-agent".into(),
        };
        assert_eq!(identity.session_key(), format!("user:{user_id}"));

        let identity = ActorIdentity {
            user: None,
            ..identity
        };
        assert_eq!(identity.session_key(), "session:tok");

        let identity = ActorIdentity::anonymous("10.0.0.1", "test-agent");
        assert_eq!(identity.session_key(), "anon:10.0.0.1:test-agent");
    }

    #[test]
    fn anon_session_key_truncates_user_agent() {
        let long_agent = "x".repeat(100);
        let identity = ActorIdentity::anonymous("host", &long_agent);
        assert_eq!(identity.session_key().len(), "anon:host:".len() + 40);
    }

    #[test]
    fn booking_key_requires_user_or_token() {
        let mut identity = ActorIdentity::anonymous("host", "agent");
        assert!(identity.booking_actor_key().is_none());

        let key = identity.ensure_booking_actor_key();
        assert!(key.starts_with("anon:"));
        // Stable once minted.
        assert_eq!(identity.booking_actor_key().as_deref(), Some(key.as_str()));
    }
}
