//! In-memory sliding-window rate limiter for the chat entry point.
//!
//! Limits per client key (session key, with host fallback). This is an
//! in-process store: it resets on restart and does not share state across
//! processes. A multi-worker deployment would swap in a shared cache with
//! the same sliding-window algorithm.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A client exceeded the allowed request rate.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Rate limit exceeded for {client_key:?}: max {limit} requests per {window_seconds}s")]
pub struct RateLimitExceeded {
    pub client_key: String,
    pub limit: usize,
    pub window_seconds: u64,
}

/// Thread-safe sliding-window rate limiter.
///
/// Each client key holds a deque of request timestamps. `check` drops
/// timestamps outside the window, then rejects if the remainder is at the
/// limit.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    store: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        assert!(max_requests >= 1, "max_requests must be >= 1");
        assert!(window >= Duration::from_secs(1), "window must be >= 1s");
        Self {
            max_requests,
            window,
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `client_key`, rejecting if over the limit.
    pub fn check(&self, client_key: &str) -> Result<(), RateLimitExceeded> {
        let now = Instant::now();
        let mut store = self.store.lock().expect("rate limiter poisoned");
        let window = store.entry(client_key.to_string()).or_default();

        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_requests {
            return Err(RateLimitExceeded {
                client_key: client_key.to_string(),
                limit: self.max_requests,
                window_seconds: self.window.as_secs(),
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// How many requests the client has left in the current window.
    pub fn remaining(&self, client_key: &str) -> usize {
        let now = Instant::now();
        let store = self.store.lock().expect("rate limiter poisoned");
        match store.get(client_key) {
            None => self.max_requests,
            Some(window) => {
                let current = window
                    .iter()
                    .filter(|ts| now.duration_since(**ts) < self.window)
                    .count();
                self.max_requests.saturating_sub(current)
            }
        }
    }

    /// Clear rate-limit state for a client (useful in tests).
    pub fn reset(&self, client_key: &str) {
        self.store
            .lock()
            .expect("rate limiter poisoned")
            .remove(client_key);
    }

    /// Drop all fully-expired entries to free memory. Returns count removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.lock().expect("rate limiter poisoned");
        let before = store.len();
        store.retain(|_, window| {
            window
                .iter()
                .any(|ts| now.duration_since(*ts) < self.window)
        });
        before - store.len()
    }
}
