//! Pending-action persistence — async trait over a swappable backend.

mod libsql_backend;

pub use libsql_backend::LibSqlStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::booking::payload::BookingPayload;
use crate::error::StoreError;

/// A persisted, TTL-bounded draft awaiting user confirmation.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub id: Uuid,
    pub actor_key: String,
    pub action_type: String,
    pub payload: BookingPayload,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of one outbound email attempt, recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailAttemptStatus {
    Sent,
    Failed,
    Blocked,
}

impl EmailAttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailAttemptStatus::Sent => "sent",
            EmailAttemptStatus::Failed => "failed",
            EmailAttemptStatus::Blocked => "blocked",
        }
    }
}

/// Backend-agnostic store for pending actions and the outbound-email audit
/// log.
///
/// Implementations must uphold the single-pending-record invariant:
/// creating a pending action deletes all prior rows for the same
/// `(actor_key, action_type)` within one transaction-equivalent section.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Replace any existing pending action for this actor with a new one
    /// expiring at `now + ttl`.
    async fn create_pending(
        &self,
        actor_key: &str,
        action_type: &str,
        payload: &BookingPayload,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<PendingAction, StoreError>;

    /// Latest pending action for this actor, deleting it when already
    /// expired. The flag reports whether an expired record was dropped.
    async fn load_latest(
        &self,
        actor_key: &str,
        action_type: &str,
        now: DateTime<Utc>,
    ) -> Result<(Option<PendingAction>, bool), StoreError>;

    /// Delete a pending action by id. Deleting a missing row is not an
    /// error (a concurrent expiry may have beaten us to it).
    async fn delete_pending(&self, id: Uuid) -> Result<(), StoreError>;

    /// Count pending rows for this actor (expired or not).
    async fn count_pending(&self, actor_key: &str, action_type: &str) -> Result<u64, StoreError>;

    /// Record one outbound email attempt for audit.
    async fn record_email_attempt(
        &self,
        actor_key: &str,
        to_email: &str,
        subject: &str,
        status: EmailAttemptStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Count sent/failed attempts (blocked ones excluded) since `cutoff`.
    async fn email_attempt_count_since(
        &self,
        actor_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}
