//! libSQL backend for the pending-action store.
//!
//! Supports local file and in-memory databases; schema is initialized on
//! open. `libsql::Connection` is `Send + Sync` and safe for concurrent
//! async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::booking::payload::BookingPayload;
use crate::error::StoreError;
use crate::store::{EmailAttemptStatus, PendingAction, PendingStore};

/// libSQL store backend.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create database directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS pending_actions (
                id TEXT PRIMARY KEY,
                actor_key TEXT NOT NULL,
                action_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_pending_actor
                ON pending_actions (actor_key, action_type, created_at)",
            "CREATE TABLE IF NOT EXISTS outbound_emails (
                id TEXT PRIMARY KEY,
                actor_key TEXT NOT NULL,
                to_email TEXT NOT NULL,
                subject TEXT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_outbound_actor
                ON outbound_emails (actor_key, created_at)",
        ];
        for sql in statements {
            self.conn()
                .execute(sql, ())
                .await
                .map_err(|e| StoreError::Open(format!("init_schema: {e}")))?;
        }
        Ok(())
    }
}

/// Parse an RFC 3339 datetime string written by this store.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn row_to_pending(row: &libsql::Row) -> Result<PendingAction, libsql::Error> {
    let id_str: String = row.get(0)?;
    let actor_key: String = row.get(1)?;
    let action_type: String = row.get(2)?;
    let payload_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let expires_str: String = row.get(5)?;

    // Lenient payload parse: a corrupt row degrades to an empty draft
    // rather than wedging the conversation.
    let payload: BookingPayload = serde_json::from_str(&payload_str).unwrap_or_else(|e| {
        warn!(id = %id_str, "Unparseable pending payload, treating as empty: {e}");
        BookingPayload::default()
    });

    Ok(PendingAction {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        actor_key,
        action_type,
        payload,
        created_at: parse_datetime(&created_str),
        expires_at: parse_datetime(&expires_str),
    })
}

const PENDING_COLUMNS: &str = "id, actor_key, action_type, payload, created_at, expires_at";

#[async_trait]
impl PendingStore for LibSqlStore {
    async fn create_pending(
        &self,
        actor_key: &str,
        action_type: &str,
        payload: &BookingPayload,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<PendingAction, StoreError> {
        let conn = self.conn();
        let id = Uuid::new_v4();
        let expires_at = now + ttl;
        let payload_json =
            serde_json::to_string(payload).map_err(|e| StoreError::Serialization(e.to_string()))?;

        // Delete-then-insert inside one transaction keeps the
        // one-pending-record-per-actor invariant under concurrent requests.
        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| StoreError::Query(format!("create_pending begin: {e}")))?;

        let result: Result<(), StoreError> = async {
            conn.execute(
                "DELETE FROM pending_actions WHERE actor_key = ?1 AND action_type = ?2",
                params![actor_key, action_type],
            )
            .await
            .map_err(|e| StoreError::Query(format!("create_pending delete: {e}")))?;

            conn.execute(
                "INSERT INTO pending_actions (id, actor_key, action_type, payload, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    actor_key,
                    action_type,
                    payload_json,
                    now.to_rfc3339(),
                    expires_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("create_pending insert: {e}")))?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.execute("COMMIT", ())
                    .await
                    .map_err(|e| StoreError::Query(format!("create_pending commit: {e}")))?;
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                return Err(e);
            }
        }

        debug!(actor_key, action_type, %id, "Pending action created");
        Ok(PendingAction {
            id,
            actor_key: actor_key.to_string(),
            action_type: action_type.to_string(),
            payload: payload.clone(),
            created_at: now,
            expires_at,
        })
    }

    async fn load_latest(
        &self,
        actor_key: &str,
        action_type: &str,
        now: DateTime<Utc>,
    ) -> Result<(Option<PendingAction>, bool), StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PENDING_COLUMNS} FROM pending_actions
                     WHERE actor_key = ?1 AND action_type = ?2
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![actor_key, action_type],
            )
            .await
            .map_err(|e| StoreError::Query(format!("load_latest: {e}")))?;

        let pending = match rows.next().await {
            Ok(Some(row)) => row_to_pending(&row)
                .map_err(|e| StoreError::Query(format!("load_latest row parse: {e}")))?,
            Ok(None) => return Ok((None, false)),
            Err(e) => return Err(StoreError::Query(format!("load_latest: {e}"))),
        };

        if pending.expires_at <= now {
            self.delete_pending(pending.id).await?;
            debug!(actor_key, id = %pending.id, "Expired pending action dropped on read");
            return Ok((None, true));
        }
        Ok((Some(pending), false))
    }

    async fn delete_pending(&self, id: Uuid) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "DELETE FROM pending_actions WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("delete_pending: {e}")))?;
        Ok(())
    }

    async fn count_pending(&self, actor_key: &str, action_type: &str) -> Result<u64, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM pending_actions WHERE actor_key = ?1 AND action_type = ?2",
                params![actor_key, action_type],
            )
            .await
            .map_err(|e| StoreError::Query(format!("count_pending: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count as u64)
            }
            _ => Ok(0),
        }
    }

    async fn record_email_attempt(
        &self,
        actor_key: &str,
        to_email: &str,
        subject: &str,
        status: EmailAttemptStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let error_value = match error {
            Some(e) => libsql::Value::Text(e.to_string()),
            None => libsql::Value::Null,
        };
        self.conn()
            .execute(
                "INSERT INTO outbound_emails (id, actor_key, to_email, subject, status, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    actor_key,
                    to_email,
                    subject,
                    status.as_str(),
                    error_value,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("record_email_attempt: {e}")))?;

        debug!(actor_key, to_email, status = status.as_str(), "Email attempt recorded");
        Ok(())
    }

    async fn email_attempt_count_since(
        &self,
        actor_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM outbound_emails
                 WHERE actor_key = ?1 AND created_at >= ?2 AND status IN ('sent', 'failed')",
                params![actor_key, cutoff.to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("email_attempt_count_since: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count as u64)
            }
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::payload::{BOOKING_ACTION_TYPE, BOOKING_TTL_MINUTES};

    fn payload_with_email(email: &str) -> BookingPayload {
        BookingPayload {
            therapist_email: Some(email.to_string()),
            ..Default::default()
        }
        .stamp()
    }

    fn ttl() -> Duration {
        Duration::minutes(BOOKING_TTL_MINUTES)
    }

    #[tokio::test]
    async fn create_replaces_prior_pending_rows() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let now = Utc::now();

        store
            .create_pending("actor", BOOKING_ACTION_TYPE, &payload_with_email("a@example.com"), now, ttl())
            .await
            .unwrap();
        store
            .create_pending("actor", BOOKING_ACTION_TYPE, &payload_with_email("b@example.com"), now, ttl())
            .await
            .unwrap();

        assert_eq!(store.count_pending("actor", BOOKING_ACTION_TYPE).await.unwrap(), 1);
        let (loaded, expired) = store
            .load_latest("actor", BOOKING_ACTION_TYPE, now)
            .await
            .unwrap();
        assert!(!expired);
        assert_eq!(
            loaded.unwrap().payload.therapist_email.as_deref(),
            Some("b@example.com")
        );
    }

    #[tokio::test]
    async fn actors_do_not_share_pending_state() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let now = Utc::now();

        store
            .create_pending("actor-a", BOOKING_ACTION_TYPE, &payload_with_email("a@example.com"), now, ttl())
            .await
            .unwrap();
        store
            .create_pending("actor-b", BOOKING_ACTION_TYPE, &payload_with_email("b@example.com"), now, ttl())
            .await
            .unwrap();

        assert_eq!(store.count_pending("actor-a", BOOKING_ACTION_TYPE).await.unwrap(), 1);
        assert_eq!(store.count_pending("actor-b", BOOKING_ACTION_TYPE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_record_is_deleted_on_read() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let created = Utc::now() - Duration::minutes(BOOKING_TTL_MINUTES + 5);

        store
            .create_pending("actor", BOOKING_ACTION_TYPE, &payload_with_email("a@example.com"), created, ttl())
            .await
            .unwrap();

        let (loaded, expired) = store
            .load_latest("actor", BOOKING_ACTION_TYPE, Utc::now())
            .await
            .unwrap();
        assert!(loaded.is_none());
        assert!(expired);
        assert_eq!(store.count_pending("actor", BOOKING_ACTION_TYPE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn expiry_is_created_plus_ttl() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let now = Utc::now();

        let pending = store
            .create_pending("actor", BOOKING_ACTION_TYPE, &payload_with_email("a@example.com"), now, ttl())
            .await
            .unwrap();
        assert_eq!(pending.expires_at, now + Duration::minutes(BOOKING_TTL_MINUTES));
    }

    #[tokio::test]
    async fn delete_missing_row_is_not_an_error() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.delete_pending(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn email_attempts_count_sent_and_failed_only() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let cutoff = Utc::now() - Duration::hours(24);

        store
            .record_email_attempt("actor", "t@example.com", "s", EmailAttemptStatus::Sent, None)
            .await
            .unwrap();
        store
            .record_email_attempt("actor", "t@example.com", "s", EmailAttemptStatus::Failed, Some("smtp down"))
            .await
            .unwrap();
        store
            .record_email_attempt("actor", "t@example.com", "s", EmailAttemptStatus::Blocked, Some("rate_limit_exceeded"))
            .await
            .unwrap();

        assert_eq!(store.email_attempt_count_since("actor", cutoff).await.unwrap(), 2);
        assert_eq!(store.email_attempt_count_since("other", cutoff).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn payload_survives_round_trip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let now = Utc::now();
        let payload = BookingPayload {
            therapist_email: Some("t@example.com".to_string()),
            subject: Some("Appointment request".to_string()),
            body: Some("Hello".to_string()),
            sender_name: Some("Anna".to_string()),
            ..Default::default()
        }
        .stamp();

        store
            .create_pending("actor", BOOKING_ACTION_TYPE, &payload, now, ttl())
            .await
            .unwrap();
        let (loaded, _) = store
            .load_latest("actor", BOOKING_ACTION_TYPE, now)
            .await
            .unwrap();
        assert_eq!(loaded.unwrap().payload, payload);
    }

    #[tokio::test]
    async fn local_file_store_opens_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coach.db");
        let now = Utc::now();

        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store
                .create_pending("actor", BOOKING_ACTION_TYPE, &payload_with_email("a@example.com"), now, ttl())
                .await
                .unwrap();
        }

        let store = LibSqlStore::new_local(&path).await.unwrap();
        assert_eq!(store.count_pending("actor", BOOKING_ACTION_TYPE).await.unwrap(), 1);
    }
}
