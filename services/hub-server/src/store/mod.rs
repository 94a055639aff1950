//! Durable SQLite-backed store for users, messages, and sessions (C1, C5).
//!
//! Grounded on the teacher's `services/forwarder/src/storage/journal.rs`:
//! same PRAGMA set, same open-time integrity check, same
//! `include_str!("schema.sql")` schema application. `rusqlite::Connection`
//! is `!Sync`, so the connection is wrapped in a `Mutex` here — the mutex
//! *is* the single-writer serialization point required by §4.5/§5 (the
//! forwarder only ever has one writer task, so the teacher didn't need an
//! explicit wrapper; the hub has many concurrent session tasks, so it does).

pub mod messages;
pub mod sessions;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;

/// Fixed-width RFC3339 timestamp (always nanosecond precision, `Z` suffix) so
/// that lexical string comparison agrees with chronological order — relied
/// on by `ListPendingFor`'s `timestamp >= since` filter (§4.5).
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub use messages::{MessageRow, NewMessage};
pub use users::{RegisterOutcome, UserRow};

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    IntegrityCheckFailed(String),
    /// A caller supplied a value the store refuses to persist (§4.5), e.g. an
    /// empty message body.
    InvalidData(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StoreError::IntegrityCheckFailed(s) => write!(f, "integrity check failed: {s}"),
            StoreError::InvalidData(s) => write!(f, "invalid data: {s}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The hub's durable store: users, messages, the broadcast-delivery ledger,
/// sessions, and a message-event audit trail (§3, §3.1).
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Appends a row to the `message_events` audit trail. Never consulted by
    /// core operations; best-effort (failures are logged, not propagated).
    fn record_event(&self, message_id: i64, event_type: &str, detail: Option<&str>) {
        let conn = self.lock();
        let now = now_rfc3339();
        if let Err(e) = conn.execute(
            "INSERT INTO message_events (message_id, event_type, detail, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![message_id, event_type, detail, now],
        ) {
            tracing::warn!(error = %e, message_id, event_type, "failed to record message event");
        }
    }
}

fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA wal_autocheckpoint=1000;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> StoreResult<()> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::IntegrityCheckFailed(result));
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(include_str!("schema.sql"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
