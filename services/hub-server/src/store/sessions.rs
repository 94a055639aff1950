//! Durable Session records (§3, §3.1): one row per WebSocket connection,
//! opened on upgrade and closed on disconnect. Analytics/audit only — no
//! core operation reads this table back, mirroring `message_events`'s
//! best-effort-audit role in `store/mod.rs`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rusqlite::{OptionalExtension, params};

use super::{Store, StoreResult, now_rfc3339};

impl Store {
    /// `StartSession(userID) -> sessionID` (§3's Session record). Generates a
    /// random session id and inserts the open row; returns the id so the
    /// caller can close the same row later.
    pub fn start_session(&self, user_id: &str) -> StoreResult<String> {
        let mut id_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut id_bytes);
        let session_id = STANDARD.encode(id_bytes);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (session_id, user_id, start_time) VALUES (?1, ?2, ?3)",
            params![session_id, user_id, now_rfc3339()],
        )?;
        Ok(session_id)
    }

    /// `EndSession(sessionID)`. Idempotent — a session row already closed is
    /// left untouched rather than overwriting its recorded duration.
    pub fn end_session(&self, session_id: &str) -> StoreResult<()> {
        let conn = self.lock();
        let start_time: Option<String> = conn
            .query_row(
                "SELECT start_time FROM sessions WHERE session_id = ?1 AND end_time IS NULL",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(start_time) = start_time else {
            return Ok(());
        };
        let end_time = now_rfc3339();
        let duration_seconds = chrono::DateTime::parse_from_rfc3339(&end_time)
            .ok()
            .zip(chrono::DateTime::parse_from_rfc3339(&start_time).ok())
            .map(|(end, start)| (end - start).num_seconds());
        conn.execute(
            "UPDATE sessions SET end_time = ?1, duration_seconds = ?2 WHERE session_id = ?3",
            params![end_time, duration_seconds, session_id],
        )?;
        Ok(())
    }
}
