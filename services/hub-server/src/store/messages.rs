//! Message Store (C5): append-only message log plus the broadcast-delivery
//! ledger (§4.5). Grounded on `services/forwarder/src/storage/journal.rs` for
//! the insert/query shape; `ListPendingFor`'s anti-join against the ledger is
//! new (the journal has no broadcast concept).

use hub_protocol::MessageStatus;
use rusqlite::{OptionalExtension, params};

use super::{Store, StoreResult, now_rfc3339};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: i64,
    pub from_user: String,
    pub to_user: String,
    pub timestamp: String,
    pub content: String,
    /// `pending`/`delivered`/`error`. For broadcast rows this stays `pending`
    /// forever — delivery is tracked per-recipient via `broadcast_deliveries`
    /// instead (§4.8 state machine), not by this column.
    pub status: String,
    pub is_broadcast: bool,
    pub signature: Option<String>,
    pub is_forward_message: bool,
}

/// Fields needed to insert a new message; `id` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub from_user: String,
    pub to_user: String,
    /// RFC3339 timestamp. If empty, the store stamps the current time
    /// (sender-supplied timestamp of zero/absent is re-stamped server-side,
    /// §3).
    pub timestamp: String,
    pub content: String,
    pub is_broadcast: bool,
    pub signature: Option<String>,
    pub is_forward_message: bool,
}

impl Store {
    /// `Insert(msg) -> id` (§4.5). Atomic; the row is visible to readers as
    /// soon as this returns.
    pub fn insert_message(&self, msg: NewMessage) -> StoreResult<i64> {
        if msg.content.is_empty() {
            return Err(super::StoreError::InvalidData("content must not be empty".to_owned()));
        }
        let timestamp = if msg.timestamp.is_empty() {
            now_rfc3339()
        } else {
            msg.timestamp
        };
        let conn = self.lock();
        conn.execute(
            "INSERT INTO messages
                 (from_user, to_user, timestamp, content, status, is_broadcast, signature, is_forward_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                msg.from_user,
                msg.to_user,
                timestamp,
                msg.content,
                MessageStatus::Pending.as_str(),
                msg.is_broadcast,
                msg.signature,
                msg.is_forward_message,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.record_event(id, "inserted", None);
        Ok(id)
    }

    /// `MarkDelivered(id)` (§4.5). Idempotent — repeated calls are no-ops.
    pub fn mark_delivered(&self, id: i64) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE messages SET status = ?1 WHERE id = ?2",
            params![MessageStatus::Delivered.as_str(), id],
        )?;
        drop(conn);
        self.record_event(id, "delivered", None);
        Ok(())
    }

    /// `RecordBroadcastDelivery(messageID, userID)` (§4.5). A primary-key
    /// collision (already delivered to this user) is treated as success.
    pub fn record_broadcast_delivery(&self, message_id: i64, user_id: &str) -> StoreResult<()> {
        let conn = self.lock();
        let now = now_rfc3339();
        let result = conn.execute(
            "INSERT INTO broadcast_deliveries (message_id, user_id, delivered_at) VALUES (?1, ?2, ?3)",
            params![message_id, user_id, now],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation => {}
            Err(e) => return Err(e.into()),
        }
        drop(conn);
        self.record_event(message_id, "ledger_recorded", Some(user_id));
        Ok(())
    }

    /// `ListPendingFor(userID, since)` (§4.5): direct messages to `userID`
    /// with `status = pending`, plus broadcast messages timestamped at or
    /// after `since` for which no ledger row exists yet for `userID`.
    pub fn list_pending_for(&self, user_id: &str, since: &str) -> StoreResult<Vec<MessageRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, from_user, to_user, timestamp, content, status, is_broadcast, signature, is_forward_message
             FROM messages
             WHERE to_user = ?1 AND is_broadcast = 0 AND status = ?2
             UNION ALL
             SELECT id, from_user, to_user, timestamp, content, status, is_broadcast, signature, is_forward_message
             FROM messages
             WHERE is_broadcast = 1 AND status = ?2 AND timestamp >= ?3
               AND id NOT IN (SELECT message_id FROM broadcast_deliveries WHERE user_id = ?1)
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(
            params![user_id, MessageStatus::Pending.as_str(), since],
            map_message_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Direct-only fallback used when a user's registration time cannot be
    /// read (§4.5's "fall back to direct-only").
    pub fn list_pending_direct_for(&self, user_id: &str) -> StoreResult<Vec<MessageRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, from_user, to_user, timestamp, content, status, is_broadcast, signature, is_forward_message
             FROM messages
             WHERE to_user = ?1 AND is_broadcast = 0 AND status = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id, MessageStatus::Pending.as_str()], map_message_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_message(&self, id: i64) -> StoreResult<Option<MessageRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, from_user, to_user, timestamp, content, status, is_broadcast, signature, is_forward_message
                 FROM messages WHERE id = ?1",
                params![id],
                map_message_row,
            )
            .optional()?;
        Ok(row)
    }
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        from_user: row.get(1)?,
        to_user: row.get(2)?,
        timestamp: row.get(3)?,
        content: row.get(4)?,
        status: row.get(5)?,
        is_broadcast: row.get(6)?,
        signature: row.get(7)?,
        is_forward_message: row.get(8)?,
    })
}
