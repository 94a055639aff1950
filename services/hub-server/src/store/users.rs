//! Key/Identity Store (C1). Grounded on `services/server/src/repo/races.rs`'s
//! one-function-per-operation shape, adapted to a typed row over a plain
//! `rusqlite::Connection` instead of an async `sqlx::PgPool`.

use rusqlite::{OptionalExtension, params};

use super::{Store, StoreResult, now_rfc3339};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user_id: String,
    pub username: String,
    /// Base64-encoded Ed25519 public key, exactly as registered (§4.1).
    pub public_key: String,
    pub created_at: String,
}

/// Outcome of [`Store::register_user`] — registration fails closed on a
/// duplicate id rather than overwriting (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    AlreadyExists,
}

impl Store {
    pub fn register_user(
        &self,
        user_id: &str,
        username: &str,
        public_key: &str,
    ) -> StoreResult<RegisterOutcome> {
        let conn = self.lock();
        let now = now_rfc3339();
        let result = conn.execute(
            "INSERT INTO users (user_id, username, public_key, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, username, public_key, now],
        );
        match result {
            Ok(_) => Ok(RegisterOutcome::Created),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(RegisterOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn lookup_user(&self, user_id: &str) -> StoreResult<Option<UserRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT user_id, username, public_key, created_at FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        public_key: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn user_exists(&self, user_id: &str) -> StoreResult<bool> {
        let conn = self.lock();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?1)",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// All registered user ids, for splitting the `/active-users` response
    /// into online/offline.
    pub fn list_all_user_ids(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT user_id FROM users")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let outcome = store.register_user("alice", "Alice", "pubkey-b64").unwrap();
        assert_eq!(outcome, RegisterOutcome::Created);

        let row = store.lookup_user("alice").unwrap().unwrap();
        assert_eq!(row.username, "Alice");
        assert_eq!(row.public_key, "pubkey-b64");
        assert!(store.user_exists("alice").unwrap());
    }

    #[test]
    fn duplicate_register_fails_closed() {
        let store = Store::open_in_memory().unwrap();
        store.register_user("alice", "Alice", "pubkey").unwrap();
        let outcome = store.register_user("alice", "Someone Else", "other-key").unwrap();
        assert_eq!(outcome, RegisterOutcome::AlreadyExists);

        let row = store.lookup_user("alice").unwrap().unwrap();
        assert_eq!(row.username, "Alice", "original registration must not be overwritten");
    }

    #[test]
    fn lookup_of_unknown_user_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.lookup_user("nobody").unwrap().is_none());
        assert!(!store.user_exists("nobody").unwrap());
    }

    #[test]
    fn list_all_user_ids_returns_every_registration() {
        let store = Store::open_in_memory().unwrap();
        store.register_user("alice", "Alice", "pk-a").unwrap();
        store.register_user("bob", "Bob", "pk-b").unwrap();
        let mut ids = store.list_all_user_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["alice".to_owned(), "bob".to_owned()]);
    }
}
