//! Session Registry (C6, §4.6): the authoritative map of which user id is
//! currently attached to which live WebSocket session. Grounded on
//! `services/server/src/state.rs`'s forwarder registry, but the replace
//! policy is the opposite of that file's reject-on-duplicate: a new login
//! always wins over a stale one (§4.6 "a second connection for the same user
//! replaces the first").

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What the registry holds for each connected user: the egress channel the
/// writer half of that user's session drains, and a token to tear the
/// session down from outside its own tasks.
#[derive(Clone)]
pub struct SessionHandle {
    pub egress: mpsc::Sender<String>,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Register(userID, handle)`. Displaces and cancels any prior session
    /// for the same user before installing the new one (§4.6).
    pub fn register(&self, user_id: &str, handle: SessionHandle) {
        let previous = self
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(user_id.to_owned(), handle);
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    /// `Unregister(userID)`. A no-op if `egress` is no longer the
    /// registered session's channel (a newer session already replaced it),
    /// so a late cleanup from a displaced session can't evict its
    /// replacement.
    pub fn unregister(&self, user_id: &str, egress: &mpsc::Sender<String>) {
        let mut sessions = self.sessions.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if sessions.get(user_id).is_some_and(|current| current.egress.same_channel(egress)) {
            sessions.remove(user_id);
        }
    }

    pub fn lookup(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    /// `Snapshot() -> []userID` for `/active-users` (§4.6).
    pub fn snapshot(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
