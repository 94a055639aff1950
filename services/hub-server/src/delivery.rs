//! Delivery Engine (C8, §4.8): routes a stored message to the registry's
//! live sessions, or leaves it pending for later replay. Grounded on
//! `services/server/src/ws_forwarder.rs`'s `send_ws_error`-style
//! best-effort-enqueue pattern, generalized from a single admin fan-out to
//! direct + broadcast, live + replay.

use std::sync::Arc;

use hub_protocol::{BROADCAST_RECIPIENT, Frame};

use crate::registry::Registry;
use crate::store::{MessageRow, Store};

/// Whether a delivery attempt is happening as a message arrives (`Live`) or
/// while replaying a user's backlog on reconnect (`Replay`). The two differ
/// only in the broadcast case (§4.8): live fan-out skips the ledger
/// entirely, replay writes exactly one ledger row for the user being caught
/// up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Live,
    Replay,
}

pub struct DeliveryEngine {
    store: Arc<Store>,
    registry: Arc<Registry>,
}

fn to_frame(row: &MessageRow) -> Frame {
    Frame {
        id: row.id,
        from: row.from_user.clone(),
        to: row.to_user.clone(),
        timestamp: row.timestamp.clone(),
        content: row.content.clone(),
        status: row.status.clone(),
        is_broadcast: row.is_broadcast,
        signature: row.signature.clone(),
        is_forward_message: row.is_forward_message,
    }
}

fn try_enqueue(registry: &Registry, user_id: &str, frame: &Frame) -> bool {
    let Some(handle) = registry.lookup(user_id) else {
        return false;
    };
    let Ok(payload) = serde_json::to_string(frame) else {
        tracing::warn!(message_id = frame.id, "frame failed to serialize, dropping");
        return false;
    };
    match handle.egress.try_send(payload) {
        Ok(()) => true,
        Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(user_id, message_id = frame.id, "egress queue full, leaving message pending");
            false
        }
        Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => false,
    }
}

impl DeliveryEngine {
    pub fn new(store: Arc<Store>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    /// `Deliver(msg, mode, targetUser)` (§4.8).
    ///
    /// Direct messages always target `row.to_user` regardless of mode.
    /// Broadcast messages fan out to every connected user except the sender
    /// when `mode == Live`, but target only `target_user` when
    /// `mode == Replay` (the caller is catching up one specific user).
    pub fn deliver(&self, row: &MessageRow, mode: DeliveryMode, target_user: &str) {
        if !row.is_broadcast {
            self.deliver_direct(row);
            return;
        }
        match mode {
            DeliveryMode::Live => self.deliver_broadcast_live(row),
            DeliveryMode::Replay => self.deliver_broadcast_replay(row, target_user),
        }
    }

    fn deliver_direct(&self, row: &MessageRow) {
        let frame = to_frame(row);
        if try_enqueue(&self.registry, &row.to_user, &frame) {
            if let Err(e) = self.store.mark_delivered(row.id) {
                tracing::warn!(message_id = row.id, error = %e, "failed to mark message delivered");
            }
        }
    }

    fn deliver_broadcast_live(&self, row: &MessageRow) {
        let frame = to_frame(row);
        for user_id in self.registry.snapshot() {
            if user_id == row.from_user {
                continue;
            }
            // No ledger row on the live path: a user connected at
            // broadcast time either received it just now or never will via
            // this path, and double sends are left to the client to dedup.
            try_enqueue(&self.registry, &user_id, &frame);
        }
    }

    fn deliver_broadcast_replay(&self, row: &MessageRow, target_user: &str) {
        if target_user == row.from_user {
            return;
        }
        let frame = to_frame(row);
        if try_enqueue(&self.registry, target_user, &frame) {
            if let Err(e) = self.store.record_broadcast_delivery(row.id, target_user) {
                tracing::warn!(message_id = row.id, user_id = target_user, error = %e, "failed to record broadcast delivery");
            }
        }
    }

    /// Replays a reconnecting user's backlog (§4.5 + §4.8): direct messages
    /// still pending, plus broadcasts since their registration that have no
    /// ledger row yet for them.
    pub fn retrieve_undelivered_for(&self, user_id: &str, since: &str) {
        let pending = match self.store.list_pending_for(user_id, since) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "falling back to direct-only replay");
                self.store.list_pending_direct_for(user_id).unwrap_or_default()
            }
        };
        for row in pending {
            self.deliver(&row, DeliveryMode::Replay, user_id);
        }
    }

    /// Direct-only replay used when a user's registration time can't be read
    /// (§4.5's fallback branch, mirroring `retrieve_undelivered_for`'s own
    /// fallback when `list_pending_for` itself errors). Never consults
    /// `since` — broadcasts are excluded outright rather than risking a
    /// replay of the entire broadcast history.
    pub fn retrieve_undelivered_direct_only_for(&self, user_id: &str) {
        let pending = self.store.list_pending_direct_for(user_id).unwrap_or_default();
        for row in pending {
            self.deliver(&row, DeliveryMode::Replay, user_id);
        }
    }

    /// The HTTP side-channel (`POST /direct-message/{recipient}`, §4.9):
    /// stores the message with `is_forward_message = true` and then
    /// attempts an immediate live delivery like any other direct message.
    pub fn deliver_http(&self, row: &MessageRow) {
        debug_assert!(row.is_forward_message, "HTTP-origin messages are always marked forwarded");
        self.deliver_direct(row);
    }
}
