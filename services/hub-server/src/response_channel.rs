//! Response-channel map (§5 shared resource (c), §4.7 reader step 4): lets an
//! HTTP caller blocked in `POST /direct-message/{recipient}?await_response=true`
//! receive the recipient's reply directly, bypassing the store and Delivery
//! Engine. Grounded on the teacher's `http/forwarder_config.rs`
//! oneshot-per-request pattern, adapted from a request-id key to a user-id
//! key — exactly one outstanding wait per user, the same single-slot shape
//! `auth.rs`'s `ChallengeStore` uses for nonces.

use std::collections::HashMap;
use std::sync::RwLock;

use hub_protocol::Frame;
use tokio::sync::oneshot;

#[derive(Default)]
pub struct ResponseChannels {
    waiters: RwLock<HashMap<String, oneshot::Sender<Frame>>>,
}

impl ResponseChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a wait for `user_id`'s next forward-response, displacing
    /// (and silently dropping) any prior unclaimed wait for the same user.
    pub fn register(&self, user_id: &str) -> oneshot::Receiver<Frame> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(user_id.to_owned(), tx);
        rx
    }

    fn take(&self, user_id: &str) -> Option<oneshot::Sender<Frame>> {
        self.waiters
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(user_id)
    }

    /// Delivers `frame` to the waiter registered for `user_id` — the
    /// connected session's own user, since a response channel is registered
    /// for the recipient the HTTP side-channel is waiting to hear back from
    /// (§4.7 step 4). Returns `true` when a waiter was found — the reader
    /// loop skips normal processing in that case regardless of whether the
    /// HTTP caller is still listening (a dropped receiver just means its
    /// wait already timed out).
    pub fn deliver(&self, user_id: &str, frame: Frame) -> bool {
        match self.take(user_id) {
            Some(sender) => {
                let _ = sender.send(frame);
                true
            }
            None => false,
        }
    }

    /// Drops a registered wait without delivering, used when the HTTP call
    /// times out before a response-channel delivery arrives.
    pub fn cancel(&self, user_id: &str) {
        self.take(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(to: &str) -> Frame {
        Frame {
            id: 1,
            from: "bob".to_owned(),
            to: to.to_owned(),
            timestamp: String::new(),
            content: "reply".to_owned(),
            status: "pending".to_owned(),
            is_broadcast: false,
            signature: None,
            is_forward_message: true,
        }
    }

    #[test]
    fn registered_wait_receives_the_delivered_frame() {
        let channels = ResponseChannels::new();
        let mut rx = channels.register("alice");
        assert!(channels.deliver("alice", frame("bob")));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.content, "reply");
    }

    #[test]
    fn deliver_with_no_registered_waiter_returns_false() {
        let channels = ResponseChannels::new();
        assert!(!channels.deliver("nobody", frame("bob")));
    }

    #[test]
    fn take_is_single_use() {
        let channels = ResponseChannels::new();
        let _rx = channels.register("alice");
        assert!(channels.take("alice").is_some());
        assert!(channels.take("alice").is_none());
    }

    #[test]
    fn cancel_drops_without_delivering() {
        let channels = ResponseChannels::new();
        let _rx = channels.register("alice");
        channels.cancel("alice");
        assert!(!channels.deliver("alice", frame("bob")));
    }

    #[test]
    fn reregistering_displaces_the_prior_wait() {
        let channels = ResponseChannels::new();
        let first_rx = channels.register("alice");
        let _second_rx = channels.register("alice");
        assert!(channels.deliver("alice", frame("bob")));
        assert!(first_rx.try_recv().is_err(), "the displaced wait never completes");
    }
}
