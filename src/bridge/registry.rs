//! Pending-reply registry.
//!
//! Tracks which caller is waiting for which correlation ID and hands each
//! reply to exactly one waiter via a oneshot channel.
//!
//! # Lifecycle
//!
//! - The facade calls `register(id)` right before the envelope is queued
//! - The dispatcher calls `deliver(envelope)` when a reply arrives
//! - The facade calls `forget(id)` when its deadline passes or it is cancelled
//!
//! Whichever of `deliver` and `forget` runs first removes the entry; the other
//! finds nothing and returns `false`. The caller awaits its receiver without
//! holding the lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tokio::sync::oneshot;

use super::{CorrelationId, InboundEnvelope};
use crate::error::LockResultExt;

/// Why a pending call was completed without a reply envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The publisher could not hand the request to the broker.
    Publish,
    /// The bridge stopped (consumer ended, shutdown, publisher gone).
    Closed,
}

/// Synthetic completion used when no reply can ever arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl DeliveryFailure {
    pub fn publish(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Publish,
            reason: reason.into(),
        }
    }

    pub fn closed(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Closed,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// What a waiting caller eventually receives.
pub type Reply = Result<InboundEnvelope, DeliveryFailure>;

/// Registry of calls waiting for a reply.
///
/// Shared by every caller (register/forget) and the single dispatcher
/// (deliver). All state sits behind one mutex, and sends on oneshot channels
/// never block, so the dispatcher can never be stalled by a slow or vanished
/// caller.
pub struct PendingReplies {
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<Reply>>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a waiter for `id` and return the receiving end.
    ///
    /// Returns `None` if `id` is already pending. Generated IDs are unique,
    /// so a collision means a broken invariant in the caller.
    pub fn register(&self, id: CorrelationId) -> Option<oneshot::Receiver<Reply>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock();

        if pending.contains_key(&id) {
            return None;
        }
        pending.insert(id, tx);

        Some(rx)
    }

    /// Hand a reply to its waiter.
    ///
    /// Returns `true` if a waiter took it. Replies for unknown IDs (timed out,
    /// cancelled, duplicated, or foreign) are dropped and return `false`.
    pub fn deliver(&self, envelope: InboundEnvelope) -> bool {
        let tx = self.lock().remove(&envelope.id);
        match tx {
            Some(sender) => sender.send(Ok(envelope)).is_ok(),
            None => false,
        }
    }

    /// Complete a single waiter with a synthetic failure.
    pub fn fail(&self, id: CorrelationId, failure: DeliveryFailure) -> bool {
        let tx = self.lock().remove(&id);
        match tx {
            Some(sender) => sender.send(Err(failure)).is_ok(),
            None => false,
        }
    }

    /// Remove a waiter without completing it.
    ///
    /// Safe to call for IDs that were already delivered or removed.
    pub fn forget(&self, id: CorrelationId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Complete every waiter with a synthetic failure.
    ///
    /// Called when the bridge can no longer receive replies, so callers fail
    /// at once instead of waiting out their deadlines.
    pub fn fail_all(&self, failure: DeliveryFailure) {
        let entries: Vec<_> = self.lock().drain().collect();

        // Lock released before touching the channels
        for (_, tx) in entries {
            let _ = tx.send(Err(failure.clone()));
        }
    }

    /// Number of calls currently waiting.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CorrelationId, oneshot::Sender<Reply>>> {
        self.pending.lock().recover_poison("PendingReplies")
    }
}

impl Default for PendingReplies {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    fn reply(id: CorrelationId, data: Value) -> InboundEnvelope {
        let Value::Object(map) = data else {
            panic!("reply data must be an object");
        };
        InboundEnvelope::new(id, map)
    }

    #[test]
    fn new_registry_is_empty() {
        assert_eq!(PendingReplies::new().pending_count(), 0);
    }

    #[test]
    fn register_duplicate_id_returns_none() {
        let registry = PendingReplies::new();
        let id = CorrelationId::generate();

        let first = registry.register(id);
        assert!(first.is_some());

        let second = registry.register(id);
        assert!(second.is_none(), "duplicate ID must not replace the waiter");
        assert_eq!(registry.pending_count(), 1);
    }

    #[tokio::test]
    async fn deliver_hands_reply_to_waiter() {
        let registry = PendingReplies::new();
        let id = CorrelationId::generate();
        let rx = registry.register(id).unwrap();

        assert!(registry.deliver(reply(id, json!({"name": "Acme"}))));
        assert_eq!(registry.pending_count(), 0);

        let received = rx.await.unwrap().unwrap();
        assert_eq!(received.message_data["name"], "Acme");
    }

    #[tokio::test]
    async fn second_delivery_for_same_id_is_dropped() {
        let registry = PendingReplies::new();
        let id = CorrelationId::generate();
        let rx = registry.register(id).unwrap();

        assert!(registry.deliver(reply(id, json!({"n": 1}))));
        assert!(!registry.deliver(reply(id, json!({"n": 2}))));

        let received = rx.await.unwrap().unwrap();
        assert_eq!(received.message_data["n"], 1);
    }

    #[test]
    fn deliver_unknown_id_returns_false() {
        let registry = PendingReplies::new();
        let _rx = registry.register(CorrelationId::generate()).unwrap();

        assert!(!registry.deliver(InboundEnvelope::new(CorrelationId::generate(), Map::new())));
        assert_eq!(registry.pending_count(), 1, "unrelated waiter untouched");
    }

    #[test]
    fn deliver_after_forget_returns_false() {
        let registry = PendingReplies::new();
        let id = CorrelationId::generate();
        let _rx = registry.register(id).unwrap();

        assert!(registry.forget(id));
        assert!(!registry.deliver(InboundEnvelope::new(id, Map::new())));
    }

    #[test]
    fn forget_is_idempotent() {
        let registry = PendingReplies::new();
        let id = CorrelationId::generate();
        let _rx = registry.register(id).unwrap();

        assert!(registry.forget(id));
        assert!(!registry.forget(id));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn deliver_after_receiver_dropped_returns_false() {
        let registry = PendingReplies::new();
        let id = CorrelationId::generate();
        let rx = registry.register(id).unwrap();
        drop(rx);

        assert!(!registry.deliver(InboundEnvelope::new(id, Map::new())));
        assert_eq!(registry.pending_count(), 0, "entry removed anyway");
    }

    #[tokio::test]
    async fn out_of_order_delivery_only_wakes_matching_waiter() {
        let registry = PendingReplies::new();
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        let mut rx_a = registry.register(a).unwrap();
        let rx_b = registry.register(b).unwrap();

        assert!(registry.deliver(reply(b, json!({"who": "b"}))));

        assert_eq!(rx_b.await.unwrap().unwrap().message_data["who"], "b");
        assert!(rx_a.try_recv().is_err(), "a must still be pending");
        assert_eq!(registry.pending_count(), 1);

        assert!(registry.deliver(reply(a, json!({"who": "a"}))));
        assert_eq!(rx_a.await.unwrap().unwrap().message_data["who"], "a");
    }

    #[tokio::test]
    async fn fail_completes_single_waiter() {
        let registry = PendingReplies::new();
        let id = CorrelationId::generate();
        let rx = registry.register(id).unwrap();

        assert!(registry.fail(id, DeliveryFailure::publish("broker down")));
        let failure = rx.await.unwrap().unwrap_err();
        assert_eq!(failure.kind, FailureKind::Publish);
        assert_eq!(failure.reason, "broker down");
    }

    #[tokio::test]
    async fn fail_all_completes_every_waiter() {
        let registry = PendingReplies::new();
        let rx1 = registry.register(CorrelationId::generate()).unwrap();
        let rx2 = registry.register(CorrelationId::generate()).unwrap();

        registry.fail_all(DeliveryFailure::closed("consumer ended"));
        assert_eq!(registry.pending_count(), 0);

        for rx in [rx1, rx2] {
            let failure = rx.await.unwrap().unwrap_err();
            assert_eq!(failure.kind, FailureKind::Closed);
            assert_eq!(failure.to_string(), "consumer ended");
        }
    }

    #[test]
    fn concurrent_registrations_never_collide() {
        let registry = std::sync::Arc::new(PendingReplies::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| registry.register(CorrelationId::generate()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut receivers = Vec::new();
        for handle in handles {
            for rx in handle.join().unwrap() {
                receivers.push(rx.expect("generated IDs never collide"));
            }
        }
        assert_eq!(registry.pending_count(), 2000);
    }
}
