//! Reply dispatcher task.
//!
//! Consumes the reply queue and hands each reply to the caller waiting on
//! its correlation ID.
//!
//! The dispatcher:
//! - Runs in a spawned tokio task for the lifetime of the bridge
//! - Acknowledges every delivery, including malformed and unmatched ones,
//!   so the broker never redelivers a reply nobody can use
//! - Drops replies whose caller has already timed out or gone away
//! - Fails every pending call when the reply stream ends
//! - Releases the reply queue on exit

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::DeliveryFailure;
use super::{InboundEnvelope, PendingReplies};
use crate::transport::{Delivery, ReplyConsumer};

/// Handle to a running dispatcher task.
///
/// Dropping the handle cancels the task.
pub(crate) struct DispatcherTaskHandle {
    join_handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl DispatcherTaskHandle {
    /// Stop consuming and wait for the task to exit.
    pub(crate) async fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.await;
        }
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(|join_handle| join_handle.is_finished())
    }
}

impl Drop for DispatcherTaskHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// What happened to a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    /// Handed to its waiting caller.
    Delivered,
    /// Well-formed, but nobody is waiting for this ID.
    Unmatched,
    /// Not a reply envelope.
    Malformed,
}

/// Spawn the dispatcher over an already-started reply consumer.
pub(crate) fn spawn_dispatcher_task<C: ReplyConsumer>(
    consumer: C,
    registry: Arc<PendingReplies>,
) -> DispatcherTaskHandle {
    let cancel_token = CancellationToken::new();
    let token_clone = cancel_token.clone();

    let join_handle = tokio::spawn(dispatcher_loop(consumer, registry, token_clone));

    DispatcherTaskHandle {
        join_handle: Some(join_handle),
        cancel_token,
    }
}

async fn dispatcher_loop<C: ReplyConsumer>(
    mut consumer: C,
    registry: Arc<PendingReplies>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                debug!(
                    target: "manpower_bridge::dispatcher",
                    "Dispatcher cancelled, shutting down"
                );
                break;
            }

            next = consumer.next_delivery() => {
                match next {
                    Some(Ok(delivery)) => {
                        handle_delivery(delivery, &registry).await;
                    }
                    Some(Err(e)) => {
                        // The broker client recovers from transient errors on its own
                        warn!(
                            target: "manpower_bridge::dispatcher",
                            "Reply consumer error: {}",
                            e
                        );
                    }
                    None => {
                        info!(
                            target: "manpower_bridge::dispatcher",
                            "Reply stream ended, failing {} pending call(s)",
                            registry.pending_count()
                        );
                        registry.fail_all(DeliveryFailure::closed("bridge: reply stream ended"));
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = consumer.close().await {
        warn!(
            target: "manpower_bridge::dispatcher",
            "Failed to release reply queue: {}",
            e
        );
    }
}

/// Decode, acknowledge and route one delivery.
async fn handle_delivery<D: Delivery>(delivery: D, registry: &PendingReplies) -> DispatchOutcome {
    let decoded = InboundEnvelope::from_slice(delivery.payload());

    if let Err(e) = delivery.ack().await {
        warn!(
            target: "manpower_bridge::dispatcher",
            "Failed to acknowledge reply: {}",
            e
        );
    }

    match decoded {
        Ok(envelope) => {
            let id = envelope.id;
            if registry.deliver(envelope) {
                debug!(
                    target: "manpower_bridge::dispatcher",
                    "Delivered reply {}",
                    id
                );
                DispatchOutcome::Delivered
            } else {
                debug!(
                    target: "manpower_bridge::dispatcher",
                    "Reply {} has no waiting caller, dropping",
                    id
                );
                DispatchOutcome::Unmatched
            }
        }
        Err(e) => {
            warn!(
                target: "manpower_bridge::dispatcher",
                "Dropping malformed reply: {}",
                e
            );
            DispatchOutcome::Malformed
        }
    }
}
