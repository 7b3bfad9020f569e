//! Outbound publisher task.
//!
//! The single writer to the broker: it drains the bounded outbound queue and
//! publishes envelopes one at a time, in arrival order. Callers never touch
//! the broker connection directly.
//!
//! # Failure Handling
//!
//! A failed publish completes the caller's registry entry with a synthetic
//! publish failure, so the caller fails immediately instead of waiting out
//! its deadline.
//!
//! # 2-Phase Shutdown Protocol
//!
//! 1. **Stop Signal**: `stop()` sends `()` on `stop_tx`
//! 2. **Idle Confirmation**: the task publishes what is already queued, then
//!    sends `()` on `idle_tx` and exits
//!
//! Dropping the handle without `stop()` cancels the task; queued calls are
//! failed without being published.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::DeliveryFailure;
use super::{OutboundEnvelope, PendingReplies};
use crate::transport::Transport;

/// Default capacity of the outbound queue.
///
/// Bounds memory used by requests waiting to be published. When the queue
/// is full new calls are rejected rather than parked.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Handle to a running publisher task.
pub(crate) struct PublisherTaskHandle {
    join_handle: Option<JoinHandle<()>>,
    /// For signaling graceful stop
    stop_tx: Option<oneshot::Sender<()>>,
    /// For receiving idle confirmation
    idle_rx: Option<oneshot::Receiver<()>>,
    cancel_token: CancellationToken,
}

impl PublisherTaskHandle {
    /// Stop after publishing everything already queued.
    pub(crate) async fn stop(&mut self) {
        // Phase 1: Send stop signal
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        // Phase 2: Wait for idle confirmation
        if let Some(idle_rx) = self.idle_rx.take() {
            // If this fails, the task already exited
            let _ = idle_rx.await;
        }

        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.await;
        }
    }

    /// Stop immediately, failing queued calls without publishing them.
    #[cfg(test)]
    fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for PublisherTaskHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Spawn the publisher task.
///
/// # Arguments
/// * `transport` - Broker connection to publish on
/// * `rx` - Receiving end of the outbound queue
/// * `registry` - Pending replies, used to fail calls whose publish failed
pub(crate) fn spawn_publisher_task<T: Transport>(
    transport: Arc<T>,
    rx: mpsc::Receiver<OutboundEnvelope>,
    registry: Arc<PendingReplies>,
) -> PublisherTaskHandle {
    let cancel_token = CancellationToken::new();
    let token_clone = cancel_token.clone();

    let (stop_tx, stop_rx) = oneshot::channel();
    let (idle_tx, idle_rx) = oneshot::channel();

    let join_handle = tokio::spawn(async move {
        publisher_loop(transport, rx, registry, token_clone, stop_rx, idle_tx).await;
    });

    PublisherTaskHandle {
        join_handle: Some(join_handle),
        stop_tx: Some(stop_tx),
        idle_rx: Some(idle_rx),
        cancel_token,
    }
}

async fn publisher_loop<T: Transport>(
    transport: Arc<T>,
    mut rx: mpsc::Receiver<OutboundEnvelope>,
    registry: Arc<PendingReplies>,
    cancel_token: CancellationToken,
    mut stop_rx: oneshot::Receiver<()>,
    idle_tx: oneshot::Sender<()>,
) {
    loop {
        tokio::select! {
            biased;

            result = &mut stop_rx => {
                // A dropped handle also lands here; it cancels rather than drains
                if result.is_err() {
                    fail_queued(&mut rx, &registry);
                    return;
                }
                debug!(
                    target: "manpower_bridge::publisher",
                    "Publisher received stop signal, draining queue"
                );
                rx.close();
                while let Some(envelope) = rx.recv().await {
                    publish_envelope(transport.as_ref(), envelope, &registry).await;
                }
                let _ = idle_tx.send(());
                return;
            }

            _ = cancel_token.cancelled() => {
                debug!(
                    target: "manpower_bridge::publisher",
                    "Publisher cancelled, failing queued calls"
                );
                fail_queued(&mut rx, &registry);
                return;
            }

            msg = rx.recv() => {
                match msg {
                    Some(envelope) => {
                        publish_envelope(transport.as_ref(), envelope, &registry).await;
                    }
                    None => {
                        debug!(
                            target: "manpower_bridge::publisher",
                            "Outbound queue closed, publisher exiting"
                        );
                        return;
                    }
                }
            }
        }
    }
}

/// Close the queue and fail every call still waiting in it.
fn fail_queued(rx: &mut mpsc::Receiver<OutboundEnvelope>, registry: &PendingReplies) {
    rx.close();
    while let Ok(envelope) = rx.try_recv() {
        registry.fail(envelope.id, DeliveryFailure::closed("bridge: publisher stopped"));
    }
}

/// Publish one envelope, failing its caller if the broker rejects it.
async fn publish_envelope<T: Transport>(
    transport: &T,
    envelope: OutboundEnvelope,
    registry: &PendingReplies,
) {
    let body = match envelope.to_bytes() {
        Ok(body) => body,
        Err(e) => {
            warn!(
                target: "manpower_bridge::publisher",
                "Cannot encode {} ({}): {}",
                envelope.message_type,
                envelope.id,
                e
            );
            registry.fail(envelope.id, DeliveryFailure::publish(format!("encode error: {e}")));
            return;
        }
    };

    match transport.publish(&envelope.target_queue, body).await {
        Ok(()) => {
            debug!(
                target: "manpower_bridge::publisher",
                "Published {} ({}) to {}",
                envelope.message_type,
                envelope.id,
                envelope.target_queue
            );
        }
        Err(e) => {
            warn!(
                target: "manpower_bridge::publisher",
                "Publish of {} ({}) to {} failed: {}",
                envelope.message_type,
                envelope.id,
                envelope.target_queue,
                e
            );
            registry.fail(envelope.id, DeliveryFailure::publish(e.to_string()));
        }
    }
}
