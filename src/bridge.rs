//! Request/reply correlation over a message broker.
//!
//! A [`Bridge`] owns the two background tasks that sit between callers and
//! the broker:
//!
//! ```text
//!  RpcClient::call ──► outbound queue ──► publisher ──► remote queue
//!        ▲                                               │
//!        │ oneshot                                       ▼
//!  PendingReplies ◄── dispatcher ◄── reply queue ◄── remote service
//! ```
//!
//! Callers only see [`RpcClient`]. Replies may arrive in any order; each one
//! is matched to its caller by correlation ID and delivered at most once.

mod client;
mod correlation_id;
mod dispatcher;
mod envelope;
mod publisher;
mod registry;
mod timeout;

use std::io;
use std::sync::Arc;

use log::info;
use tokio::sync::mpsc;
use ulid::Ulid;

pub use client::{CallOptions, RpcClient};
pub use correlation_id::CorrelationId;
pub use envelope::{ERROR_KEY, InboundEnvelope, OutboundEnvelope};
pub use publisher::OUTBOUND_QUEUE_CAPACITY;
pub use registry::{DeliveryFailure, FailureKind, PendingReplies, Reply};
pub use timeout::CallTimeout;

use dispatcher::{DispatcherTaskHandle, spawn_dispatcher_task};
use publisher::{PublisherTaskHandle, spawn_publisher_task};

use crate::config::BridgeSettings;
use crate::transport::Transport;

/// Running bridge: publisher, dispatcher and the registry they share.
///
/// Construct one per process with [`Bridge::start`] and hand out
/// [`RpcClient`]s. Dropping the bridge cancels both tasks; prefer
/// [`Bridge::shutdown`] so queued requests are still published.
pub struct Bridge {
    client: RpcClient,
    reply_queue: String,
    registry: Arc<PendingReplies>,
    publisher: PublisherTaskHandle,
    dispatcher: DispatcherTaskHandle,
}

impl Bridge {
    /// Start consuming a reply queue of this instance's own and begin
    /// accepting calls.
    ///
    /// The queue name is `settings.reply_queue` followed by a fresh instance
    /// ID, so several bridges sharing one broker never consume each other's
    /// replies. Fails if the reply queue cannot be consumed. Replies are
    /// only accepted once this returns, so no call can be issued before the
    /// dispatcher is listening.
    pub async fn start<T: Transport>(
        transport: Arc<T>,
        mut settings: BridgeSettings,
    ) -> io::Result<Self> {
        settings.reply_queue = instance_reply_queue(&settings.reply_queue);
        let consumer = transport.consume(&settings.reply_queue).await?;

        let registry = Arc::new(PendingReplies::new());
        let (tx, rx) = mpsc::channel(settings.outbound_queue_capacity);

        let dispatcher = spawn_dispatcher_task(consumer, Arc::clone(&registry));
        let publisher = spawn_publisher_task(transport, rx, Arc::clone(&registry));

        info!(
            target: "manpower_bridge::client",
            "Bridge started, replies on {}",
            settings.reply_queue
        );

        let reply_queue = settings.reply_queue.clone();
        let client = RpcClient::new(Arc::clone(&registry), tx, Arc::new(settings));
        Ok(Self {
            client,
            reply_queue,
            registry,
            publisher,
            dispatcher,
        })
    }

    /// A new handle for issuing calls.
    pub fn client(&self) -> RpcClient {
        self.client.clone()
    }

    /// The queue this bridge consumes replies from.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Publish what is queued, stop both tasks, and fail calls still waiting.
    pub async fn shutdown(mut self) {
        self.publisher.stop().await;
        self.dispatcher.stop().await;

        let pending = self.registry.pending_count();
        self.registry
            .fail_all(DeliveryFailure::closed("bridge: shut down"));

        info!(
            target: "manpower_bridge::client",
            "Bridge stopped, {} pending call(s) failed",
            pending
        );
    }
}

fn instance_reply_queue(prefix: &str) -> String {
    format!("{}.{}", prefix, Ulid::new().to_string().to_lowercase())
}
