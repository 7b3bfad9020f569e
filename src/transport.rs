//! Broker transport seam.
//!
//! The bridge only needs two primitives from a message broker: publish a
//! payload to a named queue, and consume a named queue with manual
//! acknowledgment. Everything broker-specific lives behind these traits.
//!
//! # Implementations
//!
//! - `memory` - In-process queues, used by tests and local development
//! - `nats` - NATS JetStream (durable work-queue streams, explicit ack)

pub mod memory;
pub mod nats;

use std::future::Future;
use std::io;

pub use memory::MemoryTransport;
pub use nats::NatsTransport;

/// Connection to a message broker.
///
/// The bridge holds exactly one publisher (the outbound task) and one
/// consumer (the dispatcher) per transport.
pub trait Transport: Send + Sync + 'static {
    /// Consumer returned by [`Transport::consume`].
    type Consumer: ReplyConsumer;

    /// Publish a payload to `queue`.
    ///
    /// Resolves once the broker has accepted the message.
    fn publish(&self, queue: &str, payload: Vec<u8>)
    -> impl Future<Output = io::Result<()>> + Send;

    /// Start consuming `queue`.
    ///
    /// Every delivery must be acknowledged explicitly.
    fn consume(&self, queue: &str) -> impl Future<Output = io::Result<Self::Consumer>> + Send;
}

/// Stream of deliveries from one queue.
pub trait ReplyConsumer: Send + 'static {
    /// Delivery type yielded by this consumer.
    type Delivery: Delivery;

    /// Wait for the next delivery.
    ///
    /// Returns `None` once the stream has ended for good.
    fn next_delivery(
        &mut self,
    ) -> impl Future<Output = Option<io::Result<Self::Delivery>>> + Send;

    /// Stop consuming and release whatever the broker keeps for this queue.
    fn close(self) -> impl Future<Output = io::Result<()>> + Send;
}

/// A single raw message taken from a queue.
pub trait Delivery: Send {
    /// The raw message body.
    fn payload(&self) -> &[u8];

    /// Acknowledge the message so the broker does not redeliver it.
    fn ack(self) -> impl Future<Output = io::Result<()>> + Send;
}
