//! In-memory transport.
//!
//! Simulates a broker entirely within the process. Queues are created on
//! first use, buffer messages until someone consumes them, and hand each
//! message to exactly one of possibly several competing consumers.
//!
//! Persistence, redelivery and network failure are not simulated. Publish
//! failure can be switched on for tests with [`MemoryTransport::fail_publishes`].

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{Delivery, ReplyConsumer, Transport};
use crate::error::LockResultExt;

/// In-process broker.
#[derive(Default)]
pub struct MemoryTransport {
    queues: DashMap<String, Arc<MemoryQueue>>,
    fail_publishes: AtomicBool,
}

struct MemoryQueue {
    /// `None` once the queue is closed; consumers then drain and end.
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    acked: Arc<AtomicUsize>,
}

impl MemoryQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            acked: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Close `queue`: consumers receive what is buffered, then their stream ends.
    pub fn close_queue(&self, queue: &str) {
        self.queue(queue)
            .tx
            .lock()
            .recover_poison("MemoryQueue::tx")
            .take();
    }

    /// Number of deliveries acknowledged on `queue` so far.
    pub fn ack_count(&self, queue: &str) -> usize {
        self.queue(queue).acked.load(Ordering::SeqCst)
    }

    fn queue(&self, name: &str) -> Arc<MemoryQueue> {
        Arc::clone(
            self.queues
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryQueue::new()))
                .value(),
        )
    }

    fn push(&self, queue: &str, payload: Vec<u8>) -> io::Result<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "memory transport: publishing disabled",
            ));
        }

        let queue_handle = self.queue(queue);
        let tx = queue_handle.tx.lock().recover_poison("MemoryQueue::tx");
        match tx.as_ref() {
            Some(tx) => tx
                .send(payload)
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "memory transport: queue gone")),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("memory transport: queue {queue} closed"),
            )),
        }
    }
}

impl Transport for MemoryTransport {
    type Consumer = MemoryConsumer;

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> io::Result<()> {
        self.push(queue, payload)
    }

    async fn consume(&self, queue: &str) -> io::Result<MemoryConsumer> {
        Ok(MemoryConsumer {
            queue: self.queue(queue),
        })
    }
}

/// Consumer of one in-memory queue.
pub struct MemoryConsumer {
    queue: Arc<MemoryQueue>,
}

impl ReplyConsumer for MemoryConsumer {
    type Delivery = MemoryDelivery;

    async fn next_delivery(&mut self) -> Option<io::Result<MemoryDelivery>> {
        let payload = self.queue.rx.lock().await.recv().await?;
        Some(Ok(MemoryDelivery {
            payload,
            acked: Arc::clone(&self.queue.acked),
        }))
    }

    async fn close(self) -> io::Result<()> {
        Ok(())
    }
}

/// Message taken from an in-memory queue.
pub struct MemoryDelivery {
    payload: Vec<u8>,
    acked: Arc<AtomicUsize>,
}

impl Delivery for MemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(self) -> io::Result<()> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
