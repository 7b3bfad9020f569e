//! NATS JetStream transport.
//!
//! Each queue name is a JetStream subject backed by its own work-queue
//! stream, so a message is kept until exactly one consumer acknowledges it.
//! A reply queue is read through a pull consumer with explicit
//! acknowledgment. Every bridge instance consumes a reply queue of its own,
//! and deletes the backing stream when it closes the consumer.

use std::io;
use std::time::Duration;

use async_nats::jetstream::consumer::pull::{Config as PullConsumerConfig, Stream as PullStream};
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy};
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, Stream};
use async_nats::jetstream::{self, Context as JetStreamContext};
use dashmap::DashMap;
use futures::StreamExt;
use log::{debug, info};

use super::{Delivery, ReplyConsumer, Transport};

/// Connection timeout when dialing the broker.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redelivery window for unacknowledged replies.
const ACK_WAIT: Duration = Duration::from_secs(30);

/// Client name reported to the NATS server.
const CLIENT_NAME: &str = "manpower-bridge";

/// Transport over a NATS JetStream connection.
pub struct NatsTransport {
    jetstream: JetStreamContext,
    /// Streams already ensured, keyed by queue name
    streams: DashMap<String, Stream>,
}

impl NatsTransport {
    /// Connect to the broker at `url`.
    pub async fn connect(url: &str) -> io::Result<Self> {
        let client = async_nats::ConnectOptions::new()
            .name(CLIENT_NAME)
            .connection_timeout(CONNECT_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string()))?;

        info!(
            target: "manpower_bridge::transport",
            "Connected to NATS at {}",
            url
        );

        Ok(Self {
            jetstream: jetstream::new(client),
            streams: DashMap::new(),
        })
    }

    /// Get or create the work-queue stream that backs `queue`.
    async fn ensure_stream(&self, queue: &str) -> io::Result<Stream> {
        if let Some(stream) = self.streams.get(queue) {
            return Ok(stream.value().clone());
        }

        let config = StreamConfig {
            name: stream_name(queue),
            subjects: vec![queue.to_string()],
            retention: RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        let stream = self
            .jetstream
            .get_or_create_stream(config)
            .await
            .map_err(io::Error::other)?;

        debug!(
            target: "manpower_bridge::transport",
            "Stream {} ready for queue {}",
            stream_name(queue),
            queue
        );
        self.streams.insert(queue.to_string(), stream.clone());
        Ok(stream)
    }
}

impl Transport for NatsTransport {
    type Consumer = NatsConsumer;

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> io::Result<()> {
        self.ensure_stream(queue).await?;

        // Wait for the stream ack so a lost publish surfaces as an error
        let ack = self
            .jetstream
            .publish(queue.to_string(), payload.into())
            .await
            .map_err(io::Error::other)?;
        ack.await.map_err(io::Error::other)?;

        Ok(())
    }

    async fn consume(&self, queue: &str) -> io::Result<NatsConsumer> {
        let stream = self.ensure_stream(queue).await?;
        let durable_name = consumer_name(queue);

        let consumer = stream
            .get_or_create_consumer(
                &durable_name,
                PullConsumerConfig {
                    durable_name: Some(durable_name.clone()),
                    deliver_policy: DeliverPolicy::All,
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: ACK_WAIT,
                    ..Default::default()
                },
            )
            .await
            .map_err(io::Error::other)?;

        let messages = consumer.messages().await.map_err(io::Error::other)?;

        info!(
            target: "manpower_bridge::transport",
            "Consuming {} with durable consumer {}",
            queue,
            durable_name
        );

        Ok(NatsConsumer {
            messages,
            jetstream: self.jetstream.clone(),
            stream_name: stream_name(queue),
        })
    }
}

/// Pull consumer over one JetStream stream.
pub struct NatsConsumer {
    messages: PullStream,
    jetstream: JetStreamContext,
    stream_name: String,
}

impl ReplyConsumer for NatsConsumer {
    type Delivery = NatsDelivery;

    async fn next_delivery(&mut self) -> Option<io::Result<NatsDelivery>> {
        let next = self.messages.next().await?;
        Some(
            next.map(|message| NatsDelivery { message })
                .map_err(io::Error::other),
        )
    }

    async fn close(self) -> io::Result<()> {
        drop(self.messages);
        self.jetstream
            .delete_stream(&self.stream_name)
            .await
            .map_err(io::Error::other)?;

        debug!(
            target: "manpower_bridge::transport",
            "Deleted stream {}",
            self.stream_name
        );
        Ok(())
    }
}

/// Message pulled from JetStream.
pub struct NatsDelivery {
    message: jetstream::Message,
}

impl Delivery for NatsDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    async fn ack(self) -> io::Result<()> {
        self.message.ack().await.map_err(io::Error::other)
    }
}

/// Stream names may not contain `.`, `*`, `>` or whitespace.
fn stream_name(queue: &str) -> String {
    sanitize(queue).to_uppercase()
}

/// Durable consumer names follow the same character rules as streams.
fn consumer_name(queue: &str) -> String {
    format!("{}-bridge", sanitize(queue))
}

fn sanitize(queue: &str) -> String {
    queue
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
