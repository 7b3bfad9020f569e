//! Request/reply facade.
//!
//! [`RpcClient::call`] turns one publish plus one correlated reply into a
//! single awaitable result:
//!
//! 1. Generate a correlation ID and register a waiter for it
//! 2. Queue the envelope for the publisher task (rejected when full)
//! 3. Wait for the reply, the deadline or cancellation, whichever is first
//! 4. Decode the reply, or surface the remote error it carries
//!
//! Every exit path removes the registry entry. If the caller drops the
//! future mid-flight, a drop guard does the same.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::registry::{DeliveryFailure, FailureKind, Reply};
use super::{CorrelationId, InboundEnvelope, OutboundEnvelope, PendingReplies};
use crate::config::{BridgeSettings, RemoteQueues};
use crate::error::{RpcError, RpcResult};

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Deadline for this call instead of the configured one.
    pub timeout: Option<Duration>,
    /// Abandon the call when this token is cancelled.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Cheaply cloneable handle for issuing remote calls.
///
/// All clones share one registry and one outbound queue. Usable from any
/// number of concurrent tasks.
#[derive(Clone)]
pub struct RpcClient {
    registry: Arc<PendingReplies>,
    outbound: mpsc::Sender<OutboundEnvelope>,
    settings: Arc<BridgeSettings>,
}

impl RpcClient {
    pub(crate) fn new(
        registry: Arc<PendingReplies>,
        outbound: mpsc::Sender<OutboundEnvelope>,
        settings: Arc<BridgeSettings>,
    ) -> Self {
        Self {
            registry,
            outbound,
            settings,
        }
    }

    /// Queue names of the remote services.
    pub fn queues(&self) -> &RemoteQueues {
        &self.settings.queues
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Call `message_type` on the service behind `queue` with the default options.
    pub async fn call<P, R>(&self, queue: &str, message_type: &str, params: &P) -> RpcResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_with(queue, message_type, params, CallOptions::default())
            .await
    }

    /// Call `message_type` on the service behind `queue`.
    ///
    /// `params` must serialize to a JSON object; it becomes `message_data`.
    pub async fn call_with<P, R>(
        &self,
        queue: &str,
        message_type: &str,
        params: &P,
        options: CallOptions,
    ) -> RpcResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.settings.timeout_for(message_type));
        let message_data = encode_params(message_type, params)?;

        let id = CorrelationId::generate();
        let reply_rx = self.registry.register(id).ok_or_else(|| {
            error!(
                target: "manpower_bridge::client",
                "Correlation ID {} already pending for {}",
                id,
                message_type
            );
            RpcError::DuplicateCorrelation {
                message_type: message_type.to_string(),
            }
        })?;
        let _guard = PendingGuard {
            registry: &self.registry,
            id,
        };

        self.enqueue(OutboundEnvelope::new(
            id,
            queue,
            message_type,
            message_data,
            &self.settings.reply_queue,
        ))?;

        debug!(
            target: "manpower_bridge::client",
            "Sent {} ({}) to {}, {} pending",
            message_type,
            id,
            queue,
            self.registry.pending_count()
        );

        let envelope =
            wait_for_reply(message_type, reply_rx, timeout, options.cancel.as_ref()).await?;
        decode_reply(message_type, envelope)
    }

    fn enqueue(&self, envelope: OutboundEnvelope) -> RpcResult<()> {
        let message_type = envelope.message_type.clone();
        self.outbound.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(
                    target: "manpower_bridge::client",
                    "Outbound queue full, rejecting {}",
                    message_type
                );
                RpcError::QueueFull { message_type }
            }
            mpsc::error::TrySendError::Closed(_) => RpcError::BridgeClosed {
                message_type,
                reason: "publisher stopped".to_string(),
            },
        })
    }
}

/// Removes the registry entry when the call ends, however it ends.
struct PendingGuard<'a> {
    registry: &'a PendingReplies,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.forget(self.id);
    }
}

fn encode_params<P: Serialize + ?Sized>(
    message_type: &str,
    params: &P,
) -> RpcResult<Map<String, Value>> {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RpcError::Encode {
            message_type: message_type.to_string(),
            message: format!("parameters must be a JSON object, got {other}"),
        }),
        Err(e) => Err(RpcError::Encode {
            message_type: message_type.to_string(),
            message: e.to_string(),
        }),
    }
}

async fn wait_for_reply(
    message_type: &str,
    reply_rx: oneshot::Receiver<Reply>,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> RpcResult<InboundEnvelope> {
    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;

        _ = cancelled => {
            debug!(
                target: "manpower_bridge::client",
                "{} cancelled by caller",
                message_type
            );
            Err(RpcError::Cancelled {
                message_type: message_type.to_string(),
            })
        }

        result = tokio::time::timeout(timeout, reply_rx) => match result {
            Ok(Ok(Ok(envelope))) => Ok(envelope),
            Ok(Ok(Err(failure))) => Err(failure_to_error(message_type, failure)),
            Ok(Err(_)) => Err(RpcError::BridgeClosed {
                message_type: message_type.to_string(),
                reason: "reply channel dropped".to_string(),
            }),
            Err(_) => {
                warn!(
                    target: "manpower_bridge::client",
                    "{} timed out after {:?}",
                    message_type,
                    timeout
                );
                Err(RpcError::Timeout {
                    message_type: message_type.to_string(),
                    timeout,
                })
            }
        },
    }
}

fn failure_to_error(message_type: &str, failure: DeliveryFailure) -> RpcError {
    let message_type = message_type.to_string();
    match failure.kind {
        FailureKind::Publish => RpcError::Publish {
            message_type,
            reason: failure.reason,
        },
        FailureKind::Closed => RpcError::BridgeClosed {
            message_type,
            reason: failure.reason,
        },
    }
}

fn decode_reply<R: DeserializeOwned>(message_type: &str, envelope: InboundEnvelope) -> RpcResult<R> {
    if let Some(message) = envelope.remote_error() {
        debug!(
            target: "manpower_bridge::client",
            "{} ({}) answered with error: {}",
            message_type,
            envelope.id,
            message
        );
        return Err(RpcError::Remote {
            message_type: message_type.to_string(),
            message,
        });
    }

    serde_json::from_value(Value::Object(envelope.message_data)).map_err(|source| {
        RpcError::Decode {
            message_type: message_type.to_string(),
            source,
        }
    })
}
