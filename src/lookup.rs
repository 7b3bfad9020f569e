//! Typed call sites for the remote manpower services.
//!
//! Each lookup is a method on [`RpcClient`](crate::bridge::RpcClient) with an
//! explicit parameter and response schema. The message type sent on the wire
//! is the method name.
//!
//! | Service      | Lookups                                                    |
//! |--------------|------------------------------------------------------------|
//! | organization | organization, location, structure, job, job level          |
//! | employee     | employee                                                   |
//! | user         | user                                                       |

mod employee;
mod job;
mod organization;
mod user;

pub use employee::Employee;
pub use job::{Job, JobLevel};
pub use organization::{Organization, OrganizationLocation, OrganizationStructure};
pub use user::User;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use serde_json::{Map, Value};
    use tokio::sync::mpsc;

    use crate::bridge::{InboundEnvelope, OutboundEnvelope, PendingReplies, RpcClient};
    use crate::config::BridgeSettings;

    /// A client whose requests are answered in-process by `respond`.
    ///
    /// The responder sees each outbound envelope and returns the reply's
    /// `message_data`.
    pub(crate) fn client_answering<F>(respond: F) -> RpcClient
    where
        F: Fn(&OutboundEnvelope) -> Value + Send + 'static,
    {
        let registry = Arc::new(PendingReplies::new());
        let (tx, mut rx) = mpsc::channel::<OutboundEnvelope>(16);
        let client = RpcClient::new(
            Arc::clone(&registry),
            tx,
            Arc::new(BridgeSettings::default()),
        );

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let data = match respond(&envelope) {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                registry.deliver(InboundEnvelope::new(envelope.id, data));
            }
        });

        client
    }
}
