//! A stand-in for a remote manpower service.
//!
//! Requests published to the service queue are captured raw; the test then
//! decides when (and whether) to answer each one, which makes reordering and
//! silence as easy to express as a normal reply.

use std::sync::Arc;

use manpower_bridge::transport::{Delivery, MemoryTransport, ReplyConsumer, Transport};
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// A request as seen by the remote service.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Value,
}

impl CapturedRequest {
    pub fn id(&self) -> &str {
        self.body["id"].as_str().unwrap_or_default()
    }

    pub fn message_type(&self) -> &str {
        self.body["message_type"].as_str().unwrap_or_default()
    }

    pub fn reply_to(&self) -> &str {
        self.body["reply_to"].as_str().unwrap_or_default()
    }

    pub fn data(&self) -> &Value {
        &self.body["message_data"]
    }
}

/// Capture every request published to `queue`.
pub fn capture_requests(
    transport: Arc<MemoryTransport>,
    queue: &str,
) -> mpsc::UnboundedReceiver<CapturedRequest> {
    let (tx, rx) = mpsc::unbounded_channel();
    let queue = queue.to_string();

    tokio::spawn(async move {
        let Ok(mut consumer) = transport.consume(&queue).await else {
            return;
        };
        while let Some(Ok(delivery)) = consumer.next_delivery().await {
            let body = serde_json::from_slice(delivery.payload()).unwrap_or(Value::Null);
            let _ = delivery.ack().await;
            if tx.send(CapturedRequest { body }).is_err() {
                break;
            }
        }
    });

    rx
}

/// Answer `request` with `message_data` on the queue it named.
pub async fn reply(transport: &MemoryTransport, request: &CapturedRequest, message_data: Value) {
    let body = json!({"id": request.id(), "message_data": message_data});
    transport
        .publish(request.reply_to(), serde_json::to_vec(&body).unwrap())
        .await
        .unwrap();
}

/// Answer every request on `queue` using `respond`; `None` leaves it unanswered.
pub fn serve<F>(transport: Arc<MemoryTransport>, queue: &str, respond: F)
where
    F: Fn(&CapturedRequest) -> Option<Value> + Send + 'static,
{
    let mut requests = capture_requests(Arc::clone(&transport), queue);
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            if let Some(data) = respond(&request) {
                reply(&transport, &request, data).await;
            }
        }
    });
}
