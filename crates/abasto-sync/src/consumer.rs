//! # Sale Batch Consumer
//!
//! The long-running ingestion loop. Delivery semantics:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Per-Message Outcome Table                               │
//! │                                                                         │
//! │  parse + apply OK        → commit offset                               │
//! │  transient infra failure → sleep retry_delay, apply again (in place)   │
//! │  poison (bad payload,    → publish to dead-letter topic,              │
//! │   domain violation)         THEN commit offset                         │
//! │                                                                         │
//! │  The offset is never committed before the batch is either durable in  │
//! │  the database or parked on the dead-letter topic. A crash between     │
//! │  apply and commit replays the batch; idempotency absorbs it.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::producer::FutureProducer;
use rdkafka::Message;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use abasto_core::SaleBatchMessage;
use abasto_db::Gateway;

use crate::apply::apply_batch;
use crate::broker::{publish, BrokerConfig};
use crate::error::SyncResult;

/// The sale-ingestion consumer.
pub struct SyncConsumer {
    gateway: Gateway,
    config: BrokerConfig,
    consumer: StreamConsumer,
    producer: FutureProducer,
}

impl SyncConsumer {
    /// Builds the consumer and its dead-letter producer.
    pub fn new(gateway: Gateway, config: BrokerConfig) -> SyncResult<Self> {
        let consumer = config.create_consumer()?;
        let producer = config.create_producer()?;
        Ok(SyncConsumer {
            gateway,
            config,
            consumer,
            producer,
        })
    }

    /// Runs the ingestion loop until the stream ends.
    pub async fn run(&self) {
        info!(topic = %self.config.ventas_topic, "sale ingestion consumer started");
        let mut stream = self.consumer.stream();
        while let Some(message) = stream.next().await {
            match message {
                Ok(m) => self.handle_message(&m).await,
                Err(e) => {
                    error!(error = %e, "broker receive error");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
        warn!("consumer stream ended");
    }

    async fn handle_message(&self, m: &BorrowedMessage<'_>) {
        let raw = match m.payload().map(std::str::from_utf8) {
            Some(Ok(raw)) => raw,
            Some(Err(_)) | None => {
                warn!(offset = m.offset(), "dead-lettering non-utf8/empty payload");
                // keep the original bytes recoverable for replay
                let encoded = BASE64.encode(m.payload().unwrap_or_default());
                if self
                    .dead_letter(&encoded, "payload is not utf-8; base64-encoded")
                    .await
                {
                    self.commit(m);
                }
                return;
            }
        };

        let batch: SaleBatchMessage = match serde_json::from_str(raw) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(offset = m.offset(), error = %e, "malformed batch, dead-lettering");
                if self.dead_letter(raw, &e.to_string()).await {
                    self.commit(m);
                }
                return;
            }
        };

        // Retry transient failures in place; the offset stays put so a
        // crash mid-retry just redelivers.
        loop {
            match apply_batch(&self.gateway, &batch).await {
                Ok(_) => {
                    self.commit(m);
                    return;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        sucursal_id = batch.sucursal_id,
                        error = %e,
                        "transient failure applying batch, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        sucursal_id = batch.sucursal_id,
                        error = %e,
                        "poison batch, dead-lettering"
                    );
                    if self.dead_letter(raw, &e.to_string()).await {
                        self.commit(m);
                    }
                    return;
                }
            }
        }
    }

    /// Parks a batch on the dead-letter topic. Returns whether it
    /// landed; on failure the caller leaves the offset uncommitted so
    /// the batch comes back around.
    async fn dead_letter(&self, raw: &str, reason: &str) -> bool {
        let id = Uuid::new_v4();
        let envelope = dlq_envelope(id, reason, raw);
        match publish(
            &self.producer,
            &self.config.dead_letter_topic,
            &id.to_string(),
            &envelope,
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to dead-letter batch");
                false
            }
        }
    }

    fn commit(&self, m: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(m, CommitMode::Async) {
            error!(error = %e, "offset commit failed");
        }
    }
}

/// Dead-letter envelope body. Undecodable payloads arrive here already
/// base64-encoded so the original bytes stay recoverable for replay.
fn dlq_envelope(id: Uuid, reason: &str, payload: &str) -> String {
    json!({
        "id": id,
        "error": reason,
        "payload": payload,
    })
    .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn binary_payload_survives_the_envelope_round_trip() {
        let bytes: &[u8] = &[0xff, 0xfe, 0x00, 0x41];
        let encoded = BASE64.encode(bytes);

        let envelope = dlq_envelope(Uuid::new_v4(), "payload is not utf-8; base64-encoded", &encoded);

        let parsed: serde_json::Value = serde_json::from_str(&envelope).unwrap();
        assert_eq!(parsed["error"], "payload is not utf-8; base64-encoded");
        let recovered = BASE64
            .decode(parsed["payload"].as_str().unwrap())
            .unwrap();
        assert_eq!(recovered, bytes);
    }
}
