//! # Broker Setup
//!
//! Kafka client construction. One producer, one consumer group; the
//! consumer runs with auto-commit off so offsets advance only after the
//! database transaction commits.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{debug, info};

use crate::error::SyncResult;

/// Broker connection and topic layout.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// `host:port` bootstrap list.
    pub brokers: String,

    /// Consumer group for the sale-ingestion consumer.
    pub group_id: String,

    /// Topic branch POS stations publish sale batches to.
    pub ventas_topic: String,

    /// Topic poison batches are parked on.
    pub dead_letter_topic: String,

    /// Pause before re-polling after a transient failure.
    pub retry_delay: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            brokers: "localhost:9092".to_string(),
            group_id: "abasto-central".to_string(),
            ventas_topic: "sync_ventas".to_string(),
            dead_letter_topic: "sync_ventas_dlq".to_string(),
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl BrokerConfig {
    /// Builds the producer used for dead-lettering and batch publishing.
    pub fn create_producer(&self) -> SyncResult<FutureProducer> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        info!(brokers = %self.brokers, "kafka producer created");
        Ok(producer)
    }

    /// Builds the sale-batch consumer, subscribed to the ventas topic.
    ///
    /// Auto-commit is off: the consumer loop commits each offset
    /// explicitly once the batch is durably applied (or dead-lettered).
    pub fn create_consumer(&self) -> SyncResult<StreamConsumer> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &self.group_id)
            .set("bootstrap.servers", &self.brokers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;
        consumer.subscribe(&[&self.ventas_topic])?;
        info!(
            brokers = %self.brokers,
            group = %self.group_id,
            topic = %self.ventas_topic,
            "kafka consumer subscribed"
        );
        Ok(consumer)
    }
}

/// Publishes one JSON payload, awaiting broker acknowledgement.
pub(crate) async fn publish(
    producer: &FutureProducer,
    topic: &str,
    key: &str,
    payload: &str,
) -> SyncResult<()> {
    let record = FutureRecord::to(topic).key(key).payload(payload);
    producer
        .send(record, Duration::from_secs(5))
        .await
        .map_err(|(e, _)| e)?;
    debug!(topic, key, "message published");
    Ok(())
}
