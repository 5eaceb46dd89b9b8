use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("broker rejected message: {0}")]
    Rejected(String),
    #[error("no acknowledgment within {0:?}")]
    Timeout(Duration),
    #[error("flush failed: {0}")]
    Flush(String),
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One record ready to go onto the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub partition: i32,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Destination for normalized records.
///
/// `publish` resolves once the broker has acknowledged the message; `flush`
/// pushes out anything the client is still buffering.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<(), PublishError>;
    async fn flush(&self) -> Result<(), PublishError>;
}

#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    ack_timeout: Duration,
    flush_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &Config) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", &config.acks)
            .set("retries", config.retries.to_string())
            .set("linger.ms", config.linger_ms.to_string())
            .set(
                "client.id",
                concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            )
            .create()?;

        info!(
            brokers = %config.brokers,
            acks = %config.acks,
            retries = config.retries,
            linger_ms = config.linger_ms,
            "kafka producer created"
        );

        Ok(KafkaPublisher {
            producer,
            ack_timeout: config.ack_timeout,
            flush_timeout: config.flush_timeout,
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<(), PublishError> {
        let record = FutureRecord::to(&message.topic)
            .partition(message.partition)
            .key(&message.key)
            .payload(&message.payload);

        let delivery = tokio::time::timeout(
            self.ack_timeout,
            self.producer.send(record, Timeout::After(self.ack_timeout)),
        )
        .await
        .map_err(|_| PublishError::Timeout(self.ack_timeout))?;

        match delivery {
            Ok(delivery) => {
                debug!(?delivery, topic = %message.topic, "message acknowledged");
                Ok(())
            }
            Err((error, _)) => {
                debug!(?error, topic = %message.topic, "message delivery failed");
                Err(PublishError::Rejected(error.to_string()))
            }
        }
    }

    async fn flush(&self) -> Result<(), PublishError> {
        // librdkafka flushes synchronously, keep it off the runtime workers
        let producer = self.producer.clone();
        let timeout = self.flush_timeout;
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| PublishError::Flush(e.to_string()))?
            .map_err(|e| PublishError::Flush(e.to_string()))
    }
}
