use futures::stream::{StreamExt, TryStreamExt};
use serde_json::Value;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{Config, PublishMode, PARTITION, PARTITION_KEY, TOPIC};
use crate::publish::{OutboundMessage, PublishError, Publisher};
use crate::telemetry::{NormalizedRecord, RawDeviceRecord, TelemetryError};

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Publish(PublishError),
    #[error("{0}")]
    Flush(PublishError),
}

impl ForwardError {
    /// Failures talking to the broker, as opposed to bad input.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(self, ForwardError::Publish(_) | ForwardError::Flush(_))
    }
}

impl From<TelemetryError> for ForwardError {
    fn from(error: TelemetryError) -> Self {
        match error {
            TelemetryError::Parse(message) => ForwardError::Parse(message),
            TelemetryError::Validation(message) => ForwardError::Validation(message),
        }
    }
}

impl From<PublishError> for ForwardError {
    fn from(error: PublishError) -> Self {
        match error {
            PublishError::Flush(_) => ForwardError::Flush(error),
            _ => ForwardError::Publish(error),
        }
    }
}

/// Parses a posted batch into its elements without validating them.
pub fn parse_batch(body: &str) -> Result<Vec<Value>, TelemetryError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| TelemetryError::Parse(e.to_string()))?;
    match value {
        Value::Array(records) => Ok(records),
        _ => Err(TelemetryError::Validation("not an array".to_string())),
    }
}

fn to_message(record: &NormalizedRecord) -> Result<OutboundMessage, PublishError> {
    Ok(OutboundMessage {
        topic: TOPIC.to_string(),
        partition: PARTITION,
        key: PARTITION_KEY.to_string(),
        payload: serde_json::to_vec(record)?,
    })
}

/// Normalizes a posted batch and publishes one message per record, then
/// flushes the publisher. Returns the number of records published.
///
/// Processing stops at the first failing record. Records published before
/// the failure stay published.
pub async fn normalize_batch(
    body: &str,
    publisher: &dyn Publisher,
    config: &Config,
) -> Result<usize, ForwardError> {
    let start = Instant::now();
    let records = parse_batch(body)?;
    let count = records.len();
    debug!("received batch of {} records", count);

    match config.publish_mode {
        PublishMode::Sequential => publish_sequential(records, publisher).await?,
        PublishMode::Pipelined => {
            publish_pipelined(records, publisher, config.max_in_flight).await?
        }
    }

    publisher.flush().await.map_err(ForwardError::Flush)?;

    info!(
        "published {} records to {} in {:?}",
        count,
        TOPIC,
        start.elapsed()
    );
    Ok(count)
}

async fn publish_sequential(
    records: Vec<Value>,
    publisher: &dyn Publisher,
) -> Result<(), ForwardError> {
    for (index, value) in records.into_iter().enumerate() {
        let record = RawDeviceRecord::from_value(index, value)?.normalize();
        let message = to_message(&record)?;
        publisher.publish(message).await.map_err(|error| {
            error!(?error, index, "failed to publish record");
            ForwardError::Publish(error)
        })?;
    }
    Ok(())
}

async fn publish_pipelined(
    records: Vec<Value>,
    publisher: &dyn Publisher,
    max_in_flight: usize,
) -> Result<(), ForwardError> {
    let messages = records
        .into_iter()
        .enumerate()
        .map(|(index, value)| -> Result<OutboundMessage, ForwardError> {
            let record = RawDeviceRecord::from_value(index, value)?.normalize();
            Ok(to_message(&record)?)
        })
        .collect::<Result<Vec<_>, _>>()?;

    futures::stream::iter(messages)
        .map(|message| publisher.publish(message))
        .buffered(max_in_flight)
        .inspect_err(|error| error!(?error, "failed to publish record"))
        .try_collect::<Vec<()>>()
        .await
        .map_err(ForwardError::Publish)?;
    Ok(())
}

/// Logs a failed batch at the level matching its cause.
pub fn log_failure(error: &ForwardError) {
    match error {
        ForwardError::Parse(_) | ForwardError::Validation(_) => {
            warn!(%error, "rejected telemetry batch")
        }
        ForwardError::Publish(_) | ForwardError::Flush(_) => {
            error!(%error, "failed to deliver telemetry batch")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_batch() {
        assert_eq!(parse_batch("[]").unwrap().len(), 0);
        assert_eq!(parse_batch(r#"[{}, {"a": 1}]"#).unwrap().len(), 2);

        let err = parse_batch(r#"{"uniqueId": "abc"}"#).unwrap_err();
        assert_eq!(err.to_string(), "not an array");

        let err = parse_batch("[{").unwrap_err();
        assert!(matches!(err, TelemetryError::Parse(_)));
    }

    #[test]
    fn test_error_conversion() {
        let err = ForwardError::from(PublishError::Flush("timed out".to_string()));
        assert!(matches!(err, ForwardError::Flush(_)));
        assert!(err.is_delivery_failure());

        let err = ForwardError::from(TelemetryError::Validation("missing uniqueId".to_string()));
        assert!(!err.is_delivery_failure());
        assert_eq!(err.to_string(), "missing uniqueId");
    }

    #[test]
    fn test_to_message_uses_fixed_routing() {
        let record = RawDeviceRecord::from_value(
            0,
            serde_json::json!({
                "uniqueId": "abc",
                "vehicleName": "Car1",
                "timestamp": "t",
                "latitude": 1,
                "longitude": 2,
                "evCanData": {"VehicleState": 0},
            }),
        )
        .unwrap()
        .normalize();
        let message = to_message(&record).unwrap();
        assert_eq!(message.topic, "device.activity.NewCan");
        assert_eq!(message.partition, 0);
        assert_eq!(message.key, "alldata");

        let payload: Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(payload["movementStatus"], "idle");
    }
}
