//! Bounded micro-batch consumption for streaming sources
//!
//! Broker clients themselves are external collaborators; what lives here is
//! the consumption discipline they plug into: poll repeatedly until either a
//! message-count ceiling or a wall-clock deadline elapses, whichever comes
//! first. That caps how long a single fetch may block. There is no
//! cancellation token; bounding is purely count/time based.

use crate::contract::{IngestedItem, IngestionResult};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// One message pulled off a stream
#[derive(Debug, Clone, Default)]
pub struct StreamMessage {
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub metadata: BTreeMap<String, Value>,
}

/// Minimal polling contract a broker client must satisfy
#[async_trait]
pub trait MessagePoller: Send {
    /// Wait up to `timeout` for one message; `None` means the poll timed out
    async fn poll(&mut self, timeout: Duration) -> Result<Option<StreamMessage>>;
}

/// Bounds for one micro-batch consumption loop
#[derive(Debug, Clone)]
pub struct BatchLimits {
    /// Message-count ceiling for the batch
    pub max_messages: usize,
    /// Wall-clock deadline for the whole batch
    pub max_wait: Duration,
    /// Timeout passed to each individual poll
    pub poll_timeout: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_messages: 500,
            max_wait: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(1),
        }
    }
}

/// Consume one bounded micro-batch from the poller
pub async fn consume_micro_batch<P: MessagePoller>(
    poller: &mut P,
    limits: &BatchLimits,
) -> Result<Vec<StreamMessage>> {
    let deadline = Instant::now() + limits.max_wait;
    let mut messages = Vec::new();

    while messages.len() < limits.max_messages && Instant::now() < deadline {
        if let Some(message) = poller.poll(limits.poll_timeout).await? {
            messages.push(message);
        }
    }

    debug!(count = messages.len(), "Micro-batch consumption finished");
    Ok(messages)
}

/// Decode a raw payload: UTF-8 text, parsed as JSON when possible
pub fn decode_payload(payload: Option<&[u8]>) -> Option<Value> {
    let bytes = payload?;
    let text = String::from_utf8_lossy(bytes).into_owned();
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(text)),
    }
}

/// Normalize one stream message into a flat staging row
pub fn build_record(protocol: &str, stream_name: &str, message: &StreamMessage) -> Map<String, Value> {
    let payload_value = decode_payload(message.payload.as_deref());

    let mut record = Map::new();
    record.insert("protocol".to_string(), json!(protocol));
    record.insert("stream".to_string(), json!(stream_name));
    record.insert(
        "event_time".to_string(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    record.insert(
        "message_key".to_string(),
        message.key.as_ref().map_or(Value::Null, |k| json!(k)),
    );
    record.insert(
        "payload".to_string(),
        payload_value.map_or(Value::Null, |v| json!(v.to_string())),
    );
    record.insert(
        "metadata".to_string(),
        json!(Value::Object(message.metadata.clone().into_iter().collect()).to_string()),
    );
    record
}

/// Standardized ingestion result for a consumed micro-batch
///
/// The records travel as one array payload; the staging writer turns the
/// array into one row per message.
pub fn build_success_result(
    protocol: &str,
    stream_name: &str,
    records: Vec<Map<String, Value>>,
) -> IngestionResult {
    let messages = records.len();

    let items = if records.is_empty() {
        Vec::new()
    } else {
        vec![IngestedItem::from_payload(Value::Array(
            records.into_iter().map(Value::Object).collect(),
        ))]
    };

    IngestionResult::success(protocol, items)
        .with_metadata("stream", json!(stream_name))
        .with_metadata("messages", json!(messages))
}
