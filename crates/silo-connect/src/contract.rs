//! Connector capability contract and standardized ingestion data contract

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One item produced by a connector fetch
///
/// An item either carries an inline `payload` to be staged, or is already
/// materialized in the lake (`lake_path` set), in which case staging passes
/// it through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestedItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lake_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl IngestedItem {
    /// Item carrying an inline payload for the staging writer
    pub fn from_payload(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }

    /// Item already written to the lake by the connector itself
    pub fn materialized(
        source_path: impl Into<String>,
        lake_path: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            source_path: Some(source_path.into()),
            lake_path: Some(lake_path.into()),
            size_bytes: Some(size_bytes),
            payload: None,
        }
    }
}

/// Standardized output of a connector's fetch operation
///
/// `success = false` short-circuits the rest of the pipeline: staging and
/// loading are skipped entirely and the run is audited as a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    pub protocol: String,
    pub success: bool,

    #[serde(default)]
    pub items: Vec<IngestedItem>,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl IngestionResult {
    /// Successful fetch with the given items
    pub fn success(protocol: impl Into<String>, items: Vec<IngestedItem>) -> Self {
        Self {
            protocol: protocol.into(),
            success: true,
            items,
            metadata: BTreeMap::new(),
            error_message: None,
        }
    }

    /// Connector-reported operational failure
    pub fn failure(protocol: impl Into<String>, error_message: impl Into<String>) -> Self {
        let message = error_message.into();
        Self {
            protocol: protocol.into(),
            success: false,
            items: Vec::new(),
            metadata: BTreeMap::new(),
            error_message: Some(message),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Error text for auditing: the explicit message, or `metadata.error`
    pub fn error_text(&self) -> Option<String> {
        if let Some(ref message) = self.error_message {
            return Some(message.clone());
        }
        self.metadata.get("error").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Capability contract every source integration must satisfy
///
/// Within one pipeline run the sequence is strictly `connect` -> `fetch_data`
/// -> `close`, and `close` is always invoked once fetch returns, success or
/// not.
#[async_trait]
pub trait Connector: Send {
    /// Initialize and validate access to the external source
    async fn connect(&mut self) -> Result<()>;

    /// Fetch source data and return it in standardized ingestion format
    async fn fetch_data(&mut self, query: &str) -> Result<IngestionResult>;

    /// Release all connector resources; idempotent and infallible
    async fn close(&mut self);
}
