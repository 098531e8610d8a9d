//! SQLite source connector
//!
//! Same row semantics as the Postgres source, against an embedded
//! single-file database.

use crate::config::{ConfigLoader, ConnectorConfig};
use crate::contract::{Connector, IngestedItem, IngestionResult};
use crate::engine::DwEngine;
use crate::error::{ConnectError, Result};
use crate::registry::ConnectorContext;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Register under the `sqlite` protocol
pub fn create(
    config: &ConnectorConfig,
    context: &ConnectorContext,
) -> Result<Box<dyn Connector>> {
    let merged = ConfigLoader::new()
        .env_prefix("SQLITE")
        .explicit(config)
        .required(&["database_path"])
        .load()?;

    Ok(Box::new(SqliteConnector {
        config: merged,
        engines: Arc::clone(&context.engines),
        reuse: context.reuse,
        engine: None,
    }))
}

pub struct SqliteConnector {
    config: ConnectorConfig,
    engines: Arc<crate::cache::EngineCache>,
    reuse: bool,
    engine: Option<DwEngine>,
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&mut self) -> Result<()> {
        info!(config = %self.config.redacted(), "Connecting SQLite connector");

        let path = self.config.require_str("database_path")?;
        let engine = self
            .engines
            .get_or_create("sqlite", &self.config, self.reuse, || {
                DwEngine::sqlite(&path)
            })?;

        engine.health_check().await.map_err(|error| {
            ConnectError::connection(format!("SQLite source unreadable: {error}"))
        })?;

        self.engine = Some(engine);
        Ok(())
    }

    async fn fetch_data(&mut self, query: &str) -> Result<IngestionResult> {
        let engine = self.engine.as_ref().ok_or_else(|| {
            ConnectError::connection("SQLite connector is not connected. Call connect() first")
        })?;

        if query.trim().is_empty() {
            return Err(ConnectError::configuration(
                "query cannot be empty. Expected a SQL statement",
            ));
        }

        debug!("Running SQLite source query");
        let rows = engine.query(query, &[]).await?;

        let items: Vec<IngestedItem> = rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, Value> = row
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect();
                IngestedItem::from_payload(Value::Object(object))
            })
            .collect();

        let count = items.len();
        Ok(IngestionResult::success("sqlite", items)
            .with_metadata("rows", json!(count)))
    }

    async fn close(&mut self) {
        debug!("Closing SQLite connector");
        self.engine = None;
    }
}
