//! PostgreSQL source connector
//!
//! Runs one SQL query per fetch and returns each row as a JSON object
//! payload. Pools come from the engine cache so concurrent pipelines
//! against the same source share connections.

use crate::config::{ConfigLoader, ConnectorConfig};
use crate::contract::{Connector, IngestedItem, IngestionResult};
use crate::engine::{build_postgres_url, DwEngine};
use crate::error::{ConnectError, Result};
use crate::registry::ConnectorContext;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Register under the `postgres` protocol
pub fn create(
    config: &ConnectorConfig,
    context: &ConnectorContext,
) -> Result<Box<dyn Connector>> {
    let merged = ConfigLoader::new()
        .default_value("port", json!(5432))
        .env_prefix("PG")
        .explicit(config)
        .required(&["host", "database", "username", "password"])
        .load()?;

    Ok(Box::new(PostgresConnector {
        config: merged,
        engines: Arc::clone(&context.engines),
        reuse: context.reuse,
        engine: None,
    }))
}

pub struct PostgresConnector {
    config: ConnectorConfig,
    engines: Arc<crate::cache::EngineCache>,
    reuse: bool,
    engine: Option<DwEngine>,
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&mut self) -> Result<()> {
        info!(config = %self.config.redacted(), "Connecting Postgres connector");

        let url = build_postgres_url(&self.config)?;
        let engine = self
            .engines
            .get_or_create("src_postgres", &self.config, self.reuse, || {
                DwEngine::postgres_lazy(&url)
            })?;

        // The pool connects lazily; probe it now so credential problems
        // surface as an expected connection failure
        engine.health_check().await.map_err(|error| {
            ConnectError::connection(format!("Postgres source unreachable: {error}"))
        })?;

        self.engine = Some(engine);
        Ok(())
    }

    async fn fetch_data(&mut self, query: &str) -> Result<IngestionResult> {
        let engine = self.engine.as_ref().ok_or_else(|| {
            ConnectError::connection("Postgres connector is not connected. Call connect() first")
        })?;

        if query.trim().is_empty() {
            return Err(ConnectError::configuration(
                "query cannot be empty. Expected a SQL statement",
            ));
        }

        debug!("Running Postgres source query");
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
        Ok(IngestionResult::success("postgres", items)
            .with_metadata("rows", json!(count)))
    }

    async fn close(&mut self) {
        debug!("Closing Postgres connector");
        // The pool itself stays in the engine cache until shutdown disposal
        self.engine = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_missing_credentials_rejected() {
        let mut config = ConnectorConfig::new();
        config.insert("host", json!("db.internal"));

        let err = create(&config, &ConnectorContext::new()).err().unwrap();
        let message = err.to_string();
        assert!(message.contains("database"));
        assert!(message.contains("username"));
        assert!(message.contains("password"));
    }

    #[tokio::test]
    #[serial]
    async fn test_fetch_before_connect_rejected() {
        let mut config = ConnectorConfig::new();
        config.insert("host", json!("db.internal"));
        config.insert("database", json!("warehouse"));
        config.insert("username", json!("loader"));
        config.insert("password", json!("pw"));

        let mut connector = create(&config, &ConnectorContext::new()).unwrap();
        assert!(connector.fetch_data("SELECT 1").await.is_err());
    }
}
