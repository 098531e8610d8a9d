//! End-to-end pipeline runs against an in-memory warehouse and a temp lake
//!
//! Stub connectors registered under test protocols drive the three outcome
//! paths: success, connector-reported ingestion failure, and a crash during
//! connect.

use async_trait::async_trait;
use serde_json::json;
use silo_connect::{
    ConnectError, Connector, ConnectorConfig, ConnectorContext, ConnectorRegistry,
    DwEngine, IngestedItem, IngestionResult, SqlValue,
};
use silo_pipeline::{run_pipeline, PipelineParams};
use silo_stage::AuditStatus;

/// Deterministic connector returning one `{"id": 1, "val": "a"}` row
struct StaticConnector;

#[async_trait]
impl Connector for StaticConnector {
    async fn connect(&mut self) -> silo_connect::Result<()> {
        Ok(())
    }

    async fn fetch_data(&mut self, _query: &str) -> silo_connect::Result<IngestionResult> {
        Ok(IngestionResult::success(
            "static",
            vec![IngestedItem::from_payload(json!({"id": 1, "val": "a"}))],
        ))
    }

    async fn close(&mut self) {}
}

/// Connector reporting an expected ingestion failure
struct FailingConnector;

#[async_trait]
impl Connector for FailingConnector {
    async fn connect(&mut self) -> silo_connect::Result<()> {
        Ok(())
    }

    async fn fetch_data(&mut self, _query: &str) -> silo_connect::Result<IngestionResult> {
        let mut result = IngestionResult::success("failing", vec![]);
        result.success = false;
        Ok(result.with_metadata("error", json!("404")))
    }

    async fn close(&mut self) {}
}

/// Connector that crashes during connect
struct ExplodingConnector;

#[async_trait]
impl Connector for ExplodingConnector {
    async fn connect(&mut self) -> silo_connect::Result<()> {
        Err(ConnectError::connection("source exploded"))
    }

    async fn fetch_data(&mut self, _query: &str) -> silo_connect::Result<IngestionResult> {
        unreachable!("connect never succeeds")
    }

    async fn close(&mut self) {}
}

fn static_ctor(
    _config: &ConnectorConfig,
    _context: &ConnectorContext,
) -> silo_connect::Result<Box<dyn Connector>> {
    Ok(Box::new(StaticConnector))
}

fn failing_ctor(
    _config: &ConnectorConfig,
    _context: &ConnectorContext,
) -> silo_connect::Result<Box<dyn Connector>> {
    Ok(Box::new(FailingConnector))
}

fn exploding_ctor(
    _config: &ConnectorConfig,
    _context: &ConnectorContext,
) -> silo_connect::Result<Box<dyn Connector>> {
    Ok(Box::new(ExplodingConnector))
}

fn test_registry() -> ConnectorRegistry {
    let mut registry = ConnectorRegistry::new(ConnectorContext::new());
    registry
        .register("static", "StaticConnector", static_ctor)
        .unwrap();
    registry
        .register("failing", "FailingConnector", failing_ctor)
        .unwrap();
    registry
        .register("exploding", "ExplodingConnector", exploding_ctor)
        .unwrap();
    registry
}

fn connector_config(protocol: &str) -> ConnectorConfig {
    let mut config = ConnectorConfig::new();
    config.insert("protocol", json!(protocol));
    config
}

fn params(protocol: &str, lake: &tempfile::TempDir) -> PipelineParams {
    PipelineParams::new(
        connector_config(protocol),
        "unused-query",
        "e2e-source",
        "events",
        lake.path(),
    )
}

async fn audit_rows(engine: &DwEngine) -> Vec<silo_connect::SqlRow> {
    engine
        .query(
            "SELECT run_id, status, target_table, rows_loaded, error_message \
             FROM etl_audit_log ORDER BY id",
            &[],
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_e2e_success_loads_and_audits() {
    let lake = tempfile::tempdir().unwrap();
    let engine = DwEngine::sqlite_in_memory().unwrap();
    let registry = test_registry();

    let outcome = run_pipeline(&registry, &engine, params("static", &lake))
        .await
        .unwrap();

    assert_eq!(outcome.status, AuditStatus::Success);
    assert_eq!(outcome.rows_loaded, 1);
    assert_eq!(outcome.parquet_files, 1);
    assert!(outcome.duration_seconds.is_some());
    assert!(outcome.error.is_none());

    let loaded = engine
        .query("SELECT id, val, _source_file FROM events", &[])
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].get("id"), Some(&SqlValue::Integer(1)));
    assert_eq!(loaded[0].get("val"), Some(&SqlValue::Text("a".to_string())));

    let audits = audit_rows(&engine).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(
        audits[0].get("status"),
        Some(&SqlValue::Text("success".to_string()))
    );
    assert_eq!(
        audits[0].get("target_table"),
        Some(&SqlValue::Text("events".to_string()))
    );
    assert_eq!(
        audits[0].get("run_id"),
        Some(&SqlValue::Text(outcome.run_id.clone()))
    );
}

#[tokio::test]
async fn test_e2e_ingestion_failure_is_returned_not_raised() {
    let lake = tempfile::tempdir().unwrap();
    let engine = DwEngine::sqlite_in_memory().unwrap();
    let registry = test_registry();

    let outcome = run_pipeline(&registry, &engine, params("failing", &lake))
        .await
        .unwrap();

    assert_eq!(outcome.status, AuditStatus::Failure);
    assert_eq!(outcome.rows_loaded, 0);
    assert_eq!(outcome.parquet_files, 0);
    assert!(outcome.error.as_deref().unwrap().contains("404"));

    // no staged files
    assert_eq!(std::fs::read_dir(lake.path()).unwrap().count(), 0);

    let audits = audit_rows(&engine).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(
        audits[0].get("status"),
        Some(&SqlValue::Text("failure".to_string()))
    );
    match audits[0].get("error_message") {
        Some(SqlValue::Text(message)) => assert!(message.contains("404")),
        other => panic!("unexpected error_message: {other:?}"),
    }
}

#[tokio::test]
async fn test_e2e_connect_crash_audits_then_propagates() {
    let lake = tempfile::tempdir().unwrap();
    let engine = DwEngine::sqlite_in_memory().unwrap();
    let registry = test_registry();

    let error = run_pipeline(&registry, &engine, params("exploding", &lake))
        .await
        .unwrap_err();
    assert!(error.to_string().contains("source exploded"));

    let audits = audit_rows(&engine).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(
        audits[0].get("status"),
        Some(&SqlValue::Text("failure".to_string()))
    );
    match audits[0].get("error_message") {
        Some(SqlValue::Text(message)) => assert!(message.contains("source exploded")),
        other => panic!("unexpected error_message: {other:?}"),
    }
}

#[tokio::test]
async fn test_e2e_unknown_protocol_audits_then_propagates() {
    let lake = tempfile::tempdir().unwrap();
    let engine = DwEngine::sqlite_in_memory().unwrap();
    let registry = test_registry();

    let error = run_pipeline(&registry, &engine, params("gopher", &lake))
        .await
        .unwrap_err();
    assert!(error.to_string().contains("gopher"));

    let audits = audit_rows(&engine).await;
    assert_eq!(audits.len(), 1);
}

#[tokio::test]
async fn test_e2e_two_runs_append_two_audit_records() {
    let lake = tempfile::tempdir().unwrap();
    let engine = DwEngine::sqlite_in_memory().unwrap();
    let registry = test_registry();

    let first = run_pipeline(&registry, &engine, params("static", &lake))
        .await
        .unwrap();
    let second = run_pipeline(&registry, &engine, params("static", &lake))
        .await
        .unwrap();

    assert_ne!(first.run_id, second.run_id);

    let audits = audit_rows(&engine).await;
    assert_eq!(audits.len(), 2);

    let loaded = engine.query("SELECT id FROM events", &[]).await.unwrap();
    assert_eq!(loaded.len(), 2);
}
