//! Append-only pipeline run audit trail
//!
//! One record per run, written exactly once regardless of outcome. The
//! trail is insert-only: records are never updated or deleted. Audit writes
//! are not transactionally coupled to the load itself, so a crash between
//! load-commit and audit-write can leave a loaded batch with no trail
//! (at-least-once load, best-effort audit).

use crate::error::{Result, StageError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use silo_connect::engine::Dialect;
use silo_connect::{DwEngine, SqlValue};
use tracing::{debug, info};

/// Audit table name in the warehouse
pub const AUDIT_TABLE: &str = "etl_audit_log";

/// Terminal status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
        }
    }
}

/// One run's outcome, as persisted to the audit trail
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub run_id: String,
    pub pipeline_name: String,
    pub source_name: String,
    pub protocol: String,
    pub target_table: String,
    pub status: AuditStatus,
    pub rows_loaded: i64,
    pub parquet_files: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Idempotently create the audit table
pub async fn ensure_audit_table(engine: &DwEngine) -> Result<()> {
    let (id_type, ts_type) = match engine.dialect() {
        Dialect::Sqlite => ("INTEGER PRIMARY KEY AUTOINCREMENT", "TIMESTAMP"),
        Dialect::Postgres => ("BIGSERIAL PRIMARY KEY", "TIMESTAMP WITH TIME ZONE"),
    };

    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {AUDIT_TABLE} (
            id            {id_type},
            run_id        TEXT NOT NULL,
            pipeline_name TEXT NOT NULL,
            source_name   TEXT NOT NULL,
            protocol      TEXT NOT NULL,
            target_table  TEXT NOT NULL,
            status        TEXT NOT NULL,
            rows_loaded   BIGINT,
            parquet_files BIGINT,
            error_message TEXT,
            started_at    {ts_type} NOT NULL,
            finished_at   {ts_type}
        )"
    );

    debug!("Ensuring audit table exists");
    engine
        .execute(&ddl, &[])
        .await
        .map_err(|error| StageError::audit_write(error.to_string()))?;
    Ok(())
}

/// Append one audit record; never updates or deletes
pub async fn write_audit_record(engine: &DwEngine, record: &AuditRecord) -> Result<()> {
    let placeholders: Vec<String> = (1..=11).map(|i| engine.placeholder(i)).collect();
    let sql = format!(
        "INSERT INTO {AUDIT_TABLE} (
            run_id, pipeline_name, source_name, protocol, target_table,
            status, rows_loaded, parquet_files, error_message, started_at, finished_at
        ) VALUES ({})",
        placeholders.join(", ")
    );

    let params = [
        SqlValue::Text(record.run_id.clone()),
        SqlValue::Text(record.pipeline_name.clone()),
        SqlValue::Text(record.source_name.clone()),
        SqlValue::Text(record.protocol.clone()),
        SqlValue::Text(record.target_table.clone()),
        SqlValue::Text(record.status.as_str().to_string()),
        SqlValue::Integer(record.rows_loaded),
        SqlValue::Integer(record.parquet_files),
        record
            .error_message
            .clone()
            .map_or(SqlValue::Null, SqlValue::Text),
        SqlValue::Timestamp(record.started_at),
        record
            .finished_at
            .map_or(SqlValue::Null, SqlValue::Timestamp),
    ];

    info!(
        run_id = %record.run_id,
        status = record.status.as_str(),
        "Writing audit record"
    );
    engine
        .execute(&sql, &params)
        .await
        .map_err(|error| StageError::audit_write(error.to_string()))?;
    Ok(())
}
