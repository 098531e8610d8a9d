//! The pipeline run state machine
//!
//! Sequence per run: ensure the audit table, construct and connect the
//! connector, fetch (with close always paired), stage, load, audit. A
//! connector-reported ingestion failure is an expected operational outcome
//! and is returned, not raised; anything else is audited as a failure and
//! then propagated to the caller.

use crate::error::Result;
use chrono::Utc;
use serde::Serialize;
use silo_connect::{ConnectorConfig, ConnectorRegistry, DwEngine};
use silo_stage::{
    ensure_audit_table, load_parquet_files, stage_ingestion_result, write_audit_record,
    AuditRecord, AuditStatus,
};
use std::path::PathBuf;
use tracing::{error, info};
use uuid::Uuid;

/// Inputs for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineParams {
    pub connector_config: ConnectorConfig,
    pub query: String,
    pub source_name: String,
    pub target_table: String,
    pub lake_path: PathBuf,
    pub schema: Option<String>,
    pub pipeline_name: String,
}

impl PipelineParams {
    pub fn new(
        connector_config: ConnectorConfig,
        query: impl Into<String>,
        source_name: impl Into<String>,
        target_table: impl Into<String>,
        lake_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            connector_config,
            query: query.into(),
            source_name: source_name.into(),
            target_table: target_table.into(),
            lake_path: lake_path.into(),
            schema: Some("public".to_string()),
            pipeline_name: "default".to_string(),
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }
}

/// Structured outcome of a completed (not crashed) run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: AuditStatus,
    pub rows_loaded: u64,
    pub parquet_files: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execute one full pipeline run
pub async fn run_pipeline(
    registry: &ConnectorRegistry,
    dw_engine: &DwEngine,
    params: PipelineParams,
) -> Result<RunOutcome> {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let protocol = params
        .connector_config
        .protocol()
        .unwrap_or_else(|_| "unknown".to_string());

    info!(
        run_id = %run_id,
        pipeline = %params.pipeline_name,
        source = %params.source_name,
        protocol = %protocol,
        "Pipeline run starting"
    );

    ensure_audit_table(dw_engine).await?;

    let audit_base = AuditRecord {
        run_id: run_id.clone(),
        pipeline_name: params.pipeline_name.clone(),
        source_name: params.source_name.clone(),
        protocol: protocol.clone(),
        target_table: params.target_table.clone(),
        status: AuditStatus::Failure,
        rows_loaded: 0,
        parquet_files: 0,
        error_message: None,
        started_at,
        finished_at: None,
    };

    match execute(registry, dw_engine, &params, &run_id, &audit_base).await {
        Ok(outcome) => Ok(outcome),
        Err(pipeline_error) => {
            // Audit the crash before propagating; an audit failure here is
            // logged but must never mask the original error
            let record = AuditRecord {
                error_message: Some(pipeline_error.to_string()),
                finished_at: Some(Utc::now()),
                ..audit_base
            };
            if let Err(audit_error) = write_audit_record(dw_engine, &record).await {
                error!(
                    run_id = %run_id,
                    error = %audit_error,
                    "Failed to write failure audit record"
                );
            }
            error!(run_id = %run_id, error = %pipeline_error, "Pipeline execution failed");
            Err(pipeline_error)
        }
    }
}

async fn execute(
    registry: &ConnectorRegistry,
    dw_engine: &DwEngine,
    params: &PipelineParams,
    run_id: &str,
    audit_base: &AuditRecord,
) -> Result<RunOutcome> {
    let started_at = audit_base.started_at;

    let mut connector = registry.create(&params.connector_config)?;
    connector.connect().await?;

    // close() is paired with connect() regardless of the fetch outcome
    let fetched = connector.fetch_data(&params.query).await;
    connector.close().await;
    let result = fetched?;

    if !result.success {
        let error_message = format!(
            "Ingestion failed: {}",
            result.error_text().unwrap_or_else(|| "unknown".to_string())
        );
        info!(run_id, error = %error_message, "Connector reported ingestion failure");

        let record = AuditRecord {
            error_message: Some(error_message.clone()),
            finished_at: Some(Utc::now()),
            ..audit_base.clone()
        };
        write_audit_record(dw_engine, &record).await?;

        return Ok(RunOutcome {
            run_id: run_id.to_string(),
            status: AuditStatus::Failure,
            rows_loaded: 0,
            parquet_files: 0,
            duration_seconds: None,
            error: Some(error_message),
        });
    }

    let parquet_paths =
        stage_ingestion_result(&result, &params.lake_path, &params.source_name)?;

    let rows_loaded = load_parquet_files(
        dw_engine,
        &parquet_paths,
        &params.target_table,
        params.schema.as_deref(),
    )
    .await?;

    let finished_at = Utc::now();
    let duration_seconds = (finished_at - started_at)
        .num_microseconds()
        .map(|micros| micros as f64 / 1_000_000.0);

    let record = AuditRecord {
        status: AuditStatus::Success,
        rows_loaded: rows_loaded as i64,
        parquet_files: parquet_paths.len() as i64,
        finished_at: Some(finished_at),
        ..audit_base.clone()
    };
    write_audit_record(dw_engine, &record).await?;

    info!(
        run_id,
        rows_loaded,
        parquet_files = parquet_paths.len(),
        "Pipeline run finished successfully"
    );

    Ok(RunOutcome {
        run_id: run_id.to_string(),
        status: AuditStatus::Success,
        rows_loaded,
        parquet_files: parquet_paths.len(),
        duration_seconds,
        error: None,
    })
}
