//! Staging writer: ingestion results to partitioned Parquet files
//!
//! Layout: `<lake>/<protocol>/<source>/<yyyy-mm-dd>/<source>_<timestamp>.parquet`
//! with microsecond timestamps so rapid successive writes land in distinct
//! files. Items that already carry a `lake_path` pass through unchanged.
//! Every written table gains an `_ingested_at` ISO-8601 UTC column.

use crate::columnar::rows_to_batch;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Value};
use silo_connect::IngestionResult;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Stage one ingestion result, returning file paths in item order
///
/// No-op when the result is unsuccessful or carries no items; items whose
/// payloads normalize to zero rows are skipped.
pub fn stage_ingestion_result(
    result: &IngestionResult,
    lake_root: &Path,
    source_name: &str,
) -> Result<Vec<PathBuf>> {
    if !result.success || result.items.is_empty() {
        debug!(
            success = result.success,
            items = result.items.len(),
            "Nothing to stage"
        );
        return Ok(Vec::new());
    }

    let safe_source = safe_name(source_name);
    let mut paths = Vec::new();

    for item in &result.items {
        if let Some(ref lake_path) = item.lake_path {
            // Already materialized by the connector
            paths.push(PathBuf::from(lake_path));
            continue;
        }

        let rows = payload_to_rows(item.payload.as_ref());
        if rows.is_empty() {
            continue;
        }

        let now = Utc::now();
        let ingested_at = now.to_rfc3339_opts(SecondsFormat::Micros, true);

        let rows: Vec<Map<String, Value>> = rows
            .into_iter()
            .map(|mut row| {
                row.insert("_ingested_at".to_string(), Value::String(ingested_at.clone()));
                row
            })
            .collect();

        let target_dir = lake_root
            .join(&result.protocol)
            .join(source_name)
            .join(now.format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&target_dir)?;

        let target_path = unique_target_path(&target_dir, &safe_source, now);

        let batch = rows_to_batch(&rows)?;
        let file = File::create(&target_path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;

        info!(
            protocol = %result.protocol,
            source = source_name,
            rows = batch.num_rows(),
            path = %target_path.display(),
            "Parquet written for ingestion result"
        );
        paths.push(target_path);
    }

    Ok(paths)
}

/// Normalize a payload into staging rows
///
/// Object: one row. Array: one row per element, non-objects wrapped as
/// `{"payload": element}`. Scalar: one wrapped row. Null/absent: none.
fn payload_to_rows(payload: Option<&Value>) -> Vec<Map<String, Value>> {
    match payload {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => vec![map.clone()],
        Some(Value::Array(elements)) => elements
            .iter()
            .map(|element| match element {
                Value::Object(map) => map.clone(),
                other => wrap_scalar(other),
            })
            .collect(),
        Some(other) => vec![wrap_scalar(other)],
    }
}

fn wrap_scalar(value: &Value) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("payload".to_string(), value.clone());
    row
}

fn safe_name(value: &str) -> String {
    value.replace(['/', '.'], "_")
}

/// Timestamped file name with microsecond resolution; regenerated on the
/// rare same-microsecond collision
fn unique_target_path(target_dir: &Path, safe_source: &str, now: DateTime<Utc>) -> PathBuf {
    let mut stamp = now;
    loop {
        let file_name = format!("{}_{}.parquet", safe_source, stamp.format("%Y%m%dT%H%M%S%6fZ"));
        let candidate = target_dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }
        stamp = Utc::now();
    }
}
