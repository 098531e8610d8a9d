//! Warehouse loader for staged Parquet files
//!
//! Reads each staged file, evolves the target table to cover its schema,
//! stamps `_source_file` lineage, and appends all rows in one batched
//! insert. A file that disappeared between staging and loading fails the
//! load immediately.

use crate::columnar::batch_to_rows;
use crate::error::{Result, StageError};
use crate::schema::ensure_table;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use silo_connect::engine::Dialect;
use silo_connect::{DwEngine, SqlValue};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Load staged files into the target table, returning total rows inserted
pub async fn load_parquet_files(
    engine: &DwEngine,
    parquet_paths: &[PathBuf],
    table_name: &str,
    schema_name: Option<&str>,
) -> Result<u64> {
    let schema_name = match engine.dialect() {
        Dialect::Sqlite => None,
        Dialect::Postgres => schema_name,
    };

    let mut total_rows = 0u64;

    for path in parquet_paths {
        if !path.exists() {
            return Err(StageError::FileNotFound(path.display().to_string()));
        }

        let (file_schema, batches) = read_parquet(path)?;
        let row_count: usize = batches.iter().map(RecordBatch::num_rows).sum();
        if row_count == 0 {
            info!(path = %path.display(), "Skipping empty Parquet file");
            continue;
        }

        ensure_table(engine, table_name, schema_name, &file_schema).await?;

        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut columns: Vec<String> = file_schema
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect();
        columns.push("_source_file".to_string());

        let mut rows: Vec<Vec<SqlValue>> = Vec::with_capacity(row_count);
        for batch in &batches {
            for mut row in batch_to_rows(batch)? {
                row.push(SqlValue::Text(source_file.clone()));
                rows.push(row);
            }
        }

        let inserted = engine
            .insert_rows(schema_name, table_name, &columns, &rows)
            .await
            .map_err(|error| StageError::load(error.to_string()))?;

        total_rows += inserted;
        info!(
            path = %path.display(),
            table = table_name,
            rows = inserted,
            "Loaded Parquet file into warehouse"
        );
    }

    Ok(total_rows)
}

fn read_parquet(path: &Path) -> Result<(arrow::datatypes::Schema, Vec<RecordBatch>)> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().as_ref().clone();

    let reader = builder.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::writer::stage_ingestion_result;
    use serde_json::json;
    use silo_connect::{IngestedItem, IngestionResult};

    fn staged_file(lake: &Path, payload: serde_json::Value) -> Vec<PathBuf> {
        let result =
            IngestionResult::success("http", vec![IngestedItem::from_payload(payload)]);
        stage_ingestion_result(&result, lake, "api").unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_preserves_row_count_and_columns() {
        let lake = tempfile::tempdir().unwrap();
        let engine = DwEngine::sqlite_in_memory().unwrap();

        let paths = staged_file(
            lake.path(),
            json!([
                {"id": 1, "val": "a"},
                {"id": 2, "val": "b"},
                {"id": 3, "val": "c"}
            ]),
        );

        let rows = load_parquet_files(&engine, &paths, "events", Some("public"))
            .await
            .unwrap();
        assert_eq!(rows, 3);

        let columns = engine.table_columns(None, "events").await.unwrap();
        for expected in ["id", "val", "_ingested_at", "_loaded_at", "_source_file"] {
            assert!(columns.contains(&expected.to_string()), "missing {expected}");
        }

        let loaded = engine
            .query("SELECT id, val, _source_file FROM events ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].get("id"), Some(&SqlValue::Integer(1)));
        match loaded[0].get("_source_file") {
            Some(SqlValue::Text(name)) => assert!(name.ends_with(".parquet")),
            other => panic!("unexpected _source_file: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_fails_immediately() {
        let engine = DwEngine::sqlite_in_memory().unwrap();
        let missing = PathBuf::from("/nonexistent/gone.parquet");

        let err = load_parquet_files(&engine, &[missing], "events", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_path_list_loads_zero_rows() {
        let engine = DwEngine::sqlite_in_memory().unwrap();
        let rows = load_parquet_files(&engine, &[], "events", None).await.unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_schema_evolves_across_files() {
        let lake = tempfile::tempdir().unwrap();
        let engine = DwEngine::sqlite_in_memory().unwrap();

        let first = staged_file(lake.path(), json!({"id": 1}));
        load_parquet_files(&engine, &first, "events", None).await.unwrap();

        let second = staged_file(lake.path(), json!({"id": 2, "note": "new"}));
        load_parquet_files(&engine, &second, "events", None).await.unwrap();

        let columns = engine.table_columns(None, "events").await.unwrap();
        assert!(columns.contains(&"note".to_string()));

        let loaded = engine
            .query("SELECT id, note FROM events ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].get("note"), Some(&SqlValue::Null));
        assert_eq!(loaded[1].get("note"), Some(&SqlValue::Text("new".to_string())));
    }
}
