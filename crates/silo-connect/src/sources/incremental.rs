//! Incremental (watermark-based) SQL fetch helper
//!
//! Fetches only rows whose watermark column value is strictly greater than
//! the last seen watermark, ascending, bounded by a batch size. The new
//! watermark is the last returned row's value.

use crate::engine::{qualified_table, quote_identifier, DwEngine, SqlRow, SqlValue};
use crate::error::{ConnectError, Result};
use tracing::{debug, info};

/// Fetch the next batch of rows above `last_watermark`
///
/// Returns the rows (watermark ascending) and the new watermark, which is
/// unchanged when no rows qualify.
pub async fn fetch_incremental_rows(
    engine: &DwEngine,
    table: &str,
    schema: Option<&str>,
    watermark_column: &str,
    last_watermark: Option<&SqlValue>,
    batch_size: u32,
) -> Result<(Vec<SqlRow>, Option<SqlValue>)> {
    if batch_size == 0 {
        return Err(ConnectError::configuration(
            "batch_size must be greater than zero",
        ));
    }

    let columns = engine.table_columns(schema, table).await?;
    if !columns.iter().any(|name| name == watermark_column) {
        return Err(ConnectError::configuration(format!(
            "watermark column '{watermark_column}' not found in table '{table}'"
        )));
    }

    let target = qualified_table(schema, table);
    let watermark = quote_identifier(watermark_column);

    let mut sql = format!("SELECT * FROM {target}");
    let mut params: Vec<SqlValue> = Vec::new();
    if let Some(value) = last_watermark {
        sql.push_str(&format!(" WHERE {watermark} > {}", engine.placeholder(1)));
        params.push(value.clone());
    }
    sql.push_str(&format!(" ORDER BY {watermark} ASC LIMIT {batch_size}"));

    debug!(table, watermark_column, batch_size, "Running incremental fetch");
    let rows = engine.query(&sql, &params).await?;

    if rows.is_empty() {
        info!(table, "No incremental rows found");
        return Ok((rows, last_watermark.cloned()));
    }

    let new_watermark = rows
        .last()
        .and_then(|row| row.get(watermark_column))
        .cloned()
        .or_else(|| last_watermark.cloned());

    info!(
        table,
        rows = rows.len(),
        new_watermark = ?new_watermark,
        "Incremental fetch finished"
    );
    Ok((rows, new_watermark))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn seeded_engine() -> DwEngine {
        let engine = DwEngine::sqlite_in_memory().unwrap();
        engine
            .execute("CREATE TABLE events (seq BIGINT, label TEXT)", &[])
            .await
            .unwrap();
        engine
            .insert_rows(
                None,
                "events",
                &["seq".to_string(), "label".to_string()],
                &[
                    vec![SqlValue::Integer(1), SqlValue::Text("a".to_string())],
                    vec![SqlValue::Integer(2), SqlValue::Text("b".to_string())],
                    vec![SqlValue::Integer(3), SqlValue::Text("c".to_string())],
                ],
            )
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_fetch_above_watermark_ascending() {
        let engine = seeded_engine().await;

        let (rows, new_watermark) = fetch_incremental_rows(
            &engine,
            "events",
            None,
            "seq",
            Some(&SqlValue::Integer(1)),
            2,
        )
        .await
        .unwrap();

        let seqs: Vec<&SqlValue> = rows.iter().map(|row| row.get("seq").unwrap()).collect();
        assert_eq!(seqs, vec![&SqlValue::Integer(2), &SqlValue::Integer(3)]);
        assert_eq!(new_watermark, Some(SqlValue::Integer(3)));
    }

    #[tokio::test]
    async fn test_no_watermark_fetches_from_start() {
        let engine = seeded_engine().await;

        let (rows, new_watermark) =
            fetch_incremental_rows(&engine, "events", None, "seq", None, 2)
                .await
                .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("seq"), Some(&SqlValue::Integer(1)));
        assert_eq!(new_watermark, Some(SqlValue::Integer(2)));
    }

    #[tokio::test]
    async fn test_empty_batch_keeps_watermark() {
        let engine = seeded_engine().await;

        let (rows, new_watermark) = fetch_incremental_rows(
            &engine,
            "events",
            None,
            "seq",
            Some(&SqlValue::Integer(3)),
            10,
        )
        .await
        .unwrap();

        assert!(rows.is_empty());
        assert_eq!(new_watermark, Some(SqlValue::Integer(3)));
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let engine = seeded_engine().await;
        let err = fetch_incremental_rows(&engine, "events", None, "seq", None, 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[tokio::test]
    async fn test_unknown_watermark_column_rejected() {
        let engine = seeded_engine().await;
        let err = fetch_incremental_rows(&engine, "events", None, "updated_at", None, 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("updated_at"));
    }
}
