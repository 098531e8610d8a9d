//! Additive-only target-table schema evolution
//!
//! `ensure_table` creates the target table from a staged batch's schema when
//! missing, and appends any column the batch (or the framework) requires
//! that the table lacks. Evolution never drops, retypes, or renames an
//! existing column.

use crate::error::{Result, StageError};
use arrow::datatypes::{DataType, Schema};
use silo_connect::engine::{qualified_table, quote_identifier, Dialect};
use silo_connect::DwEngine;
use tracing::{debug, info};

/// SQL column type for an Arrow data type, per dialect
fn sql_column_type(data_type: &DataType, dialect: Dialect) -> &'static str {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 => "TEXT",
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "BIGINT",
        DataType::Float16 | DataType::Float32 | DataType::Float64 => "DOUBLE PRECISION",
        DataType::Boolean => "BOOLEAN",
        DataType::Date32 | DataType::Date64 => "DATE",
        DataType::Timestamp(_, _) => timestamp_type(dialect),
        _ => "TEXT",
    }
}

fn timestamp_type(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "TIMESTAMP",
        Dialect::Postgres => "TIMESTAMP WITH TIME ZONE",
    }
}

fn now_function(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "CURRENT_TIMESTAMP",
        Dialect::Postgres => "now()",
    }
}

/// SQLite has no schema namespaces; drop the qualifier there
fn normalize_schema<'a>(engine: &DwEngine, schema_name: Option<&'a str>) -> Option<&'a str> {
    match engine.dialect() {
        Dialect::Sqlite => None,
        Dialect::Postgres => schema_name,
    }
}

/// Ensure the target table covers the staged batch's columns
///
/// Returns the number of columns added, so callers (and tests) can observe
/// that re-ensuring an unchanged schema issues zero ALTERs.
pub async fn ensure_table(
    engine: &DwEngine,
    table_name: &str,
    schema_name: Option<&str>,
    batch_schema: &Schema,
) -> Result<usize> {
    let dialect = engine.dialect();
    let schema_name = normalize_schema(engine, schema_name);
    let qualified = qualified_table(schema_name, table_name);

    let ts_type = timestamp_type(dialect);
    let now_fn = now_function(dialect);

    let mut required_columns: Vec<(String, String)> = batch_schema
        .fields()
        .iter()
        .map(|field| {
            (
                field.name().clone(),
                sql_column_type(field.data_type(), dialect).to_string(),
            )
        })
        .collect();
    required_columns.push(("_loaded_at".to_string(), format!("{ts_type} DEFAULT {now_fn}")));
    required_columns.push(("_source_file".to_string(), "TEXT".to_string()));

    let definitions: Vec<String> = required_columns
        .iter()
        .map(|(name, column_type)| format!("{} {}", quote_identifier(name), column_type))
        .collect();
    let create_sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified,
        definitions.join(", ")
    );

    debug!(ddl = %create_sql, "Ensuring target table exists");
    engine
        .execute(&create_sql, &[])
        .await
        .map_err(|error| StageError::schema_evolution(error.to_string()))?;

    let existing = engine
        .table_columns(schema_name, table_name)
        .await
        .map_err(|error| StageError::schema_evolution(error.to_string()))?;

    let missing: Vec<(String, String)> = required_columns
        .iter()
        .filter(|(name, _)| !existing.iter().any(|column| column == name))
        .cloned()
        .collect();

    for (name, column_type) in &missing {
        let alter_sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            qualified,
            quote_identifier(name),
            column_type
        );
        info!(ddl = %alter_sql, column = %name, "Adding missing column");
        engine
            .execute(&alter_sql, &[])
            .await
            .map_err(|error| StageError::schema_evolution(error.to_string()))?;
    }

    Ok(missing.len())
}
