//! Row/RecordBatch conversion shared by the staging writer and the loader
//!
//! JSON payload rows become Arrow batches on the way into the lake; Arrow
//! batches become SQL rows on the way into the warehouse. Column types are
//! inferred conservatively: integers widen to `Int64`, mixed int/float
//! widens to `Float64`, and anything mixed or nested falls back to JSON
//! text.

use crate::error::{Result, StageError};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, LargeStringArray,
    StringArray, TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use serde_json::{Map, Value};
use silo_connect::SqlValue;
use std::sync::Arc;

/// Inferred column type for JSON payload rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InferredType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl InferredType {
    fn widen(self, other: InferredType) -> InferredType {
        use InferredType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            InferredType::Integer => DataType::Int64,
            InferredType::Float => DataType::Float64,
            InferredType::Boolean => DataType::Boolean,
            InferredType::Text => DataType::Utf8,
        }
    }
}

fn classify(value: &Value) -> Option<InferredType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(InferredType::Boolean),
        Value::Number(n) => {
            if n.as_i64().is_some() {
                Some(InferredType::Integer)
            } else {
                Some(InferredType::Float)
            }
        }
        Value::String(_) => Some(InferredType::Text),
        // Nested values are staged as their JSON rendering
        Value::Array(_) | Value::Object(_) => Some(InferredType::Text),
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Column names in first-seen order across all rows
fn column_order(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !order.iter().any(|existing| existing == key) {
                order.push(key.clone());
            }
        }
    }
    order
}

fn build_array(rows: &[Map<String, Value>], key: &str, inferred: InferredType) -> ArrayRef {
    match inferred {
        InferredType::Integer => {
            let values: Vec<Option<i64>> = rows
                .iter()
                .map(|row| row.get(key).and_then(Value::as_i64))
                .collect();
            Arc::new(Int64Array::from(values))
        }
        InferredType::Float => {
            let values: Vec<Option<f64>> = rows
                .iter()
                .map(|row| row.get(key).and_then(Value::as_f64))
                .collect();
            Arc::new(Float64Array::from(values))
        }
        InferredType::Boolean => {
            let values: Vec<Option<bool>> = rows
                .iter()
                .map(|row| row.get(key).and_then(Value::as_bool))
                .collect();
            Arc::new(BooleanArray::from(values))
        }
        InferredType::Text => {
            let values: Vec<Option<String>> = rows
                .iter()
                .map(|row| {
                    row.get(key).and_then(|value| match value {
                        Value::Null => None,
                        other => Some(value_to_text(other)),
                    })
                })
                .collect();
            Arc::new(StringArray::from(values))
        }
    }
}

/// Convert JSON payload rows into one Arrow batch
pub fn rows_to_batch(rows: &[Map<String, Value>]) -> Result<RecordBatch> {
    if rows.is_empty() {
        return Err(StageError::staging("cannot build a batch from zero rows"));
    }

    let order = column_order(rows);
    let mut fields = Vec::with_capacity(order.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(order.len());

    for key in &order {
        let inferred = rows
            .iter()
            .filter_map(|row| row.get(key).and_then(classify))
            .reduce(InferredType::widen)
            .unwrap_or(InferredType::Text);

        fields.push(Field::new(key.clone(), inferred.data_type(), true));
        arrays.push(build_array(rows, key, inferred));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Convert one Arrow batch into SQL rows, column-for-column
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Vec<SqlValue>>> {
    let row_count = batch.num_rows();
    let mut columns: Vec<Vec<SqlValue>> = Vec::with_capacity(batch.num_columns());

    for column in batch.columns() {
        columns.push(column_to_values(column, row_count)?);
    }

    let mut rows = Vec::with_capacity(row_count);
    for row_index in 0..row_count {
        rows.push(
            columns
                .iter()
                .map(|column| column[row_index].clone())
                .collect(),
        );
    }
    Ok(rows)
}

fn column_to_values(column: &ArrayRef, row_count: usize) -> Result<Vec<SqlValue>> {
    match column.data_type() {
        DataType::Utf8 => {
            let array = downcast::<StringArray>(column)?;
            Ok(collect_values(row_count, array, |a, i| {
                SqlValue::Text(a.value(i).to_string())
            }))
        }
        DataType::LargeUtf8 => {
            let array = downcast::<LargeStringArray>(column)?;
            Ok(collect_values(row_count, array, |a, i| {
                SqlValue::Text(a.value(i).to_string())
            }))
        }
        DataType::Boolean => {
            let array = downcast::<BooleanArray>(column)?;
            Ok(collect_values(row_count, array, |a, i| {
                SqlValue::Boolean(a.value(i))
            }))
        }
        DataType::Int64 => {
            let array = downcast::<Int64Array>(column)?;
            Ok(collect_values(row_count, array, |a, i| {
                SqlValue::Integer(a.value(i))
            }))
        }
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::UInt8
        | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let widened = cast(column.as_ref(), &DataType::Int64)?;
            let array = downcast::<Int64Array>(&widened)?;
            Ok(collect_values(row_count, array, |a, i| {
                SqlValue::Integer(a.value(i))
            }))
        }
        DataType::Float64 => {
            let array = downcast::<Float64Array>(column)?;
            Ok(collect_values(row_count, array, |a, i| {
                SqlValue::Real(a.value(i))
            }))
        }
        DataType::Float16 | DataType::Float32 => {
            let widened = cast(column.as_ref(), &DataType::Float64)?;
            let array = downcast::<Float64Array>(&widened)?;
            Ok(collect_values(row_count, array, |a, i| {
                SqlValue::Real(a.value(i))
            }))
        }
        DataType::Date32 | DataType::Date64 => {
            let as_days = cast(column.as_ref(), &DataType::Date32)?;
            let array = downcast::<Date32Array>(&as_days)?;
            Ok(collect_values(row_count, array, |a, i| {
                let days = i64::from(a.value(i));
                DateTime::from_timestamp(days * 86_400, 0)
                    .map(|dt| SqlValue::Date(dt.date_naive()))
                    .unwrap_or(SqlValue::Null)
            }))
        }
        DataType::Timestamp(_, _) => {
            let as_micros = cast(
                column.as_ref(),
                &DataType::Timestamp(TimeUnit::Microsecond, None),
            )?;
            let array = downcast::<TimestampMicrosecondArray>(&as_micros)?;
            Ok(collect_values(row_count, array, |a, i| {
                DateTime::from_timestamp_micros(a.value(i))
                    .map(SqlValue::Timestamp)
                    .unwrap_or(SqlValue::Null)
            }))
        }
        other => {
            // Last resort for exotic types: stage their text rendering
            let as_text = cast(column.as_ref(), &DataType::Utf8).map_err(|_| {
                StageError::staging(format!("unsupported staged column type {other}"))
            })?;
            let array = downcast::<StringArray>(&as_text)?;
            Ok(collect_values(row_count, array, |a, i| {
                SqlValue::Text(a.value(i).to_string())
            }))
        }
    }
}

fn downcast<'a, T: 'static>(column: &'a ArrayRef) -> Result<&'a T> {
    column
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StageError::staging("column downcast mismatch"))
}

fn collect_values<A: Array>(
    row_count: usize,
    array: &A,
    extract: impl Fn(&A, usize) -> SqlValue,
) -> Vec<SqlValue> {
    (0..row_count)
        .map(|index| {
            if array.is_null(index) {
                SqlValue::Null
            } else {
                extract(array, index)
            }
        })
        .collect()
}
