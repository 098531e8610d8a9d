//! Silo staging layer
//!
//! The path between a connector's ingestion result and warehouse rows:
//!
//! - **writer**: normalize fetched payloads into partitioned Parquet files
//! - **schema**: additive-only target-table schema evolution
//! - **loader**: insert staged files into the warehouse
//! - **audit**: the append-only run audit trail
//! - **columnar**: row/RecordBatch conversion shared by writer and loader

pub mod audit;
pub mod columnar;
pub mod error;
pub mod loader;
pub mod schema;
pub mod writer;

pub use audit::{ensure_audit_table, write_audit_record, AuditRecord, AuditStatus};
pub use error::{Result, StageError};
pub use loader::load_parquet_files;
pub use schema::ensure_table;
pub use writer::stage_ingestion_result;
