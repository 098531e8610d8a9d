//! Silo connection layer
//!
//! Everything between a pipeline run and the outside world lives here:
//!
//! - **Configuration**: layered config resolution with secret redaction
//!   (`config`)
//! - **Contract**: the connector capability trait and the standardized
//!   ingestion result (`contract`)
//! - **Registry**: protocol name to connector constructor dispatch
//!   (`registry`)
//! - **Caches**: thread-safe engine and session deduplication (`cache`)
//! - **Engines**: the warehouse/SQL engine abstraction over the embedded
//!   and client-server dialects (`engine`, `dw`)
//! - **Sources**: the built-in connector implementations and the shared
//!   incremental/stream helpers (`sources`)

pub mod cache;
pub mod config;
pub mod contract;
pub mod dw;
pub mod engine;
pub mod error;
pub mod registry;
pub mod sources;

// Re-export commonly used types
pub use config::{ConfigLoader, ConnectorConfig};
pub use contract::{Connector, IngestedItem, IngestionResult};
pub use engine::{DwEngine, SqlRow, SqlValue};
pub use error::{ConnectError, Result};
pub use registry::{ConnectorContext, ConnectorRegistry};
