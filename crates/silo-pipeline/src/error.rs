//! Error type for pipeline orchestration

use silo_connect::ConnectError;
use silo_stage::StageError;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Unexpected pipeline failure, always audited before it propagates
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Stage(#[from] StageError),
}
