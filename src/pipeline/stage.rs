//! The stage contract.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{
    DriftError, GenerateError, OperationError, PlatformError, StoreError, SyncError,
    WarehouseError,
};

/// Errors that can fail a pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Blob store error: {0}")]
    Store(#[from] StoreError),

    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Long-running operation failed: {0}")]
    OperationFailed(String),

    #[error("Long-running operation timed out after {0:?}")]
    OperationTimedOut(Duration),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("ML platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Drift check error: {0}")]
    Drift(#[from] DriftError),

    #[error("Data generation error: {0}")]
    Generate(#[from] GenerateError),

    #[error("No timestamped data partition found under '{0}'")]
    MissingPartition(String),
}

/// One unit of pipeline work.
///
/// A stage owns everything it needs to run; the runner only knows its name
/// and its result. Stages must tolerate re-invocation, since the runner
/// retries them and the scheduler guarantees at-least-once execution.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short stable identifier, used by the scheduler and in logs.
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<(), StageError>;
}
