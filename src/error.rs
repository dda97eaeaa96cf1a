//! Error types for careforge operations.
//!
//! Defines error types for all major subsystems:
//! - Blob storage (existence checks, uploads, listings)
//! - Directory synchronization
//! - Long-running healthcare API operations
//! - Warehouse aggregation queries
//! - ML platform job submission
//! - Synthetic data generation

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the blob store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Blob store returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during a directory sync pass.
///
/// Per-file validation failures are not errors; they are skip decisions.
/// Everything here aborts the whole pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync root '{0}' does not exist or is not a directory")]
    InvalidRoot(PathBuf),

    #[error("Remote prefix '{0}' must be non-empty and must not start with '/'")]
    InvalidPrefix(String),

    #[error("Sync concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("File '{0}' is outside the sync root")]
    OutsideRoot(PathBuf),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that can occur while submitting or polling a long-running
/// healthcare API operation.
///
/// These are transport-level failures. An operation that completes with an
/// error payload, or that outlives the wait budget, is reported through
/// [`crate::fhir::OperationOutcome`] instead.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Healthcare API returned unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Malformed operation response: {0}")]
    MalformedResponse(String),
}

/// Errors that can occur while running warehouse aggregation queries.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Warehouse returned unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Query returned no rows")]
    EmptyResult,

    #[error("Malformed cell in column '{column}': {value}")]
    MalformedCell { column: String, value: String },
}

/// Errors that can occur while talking to the ML platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ML platform returned unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("No model found with display name '{0}'")]
    ModelNotFound(String),
}

/// Errors that can occur while running the external data generator.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Failed to launch data generator: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data generator exited with status {status}")]
    Failed { status: i32 },

    #[error("Data generator timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that can occur during a drift check or retrain trigger.
#[derive(Debug, Error)]
pub enum DriftError {
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("ML platform error: {0}")]
    Platform(#[from] PlatformError),
}
