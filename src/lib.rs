//! careforge: weekly healthcare MLOps pipeline.
//!
//! This library wires synthetic clinical data generation, GCS ingestion,
//! FHIR store loading, BigQuery export, model training, batch prediction
//! and drift monitoring into a linear, retryable pipeline.

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod fhir;
pub mod generate;
pub mod ingest;
pub mod monitor;
pub mod pipeline;
pub mod platform;
pub mod storage;
pub mod warehouse;

// Re-export commonly used error types
pub use error::{
    DriftError, GenerateError, OperationError, PlatformError, StoreError, SyncError,
    WarehouseError,
};
