//! Pipeline orchestration.
//!
//! The weekly pipeline is a fixed linear sequence of stages with hard
//! ordering: each stage must complete before the next starts. Stages are
//! typed values implementing [`Stage`], registered with the
//! [`PipelineRunner`] by reference; the runner retries a failing stage a
//! fixed number of times before aborting the whole run.
//!
//! # Stage order
//!
//! 1. `generate_synthea_data`: run the external data generator
//! 2. `ingest_fhir_to_gcs`: idempotent sync of the latest local partition
//! 3. `load_to_fhir_store`: bulk import into the FHIR store
//! 4. `export_fhir_to_bq`: analytic-schema export to BigQuery
//! 5. `train_model`: submit a training job
//! 6. `batch_prediction`: submit a batch prediction job
//! 7. `monitor_and_retrain`: drift check, retrain on a drift verdict
//!
//! # Example
//!
//! ```rust,ignore
//! use careforge::pipeline::{IngestStage, PipelineRunner};
//!
//! let mut runner = PipelineRunner::new(1);
//! runner.register(Box::new(IngestStage::new(store, "./data/raw", "raw_data", 8)));
//! let reports = runner.run().await?;
//! for report in reports {
//!     println!("{} succeeded after {} attempt(s)", report.stage, report.attempts);
//! }
//! ```

pub mod runner;
pub mod stage;
pub mod stages;

pub use runner::{PipelineError, PipelineRunner, StageReport};
pub use stage::{Stage, StageError};
pub use stages::{
    ExportStage, GenerateStage, IngestStage, LoadStage, MonitorStage, PredictStage, TrainStage,
};
