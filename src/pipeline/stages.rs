//! The weekly pipeline's stage implementations.
//!
//! Each stage is a thin wrapper over one managed-service client. Partition
//! discovery follows the original data layout: the generator writes
//! `<data_root>/<timestamp>/{fhir,metadata}/` locally, ingestion mirrors
//! that to `<remote_root>/<timestamp>/...` in the bucket, and the load
//! stage imports the newest remote partition.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::fhir::{await_operation, FhirStoreClient, OperationOutcome, PollConfig};
use crate::generate::SyntheaGenerator;
use crate::ingest::{sync_directory, SyncConfig};
use crate::monitor::DriftMonitor;
use crate::pipeline::stage::{Stage, StageError};
use crate::platform::{BatchPredictionRequest, ModelTrainer, TrainingJobRequest, VertexAiClient};
use crate::storage::BlobStore;

/// Data categories ingested from each partition.
const CATEGORIES: [&str; 2] = ["fhir", "metadata"];

/// Picks the newest timestamped partition name from `names`.
///
/// Partition names start with a digit (`20250801-0300`), so the lexical
/// maximum is the newest. Non-partition entries (logs, temp dirs) are
/// ignored.
fn latest_partition(names: impl IntoIterator<Item = String>) -> Option<String> {
    names
        .into_iter()
        .filter(|name| name.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .max()
}

fn latest_local_partition(data_root: &Path) -> Result<String, StageError> {
    let entries = std::fs::read_dir(data_root).map_err(crate::error::SyncError::Io)?;
    let names = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned());
    latest_partition(names)
        .ok_or_else(|| StageError::MissingPartition(data_root.display().to_string()))
}

/// Runs the external synthetic data generator.
pub struct GenerateStage {
    generator: SyntheaGenerator,
}

impl GenerateStage {
    pub fn new(generator: SyntheaGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for GenerateStage {
    fn name(&self) -> &'static str {
        "generate_synthea_data"
    }

    async fn run(&self) -> Result<(), StageError> {
        self.generator.run().await?;
        Ok(())
    }
}

/// Idempotently syncs the newest local partition into the bucket.
pub struct IngestStage {
    store: Arc<dyn BlobStore>,
    data_root: PathBuf,
    remote_root: String,
    concurrency: usize,
}

impl IngestStage {
    pub fn new(
        store: Arc<dyn BlobStore>,
        data_root: impl Into<PathBuf>,
        remote_root: impl Into<String>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            data_root: data_root.into(),
            remote_root: remote_root.into(),
            concurrency,
        }
    }
}

#[async_trait]
impl Stage for IngestStage {
    fn name(&self) -> &'static str {
        "ingest_fhir_to_gcs"
    }

    async fn run(&self) -> Result<(), StageError> {
        let partition = latest_local_partition(&self.data_root)?;
        info!(partition, "Ingesting latest local partition");

        for category in CATEGORIES {
            let local = self.data_root.join(&partition).join(category);
            if !local.is_dir() {
                warn!(path = %local.display(), "Partition has no such category, skipping");
                continue;
            }
            let prefix = format!("{}/{}/{}", self.remote_root, partition, category);
            let config = SyncConfig::new(local, prefix).with_concurrency(self.concurrency);
            sync_directory(self.store.as_ref(), &config).await?;
        }
        Ok(())
    }
}

/// Imports the newest remote partition into the FHIR store.
pub struct LoadStage {
    store: Arc<dyn BlobStore>,
    fhir: Arc<FhirStoreClient>,
    bucket: String,
    remote_root: String,
    poll: PollConfig,
}

impl LoadStage {
    pub fn new(
        store: Arc<dyn BlobStore>,
        fhir: Arc<FhirStoreClient>,
        bucket: impl Into<String>,
        remote_root: impl Into<String>,
        poll: PollConfig,
    ) -> Self {
        Self {
            store,
            fhir,
            bucket: bucket.into(),
            remote_root: remote_root.into(),
            poll,
        }
    }
}

#[async_trait]
impl Stage for LoadStage {
    fn name(&self) -> &'static str {
        "load_to_fhir_store"
    }

    async fn run(&self) -> Result<(), StageError> {
        let dirs = self
            .store
            .list_dirs(&format!("{}/", self.remote_root))
            .await?;
        let partition = latest_partition(dirs)
            .ok_or_else(|| StageError::MissingPartition(self.remote_root.clone()))?;

        let source_uri = format!(
            "gs://{}/{}/{}/fhir/*.json",
            self.bucket, self.remote_root, partition
        );
        let handle = self.fhir.import_from_gcs(&source_uri).await?;

        match await_operation(&*self.fhir, &handle, &self.poll).await? {
            OperationOutcome::Succeeded => Ok(()),
            OperationOutcome::Failed(message) => Err(StageError::OperationFailed(message)),
            OperationOutcome::TimedOut { waited } => Err(StageError::OperationTimedOut(waited)),
        }
    }
}

/// Exports the FHIR store into the analytics dataset.
pub struct ExportStage {
    fhir: Arc<FhirStoreClient>,
    project_id: String,
    bq_dataset: String,
    poll: PollConfig,
}

impl ExportStage {
    pub fn new(
        fhir: Arc<FhirStoreClient>,
        project_id: impl Into<String>,
        bq_dataset: impl Into<String>,
        poll: PollConfig,
    ) -> Self {
        Self {
            fhir,
            project_id: project_id.into(),
            bq_dataset: bq_dataset.into(),
            poll,
        }
    }
}

#[async_trait]
impl Stage for ExportStage {
    fn name(&self) -> &'static str {
        "export_fhir_to_bq"
    }

    async fn run(&self) -> Result<(), StageError> {
        let dataset_uri = format!("bq://{}.{}", self.project_id, self.bq_dataset);
        let handle = self.fhir.export_to_bigquery(&dataset_uri).await?;

        match await_operation(&*self.fhir, &handle, &self.poll).await? {
            OperationOutcome::Succeeded => Ok(()),
            OperationOutcome::Failed(message) => Err(StageError::OperationFailed(message)),
            OperationOutcome::TimedOut { waited } => Err(StageError::OperationTimedOut(waited)),
        }
    }
}

/// Submits the weekly training job.
pub struct TrainStage {
    trainer: Arc<dyn ModelTrainer>,
    request_template: TrainingJobRequest,
}

impl TrainStage {
    /// `request_template.display_name` is ignored; each run stamps its own.
    pub fn new(trainer: Arc<dyn ModelTrainer>, request_template: TrainingJobRequest) -> Self {
        Self {
            trainer,
            request_template,
        }
    }
}

#[async_trait]
impl Stage for TrainStage {
    fn name(&self) -> &'static str {
        "train_model"
    }

    async fn run(&self) -> Result<(), StageError> {
        let mut request = self.request_template.clone();
        request.display_name = format!(
            "train-{}-{}",
            request.model_display_name,
            Utc::now().format("%Y%m%d-%H%M%S")
        );
        let handle = self.trainer.submit_training_job(&request).await?;
        info!(job = %handle.display_name, "Training job submitted");
        Ok(())
    }
}

/// Submits a batch prediction job against the registered model.
pub struct PredictStage {
    platform: Arc<VertexAiClient>,
    model_display_name: String,
    bigquery_source: String,
    bigquery_destination: String,
    machine_type: String,
}

impl PredictStage {
    pub fn new(
        platform: Arc<VertexAiClient>,
        model_display_name: impl Into<String>,
        bigquery_source: impl Into<String>,
        bigquery_destination: impl Into<String>,
        machine_type: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            model_display_name: model_display_name.into(),
            bigquery_source: bigquery_source.into(),
            bigquery_destination: bigquery_destination.into(),
            machine_type: machine_type.into(),
        }
    }
}

#[async_trait]
impl Stage for PredictStage {
    fn name(&self) -> &'static str {
        "batch_prediction"
    }

    async fn run(&self) -> Result<(), StageError> {
        let model = self.platform.find_model(&self.model_display_name).await?;
        let request = BatchPredictionRequest::new(
            format!("batch-predict-{}", Utc::now().format("%Y%m%d-%H%M%S")),
            model.name,
            &self.bigquery_source,
            &self.bigquery_destination,
        )
        .with_machine_type(&self.machine_type);
        self.platform.submit_batch_prediction(&request).await?;
        Ok(())
    }
}

/// Checks for drift and retrains on a drift verdict.
pub struct MonitorStage {
    monitor: DriftMonitor,
}

impl MonitorStage {
    pub fn new(monitor: DriftMonitor) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl Stage for MonitorStage {
    fn name(&self) -> &'static str {
        "monitor_and_retrain"
    }

    async fn run(&self) -> Result<(), StageError> {
        self.monitor.run_once().await?;
        Ok(())
    }
}
