//! CLI command definitions for careforge.
//!
//! Each subcommand runs one pipeline stage against the configured cloud
//! project; `run` executes the whole weekly sequence in DAG order.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::config::PipelineConfig;
use crate::fhir::FhirStoreClient;
use crate::generate::SyntheaGenerator;
use crate::ingest::{sync_directory, SyncConfig};
use crate::monitor::DriftMonitor;
use crate::pipeline::{
    ExportStage, GenerateStage, IngestStage, LoadStage, MonitorStage, PipelineRunner,
    PredictStage, Stage, TrainStage,
};
use crate::platform::VertexAiClient;
use crate::storage::{BlobStore, GcsBlobStore, MemoryBlobStore};
use crate::warehouse::{BigQueryClient, BigQueryPredictionSource};

/// Weekly healthcare MLOps pipeline.
#[derive(Parser)]
#[command(name = "careforge")]
#[command(about = "Run the healthcare MLOps pipeline: ingest, load, export, train, predict, monitor")]
#[command(version)]
#[command(
    long_about = "careforge orchestrates a weekly clinical ML pipeline against managed cloud services.\n\nConfiguration comes from environment variables (PROJECT_ID, GCS_BUCKET, GCP_ACCESS_TOKEN, ...).\n\nExample usage:\n  careforge run\n  careforge ingest --local-root ./data/raw/20250801-0300/fhir --remote-prefix raw_data/20250801-0300/fhir\n  careforge monitor --threshold 0.25"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full weekly pipeline in DAG order.
    Run(RunArgs),

    /// Run the external synthetic data generator.
    #[command(alias = "gen")]
    Generate,

    /// Idempotently sync local data into the bucket.
    Ingest(IngestArgs),

    /// Import the newest bucket partition into the FHIR store.
    Load,

    /// Export the FHIR store to BigQuery with the analytic schema.
    Export,

    /// Submit a model training job.
    Train,

    /// Submit a batch prediction job.
    Predict,

    /// Check prediction drift and retrain if warranted.
    Monitor(MonitorArgs),
}

/// Arguments for `careforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Extra attempts per stage before the run aborts.
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Arguments for `careforge ingest`.
#[derive(Parser, Debug)]
pub struct IngestArgs {
    /// Sync this directory instead of auto-discovering the newest
    /// partition under the configured data root.
    #[arg(long, requires = "remote_prefix")]
    pub local_root: Option<PathBuf>,

    /// Remote key prefix for --local-root.
    #[arg(long, requires = "local_root")]
    pub remote_prefix: Option<String>,

    /// Concurrent per-file uploads.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Sync into an in-memory store instead of the bucket, to preview
    /// decisions without uploading anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for `careforge monitor`.
#[derive(Parser, Debug)]
pub struct MonitorArgs {
    /// Low-confidence ratio above which retraining triggers.
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Confidence below which a prediction counts as low-confidence.
    #[arg(long)]
    pub confidence_cutoff: Option<f64>,

    /// Report the drift verdict without submitting a retraining job.
    #[arg(long)]
    pub check_only: bool,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Generate => {
            let config = PipelineConfig::from_env()?;
            SyntheaGenerator::new(config.generator_config()).run().await?;
            Ok(())
        }
        Commands::Ingest(args) => ingest(args).await,
        Commands::Load => {
            let config = PipelineConfig::from_env()?;
            let store: Arc<dyn BlobStore> = Arc::new(GcsBlobStore::new(config.gcs_config()));
            let fhir = Arc::new(FhirStoreClient::new(config.fhir_config()));
            LoadStage::new(
                store,
                fhir,
                config.gcs_bucket.clone(),
                config.remote_data_root.clone(),
                config.poll_config(),
            )
            .run()
            .await?;
            Ok(())
        }
        Commands::Export => {
            let config = PipelineConfig::from_env()?;
            let fhir = Arc::new(FhirStoreClient::new(config.fhir_config()));
            ExportStage::new(
                fhir,
                config.project_id.clone(),
                config.bq_dataset.clone(),
                config.poll_config(),
            )
            .run()
            .await?;
            Ok(())
        }
        Commands::Train => {
            let config = PipelineConfig::from_env()?;
            let platform = Arc::new(VertexAiClient::new(config.vertex_config()));
            TrainStage::new(platform, config.training_request_template())
                .run()
                .await?;
            Ok(())
        }
        Commands::Predict => {
            let config = PipelineConfig::from_env()?;
            let platform = Arc::new(VertexAiClient::new(config.vertex_config()));
            PredictStage::new(
                platform,
                config.model_name.clone(),
                config.bq_source_uri.clone(),
                config.bq_prediction_output.clone(),
                config.machine_type.clone(),
            )
            .run()
            .await?;
            Ok(())
        }
        Commands::Monitor(args) => monitor(args).await,
    }
}

/// Builds the full weekly stage sequence over shared clients.
fn build_stages(config: &PipelineConfig) -> Vec<Box<dyn Stage>> {
    let store: Arc<dyn BlobStore> = Arc::new(GcsBlobStore::new(config.gcs_config()));
    let fhir = Arc::new(FhirStoreClient::new(config.fhir_config()));
    let platform = Arc::new(VertexAiClient::new(config.vertex_config()));
    let stats = Arc::new(BigQueryPredictionSource::new(
        BigQueryClient::new(config.bigquery_config()),
        config.bq_prediction_table.clone(),
        config.confidence_cutoff,
    ));
    let drift_monitor = DriftMonitor::new(stats, platform.clone(), config.drift_config());

    vec![
        Box::new(GenerateStage::new(SyntheaGenerator::new(
            config.generator_config(),
        ))),
        Box::new(IngestStage::new(
            store.clone(),
            config.data_root.clone(),
            config.remote_data_root.clone(),
            config.sync_concurrency,
        )),
        Box::new(LoadStage::new(
            store,
            fhir.clone(),
            config.gcs_bucket.clone(),
            config.remote_data_root.clone(),
            config.poll_config(),
        )),
        Box::new(ExportStage::new(
            fhir,
            config.project_id.clone(),
            config.bq_dataset.clone(),
            config.poll_config(),
        )),
        Box::new(TrainStage::new(
            platform.clone(),
            config.training_request_template(),
        )),
        Box::new(PredictStage::new(
            platform,
            config.model_name.clone(),
            config.bq_source_uri.clone(),
            config.bq_prediction_output.clone(),
            config.machine_type.clone(),
        )),
        Box::new(MonitorStage::new(drift_monitor)),
    ]
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(retries) = args.max_retries {
        config = config.with_max_retries(retries);
    }

    let mut runner = PipelineRunner::new(config.max_retries);
    for stage in build_stages(&config) {
        runner.register(stage);
    }

    let reports = runner.run().await?;
    for report in &reports {
        println!(
            "{:<24} attempts={} duration={:.1}s",
            report.stage,
            report.attempts,
            report.duration.as_secs_f64()
        );
    }
    Ok(())
}

async fn ingest(args: IngestArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(concurrency) = args.concurrency {
        config = config.with_sync_concurrency(concurrency);
    }

    let store: Arc<dyn BlobStore> = if args.dry_run {
        info!("Dry run: syncing into an in-memory store");
        Arc::new(MemoryBlobStore::new())
    } else {
        Arc::new(GcsBlobStore::new(config.gcs_config()))
    };

    if let (Some(local_root), Some(remote_prefix)) = (args.local_root, args.remote_prefix) {
        let sync_config =
            SyncConfig::new(local_root, remote_prefix).with_concurrency(config.sync_concurrency);
        let summary = sync_directory(store.as_ref(), &sync_config).await?;
        println!(
            "validated={} skipped_invalid={} skipped_existing={} uploaded={}",
            summary.validated,
            summary.skipped_invalid,
            summary.skipped_existing,
            summary.uploaded
        );
    } else {
        IngestStage::new(
            store,
            config.data_root.clone(),
            config.remote_data_root.clone(),
            config.sync_concurrency,
        )
        .run()
        .await?;
    }
    Ok(())
}

async fn monitor(args: MonitorArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(threshold) = args.threshold {
        config = config.with_drift_threshold(threshold);
    }
    if let Some(cutoff) = args.confidence_cutoff {
        config = config.with_confidence_cutoff(cutoff);
    }
    config.validate()?;

    let platform = Arc::new(VertexAiClient::new(config.vertex_config()));
    let stats = Arc::new(BigQueryPredictionSource::new(
        BigQueryClient::new(config.bigquery_config()),
        config.bq_prediction_table.clone(),
        config.confidence_cutoff,
    ));
    let drift_monitor = DriftMonitor::new(stats, platform, config.drift_config());

    let outcome = if args.check_only {
        drift_monitor.check_for_drift().await?
    } else {
        drift_monitor.run_once().await?
    };
    println!("{:?}", outcome);
    Ok(())
}
