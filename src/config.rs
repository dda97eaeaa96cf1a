//! Pipeline configuration.
//!
//! One explicit configuration struct feeds every component: cloud resource
//! identifiers, drift thresholds, sync concurrency, retry and polling
//! budgets. Values come from environment variables via [`PipelineConfig::from_env`]
//! or from builder methods; components never read the environment
//! themselves.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::fhir::{FhirStoreConfig, PollConfig};
use crate::generate::GeneratorConfig;
use crate::monitor::{DriftConfig, DEFAULT_CONFIDENCE_CUTOFF, DEFAULT_DRIFT_THRESHOLD};
use crate::platform::{TrainingJobRequest, VertexConfig};
use crate::storage::GcsConfig;
use crate::warehouse::BigQueryConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Cloud project
    /// GCP project id.
    pub project_id: String,
    /// Region hosting the healthcare dataset and ML platform.
    pub location: String,
    /// OAuth2 access token used by every managed-service client.
    pub access_token: String,

    // Storage
    /// Bucket receiving raw data partitions.
    pub gcs_bucket: String,
    /// Key prefix under which partitions live in the bucket.
    pub remote_data_root: String,
    /// Local directory the generator writes partitions into.
    pub data_root: PathBuf,

    // Healthcare API
    pub dataset_id: String,
    pub fhir_store_id: String,

    // Warehouse
    /// BigQuery dataset receiving the FHIR export.
    pub bq_dataset: String,
    /// Fully qualified prediction table monitored for drift.
    pub bq_prediction_table: String,
    /// `bq://` URI of the batch-prediction instances table.
    pub bq_source_uri: String,
    /// `bq://` URI receiving batch predictions.
    pub bq_prediction_output: String,

    // Model
    pub model_name: String,
    /// `gs://` URI of the python training package.
    pub training_package_uri: String,
    /// Python module executed by the training package.
    pub training_module: String,
    /// Training container image.
    pub training_container_image: String,
    /// `gs://` output prefix for model artifacts.
    pub model_output_dir: String,
    /// Worker machine type for training and batch prediction.
    pub machine_type: String,

    // Drift monitoring
    /// Low-confidence ratio above which retraining triggers.
    pub drift_threshold: f64,
    /// Confidence below which a prediction counts as low-confidence.
    pub confidence_cutoff: f64,

    // Execution
    /// Concurrent per-file tasks during ingestion.
    pub sync_concurrency: usize,
    /// Extra attempts per pipeline stage.
    pub max_retries: u32,
    pub poll_initial_interval: Duration,
    pub poll_max_interval: Duration,
    pub poll_backoff_multiplier: f64,
    pub poll_max_wait: Duration,

    // Data generator
    pub generator_command: String,
    pub generator_args: Vec<String>,
    pub generator_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // Cloud defaults
            project_id: "healthcare-mlops".to_string(),
            location: "us-central1".to_string(),
            access_token: String::new(),

            // Storage defaults
            gcs_bucket: "healthcare_elt_bucket".to_string(),
            remote_data_root: "raw_data".to_string(),
            data_root: PathBuf::from("./data/raw"),

            // Healthcare defaults
            dataset_id: "healthcare_dataset".to_string(),
            fhir_store_id: "fhir_store".to_string(),

            // Warehouse defaults
            bq_dataset: "fhir_analytics".to_string(),
            bq_prediction_table: "fhir_analytics.predictions".to_string(),
            bq_source_uri: "bq://healthcare-mlops.fhir_analytics.appointments".to_string(),
            bq_prediction_output: "bq://healthcare-mlops.fhir_analytics.predictions".to_string(),

            // Model defaults
            model_name: "no_show_predictor".to_string(),
            training_package_uri: "gs://healthcare_elt_bucket/packages/trainer-0.1.tar.gz"
                .to_string(),
            training_module: "train_model".to_string(),
            training_container_image:
                "us-docker.pkg.dev/vertex-ai/training/scikit-learn-cpu.0-24:latest".to_string(),
            model_output_dir: "gs://healthcare_elt_bucket/models/no_show_predictor".to_string(),
            machine_type: "n1-standard-4".to_string(),

            // Drift defaults
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            confidence_cutoff: DEFAULT_CONFIDENCE_CUTOFF,

            // Execution defaults
            sync_concurrency: 8,
            max_retries: 1,
            poll_initial_interval: Duration::from_secs(5),
            poll_max_interval: Duration::from_secs(60),
            poll_backoff_multiplier: 2.0,
            poll_max_wait: Duration::from_secs(1800),

            // Generator defaults
            generator_command: "bash".to_string(),
            generator_args: vec!["scripts/generate_synthea_data.sh".to_string()],
            generator_timeout: Duration::from_secs(3600),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `PROJECT_ID`: GCP project id
    /// - `GCS_BUCKET`: raw data bucket
    /// - `GCP_ACCESS_TOKEN`: OAuth2 access token
    ///
    /// Optional (defaults in parentheses):
    /// - `LOCATION` (us-central1), `DATASET_ID`, `FHIR_STORE_ID`
    /// - `BQ_DATASET`, `BQ_PREDICTION_TABLE`, `BQ_SOURCE_URI`, `BQ_PREDICTION_OUTPUT`
    /// - `MODEL_NAME`, `TRAINING_PKG_GCS_PATH`, `MODEL_OUTPUT_GCS_DIR`
    /// - `CAREFORGE_DATA_ROOT` (./data/raw), `CAREFORGE_REMOTE_DATA_ROOT` (raw_data)
    /// - `CAREFORGE_DRIFT_THRESHOLD` (0.3), `CAREFORGE_CONFIDENCE_CUTOFF` (0.6)
    /// - `CAREFORGE_SYNC_CONCURRENCY` (8), `CAREFORGE_MAX_RETRIES` (1)
    /// - `CAREFORGE_POLL_INITIAL_SECS` (5), `CAREFORGE_POLL_MAX_SECS` (60),
    ///   `CAREFORGE_POLL_BACKOFF` (2.0), `CAREFORGE_POLL_MAX_WAIT_SECS` (1800)
    /// - `CAREFORGE_TRAINING_MODULE`, `CAREFORGE_TRAINING_IMAGE`, `CAREFORGE_MACHINE_TYPE`
    /// - `CAREFORGE_GENERATOR_CMD` (whitespace-split into program and args),
    ///   `CAREFORGE_GENERATOR_TIMEOUT_SECS` (3600)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or have
    /// invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.project_id = std::env::var("PROJECT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("PROJECT_ID".to_string()))?;
        config.gcs_bucket = std::env::var("GCS_BUCKET")
            .map_err(|_| ConfigError::MissingEnvVar("GCS_BUCKET".to_string()))?;
        config.access_token = std::env::var("GCP_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("GCP_ACCESS_TOKEN".to_string()))?;

        if let Ok(val) = std::env::var("LOCATION") {
            config.location = val;
        }
        if let Ok(val) = std::env::var("DATASET_ID") {
            config.dataset_id = val;
        }
        if let Ok(val) = std::env::var("FHIR_STORE_ID") {
            config.fhir_store_id = val;
        }
        if let Ok(val) = std::env::var("BQ_DATASET") {
            config.bq_dataset = val;
        }
        if let Ok(val) = std::env::var("BQ_PREDICTION_TABLE") {
            config.bq_prediction_table = val;
        }
        if let Ok(val) = std::env::var("BQ_SOURCE_URI") {
            config.bq_source_uri = val;
        }
        if let Ok(val) = std::env::var("BQ_PREDICTION_OUTPUT") {
            config.bq_prediction_output = val;
        }
        if let Ok(val) = std::env::var("MODEL_NAME") {
            config.model_name = val;
        }
        if let Ok(val) = std::env::var("TRAINING_PKG_GCS_PATH") {
            config.training_package_uri = val;
        }
        if let Ok(val) = std::env::var("MODEL_OUTPUT_GCS_DIR") {
            config.model_output_dir = val;
        }
        if let Ok(val) = std::env::var("CAREFORGE_DATA_ROOT") {
            config.data_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("CAREFORGE_REMOTE_DATA_ROOT") {
            config.remote_data_root = val;
        }
        if let Ok(val) = std::env::var("CAREFORGE_DRIFT_THRESHOLD") {
            config.drift_threshold = parse_env_value(&val, "CAREFORGE_DRIFT_THRESHOLD")?;
        }
        if let Ok(val) = std::env::var("CAREFORGE_CONFIDENCE_CUTOFF") {
            config.confidence_cutoff = parse_env_value(&val, "CAREFORGE_CONFIDENCE_CUTOFF")?;
        }
        if let Ok(val) = std::env::var("CAREFORGE_SYNC_CONCURRENCY") {
            config.sync_concurrency = parse_env_value(&val, "CAREFORGE_SYNC_CONCURRENCY")?;
        }
        if let Ok(val) = std::env::var("CAREFORGE_MAX_RETRIES") {
            config.max_retries = parse_env_value(&val, "CAREFORGE_MAX_RETRIES")?;
        }
        if let Ok(val) = std::env::var("CAREFORGE_POLL_INITIAL_SECS") {
            let secs: u64 = parse_env_value(&val, "CAREFORGE_POLL_INITIAL_SECS")?;
            config.poll_initial_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("CAREFORGE_POLL_MAX_SECS") {
            let secs: u64 = parse_env_value(&val, "CAREFORGE_POLL_MAX_SECS")?;
            config.poll_max_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("CAREFORGE_POLL_BACKOFF") {
            config.poll_backoff_multiplier = parse_env_value(&val, "CAREFORGE_POLL_BACKOFF")?;
        }
        if let Ok(val) = std::env::var("CAREFORGE_POLL_MAX_WAIT_SECS") {
            let secs: u64 = parse_env_value(&val, "CAREFORGE_POLL_MAX_WAIT_SECS")?;
            config.poll_max_wait = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("CAREFORGE_TRAINING_MODULE") {
            config.training_module = val;
        }
        if let Ok(val) = std::env::var("CAREFORGE_TRAINING_IMAGE") {
            config.training_container_image = val;
        }
        if let Ok(val) = std::env::var("CAREFORGE_MACHINE_TYPE") {
            config.machine_type = val;
        }
        if let Ok(val) = std::env::var("CAREFORGE_GENERATOR_CMD") {
            let mut parts = val.split_whitespace().map(str::to_string);
            config.generator_command = parts.next().ok_or_else(|| ConfigError::InvalidValue {
                key: "CAREFORGE_GENERATOR_CMD".to_string(),
                message: "expected a command".to_string(),
            })?;
            config.generator_args = parts.collect();
        }
        if let Ok(val) = std::env::var("CAREFORGE_GENERATOR_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "CAREFORGE_GENERATOR_TIMEOUT_SECS")?;
            config.generator_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("project_id", &self.project_id),
            ("gcs_bucket", &self.gcs_bucket),
            ("dataset_id", &self.dataset_id),
            ("fhir_store_id", &self.fhir_store_id),
            ("bq_dataset", &self.bq_dataset),
            ("bq_prediction_table", &self.bq_prediction_table),
            ("model_name", &self.model_name),
            ("machine_type", &self.machine_type),
            ("generator_command", &self.generator_command),
        ] {
            if value.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} cannot be empty",
                    name
                )));
            }
        }

        if self.remote_data_root.is_empty() || self.remote_data_root.starts_with('/') {
            return Err(ConfigError::ValidationFailed(
                "remote_data_root must be non-empty and must not start with '/'".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.drift_threshold) {
            return Err(ConfigError::ValidationFailed(
                "drift_threshold must be in [0.0, 1.0)".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.confidence_cutoff) {
            return Err(ConfigError::ValidationFailed(
                "confidence_cutoff must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.sync_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "sync_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.poll_backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationFailed(
                "poll_backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.poll_max_wait < self.poll_initial_interval {
            return Err(ConfigError::ValidationFailed(
                "poll_max_wait must be at least poll_initial_interval".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the project id.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Builder method to set the bucket.
    pub fn with_gcs_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.gcs_bucket = bucket.into();
        self
    }

    /// Builder method to set the access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    /// Builder method to set the local data root.
    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = root.into();
        self
    }

    /// Builder method to set the remote data root prefix.
    pub fn with_remote_data_root(mut self, root: impl Into<String>) -> Self {
        self.remote_data_root = root.into();
        self
    }

    /// Builder method to set the model display name.
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Builder method to set the drift threshold.
    pub fn with_drift_threshold(mut self, threshold: f64) -> Self {
        self.drift_threshold = threshold;
        self
    }

    /// Builder method to set the confidence cutoff.
    pub fn with_confidence_cutoff(mut self, cutoff: f64) -> Self {
        self.confidence_cutoff = cutoff;
        self
    }

    /// Builder method to set the sync concurrency.
    pub fn with_sync_concurrency(mut self, concurrency: usize) -> Self {
        self.sync_concurrency = concurrency;
        self
    }

    /// Builder method to set the per-stage retry count.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder method to set the poll wait budget.
    pub fn with_poll_max_wait(mut self, max_wait: Duration) -> Self {
        self.poll_max_wait = max_wait;
        self
    }

    /// Blob store configuration for the raw data bucket.
    pub fn gcs_config(&self) -> GcsConfig {
        GcsConfig {
            bucket: self.gcs_bucket.clone(),
            access_token: self.access_token.clone(),
        }
    }

    /// FHIR store client configuration.
    pub fn fhir_config(&self) -> FhirStoreConfig {
        FhirStoreConfig {
            project_id: self.project_id.clone(),
            location: self.location.clone(),
            dataset_id: self.dataset_id.clone(),
            fhir_store_id: self.fhir_store_id.clone(),
            access_token: self.access_token.clone(),
        }
    }

    /// Warehouse client configuration.
    pub fn bigquery_config(&self) -> BigQueryConfig {
        BigQueryConfig {
            project_id: self.project_id.clone(),
            access_token: self.access_token.clone(),
        }
    }

    /// ML platform client configuration.
    pub fn vertex_config(&self) -> VertexConfig {
        VertexConfig {
            project_id: self.project_id.clone(),
            location: self.location.clone(),
            access_token: self.access_token.clone(),
        }
    }

    /// Polling cadence for long-running operations.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            initial_interval: self.poll_initial_interval,
            max_interval: self.poll_max_interval,
            backoff_multiplier: self.poll_backoff_multiplier,
            max_wait: self.poll_max_wait,
        }
    }

    /// Drift monitor configuration.
    pub fn drift_config(&self) -> DriftConfig {
        DriftConfig {
            drift_threshold: self.drift_threshold,
            confidence_cutoff: self.confidence_cutoff,
            model_display_name: self.model_name.clone(),
            training_package_uri: self.training_package_uri.clone(),
            training_module: self.training_module.clone(),
            training_container_image: self.training_container_image.clone(),
            model_output_dir: self.model_output_dir.clone(),
        }
    }

    /// Data generator configuration.
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig::new(&self.generator_command, &self.data_root)
            .with_args(self.generator_args.clone())
            .with_timeout(self.generator_timeout)
    }

    /// Training request template for the weekly train stage. The stage
    /// stamps the display name per submission.
    pub fn training_request_template(&self) -> TrainingJobRequest {
        TrainingJobRequest::new(
            String::new(),
            &self.training_package_uri,
            &self.model_name,
            &self.model_output_dir,
        )
        .with_python_module(&self.training_module)
        .with_container_image(&self.training_container_image)
        .with_machine_type(&self.machine_type)
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.location, "us-central1");
        assert!((config.drift_threshold - 0.3).abs() < f64::EPSILON);
        assert!((config.confidence_cutoff - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.sync_concurrency, 8);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.poll_initial_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_project_id("clinic-prod")
            .with_gcs_bucket("clinic-raw")
            .with_access_token("token")
            .with_model_name("readmission_predictor")
            .with_drift_threshold(0.25)
            .with_confidence_cutoff(0.5)
            .with_sync_concurrency(16)
            .with_max_retries(3)
            .with_remote_data_root("partitions")
            .with_poll_max_wait(Duration::from_secs(600));

        assert_eq!(config.project_id, "clinic-prod");
        assert_eq!(config.gcs_bucket, "clinic-raw");
        assert_eq!(config.model_name, "readmission_predictor");
        assert!((config.drift_threshold - 0.25).abs() < f64::EPSILON);
        assert!((config.confidence_cutoff - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.sync_concurrency, 16);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.remote_data_root, "partitions");
        assert_eq!(config.poll_max_wait, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_project() {
        let config = PipelineConfig::default().with_project_id("");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("project_id"));
    }

    #[test]
    fn test_validation_invalid_drift_threshold() {
        let config = PipelineConfig::default().with_drift_threshold(1.0);
        assert!(config.validate().is_err());

        let config = PipelineConfig::default().with_drift_threshold(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_confidence_cutoff() {
        let config = PipelineConfig::default().with_confidence_cutoff(1.5);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("confidence_cutoff"));
    }

    #[test]
    fn test_validation_zero_concurrency() {
        let config = PipelineConfig::default().with_sync_concurrency(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("sync_concurrency"));
    }

    #[test]
    fn test_validation_absolute_remote_root() {
        let config = PipelineConfig::default().with_remote_data_root("/raw_data");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("remote_data_root"));
    }

    #[test]
    fn test_validation_poll_budget_below_interval() {
        let config = PipelineConfig::default().with_poll_max_wait(Duration::from_secs(1));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("poll_max_wait"));
    }

    #[test]
    fn test_derived_configs() {
        let config = PipelineConfig::default()
            .with_project_id("clinic-prod")
            .with_access_token("token");

        assert_eq!(config.gcs_config().bucket, config.gcs_bucket);
        assert_eq!(config.fhir_config().project_id, "clinic-prod");
        assert_eq!(config.bigquery_config().access_token, "token");
        assert_eq!(config.vertex_config().location, "us-central1");
        assert_eq!(config.poll_config().max_wait, config.poll_max_wait);

        let drift = config.drift_config();
        assert_eq!(drift.model_display_name, config.model_name);
        assert!((drift.drift_threshold - config.drift_threshold).abs() < f64::EPSILON);

        let template = config.training_request_template();
        assert_eq!(template.model_display_name, config.model_name);
        assert_eq!(template.python_module, config.training_module);
    }

    #[test]
    fn test_parse_env_value() {
        assert_eq!(parse_env_value::<u64>("42", "KEY").unwrap(), 42);
        assert!((parse_env_value::<f64>("0.25", "KEY").unwrap() - 0.25).abs() < f64::EPSILON);

        let err = parse_env_value::<u64>("not-a-number", "KEY").unwrap_err();
        assert!(err.to_string().contains("KEY"));
        assert!(err.to_string().contains("not-a-number"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("PROJECT_ID".to_string());
        assert!(err.to_string().contains("PROJECT_ID"));

        let err = ConfigError::ValidationFailed("bad value".to_string());
        assert!(err.to_string().contains("bad value"));
    }
}
