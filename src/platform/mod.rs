//! Vertex AI client.
//!
//! Thin job-submission surface over the ML platform: model lookup by
//! display name, batch prediction jobs, and python-package custom training
//! jobs. Submission returns a [`JobHandle`]; job completion is the
//! platform's concern, not this pipeline's.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::PlatformError;

/// Default machine type for training and batch prediction workers.
const DEFAULT_MACHINE_TYPE: &str = "n1-standard-4";

/// Configuration for a [`VertexAiClient`].
#[derive(Debug, Clone)]
pub struct VertexConfig {
    pub project_id: String,
    pub location: String,
    /// OAuth2 access token with `aiplatform` permissions.
    pub access_token: String,
}

/// A registered model, as listed by display name.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSummary {
    /// Fully qualified model resource name.
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Handle for a submitted platform job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Fully qualified job resource name.
    pub name: String,
    pub display_name: String,
}

/// Description of a python-package custom training job.
///
/// Immutable once submitted; ownership passes to the platform on
/// submission.
#[derive(Debug, Clone)]
pub struct TrainingJobRequest {
    /// Unique-per-submission display name.
    pub display_name: String,
    /// `gs://` URI of the training package.
    pub package_uri: String,
    /// Python module to execute, e.g. `train_model`.
    pub python_module: String,
    /// Training container image.
    pub container_image: String,
    /// Display name under which the trained model is registered.
    pub model_display_name: String,
    /// `gs://` URI prefix receiving model artifacts.
    pub base_output_dir: String,
    pub machine_type: String,
}

impl TrainingJobRequest {
    pub fn new(
        display_name: impl Into<String>,
        package_uri: impl Into<String>,
        model_display_name: impl Into<String>,
        base_output_dir: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            package_uri: package_uri.into(),
            python_module: "train_model".to_string(),
            container_image:
                "us-docker.pkg.dev/vertex-ai/training/scikit-learn-cpu.0-24:latest".to_string(),
            model_display_name: model_display_name.into(),
            base_output_dir: base_output_dir.into(),
            machine_type: DEFAULT_MACHINE_TYPE.to_string(),
        }
    }

    /// Sets the python module executed by the training package.
    pub fn with_python_module(mut self, module: impl Into<String>) -> Self {
        self.python_module = module.into();
        self
    }

    /// Sets the training container image.
    pub fn with_container_image(mut self, image: impl Into<String>) -> Self {
        self.container_image = image.into();
        self
    }

    /// Sets the worker machine type.
    pub fn with_machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.machine_type = machine_type.into();
        self
    }
}

/// Description of a batch prediction job over BigQuery tables.
#[derive(Debug, Clone)]
pub struct BatchPredictionRequest {
    pub display_name: String,
    /// Fully qualified model resource name.
    pub model_name: String,
    /// `bq://` URI of the instances table.
    pub bigquery_source: String,
    /// `bq://` URI receiving predictions.
    pub bigquery_destination: String,
    pub machine_type: String,
}

impl BatchPredictionRequest {
    pub fn new(
        display_name: impl Into<String>,
        model_name: impl Into<String>,
        bigquery_source: impl Into<String>,
        bigquery_destination: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            model_name: model_name.into(),
            bigquery_source: bigquery_source.into(),
            bigquery_destination: bigquery_destination.into(),
            machine_type: DEFAULT_MACHINE_TYPE.to_string(),
        }
    }

    /// Sets the worker machine type.
    pub fn with_machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.machine_type = machine_type.into();
        self
    }
}

/// Submission seam used by the drift monitor, so retraining is testable
/// without a live platform.
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    async fn submit_training_job(
        &self,
        request: &TrainingJobRequest,
    ) -> Result<JobHandle, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    #[serde(default)]
    models: Vec<ModelSummary>,
}

#[derive(Debug, Deserialize)]
struct JobResource {
    name: String,
    #[serde(rename = "displayName", default)]
    display_name: String,
}

/// REST client for one Vertex AI project/location.
pub struct VertexAiClient {
    client: Client,
    config: VertexConfig,
}

impl VertexAiClient {
    pub fn new(config: VertexConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");
        Self { client, config }
    }

    fn api_base(&self) -> String {
        format!(
            "https://{}-aiplatform.googleapis.com/v1",
            self.config.location
        )
    }

    fn parent(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.config.project_id, self.config.location
        )
    }

    /// Lists registered models with the given display name.
    pub async fn list_models(
        &self,
        display_name: &str,
    ) -> Result<Vec<ModelSummary>, PlatformError> {
        let url = format!("{}/{}/models", self.api_base(), self.parent());
        let filter = format!("display_name=\"{}\"", display_name);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .query(&[("filter", filter.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PlatformError::UnexpectedStatus {
                status: status.as_u16(),
                message,
            });
        }

        let list: ModelListResponse = resp.json().await?;
        Ok(list.models)
    }

    /// Returns the newest registered model with the given display name.
    pub async fn find_model(&self, display_name: &str) -> Result<ModelSummary, PlatformError> {
        self.list_models(display_name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::ModelNotFound(display_name.to_string()))
    }

    /// Submits a batch prediction job. Fire-and-forget: the handle is
    /// returned as soon as the platform acknowledges the job.
    pub async fn submit_batch_prediction(
        &self,
        request: &BatchPredictionRequest,
    ) -> Result<JobHandle, PlatformError> {
        let url = format!("{}/{}/batchPredictionJobs", self.api_base(), self.parent());
        let body = serde_json::json!({
            "displayName": request.display_name,
            "model": request.model_name,
            "inputConfig": {
                "instancesFormat": "bigquery",
                "bigquerySource": { "inputUri": request.bigquery_source },
            },
            "outputConfig": {
                "predictionsFormat": "bigquery",
                "bigqueryDestination": { "outputUri": request.bigquery_destination },
            },
            "dedicatedResources": {
                "machineSpec": { "machineType": request.machine_type },
                "startingReplicaCount": 1,
            },
        });

        let handle = self.submit_job(&url, &body).await?;
        tracing::info!(job = %handle.name, display_name = %handle.display_name, "Submitted batch prediction job");
        Ok(handle)
    }

    async fn submit_job(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<JobHandle, PlatformError> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PlatformError::UnexpectedStatus {
                status: status.as_u16(),
                message,
            });
        }

        let job: JobResource = resp.json().await?;
        Ok(JobHandle {
            name: job.name,
            display_name: job.display_name,
        })
    }
}

#[async_trait]
impl ModelTrainer for VertexAiClient {
    async fn submit_training_job(
        &self,
        request: &TrainingJobRequest,
    ) -> Result<JobHandle, PlatformError> {
        let url = format!("{}/{}/customJobs", self.api_base(), self.parent());
        let body = serde_json::json!({
            "displayName": request.display_name,
            "jobSpec": {
                "workerPoolSpecs": [{
                    "machineSpec": { "machineType": request.machine_type },
                    "replicaCount": "1",
                    "pythonPackageSpec": {
                        "executorImageUri": request.container_image,
                        "packageUris": [request.package_uri],
                        "pythonModule": request.python_module,
                        "args": [
                            format!("--model-display-name={}", request.model_display_name),
                        ],
                    },
                }],
                "baseOutputDirectory": { "outputUriPrefix": request.base_output_dir },
            },
        });

        let handle = self.submit_job(&url, &body).await?;
        tracing::info!(job = %handle.name, display_name = %handle.display_name, "Submitted training job");
        Ok(handle)
    }
}
