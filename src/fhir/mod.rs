//! Cloud Healthcare FHIR store client.
//!
//! Covers the two bulk operations the pipeline needs: importing FHIR
//! resources from GCS into the store, and exporting the store into a
//! BigQuery dataset with the analytic schema. Both are asynchronous
//! server-side jobs; the returned [`OperationHandle`] is polled to
//! completion by [`operation::await_operation`].

pub mod operation;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::OperationError;

pub use operation::{await_operation, OperationOutcome, PollConfig};

const HEALTHCARE_API_BASE: &str = "https://healthcare.googleapis.com/v1";

/// Configuration for a [`FhirStoreClient`].
#[derive(Debug, Clone)]
pub struct FhirStoreConfig {
    pub project_id: String,
    pub location: String,
    pub dataset_id: String,
    pub fhir_store_id: String,
    /// OAuth2 access token with Healthcare API permissions.
    pub access_token: String,
}

impl FhirStoreConfig {
    /// Fully qualified resource path of the FHIR store.
    pub fn store_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/datasets/{}/fhirStores/{}",
            self.project_id, self.location, self.dataset_id, self.fhir_store_id
        )
    }
}

/// Handle for a long-running healthcare API operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    /// Fully qualified operation name, e.g.
    /// `projects/p/locations/l/datasets/d/operations/123`.
    pub name: String,
}

/// One poll observation of a long-running operation.
#[derive(Debug, Clone)]
pub struct OperationStatus {
    pub done: bool,
    /// Error message reported by the operation, if it finished unsuccessfully.
    pub error: Option<String>,
}

/// Contract for polling a long-running operation to completion.
#[async_trait]
pub trait OperationPoller: Send + Sync {
    async fn poll(&self, handle: &OperationHandle) -> Result<OperationStatus, OperationError>;
}

#[derive(Debug, Serialize)]
struct GcsSource {
    uri: String,
}

#[derive(Debug, Serialize)]
struct ImportRequest {
    #[serde(rename = "gcsSource")]
    gcs_source: GcsSource,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SchemaConfig {
    schema_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BigQueryDestination {
    dataset_uri: String,
    schema_config: SchemaConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportRequest {
    bigquery_destination: BigQueryDestination,
}

#[derive(Debug, Deserialize)]
struct OperationResource {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorBody {
    #[serde(default)]
    message: String,
}

/// REST client for one FHIR store.
pub struct FhirStoreClient {
    client: Client,
    config: FhirStoreConfig,
}

impl FhirStoreClient {
    pub fn new(config: FhirStoreConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");
        Self { client, config }
    }

    /// Starts an import of FHIR resources from GCS into the store.
    ///
    /// `source_uri` is a `gs://` URI, wildcards allowed, e.g.
    /// `gs://bucket/raw_data/20250801-0300/fhir/*.json`.
    pub async fn import_from_gcs(
        &self,
        source_uri: &str,
    ) -> Result<OperationHandle, OperationError> {
        let url = format!(
            "{}/{}:import",
            HEALTHCARE_API_BASE,
            self.config.store_path()
        );
        let body = ImportRequest {
            gcs_source: GcsSource {
                uri: source_uri.to_string(),
            },
        };

        tracing::info!(store = %self.config.store_path(), source = source_uri, "Starting FHIR import");
        self.submit(&url, &body).await
    }

    /// Starts an export of the store into a BigQuery dataset.
    ///
    /// `dataset_uri` is a `bq://` URI, e.g. `bq://my-project.fhir_analytics`.
    /// The export uses the analytic schema, which flattens FHIR resources
    /// into queryable tables.
    pub async fn export_to_bigquery(
        &self,
        dataset_uri: &str,
    ) -> Result<OperationHandle, OperationError> {
        let url = format!(
            "{}/{}:export",
            HEALTHCARE_API_BASE,
            self.config.store_path()
        );
        let body = ExportRequest {
            bigquery_destination: BigQueryDestination {
                dataset_uri: dataset_uri.to_string(),
                schema_config: SchemaConfig {
                    schema_type: "ANALYTIC_SCHEMA".to_string(),
                },
            },
        };

        tracing::info!(store = %self.config.store_path(), destination = dataset_uri, "Starting FHIR export");
        self.submit(&url, &body).await
    }

    async fn submit<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<OperationHandle, OperationError> {
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
            return Err(OperationError::UnexpectedStatus {
                status: status.as_u16(),
                message,
            });
        }

        let operation: OperationResource = resp
            .json()
            .await
            .map_err(|e| OperationError::MalformedResponse(e.to_string()))?;
        Ok(OperationHandle {
            name: operation.name,
        })
    }
}

#[async_trait]
impl OperationPoller for FhirStoreClient {
    async fn poll(&self, handle: &OperationHandle) -> Result<OperationStatus, OperationError> {
        let url = format!("{}/{}", HEALTHCARE_API_BASE, handle.name);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OperationError::UnexpectedStatus {
                status: status.as_u16(),
                message,
            });
        }

        let operation: OperationResource = resp
            .json()
            .await
            .map_err(|e| OperationError::MalformedResponse(e.to_string()))?;
        Ok(OperationStatus {
            done: operation.done,
            error: operation.error.map(|e| e.message),
        })
    }
}
