//! BigQuery aggregation queries.
//!
//! The pipeline only ever asks the warehouse one kind of question: how
//! many predictions exist, and how many of them are low-confidence. The
//! client wraps the synchronous `jobs.query` endpoint and parses the
//! string-typed cells BigQuery returns.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::WarehouseError;
use crate::monitor::{DriftStatistics, PredictionStatsSource};

const BIGQUERY_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Configuration for a [`BigQueryClient`].
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project_id: String,
    /// OAuth2 access token with BigQuery read permissions.
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    v: Option<serde_json::Value>,
}

/// REST client for one BigQuery project.
pub struct BigQueryClient {
    client: Client,
    config: BigQueryConfig,
}

impl BigQueryClient {
    pub fn new(config: BigQueryConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");
        Self { client, config }
    }

    async fn query(&self, sql: &str) -> Result<QueryResponse, WarehouseError> {
        let url = format!(
            "{}/projects/{}/queries",
            BIGQUERY_API_BASE, self.config.project_id
        );
        let body = QueryRequest {
            query: sql.to_string(),
            use_legacy_sql: false,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(WarehouseError::UnexpectedStatus {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}

/// SQL for the confidence aggregate over `table`.
///
/// `SUM` over an empty table yields NULL, which the cell parser maps
/// to 0.
fn stats_query(table: &str, confidence_cutoff: f64) -> String {
    format!(
        "SELECT COUNT(*) AS total_predictions, \
         SUM(CASE WHEN confidence < {cutoff} THEN 1 ELSE 0 END) AS low_confidence_count \
         FROM `{table}`",
        cutoff = confidence_cutoff,
        table = table,
    )
}

/// Parses one numeric cell. BigQuery serializes integers as JSON strings;
/// NULL aggregates (empty-table `SUM`) come back as `null`.
fn parse_count(cell: Option<&Cell>, column: &str) -> Result<u64, WarehouseError> {
    let value = match cell.and_then(|c| c.v.as_ref()) {
        None | Some(serde_json::Value::Null) => return Ok(0),
        Some(value) => value,
    };

    let text = match value {
        serde_json::Value::String(s) => s.as_str(),
        other => {
            return Err(WarehouseError::MalformedCell {
                column: column.to_string(),
                value: other.to_string(),
            })
        }
    };

    text.parse::<u64>()
        .map_err(|_| WarehouseError::MalformedCell {
            column: column.to_string(),
            value: text.to_string(),
        })
}

fn stats_from_response(resp: &QueryResponse) -> Result<DriftStatistics, WarehouseError> {
    let row = resp.rows.first().ok_or(WarehouseError::EmptyResult)?;
    let total_predictions = parse_count(row.f.first(), "total_predictions")?;
    let low_confidence = parse_count(row.f.get(1), "low_confidence_count")?;
    Ok(DriftStatistics {
        total_predictions,
        low_confidence,
    })
}

/// Prediction-statistics source backed by one BigQuery table.
pub struct BigQueryPredictionSource {
    client: BigQueryClient,
    /// Fully qualified prediction table, e.g.
    /// `clinic-prod.fhir_analytics.predictions`.
    table: String,
    confidence_cutoff: f64,
}

impl BigQueryPredictionSource {
    pub fn new(client: BigQueryClient, table: impl Into<String>, confidence_cutoff: f64) -> Self {
        Self {
            client,
            table: table.into(),
            confidence_cutoff,
        }
    }
}

#[async_trait]
impl PredictionStatsSource for BigQueryPredictionSource {
    async fn prediction_stats(&self) -> Result<DriftStatistics, WarehouseError> {
        let sql = stats_query(&self.table, self.confidence_cutoff);
        tracing::debug!(table = %self.table, "Running prediction stats query");
        let resp = self.client.query(&sql).await?;
        stats_from_response(&resp)
    }
}
