//! Google Cloud Storage blob store.
//!
//! Talks to the GCS JSON API with an OAuth2 bearer token. Object existence
//! is a metadata GET (404 means absent), uploads use the single-request
//! media upload endpoint, and hierarchical listing uses `delimiter=/` with
//! page-token pagination.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::StoreError;
use crate::storage::BlobStore;

const GCS_API_BASE: &str = "https://storage.googleapis.com/storage/v1";
const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

/// Configuration for a [`GcsBlobStore`].
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// Bucket name, without the `gs://` scheme.
    pub bucket: String,
    /// OAuth2 access token with `storage.objects` permissions.
    pub access_token: String,
}

/// Blob store backed by a single GCS bucket.
pub struct GcsBlobStore {
    client: Client,
    config: GcsConfig,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    prefixes: Vec<String>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

impl GcsBlobStore {
    pub fn new(config: GcsConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to build HTTP client");
        Self { client, config }
    }

    /// Metadata URL for a single object. Object names are percent-encoded
    /// as one path segment, so `/` becomes `%2F`.
    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            GCS_API_BASE,
            self.config.bucket,
            urlencoding::encode(key)
        )
    }

    /// `gs://bucket/key` form used in log messages.
    pub fn object_uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.config.bucket, key)
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let resp = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(true)
        } else if status.as_u16() == 404 {
            Ok(false)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let url = format!(
            "{}/b/{}/o?uploadType=media&name={}",
            GCS_UPLOAD_BASE,
            self.config.bucket,
            urlencoding::encode(key)
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::info!(uri = %self.object_uri(key), "Uploaded object");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn list_dirs(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut dirs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(format!("{}/b/{}/o", GCS_API_BASE, self.config.bucket))
                .bearer_auth(&self.config.access_token)
                .query(&[
                    ("prefix", prefix),
                    ("delimiter", "/"),
                    ("fields", "prefixes,nextPageToken"),
                ]);
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }

            let resp = req.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(StoreError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            let page: ListResponse = resp.json().await?;
            for full in page.prefixes {
                let name = full
                    .strip_prefix(prefix)
                    .unwrap_or(full.as_str())
                    .trim_end_matches('/')
                    .to_string();
                if !name.is_empty() {
                    dirs.push(name);
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        dirs.sort();
        Ok(dirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_separators() {
        let store = GcsBlobStore::new(GcsConfig {
            bucket: "clinical-data".to_string(),
            access_token: "token".to_string(),
        });
        assert_eq!(
            store.object_url("raw_data/20250801/fhir/a.json"),
            format!(
                "{}/b/clinical-data/o/raw_data%2F20250801%2Ffhir%2Fa.json",
                GCS_API_BASE
            )
        );
    }

    #[test]
    fn test_object_uri() {
        let store = GcsBlobStore::new(GcsConfig {
            bucket: "clinical-data".to_string(),
            access_token: "token".to_string(),
        });
        assert_eq!(
            store.object_uri("raw_data/a.json"),
            "gs://clinical-data/raw_data/a.json"
        );
    }
}
