//! Blob storage backends.
//!
//! The object store is this pipeline's only idempotence ledger: the set of
//! keys that already exist remotely decides which local files still need to
//! be uploaded. No separate manifest or checkpoint file is maintained.
//!
//! Two implementations are provided:
//!
//! - [`GcsBlobStore`]: Google Cloud Storage via the JSON API
//! - [`MemoryBlobStore`]: an in-memory store for tests and dry runs

pub mod gcs;
pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;

pub use gcs::{GcsBlobStore, GcsConfig};
pub use memory::MemoryBlobStore;

/// Contract required of a blob store collaborator.
///
/// `upload` must be atomic and durable on success: a partially transferred
/// object must never become visible to later `exists` checks.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Uploads `bytes` to `key`, overwriting any existing object.
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Lists the immediate "directory" names under `prefix`.
    ///
    /// `prefix` should end with `/`. Returned names have the prefix and the
    /// trailing separator stripped, e.g. listing `raw_data/` over keys
    /// `raw_data/20250801-0300/fhir/a.json` yields `["20250801-0300"]`.
    async fn list_dirs(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
