//! The directory sync pass.
//!
//! Walks the local tree, decides per file whether to upload, and folds the
//! decisions into a [`SyncSummary`]. File decisions are independent and
//! idempotent, so the pass runs them through a bounded-concurrency stream;
//! an existence-check/upload race can at worst produce one redundant
//! upload, never corruption.

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::SyncError;
use crate::ingest::key::object_key;
use crate::storage::BlobStore;

/// Default number of concurrent per-file sync tasks.
const DEFAULT_CONCURRENCY: usize = 8;

/// Configuration for a single sync pass.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Local directory to replicate.
    pub local_root: PathBuf,
    /// Remote key prefix, e.g. `raw_data/20250801-0300/fhir`.
    pub remote_prefix: String,
    /// Maximum number of files processed concurrently.
    pub concurrency: usize,
}

impl SyncConfig {
    pub fn new(local_root: impl Into<PathBuf>, remote_prefix: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_prefix: remote_prefix.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets the per-file concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    fn validate(&self) -> Result<(), SyncError> {
        if !self.local_root.is_dir() {
            return Err(SyncError::InvalidRoot(self.local_root.clone()));
        }
        if self.remote_prefix.is_empty() || self.remote_prefix.starts_with('/') {
            return Err(SyncError::InvalidPrefix(self.remote_prefix.clone()));
        }
        if self.concurrency == 0 {
            return Err(SyncError::InvalidConcurrency);
        }
        Ok(())
    }
}

/// Per-file outcome of the sync decision chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDecision {
    /// The file is not well-formed JSON; permanently skipped for this run.
    SkipInvalid,
    /// An object already exists at the derived key; nothing to do.
    SkipExists,
    /// The file was uploaded.
    Upload,
}

/// Counters for one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Files whose content parsed as well-formed JSON.
    pub validated: u64,
    /// Files skipped because they failed validation.
    pub skipped_invalid: u64,
    /// Valid files skipped because their key already existed remotely.
    pub skipped_existing: u64,
    /// Valid files uploaded by this pass.
    pub uploaded: u64,
}

impl SyncSummary {
    fn record(&mut self, decision: UploadDecision) {
        match decision {
            UploadDecision::SkipInvalid => self.skipped_invalid += 1,
            UploadDecision::SkipExists => {
                self.validated += 1;
                self.skipped_existing += 1;
            }
            UploadDecision::Upload => {
                self.validated += 1;
                self.uploaded += 1;
            }
        }
    }

    /// Total number of files the pass looked at.
    pub fn total(&self) -> u64 {
        self.validated + self.skipped_invalid
    }
}

/// Replicates every regular file under `config.local_root` into the store
/// under `config.remote_prefix`, at most once per file.
///
/// Traversal order is unspecified and nothing below depends on it. Files
/// that are not well-formed JSON are skipped with a warning and never
/// uploaded. Store errors (existence check or upload) abort the whole pass;
/// re-running after a partial pass is safe because the existing remote keys
/// are skipped.
pub async fn sync_directory(
    store: &dyn BlobStore,
    config: &SyncConfig,
) -> Result<SyncSummary, SyncError> {
    config.validate()?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&config.local_root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let decisions: Vec<UploadDecision> = stream::iter(files)
        .map(|path| sync_one(store, config, path))
        .buffer_unordered(config.concurrency)
        .try_collect()
        .await?;

    let mut summary = SyncSummary::default();
    for decision in decisions {
        summary.record(decision);
    }

    info!(
        root = %config.local_root.display(),
        prefix = %config.remote_prefix,
        validated = summary.validated,
        skipped_invalid = summary.skipped_invalid,
        skipped_existing = summary.skipped_existing,
        uploaded = summary.uploaded,
        "Directory sync complete"
    );
    Ok(summary)
}

/// Runs the decision chain for one file: validate, derive key, check
/// existence, upload.
async fn sync_one(
    store: &dyn BlobStore,
    config: &SyncConfig,
    path: PathBuf,
) -> Result<UploadDecision, SyncError> {
    let bytes = tokio::fs::read(&path).await?;

    if serde_json::from_slice::<serde_json::Value>(&bytes).is_err() {
        warn!(path = %path.display(), "Skipping invalid JSON file");
        return Ok(UploadDecision::SkipInvalid);
    }

    let relative = relative_to_root(&path, &config.local_root)?;
    let key = object_key(&config.remote_prefix, relative);

    if store.exists(&key).await? {
        debug!(path = %path.display(), key, "Skipping already-uploaded file");
        return Ok(UploadDecision::SkipExists);
    }

    store.upload(&key, bytes).await?;
    info!(path = %path.display(), key, "Uploaded file");
    Ok(UploadDecision::Upload)
}

fn relative_to_root<'a>(path: &'a Path, root: &Path) -> Result<&'a Path, SyncError> {
    path.strip_prefix(root)
        .map_err(|_| SyncError::OutsideRoot(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::storage::MemoryBlobStore;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    fn tree_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        for (rel, content) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_uploads_valid_files() {
        let dir = tree_with(&[
            ("fhir/a.json", r#"{"resourceType": "Patient"}"#),
            ("metadata/c.json", r#"{"practitioners": 12}"#),
        ]);
        let store = MemoryBlobStore::new();
        let config = SyncConfig::new(dir.path(), "raw_data/20250801-0300");

        let summary = sync_directory(&store, &config).await.unwrap();
        assert_eq!(summary.validated, 2);
        assert_eq!(summary.uploaded, 2);
        assert_eq!(
            store.keys(),
            vec![
                "raw_data/20250801-0300/fhir/a.json",
                "raw_data/20250801-0300/metadata/c.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_run_uploads_nothing() {
        let dir = tree_with(&[
            ("fhir/a.json", r#"{"resourceType": "Patient"}"#),
            ("fhir/b.json", r#"{"resourceType": "Encounter"}"#),
        ]);
        let store = MemoryBlobStore::new();
        let config = SyncConfig::new(dir.path(), "raw_data/x");

        let first = sync_directory(&store, &config).await.unwrap();
        assert_eq!(first.uploaded, 2);

        let second = sync_directory(&store, &config).await.unwrap();
        assert_eq!(second.uploaded, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(second.validated, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_json_is_never_uploaded() {
        let dir = tree_with(&[("fhir/bad.json", "{not json")]);
        let store = MemoryBlobStore::new();
        let config = SyncConfig::new(dir.path(), "raw_data/x");

        let summary = sync_directory(&store, &config).await.unwrap();
        assert_eq!(summary.skipped_invalid, 1);
        assert_eq!(summary.validated, 0);
        assert!(store.is_empty());

        // Even with the key present remotely, the invalid file counts as
        // invalid, not as existing.
        store.insert("raw_data/x/fhir/bad.json", vec![]);
        let again = sync_directory(&store, &config).await.unwrap();
        assert_eq!(again.skipped_invalid, 1);
        assert_eq!(again.skipped_existing, 0);
    }

    #[tokio::test]
    async fn test_changed_content_with_same_name_is_not_reuploaded() {
        let dir = tree_with(&[("a.json", r#"{"v": 1}"#)]);
        let store = MemoryBlobStore::new();
        let config = SyncConfig::new(dir.path(), "raw_data/x");
        sync_directory(&store, &config).await.unwrap();

        fs::write(dir.path().join("a.json"), r#"{"v": 2}"#).unwrap();
        let summary = sync_directory(&store, &config).await.unwrap();
        assert_eq!(summary.skipped_existing, 1);
        assert_eq!(summary.uploaded, 0);
        assert_eq!(store.get("raw_data/x/a.json"), Some(br#"{"v": 1}"#.to_vec()));
    }

    #[tokio::test]
    async fn test_empty_tree_yields_zero_summary() {
        let dir = TempDir::new().unwrap();
        let store = MemoryBlobStore::new();
        let config = SyncConfig::new(dir.path(), "raw_data/x");

        let summary = sync_directory(&store, &config).await.unwrap();
        assert_eq!(summary, SyncSummary::default());
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let store = MemoryBlobStore::new();
        let config = SyncConfig::new("/nonexistent/careforge-test", "raw_data/x");
        let err = sync_directory(&store, &config).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRoot(_)));
    }

    #[tokio::test]
    async fn test_prefix_validation() {
        let dir = TempDir::new().unwrap();
        let store = MemoryBlobStore::new();

        let empty = SyncConfig::new(dir.path(), "");
        assert!(matches!(
            sync_directory(&store, &empty).await.unwrap_err(),
            SyncError::InvalidPrefix(_)
        ));

        let absolute = SyncConfig::new(dir.path(), "/raw_data");
        assert!(matches!(
            sync_directory(&store, &absolute).await.unwrap_err(),
            SyncError::InvalidPrefix(_)
        ));
    }

    /// Store whose existence checks always fail, to model a remote outage.
    struct FailingStore;

    #[async_trait]
    impl crate::storage::BlobStore for FailingStore {
        async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::UnexpectedStatus {
                status: 503,
                body: "backend unavailable".to_string(),
            })
        }

        async fn upload(&self, _key: &str, _bytes: Vec<u8>) -> Result<(), StoreError> {
            unreachable!("upload should not be reached when exists fails")
        }

        async fn list_dirs(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_errors_abort_the_pass() {
        let dir = tree_with(&[("a.json", "{}")]);
        let config = SyncConfig::new(dir.path(), "raw_data/x").with_concurrency(1);
        let err = sync_directory(&FailingStore, &config).await.unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
    }
}
