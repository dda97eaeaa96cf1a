//! Idempotent directory ingestion.
//!
//! Replicates a local directory tree into a remote blob namespace, at most
//! once per file. Each file is validated as JSON, mapped to a deterministic
//! object key, and uploaded only if no object already exists at that key.
//! The remote key set is the only idempotence ledger, so an interrupted run
//! can simply be re-executed from scratch.
//!
//! A file that changed locally but kept its name is **not** re-uploaded:
//! existence alone is the skip signal, with no content comparison. That is
//! an inherited property of the ingestion contract, not an oversight.

pub mod key;
pub mod sync;

pub use key::object_key;
pub use sync::{sync_directory, SyncConfig, SyncSummary, UploadDecision};
