//! Synthetic clinical data generation.
//!
//! Runs the external Synthea generator as a child process. The generator
//! writes a timestamped partition of FHIR bundles and metadata under the
//! local data root; everything downstream of this stage only reads that
//! tree.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tracing::{error, info};

use crate::error::GenerateError;

/// Configuration for the external data generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Program to execute.
    pub command: String,
    pub args: Vec<String>,
    /// Directory the generator writes partitions into; exported to the
    /// child as `CAREFORGE_DATA_ROOT`.
    pub data_root: PathBuf,
    /// Budget for one generator run.
    pub timeout: Duration,
}

impl GeneratorConfig {
    pub fn new(command: impl Into<String>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            data_root: data_root.into(),
            timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Child-process wrapper around the Synthea generator.
pub struct SyntheaGenerator {
    config: GeneratorConfig,
}

impl SyntheaGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Runs the generator to completion, failing on a non-zero exit.
    pub async fn run(&self) -> Result<(), GenerateError> {
        info!(
            command = %self.config.command,
            args = ?self.config.args,
            "Running data generator"
        );

        let child = Command::new(&self.config.command)
            .args(&self.config.args)
            .env("CAREFORGE_DATA_ROOT", &self.config.data_root)
            .output();

        let output = tokio::time::timeout(self.config.timeout, child)
            .await
            .map_err(|_| GenerateError::Timeout(self.config.timeout))??;

        if output.status.success() {
            info!(
                stdout_bytes = output.stdout.len(),
                "Data generation complete"
            );
            Ok(())
        } else {
            let status = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(status, stderr = %stderr.trim(), "Data generator failed");
            Err(GenerateError::Failed { status })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let config = GeneratorConfig::new("true", "/tmp");
        let generator = SyntheaGenerator::new(config);
        assert!(generator.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_an_error() {
        let config = GeneratorConfig::new("false", "/tmp");
        let generator = SyntheaGenerator::new(config);
        match generator.run().await {
            Err(GenerateError::Failed { status }) => assert_eq!(status, 1),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_an_io_error() {
        let config = GeneratorConfig::new("careforge-no-such-binary", "/tmp");
        let generator = SyntheaGenerator::new(config);
        assert!(matches!(
            generator.run().await,
            Err(GenerateError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let config =
            GeneratorConfig::new("sleep", "/tmp").with_args(vec!["5".to_string()])
                .with_timeout(Duration::from_millis(50));
        let generator = SyntheaGenerator::new(config);
        assert!(matches!(
            generator.run().await,
            Err(GenerateError::Timeout(_))
        ));
    }
}
