//! Linear stage execution with fixed-count retry.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pipeline::stage::{Stage, StageError};

/// Default number of extra attempts per stage, matching the weekly
/// schedule's retry policy.
const DEFAULT_MAX_RETRIES: u32 = 1;

/// Errors that can abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed after {attempts} attempt(s): {source}")]
    StageFailed {
        stage: String,
        attempts: u32,
        #[source]
        source: StageError,
    },
}

/// Per-stage execution record for a completed run.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: String,
    pub attempts: u32,
    pub duration: Duration,
}

/// Executes registered stages in order, retrying each a fixed number of
/// times. A stage that exhausts its attempts aborts the run; later stages
/// never start.
pub struct PipelineRunner {
    stages: Vec<Box<dyn Stage>>,
    max_retries: u32,
    run_id: Uuid,
}

impl Default for PipelineRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl PipelineRunner {
    pub fn new(max_retries: u32) -> Self {
        Self {
            stages: Vec::new(),
            max_retries,
            run_id: Uuid::new_v4(),
        }
    }

    /// Appends a stage to the execution order.
    pub fn register(&mut self, stage: Box<dyn Stage>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs all stages. On success, returns one report per stage; on
    /// failure, the error names the stage that exhausted its attempts.
    pub async fn run(&self) -> Result<Vec<StageReport>, PipelineError> {
        let mut reports = Vec::with_capacity(self.stages.len());
        info!(run_id = %self.run_id, stages = self.stages.len(), "Starting pipeline run");

        for stage in &self.stages {
            let start = Instant::now();
            let mut attempts = 0;

            loop {
                attempts += 1;
                info!(run_id = %self.run_id, stage = stage.name(), attempt = attempts, "Running stage");

                match stage.run().await {
                    Ok(()) => {
                        let duration = start.elapsed();
                        info!(
                            run_id = %self.run_id,
                            stage = stage.name(),
                            attempts,
                            ?duration,
                            "Stage succeeded"
                        );
                        reports.push(StageReport {
                            stage: stage.name().to_string(),
                            attempts,
                            duration,
                        });
                        break;
                    }
                    Err(err) if attempts <= self.max_retries => {
                        warn!(
                            run_id = %self.run_id,
                            stage = stage.name(),
                            attempt = attempts,
                            error = %err,
                            "Stage failed, retrying"
                        );
                    }
                    Err(err) => {
                        error!(
                            run_id = %self.run_id,
                            stage = stage.name(),
                            attempts,
                            error = %err,
                            "Stage failed, aborting pipeline"
                        );
                        return Err(PipelineError::StageFailed {
                            stage: stage.name().to_string(),
                            attempts,
                            source: err,
                        });
                    }
                }
            }
        }

        info!(run_id = %self.run_id, "Pipeline run complete");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Stage that fails a scripted number of times before succeeding.
    struct FlakyStage {
        name: &'static str,
        failures_left: AtomicU32,
        runs: Arc<AtomicU32>,
    }

    impl FlakyStage {
        fn new(name: &'static str, failures: u32, runs: Arc<AtomicU32>) -> Self {
            Self {
                name,
                failures_left: AtomicU32::new(failures),
                runs,
            }
        }
    }

    #[async_trait]
    impl Stage for FlakyStage {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self) -> Result<(), StageError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                Err(StageError::MissingPartition("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_all_stages_run_in_order() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut runner = PipelineRunner::new(0);
        runner.register(Box::new(FlakyStage::new("first", 0, runs.clone())));
        runner.register(Box::new(FlakyStage::new("second", 0, runs.clone())));

        let reports = runner.run().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(
            reports.iter().map(|r| r.stage.as_str()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
    }

    #[tokio::test]
    async fn test_single_failure_is_retried() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut runner = PipelineRunner::new(1);
        runner.register(Box::new(FlakyStage::new("flaky", 1, runs.clone())));

        let reports = runner.run().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(reports[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_and_skip_later_stages() {
        let failing_runs = Arc::new(AtomicU32::new(0));
        let later_runs = Arc::new(AtomicU32::new(0));

        let mut runner = PipelineRunner::new(1);
        runner.register(Box::new(FlakyStage::new("doomed", 5, failing_runs.clone())));
        runner.register(Box::new(FlakyStage::new("later", 0, later_runs.clone())));

        let err = runner.run().await.unwrap_err();
        match err {
            PipelineError::StageFailed {
                stage, attempts, ..
            } => {
                assert_eq!(stage, "doomed");
                assert_eq!(attempts, 2);
            }
        }
        assert_eq!(failing_runs.load(Ordering::SeqCst), 2);
        assert_eq!(later_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stage_names_reflect_registration_order() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut runner = PipelineRunner::default();
        runner.register(Box::new(FlakyStage::new("a", 0, runs.clone())));
        runner.register(Box::new(FlakyStage::new("b", 0, runs)));
        assert_eq!(runner.stage_names(), vec!["a", "b"]);
    }
}
