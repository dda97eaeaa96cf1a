//! Drift monitoring and retrain triggering.
//!
//! The monitor reads aggregate prediction-confidence statistics from the
//! warehouse, computes the low-confidence ratio, and submits a retraining
//! job when the ratio crosses the drift threshold. An empty prediction
//! table is an abstention, not a measurement: the monitor reports
//! insufficient data and takes no action.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{DriftError, PlatformError, WarehouseError};
use crate::platform::{JobHandle, ModelTrainer, TrainingJobRequest};

/// Reference drift threshold: retrain once more than 30% of predictions
/// are low-confidence.
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.3;

/// Reference confidence cutoff: a prediction below 0.6 counts as
/// low-confidence.
pub const DEFAULT_CONFIDENCE_CUTOFF: f64 = 0.6;

/// Configuration for one [`DriftMonitor`].
#[derive(Debug, Clone)]
pub struct DriftConfig {
    /// Low-confidence ratio above which retraining is triggered
    /// (strictly greater than).
    pub drift_threshold: f64,
    /// Confidence score below which a prediction counts as low-confidence.
    pub confidence_cutoff: f64,
    /// Display name of the monitored model.
    pub model_display_name: String,
    /// `gs://` URI of the training package submitted on retrain.
    pub training_package_uri: String,
    /// Python module inside the training package.
    pub training_module: String,
    /// Training container image.
    pub training_container_image: String,
    /// `gs://` output prefix for retrained model artifacts.
    pub model_output_dir: String,
}

/// Aggregate confidence statistics over the prediction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftStatistics {
    pub total_predictions: u64,
    /// Predictions with confidence strictly below the cutoff.
    /// Invariant: `low_confidence <= total_predictions`.
    pub low_confidence: u64,
}

impl DriftStatistics {
    /// Low-confidence ratio, or `None` when there are no predictions.
    pub fn ratio(&self) -> Option<f64> {
        if self.total_predictions == 0 {
            None
        } else {
            Some(self.low_confidence as f64 / self.total_predictions as f64)
        }
    }
}

/// Result of one drift check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftOutcome {
    /// No predictions to measure; not a drift verdict.
    InsufficientData,
    /// Ratio at or below the threshold.
    Stable { ratio: f64 },
    /// Ratio strictly above the threshold; retraining is warranted.
    Drifted { ratio: f64 },
}

impl DriftOutcome {
    pub fn is_drifted(&self) -> bool {
        matches!(self, DriftOutcome::Drifted { .. })
    }
}

/// Source of aggregate prediction statistics, typically the warehouse.
#[async_trait]
pub trait PredictionStatsSource: Send + Sync {
    async fn prediction_stats(&self) -> Result<DriftStatistics, WarehouseError>;
}

/// Classifies statistics against a drift threshold.
///
/// Pure: `total == 0` abstains, otherwise the comparison is strict, so a
/// ratio exactly at the threshold is stable.
pub fn evaluate(stats: &DriftStatistics, threshold: f64) -> DriftOutcome {
    match stats.ratio() {
        None => DriftOutcome::InsufficientData,
        Some(ratio) if ratio > threshold => DriftOutcome::Drifted { ratio },
        Some(ratio) => DriftOutcome::Stable { ratio },
    }
}

/// Display name for a retraining job submitted at `at`.
///
/// Second granularity keeps names unique even if drift checks ever run
/// more often than the weekly cadence.
pub fn retrain_job_name(model_display_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "retrain-{}-{}",
        model_display_name,
        at.format("%Y%m%d-%H%M%S")
    )
}

/// Drift monitor wired to a stats source and a training-job submitter.
pub struct DriftMonitor {
    stats: Arc<dyn PredictionStatsSource>,
    trainer: Arc<dyn ModelTrainer>,
    config: DriftConfig,
}

impl DriftMonitor {
    pub fn new(
        stats: Arc<dyn PredictionStatsSource>,
        trainer: Arc<dyn ModelTrainer>,
        config: DriftConfig,
    ) -> Self {
        Self {
            stats,
            trainer,
            config,
        }
    }

    /// Fetches statistics and classifies them. No side effects beyond
    /// logging the computed ratio.
    pub async fn check_for_drift(&self) -> Result<DriftOutcome, DriftError> {
        let stats = self.stats.prediction_stats().await?;
        let outcome = evaluate(&stats, self.config.drift_threshold);

        match outcome {
            DriftOutcome::InsufficientData => {
                warn!("No predictions found; skipping drift measurement");
            }
            DriftOutcome::Stable { ratio } | DriftOutcome::Drifted { ratio } => {
                info!(
                    low_confidence = stats.low_confidence,
                    total = stats.total_predictions,
                    ratio = format!("{:.2}%", ratio * 100.0),
                    threshold = self.config.drift_threshold,
                    "Drift check"
                );
            }
        }
        Ok(outcome)
    }

    /// Submits a retraining job with a fresh timestamped display name.
    ///
    /// Callers invoke this only after a drift verdict; no re-check happens
    /// here. Submission is fire-and-forget and errors propagate without
    /// retry; retry policy belongs to the pipeline runner.
    pub async fn trigger_retraining(&self) -> Result<JobHandle, PlatformError> {
        let request = TrainingJobRequest::new(
            retrain_job_name(&self.config.model_display_name, Utc::now()),
            &self.config.training_package_uri,
            &self.config.model_display_name,
            &self.config.model_output_dir,
        )
        .with_python_module(&self.config.training_module)
        .with_container_image(&self.config.training_container_image);

        let handle = self.trainer.submit_training_job(&request).await?;
        info!(job = %handle.display_name, "Retraining triggered");
        Ok(handle)
    }

    /// One monitoring pass: check, and retrain on a drift verdict.
    pub async fn run_once(&self) -> Result<DriftOutcome, DriftError> {
        let outcome = self.check_for_drift().await?;
        match outcome {
            DriftOutcome::Drifted { ratio } => {
                warn!(
                    ratio = format!("{:.2}%", ratio * 100.0),
                    "Drift detected, triggering retraining"
                );
                self.trigger_retraining().await?;
            }
            DriftOutcome::Stable { .. } => {
                info!("No significant drift detected");
            }
            DriftOutcome::InsufficientData => {
                info!("Insufficient data for a drift verdict; no action");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn config() -> DriftConfig {
        DriftConfig {
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            confidence_cutoff: DEFAULT_CONFIDENCE_CUTOFF,
            model_display_name: "no_show_predictor".to_string(),
            training_package_uri: "gs://bucket/pkg/trainer-0.1.tar.gz".to_string(),
            training_module: "train_model".to_string(),
            training_container_image: "gcr.io/trainer:1".to_string(),
            model_output_dir: "gs://bucket/models/no_show".to_string(),
        }
    }

    struct FixedStats(DriftStatistics);

    #[async_trait]
    impl PredictionStatsSource for FixedStats {
        async fn prediction_stats(&self) -> Result<DriftStatistics, WarehouseError> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct RecordingTrainer {
        submissions: AtomicU32,
        last_display_name: Mutex<Option<String>>,
    }

    #[async_trait]
    impl ModelTrainer for RecordingTrainer {
        async fn submit_training_job(
            &self,
            request: &TrainingJobRequest,
        ) -> Result<JobHandle, PlatformError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            *self.last_display_name.lock().unwrap() = Some(request.display_name.clone());
            Ok(JobHandle {
                name: "projects/p/locations/l/customJobs/1".to_string(),
                display_name: request.display_name.clone(),
            })
        }
    }

    fn monitor(stats: DriftStatistics) -> (DriftMonitor, Arc<RecordingTrainer>) {
        let trainer = Arc::new(RecordingTrainer::default());
        let monitor = DriftMonitor::new(Arc::new(FixedStats(stats)), trainer.clone(), config());
        (monitor, trainer)
    }

    #[test]
    fn test_zero_total_abstains() {
        let stats = DriftStatistics {
            total_predictions: 0,
            low_confidence: 0,
        };
        assert_eq!(stats.ratio(), None);
        assert_eq!(evaluate(&stats, 0.3), DriftOutcome::InsufficientData);
    }

    #[test]
    fn test_ratio_at_threshold_is_stable() {
        let stats = DriftStatistics {
            total_predictions: 100,
            low_confidence: 30,
        };
        let outcome = evaluate(&stats, 0.3);
        assert!(!outcome.is_drifted());
        assert_eq!(outcome, DriftOutcome::Stable { ratio: 0.3 });
    }

    #[test]
    fn test_ratio_above_threshold_is_drifted() {
        let stats = DriftStatistics {
            total_predictions: 100,
            low_confidence: 31,
        };
        assert!(evaluate(&stats, 0.3).is_drifted());
    }

    #[test]
    fn test_threshold_is_configurable() {
        let stats = DriftStatistics {
            total_predictions: 10,
            low_confidence: 2,
        };
        assert!(evaluate(&stats, 0.1).is_drifted());
        assert!(!evaluate(&stats, 0.2).is_drifted());
    }

    #[test]
    fn test_retrain_names_differ_across_minutes() {
        let first = Utc.with_ymd_and_hms(2025, 8, 1, 3, 15, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 8, 1, 3, 16, 0).unwrap();
        let a = retrain_job_name("no_show_predictor", first);
        let b = retrain_job_name("no_show_predictor", second);
        assert_ne!(a, b);
        assert_eq!(a, "retrain-no_show_predictor-20250801-031500");
    }

    #[test]
    fn test_retrain_names_differ_across_seconds() {
        let first = Utc.with_ymd_and_hms(2025, 8, 1, 3, 15, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 8, 1, 3, 15, 1).unwrap();
        assert_ne!(
            retrain_job_name("m", first),
            retrain_job_name("m", second)
        );
    }

    #[tokio::test]
    async fn test_run_once_stable_does_not_retrain() {
        let (monitor, trainer) = monitor(DriftStatistics {
            total_predictions: 100,
            low_confidence: 10,
        });
        let outcome = monitor.run_once().await.unwrap();
        assert_eq!(outcome, DriftOutcome::Stable { ratio: 0.1 });
        assert_eq!(trainer.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_once_drifted_submits_training_job() {
        let (monitor, trainer) = monitor(DriftStatistics {
            total_predictions: 100,
            low_confidence: 40,
        });
        let outcome = monitor.run_once().await.unwrap();
        assert!(outcome.is_drifted());
        assert_eq!(trainer.submissions.load(Ordering::SeqCst), 1);

        let name = trainer.last_display_name.lock().unwrap().clone().unwrap();
        assert!(name.starts_with("retrain-no_show_predictor-"));
    }

    #[tokio::test]
    async fn test_run_once_insufficient_data_takes_no_action() {
        let (monitor, trainer) = monitor(DriftStatistics {
            total_predictions: 0,
            low_confidence: 0,
        });
        let outcome = monitor.run_once().await.unwrap();
        assert_eq!(outcome, DriftOutcome::InsufficientData);
        assert_eq!(trainer.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submission_errors_propagate() {
        struct FailingTrainer;

        #[async_trait]
        impl ModelTrainer for FailingTrainer {
            async fn submit_training_job(
                &self,
                _request: &TrainingJobRequest,
            ) -> Result<JobHandle, PlatformError> {
                Err(PlatformError::UnexpectedStatus {
                    status: 403,
                    message: "permission denied".to_string(),
                })
            }
        }

        let monitor = DriftMonitor::new(
            Arc::new(FixedStats(DriftStatistics {
                total_predictions: 100,
                low_confidence: 90,
            })),
            Arc::new(FailingTrainer),
            config(),
        );
        assert!(monitor.run_once().await.is_err());
    }
}
