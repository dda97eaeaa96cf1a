//! Long-running-operation polling.
//!
//! The healthcare API reports bulk imports and exports through operation
//! resources that must be polled until `done`. The loop here sleeps an
//! exponentially growing interval between polls and gives up once a wait
//! budget is exhausted, so a stuck server-side operation cannot block a
//! pipeline stage forever.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::OperationError;
use crate::fhir::{OperationHandle, OperationPoller};

/// Polling cadence and wait budget for one operation.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep before the second poll.
    pub initial_interval: Duration,
    /// Upper bound on the sleep between polls.
    pub max_interval: Duration,
    /// Factor applied to the interval after each poll.
    pub backoff_multiplier: f64,
    /// Total time budget; exceeding it yields [`OperationOutcome::TimedOut`].
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_wait: Duration::from_secs(1800),
        }
    }
}

/// Terminal outcome of waiting for an operation.
///
/// `Failed` and `TimedOut` are outcomes, not transport errors: the API kept
/// answering, the operation just did not succeed within the budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Succeeded,
    Failed(String),
    TimedOut { waited: Duration },
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Succeeded)
    }
}

/// Next sleep interval after `current`, capped at the configured maximum.
pub fn next_interval(current: Duration, config: &PollConfig) -> Duration {
    let scaled = current.as_secs_f64() * config.backoff_multiplier;
    Duration::from_secs_f64(scaled.min(config.max_interval.as_secs_f64()))
}

/// Polls `handle` until it completes, fails, or outlives `config.max_wait`.
///
/// Transport errors from the poller propagate immediately; the scheduler
/// owns stage-level retry.
pub async fn await_operation(
    poller: &dyn OperationPoller,
    handle: &OperationHandle,
    config: &PollConfig,
) -> Result<OperationOutcome, OperationError> {
    let mut waited = Duration::ZERO;
    let mut interval = config.initial_interval;

    loop {
        let status = poller.poll(handle).await?;

        if status.done {
            return Ok(match status.error {
                Some(message) => {
                    error!(operation = %handle.name, %message, "Operation failed");
                    OperationOutcome::Failed(message)
                }
                None => {
                    info!(operation = %handle.name, ?waited, "Operation completed");
                    OperationOutcome::Succeeded
                }
            });
        }

        if waited >= config.max_wait {
            warn!(
                operation = %handle.name,
                ?waited,
                "Giving up on operation after exhausting wait budget"
            );
            return Ok(OperationOutcome::TimedOut { waited });
        }

        // Never sleep past the budget; the final poll happens right at it.
        let sleep_for = interval.min(config.max_wait - waited);
        debug!(operation = %handle.name, ?sleep_for, "Operation still running");
        tokio::time::sleep(sleep_for).await;
        waited += sleep_for;
        interval = next_interval(interval, config);
    }
}
