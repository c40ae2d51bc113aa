//! Sequential, throttled batch execution.
//!
//! Targets are processed strictly one at a time in order, since the platform
//! enforces its own rate limits. A failed item is counted and skipped; it
//! never aborts the run.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use warden_core::config::BatchConfig;

use crate::error::ActionError;

/// Tally of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchRun {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Index of the last target attempted.
    pub current_index: usize,
    /// The run stopped early because it was cancelled.
    pub cancelled: bool,
}

impl BatchRun {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Runs an action over a list of targets with a fixed pause between attempts.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    delay: Duration,
    progress_every: usize,
}

impl BatchExecutor {
    pub fn new(delay: Duration, progress_every: usize) -> Self {
        Self {
            delay,
            progress_every: progress_every.max(1),
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(Duration::from_millis(config.delay_ms), config.progress_every)
    }

    /// Apply `action` to every target in order.
    ///
    /// `on_progress(completed, total)` is called once before the first
    /// attempt, after every `progress_every` completed attempts, and after the
    /// final attempt. The pause follows every attempt except the last, whatever
    /// its outcome. Cancellation is observed between items and during the pause.
    pub async fn run<'a, T, A, Fut, P>(
        &self,
        targets: &'a [T],
        mut action: A,
        mut on_progress: P,
        cancel: &CancellationToken,
    ) -> BatchRun
    where
        A: FnMut(&'a T) -> Fut,
        Fut: Future<Output = Result<(), ActionError>>,
        P: FnMut(usize, usize),
    {
        let total = targets.len();
        let mut run = BatchRun {
            total,
            ..BatchRun::default()
        };
        on_progress(0, total);

        for (index, target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                run.cancelled = true;
                break;
            }
            run.current_index = index;

            match action(target).await {
                Ok(()) => run.succeeded += 1,
                Err(e) => {
                    run.failed += 1;
                    tracing::warn!(index, total, error = %e, "Batch action failed");
                }
            }

            let completed = index + 1;
            if completed % self.progress_every == 0 || completed == total {
                on_progress(completed, total);
            }

            if completed < total && !self.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = cancel.cancelled() => {
                        run.cancelled = true;
                        break;
                    }
                }
            }
        }

        if run.cancelled {
            tracing::info!(
                succeeded = run.succeeded,
                failed = run.failed,
                total,
                "Batch run cancelled"
            );
        } else {
            tracing::info!(
                succeeded = run.succeeded,
                failed = run.failed,
                total,
                "Batch run complete"
            );
        }
        run
    }
}
