//! Waits for a remote run to leave its pending states.

use crate::core::errors::ServiceError;
use crate::core::remote::{AssistantProvider, Run, RunStatus};
use log::{debug, warn};
use std::time::Duration;

/// How often and how long a run is re-fetched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first re-fetch.
    pub interval: Duration,
    /// Multiplier applied to the delay after every attempt.
    pub backoff: f64,
    pub max_interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: Duration::from_millis(500),
            backoff: 1.5,
            max_interval: Duration::from_secs(4),
            max_attempts: 90,
        }
    }
}

impl PollPolicy {
    /// Delay to sleep before re-fetch number `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff.max(1.0).powi(attempt.min(64) as i32);
        let delay = self.interval.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_interval.as_secs_f64()))
    }
}

pub struct RunPoller<'a> {
    provider: &'a dyn AssistantProvider,
    policy: PollPolicy,
}

impl<'a> RunPoller<'a> {
    pub fn new(provider: &'a dyn AssistantProvider, policy: PollPolicy) -> Self {
        Self { provider, policy }
    }

    /// Re-fetches `run` until its status is no longer `queued` or `in_progress`.
    ///
    /// A failed run is returned as-is; interpreting it is up to the caller.
    /// Returns `RunTimedOut` once `max_attempts` re-fetches came back pending.
    pub async fn wait(&self, mut run: Run) -> Result<Run, ServiceError> {
        let mut attempt = 0;

        while run.status.is_pending() {
            if attempt >= self.policy.max_attempts {
                warn!(
                    "run {} on thread {} still {:?} after {attempt} polls",
                    run.id, run.thread_id, run.status
                );
                return Err(ServiceError::RunTimedOut {
                    run_id: run.id,
                    attempts: attempt,
                });
            }

            tokio::time::sleep(self.policy.delay(attempt)).await;
            run = self
                .provider
                .retrieve_run(&run.thread_id, &run.id)
                .await?;
            attempt += 1;
            debug!("run {} is {:?} after {attempt} polls", run.id, run.status);
        }

        if run.status == RunStatus::Failed {
            warn!(
                "run {} failed at {:?}: {:?}",
                run.id, run.failed_at, run.last_error
            );
        }

        Ok(run)
    }
}
