//! Drives a long-running indexing operation to a terminal state.
//!
//! Polls with capped exponential backoff (2s, 4s, 8s, ... up to 32s) until the
//! operation reports done or the timeout passes. While waiting, a progress event is
//! emitted at every whole reporting interval of elapsed time. Progress reporting never
//! changes when the next poll happens.

use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::gemini::{FileSearchApi, Operation};
use crate::progress::ProgressSink;

/// Timing parameters for one poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub timeout: Duration,
    pub report_interval: Duration,
    pub initial_wait: Duration,
    pub max_wait: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSchedule {
    fn from(config: &PollingConfig) -> Self {
        Self {
            timeout: config.timeout(),
            report_interval: config.report_interval(),
            initial_wait: config.initial_wait(),
            max_wait: config.max_wait(),
        }
    }
}

/// Terminal state of a poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Done without an error; the final snapshot is carried for verification
    Succeeded(Operation),
    /// Done with an error status
    Failed { code: i32, message: String },
    /// Still running when the timeout passed; the remote operation is abandoned
    TimedOut { timeout: Duration },
}

impl PollOutcome {
    /// Human-readable failure, `None` for success
    pub fn failure_message(&self) -> Option<String> {
        match self {
            PollOutcome::Succeeded(_) => None,
            PollOutcome::Failed { code, message } => Some(format!("{} | {}", code, message)),
            PollOutcome::TimedOut { timeout } => Some(format!(
                "Indexing timed out after {} seconds.",
                timeout.as_secs()
            )),
        }
    }
}

/// Polls one operation on behalf of one file
pub struct OperationPoller<'a> {
    api: &'a dyn FileSearchApi,
    schedule: PollSchedule,
    progress: Option<&'a ProgressSink>,
    filename: &'a str,
}

impl<'a> OperationPoller<'a> {
    pub fn new(api: &'a dyn FileSearchApi, schedule: PollSchedule, filename: &'a str) -> Self {
        Self {
            api,
            schedule,
            progress: None,
            filename,
        }
    }

    /// Send progress events to `sink`
    pub fn with_progress(mut self, sink: Option<&'a ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Poll until the operation finishes or times out.
    ///
    /// Errors are reserved for an operation without a name and for failed fetches;
    /// remote operation failures and timeouts are outcomes.
    pub async fn run(&self, operation: Operation) -> ServiceResult<PollOutcome> {
        let Some(name) = operation.name().map(str::to_string) else {
            return Err(ServiceError::MalformedOperation {
                message: "Operation has no name attribute.".to_string(),
            });
        };

        let start = Instant::now();
        let mut ticker = self.progress_ticker(start);
        let mut wait = self.schedule.initial_wait;
        let mut current = operation;

        while !current.done {
            let elapsed = start.elapsed();
            if elapsed > self.schedule.timeout {
                warn!(
                    operation = %name,
                    filename = %self.filename,
                    elapsed_secs = elapsed.as_secs(),
                    "Indexing timed out, abandoning operation"
                );
                return Ok(PollOutcome::TimedOut {
                    timeout: self.schedule.timeout,
                });
            }

            self.wait(start, wait, &mut ticker).await;
            wait = (wait * 2).min(self.schedule.max_wait);

            current = self.api.get_operation(&name).await?;
            debug!(operation = %name, done = current.done, "Polled operation");
        }

        let outcome = match current.error.take() {
            Some(error) => PollOutcome::Failed {
                code: error.code,
                message: error.message,
            },
            None => PollOutcome::Succeeded(current),
        };

        info!(
            operation = %name,
            filename = %self.filename,
            elapsed_secs = start.elapsed().as_secs(),
            succeeded = matches!(outcome, PollOutcome::Succeeded(_)),
            "Operation finished"
        );

        Ok(outcome)
    }

    fn progress_ticker(&self, start: Instant) -> Option<Interval> {
        if self.progress.is_none() || self.schedule.report_interval.is_zero() {
            return None;
        }

        let mut ticker = interval_at(
            start + self.schedule.report_interval,
            self.schedule.report_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Some(ticker)
    }

    /// Sleep for `wait`, reporting every progress tick that falls inside the sleep.
    /// A tick due at the same instant the sleep ends is reported first.
    async fn wait(&self, start: Instant, wait: Duration, ticker: &mut Option<Interval>) {
        let deadline = Instant::now() + wait;
        let sleep = sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = next_tick(ticker) => {
                    if let Some(sink) = self.progress {
                        sink.report(self.filename, start.elapsed());
                    }
                }
                _ = &mut sleep => break,
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
