// file: src/utils/retry.rs
// description: reusable retry policy with exponential backoff, time budget and degraded mode
// reference: https://docs.rs/tokio/latest/tokio/time

use crate::config::{RetrievalConfig, UpsertConfig};
use crate::error::{PipelineError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How a remote call should be executed on a given attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Standard,
    /// Lower throughput path used after repeated resource-constrained failures.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total time allowed across all attempts and sleeps.
    pub budget: Duration,
    /// Switch to degraded mode once this many resource-constrained failures happened.
    pub degrade_after: Option<u32>,
}

impl RetryPolicy {
    pub fn for_upsert(config: &UpsertConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.base_delay_ms)),
            budget: Duration::from_secs(config.retry_budget_secs),
            degrade_after: Some(config.degrade_after),
        }
    }

    pub fn for_search(config: &RetrievalConfig) -> Self {
        Self {
            max_attempts: config.search_retries.max(1),
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            budget: Duration::from_secs(config.search_timeout_secs.max(1) * 2),
            degrade_after: None,
        }
    }

    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            budget: Duration::from_secs(60),
            degrade_after: None,
        }
    }

    pub fn with_degrade_after(mut self, attempts: u32) -> Self {
        self.degrade_after = Some(attempts);
        self
    }

    /// Delay before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails fatally, or the attempt or time budget runs out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut mode = ExecutionMode::Standard;
        let mut constrained_failures = 0u32;
        let mut number = 1;

        loop {
            // an attempt in flight is cut off once the budget is spent
            let remaining = self.budget.saturating_sub(started.elapsed());
            let Ok(result) = tokio::time::timeout(remaining, op(Attempt { number, mode })).await
            else {
                warn!(
                    "{} attempt {} cut off, retry budget of {}ms spent",
                    label,
                    number,
                    self.budget.as_millis()
                );
                return Err(PipelineError::Timeout(format!(
                    "{} exceeded retry budget of {}ms",
                    label,
                    self.budget.as_millis()
                )));
            };

            let err = match result {
                Ok(value) => {
                    if number > 1 {
                        debug!("{} succeeded on attempt {}", label, number);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                warn!("{} failed with non-retryable error: {}", label, err);
                return Err(err);
            }

            if number >= self.max_attempts {
                warn!("{} exhausted {} attempts: {}", label, self.max_attempts, err);
                return Err(err);
            }

            if err.is_resource_constrained() {
                constrained_failures += 1;
                if mode == ExecutionMode::Standard
                    && let Some(threshold) = self.degrade_after
                    && constrained_failures >= threshold
                {
                    warn!(
                        "{} switching to degraded execution after {} resource failures",
                        label, constrained_failures
                    );
                    mode = ExecutionMode::Degraded;
                }
            }

            let delay = self.backoff(number);
            if started.elapsed() + delay > self.budget {
                warn!(
                    "{} retry budget of {:.1}s exhausted after {} attempts: {}",
                    label,
                    self.budget.as_secs_f64(),
                    number,
                    err
                );
                return Err(err);
            }

            debug!(
                "{} attempt {} failed ({}), retrying in {}ms",
                label,
                number,
                err,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            number += 1;
        }
    }
}

/// Applies a timeout to one remote call, mapping expiry to `PipelineError::Timeout`.
pub async fn with_timeout<T, Fut>(label: &str, timeout: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout(format!(
            "{} exceeded {}ms",
            label,
            timeout.as_millis()
        ))),
    }
}
