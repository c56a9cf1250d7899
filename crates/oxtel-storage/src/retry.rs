use crate::{Repository, Result, StorageError};
use async_trait::async_trait;
use oxtel_common::types::Metric;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const DEFAULT_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Retrying decoration over any [`Repository`].
///
/// Each operation gets `schedule.len() + 1` attempts, sleeping the next
/// schedule entry between attempts, with a per-attempt deadline. Only
/// transient database failures are retried; `NotFound` and the model
/// sentinels short-circuit unwrapped, cancellation and deadline errors are
/// terminal, and any other failure is returned on first occurrence.
/// Exhausting the schedule wraps the last error.
///
/// Retries happen at whole-operation granularity: the inner store commits
/// or rolls back per call, so a repeated attempt never observes partial
/// state from the previous one.
pub struct RetryRepository<R> {
    inner: R,
    schedule: Vec<Duration>,
    attempt_timeout: Duration,
}

impl<R: Repository> RetryRepository<R> {
    pub fn new(inner: R) -> Self {
        Self::with_schedule(inner, Vec::new(), DEFAULT_ATTEMPT_TIMEOUT)
    }

    /// An empty schedule or zero timeout falls back to the defaults
    /// (`1s, 3s, 5s` and 5s per attempt).
    pub fn with_schedule(inner: R, schedule: Vec<Duration>, attempt_timeout: Duration) -> Self {
        let schedule = if schedule.is_empty() {
            DEFAULT_SCHEDULE.to_vec()
        } else {
            schedule
        };
        let attempt_timeout = if attempt_timeout.is_zero() {
            DEFAULT_ATTEMPT_TIMEOUT
        } else {
            attempt_timeout
        };
        Self {
            inner,
            schedule,
            attempt_timeout,
        }
    }

    async fn attempt<T, F, Fut>(&self, op: &F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match timeout(self.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::DeadlineExceeded),
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for (i, delay) in self.schedule.iter().enumerate() {
            match self.attempt(&op).await {
                Err(err) if err.is_retryable() => {
                    tracing::warn!(
                        attempt = i + 1,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "storage operation failed, retrying"
                    );
                    sleep(*delay).await;
                }
                other => return other,
            }
        }
        match self.attempt(&op).await {
            Err(err) if err.is_retryable() => Err(StorageError::RetriesExhausted(Box::new(err))),
            other => other,
        }
    }
}

#[async_trait]
impl<R: Repository> Repository for RetryRepository<R> {
    async fn update_gauge(&self, metric: &Metric) -> Result<()> {
        self.with_retry(|| self.inner.update_gauge(metric)).await
    }

    async fn update_counter(&self, metric: &Metric) -> Result<()> {
        self.with_retry(|| self.inner.update_counter(metric)).await
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        self.with_retry(|| self.inner.update_batch(metrics)).await
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        self.with_retry(|| self.inner.get_gauge(name)).await
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        self.with_retry(|| self.inner.get_counter(name)).await
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>> {
        self.with_retry(|| self.inner.all_gauges()).await
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        self.with_retry(|| self.inner.all_counters()).await
    }

    async fn ping(&self) -> Result<()> {
        self.with_retry(|| self.inner.ping()).await
    }
}
