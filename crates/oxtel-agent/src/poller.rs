use anyhow::Result;
use oxtel_collector::cpu::CpuCollector;
use oxtel_collector::runtime::RuntimeCollector;
use oxtel_collector::system::SystemCollector;
use oxtel_collector::Collector;
use oxtel_common::types::Metric;
use oxtel_storage::memory::MemStorage;
use oxtel_storage::{Repository, StorageError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const POLL_COUNT_METRIC: &str = "PollCount";
pub const RANDOM_VALUE_METRIC: &str = "RandomValue";

/// Drives one collection cycle per poll tick, staging samples in the shared
/// in-memory store for the reporter to snapshot.
pub struct Poller {
    store: Arc<MemStorage>,
    collectors: Vec<Box<dyn Collector>>,
}

impl Poller {
    pub fn new(store: Arc<MemStorage>) -> Result<Self> {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(RuntimeCollector::new()?),
            Box::new(SystemCollector::new()),
            Box::new(CpuCollector::new()),
        ];
        Ok(Self { store, collectors })
    }

    /// Runs every collector and stages the samples, then adds the built-in
    /// `RandomValue` gauge and bumps `PollCount`. Cancellation is polled
    /// between stores; an interrupted cycle returns `Cancelled`, which the
    /// caller treats as a clean stop rather than a failure.
    pub async fn collect_cycle(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<(), StorageError> {
        for collector in &mut self.collectors {
            if shutdown.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            let metrics = match collector.collect().await {
                Ok(metrics) => metrics,
                Err(err) => {
                    tracing::warn!(collector = collector.name(), error = %err, "collection failed");
                    continue;
                }
            };
            for metric in metrics {
                if shutdown.is_cancelled() {
                    return Err(StorageError::Cancelled);
                }
                self.store.update_gauge(&metric).await?;
            }
        }

        if shutdown.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        self.store
            .update_gauge(&Metric::gauge(RANDOM_VALUE_METRIC, rand::random::<f64>()))
            .await?;
        self.store
            .update_counter(&Metric::counter(POLL_COUNT_METRIC, 1))
            .await?;
        Ok(())
    }
}
