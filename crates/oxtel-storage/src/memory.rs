use crate::{Repository, Result, StorageError};
use async_trait::async_trait;
use oxtel_common::types::{Metric, MetricKind};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// Concurrency-safe in-memory store: two maps behind a reader-writer lock.
/// Writers hold the exclusive lock only for the map operation itself.
#[derive(Default)]
pub struct MemStorage {
    inner: RwLock<Maps>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored metric, counters as their current totals.
    /// The result is a consistent copy taken under the shared lock.
    pub fn snapshot(&self) -> Vec<Metric> {
        let maps = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::with_capacity(maps.gauges.len() + maps.counters.len());
        for (name, value) in &maps.gauges {
            out.push(Metric::gauge(name.clone(), *value));
        }
        for (name, delta) in &maps.counters {
            out.push(Metric::counter(name.clone(), *delta));
        }
        out
    }

    /// Zeroes an existing metric. Used by the agent to reset `PollCount`
    /// after a successful report; a missing entry is `NotFound`.
    pub fn reset_metric(&self, name: &str, kind: MetricKind) -> Result<()> {
        let mut maps = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let found = match kind {
            MetricKind::Gauge => maps.gauges.get_mut(name).map(|v| *v = 0.0).is_some(),
            MetricKind::Counter => maps.counters.get_mut(name).map(|v| *v = 0).is_some(),
        };
        if found {
            Ok(())
        } else {
            Err(StorageError::NotFound)
        }
    }
}

#[async_trait]
impl Repository for MemStorage {
    async fn update_gauge(&self, metric: &Metric) -> Result<()> {
        let value = metric.gauge_value()?;
        let mut maps = self.inner.write().unwrap_or_else(|e| e.into_inner());
        maps.gauges.insert(metric.id.clone(), value);
        Ok(())
    }

    async fn update_counter(&self, metric: &Metric) -> Result<()> {
        let delta = metric.counter_delta()?;
        let mut maps = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *maps.counters.entry(metric.id.clone()).or_insert(0) += delta;
        Ok(())
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        for metric in metrics {
            match metric.kind {
                MetricKind::Gauge => self.update_gauge(metric).await?,
                MetricKind::Counter => self.update_counter(metric).await?,
            }
        }
        Ok(())
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        let maps = self.inner.read().unwrap_or_else(|e| e.into_inner());
        maps.gauges.get(name).copied().ok_or(StorageError::NotFound)
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        let maps = self.inner.read().unwrap_or_else(|e| e.into_inner());
        maps.counters
            .get(name)
            .copied()
            .ok_or(StorageError::NotFound)
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>> {
        let maps = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(maps.gauges.clone())
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        let maps = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(maps.counters.clone())
    }
}
