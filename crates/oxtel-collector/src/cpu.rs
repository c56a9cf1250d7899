use crate::Collector;
use anyhow::Result;
use async_trait::async_trait;
use oxtel_common::types::Metric;
use std::time::Duration;
use sysinfo::System;

const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Samples per-core CPU utilisation over a one second window.
///
/// Utilisation is a delta between two readings, so each collection refreshes
/// once, sleeps out the window, refreshes again and reads the percentages.
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    async fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system.refresh_cpu_all();
        tokio::time::sleep(SAMPLE_WINDOW).await;
        self.system.refresh_cpu_all();

        Ok(self
            .system
            .cpus()
            .iter()
            .enumerate()
            .map(|(i, cpu)| Metric::gauge(format!("CPUutilization{i}"), cpu.cpu_usage() as f64))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_gauge_per_logical_cpu_zero_indexed() {
        let mut collector = CpuCollector::new();
        let metrics = collector.collect().await.unwrap();
        assert!(!metrics.is_empty());
        assert_eq!(metrics[0].id, "CPUutilization0");
        for (i, metric) in metrics.iter().enumerate() {
            assert_eq!(metric.id, format!("CPUutilization{i}"));
            let usage = metric.value.unwrap();
            assert!((0.0..=100.0).contains(&usage), "{}: {usage}", metric.id);
        }
    }
}
