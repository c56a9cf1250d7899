use crate::Collector;
use anyhow::Result;
use async_trait::async_trait;
use oxtel_common::types::Metric;
use sysinfo::System;

/// Samples host-wide virtual memory totals.
pub struct SystemCollector {
    system: System,
}

impl SystemCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for SystemCollector {
    fn name(&self) -> &str {
        "system"
    }

    async fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system.refresh_memory();
        Ok(vec![
            Metric::gauge("TotalMemory", self.system.total_memory() as f64),
            Metric::gauge("FreeMemory", self.system.free_memory() as f64),
        ])
    }
}
