use crate::Collector;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use oxtel_common::types::Metric;
use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};

/// Memory readings for the current process, in bytes.
struct MemorySample {
    resident: f64,
    virtual_size: f64,
}

/// The fixed allocator gauge set. The names are an external contract shared
/// with downstream dashboards; entries that only exist inside a managed
/// runtime (GC cycles, span/cache arenas) report zero so the set stays
/// stable across agent implementations.
const RUNTIME_GAUGES: &[(&str, fn(&MemorySample) -> f64)] = &[
    ("Alloc", |s| s.resident),
    ("BuckHashSys", |_| 0.0),
    ("Frees", |_| 0.0),
    ("GCCPUFraction", |_| 0.0),
    ("GCSys", |_| 0.0),
    ("HeapAlloc", |s| s.resident),
    ("HeapIdle", |s| (s.virtual_size - s.resident).max(0.0)),
    ("HeapInuse", |s| s.resident),
    ("HeapObjects", |_| 0.0),
    ("HeapReleased", |_| 0.0),
    ("HeapSys", |s| s.virtual_size),
    ("LastGC", |_| 0.0),
    ("Lookups", |_| 0.0),
    ("MCacheInuse", |_| 0.0),
    ("MCacheSys", |_| 0.0),
    ("MSpanInuse", |_| 0.0),
    ("MSpanSys", |_| 0.0),
    ("Mallocs", |_| 0.0),
    ("NextGC", |_| 0.0),
    ("NumForcedGC", |_| 0.0),
    ("NumGC", |_| 0.0),
    ("OtherSys", |_| 0.0),
    ("PauseTotalNs", |_| 0.0),
    ("StackInuse", |_| 0.0),
    ("StackSys", |_| 0.0),
    ("Sys", |s| s.virtual_size),
    ("TotalAlloc", |s| s.resident),
];

/// Samples the agent's own process memory into the fixed allocator gauge
/// set.
pub struct RuntimeCollector {
    system: System,
    pid: Pid,
}

impl RuntimeCollector {
    pub fn new() -> Result<Self> {
        let pid = get_current_pid().map_err(|e| anyhow!("failed to resolve own pid: {e}"))?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

#[async_trait]
impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    async fn collect(&mut self) -> Result<Vec<Metric>> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]));
        let process = self
            .system
            .process(self.pid)
            .ok_or_else(|| anyhow!("own process {} not found", self.pid))?;

        let sample = MemorySample {
            resident: process.memory() as f64,
            virtual_size: process.virtual_memory() as f64,
        };

        Ok(RUNTIME_GAUGES
            .iter()
            .map(|(name, get)| Metric::gauge(*name, get(&sample)))
            .collect())
    }
}
