pub mod cpu;
pub mod runtime;
pub mod system;

use anyhow::Result;
use async_trait::async_trait;
use oxtel_common::types::Metric;

/// A source of metric samples. Collectors keep their own sampling state
/// (e.g. previous CPU readings) and are polled by the agent on each tick.
///
/// `collect` is async because some sources need a sampling window (the CPU
/// collector holds a one second delta between two readings).
#[async_trait]
pub trait Collector: Send {
    fn name(&self) -> &str;
    async fn collect(&mut self) -> Result<Vec<Metric>>;
}
