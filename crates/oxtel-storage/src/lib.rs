//! Metric persistence layer.
//!
//! Every store implements the same [`Repository`] surface: the plain
//! in-memory map ([`memory::MemStorage`]), the snapshotting decoration over
//! it ([`file::FileStorage`]), and the Postgres-backed store
//! ([`db::DbStorage`]). [`retry::RetryRepository`] wraps any of them with a
//! classified retry schedule. Health checking is an optional capability:
//! stores without one inherit the default `ping` and surface
//! [`error::StorageError::PingUnsupported`].

pub mod db;
pub mod error;
pub mod file;
pub mod memory;
pub mod retry;


use async_trait::async_trait;
use oxtel_common::types::Metric;
use std::collections::HashMap;

pub use error::{Result, StorageError};

/// Persistence surface shared by all metric stores.
///
/// Implementations must be shareable across tasks (`Send + Sync`): the
/// HTTP ingestion path and the query endpoints hit the same store
/// concurrently.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Stores a gauge sample, last writer wins.
    async fn update_gauge(&self, metric: &Metric) -> Result<()>;

    /// Adds a counter delta to the running total, creating it on first use.
    async fn update_counter(&self, metric: &Metric) -> Result<()>;

    /// Applies a batch of updates. An empty batch is a no-op. Stores are
    /// responsible for coalescing and chunking; a batch must be equivalent
    /// to applying its members in order.
    async fn update_batch(&self, metrics: &[Metric]) -> Result<()>;

    async fn get_gauge(&self, name: &str) -> Result<f64>;

    async fn get_counter(&self, name: &str) -> Result<i64>;

    async fn all_gauges(&self) -> Result<HashMap<String, f64>>;

    async fn all_counters(&self) -> Result<HashMap<String, i64>>;

    /// Health check. Only connection-backed stores can answer; the default
    /// reports the capability as absent.
    async fn ping(&self) -> Result<()> {
        Err(StorageError::PingUnsupported)
    }
}

#[async_trait]
impl<T: Repository + ?Sized> Repository for std::sync::Arc<T> {
    async fn update_gauge(&self, metric: &Metric) -> Result<()> {
        (**self).update_gauge(metric).await
    }

    async fn update_counter(&self, metric: &Metric) -> Result<()> {
        (**self).update_counter(metric).await
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        (**self).update_batch(metrics).await
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        (**self).get_gauge(name).await
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        (**self).get_counter(name).await
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>> {
        (**self).all_gauges().await
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        (**self).all_counters().await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }
}
