use crate::memory::MemStorage;
use crate::{Repository, Result};
use async_trait::async_trait;
use oxtel_common::types::{Metric, MetricKind};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Snapshotting decoration over [`MemStorage`].
///
/// All reads and writes go through the in-memory store; the file only holds
/// periodic (or, in synchronous mode, per-mutation) JSON snapshots of the
/// full metric set. Counter entries in the snapshot carry the current
/// totals, so a restore re-accumulates each total from zero in one step.
///
/// The rewrite policy is truncate-then-write; a snapshot that was written
/// successfully is readable, crash-mid-write is not defended against.
pub struct FileStorage {
    mem: MemStorage,
    file: Mutex<File>,
    sync_save: bool,
}

impl FileStorage {
    /// Opens (creating if needed) the snapshot file. With `restore`, the
    /// current snapshot is loaded first: an absent or empty file is fine,
    /// a malformed one is a startup failure. With `sync_save`, every
    /// successful mutation rewrites the snapshot before returning.
    pub async fn open(path: &Path, restore: bool, sync_save: bool) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let storage = Self {
            mem: MemStorage::new(),
            file: Mutex::new(file.try_clone()?),
            sync_save,
        };

        if restore {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            storage.restore(&data).await?;
        }
        Ok(storage)
    }

    /// Re-applies a snapshot through the normal update path. Counters start
    /// from zero here, so the stored totals land as-is.
    async fn restore(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let snapshot: Vec<Metric> = serde_json::from_slice(data)?;
        for metric in &snapshot {
            match metric.kind {
                MetricKind::Gauge => self.mem.update_gauge(metric).await?,
                MetricKind::Counter => self.mem.update_counter(metric).await?,
            }
        }
        Ok(())
    }

    /// Serialises the full metric set and rewrites the snapshot file.
    pub fn save(&self) -> Result<()> {
        let snapshot = self.mem.snapshot();
        let data = serde_json::to_vec_pretty(&snapshot)?;

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(())
    }
}

#[async_trait]
impl Repository for FileStorage {
    async fn update_gauge(&self, metric: &Metric) -> Result<()> {
        self.mem.update_gauge(metric).await?;
        if self.sync_save {
            self.save()?;
        }
        Ok(())
    }

    async fn update_counter(&self, metric: &Metric) -> Result<()> {
        self.mem.update_counter(metric).await?;
        if self.sync_save {
            self.save()?;
        }
        Ok(())
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        self.mem.update_batch(metrics).await?;
        if self.sync_save {
            self.save()?;
        }
        Ok(())
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        self.mem.get_gauge(name).await
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        self.mem.get_counter(name).await
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>> {
        self.mem.all_gauges().await
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        self.mem.all_counters().await
    }
}
