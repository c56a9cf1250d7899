use crate::{Repository, Result, StorageError};
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use oxtel_common::types::{Metric, MetricKind};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
    TransactionTrait, Value,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

const POOL_MAX_CONNECTIONS: u32 = 50;
const POOL_MIN_CONNECTIONS: u32 = 10;
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// At most this many rows per upsert statement; each chunk commits in its
/// own transaction.
const UPSERT_CHUNK_SIZE: usize = 100;

const UPSERT_GAUGE: &str = "INSERT INTO gauges (id, value) VALUES ($1, $2) \
     ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value";
const UPSERT_COUNTER: &str = "INSERT INTO counters (id, delta) VALUES ($1, $2) \
     ON CONFLICT (id) DO UPDATE SET delta = counters.delta + EXCLUDED.delta";

const INSERT_GAUGES_HEAD: &str = "INSERT INTO gauges (id, value) VALUES ";
const INSERT_GAUGES_TAIL: &str = " ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value";
const INSERT_COUNTERS_HEAD: &str = "INSERT INTO counters (id, delta) VALUES ";
const INSERT_COUNTERS_TAIL: &str =
    " ON CONFLICT (id) DO UPDATE SET delta = counters.delta + EXCLUDED.delta";

/// Postgres-backed store over a pooled connection.
///
/// Gauges and counters live in per-kind tables keyed by metric name; rows
/// are created lazily by upsert. The schema is applied on startup by the
/// embedded migration runner.
pub struct DbStorage {
    db: DatabaseConnection,
}

impl DbStorage {
    /// Connects the pool, applies pending migrations (no-op when the schema
    /// is current) and verifies the connection with a ping.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let mut options = ConnectOptions::new(dsn.to_owned());
        options
            .max_connections(POOL_MAX_CONNECTIONS)
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_lifetime(POOL_MAX_LIFETIME)
            .idle_timeout(POOL_IDLE_TIMEOUT)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .test_before_acquire(true)
            .sqlx_logging(false);

        let db = Database::connect(options).await?;
        Migrator::up(&db, None).await?;
        db.ping().await?;

        tracing::info!("database storage initialized");
        Ok(Self { db })
    }

    /// Drains the connection pool. Called once during shutdown.
    pub async fn close(&self) {
        self.db.get_postgres_connection_pool().close().await;
    }

    /// Issues one multi-row upsert for a chunk of coalesced rows inside its
    /// own transaction.
    async fn upsert_chunk(&self, head: &str, tail: &str, rows: &[(String, Value)]) -> Result<()> {
        let mut placeholders = Vec::with_capacity(rows.len());
        let mut values: Vec<Value> = Vec::with_capacity(rows.len() * 2);
        for (i, (id, value)) in rows.iter().enumerate() {
            let base = i * 2;
            placeholders.push(format!("(${}, ${})", base + 1, base + 2));
            values.push(id.clone().into());
            values.push(value.clone());
        }
        let sql = format!("{head}{}{tail}", placeholders.join(", "));

        let txn = self.db.begin().await?;
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            values,
        ))
        .await?;
        txn.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for DbStorage {
    async fn update_gauge(&self, metric: &Metric) -> Result<()> {
        let value = metric.gauge_value()?;
        self.db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                UPSERT_GAUGE,
                [metric.id.clone().into(), value.into()],
            ))
            .await?;
        Ok(())
    }

    async fn update_counter(&self, metric: &Metric) -> Result<()> {
        let delta = metric.counter_delta()?;
        self.db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                UPSERT_COUNTER,
                [metric.id.clone().into(), delta.into()],
            ))
            .await?;
        Ok(())
    }

    /// Coalesces the batch (gauges last-wins, counters delta-sum), orders
    /// each kind by name for a deterministic commit order, then writes
    /// chunks of at most [`UPSERT_CHUNK_SIZE`] rows, one transaction each.
    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        let mut gauges: BTreeMap<String, f64> = BTreeMap::new();
        let mut counters: BTreeMap<String, i64> = BTreeMap::new();
        for metric in metrics {
            match metric.kind {
                MetricKind::Gauge => {
                    gauges.insert(metric.id.clone(), metric.gauge_value()?);
                }
                MetricKind::Counter => {
                    *counters.entry(metric.id.clone()).or_insert(0) += metric.counter_delta()?;
                }
            }
        }

        let gauge_rows: Vec<(String, Value)> =
            gauges.into_iter().map(|(id, v)| (id, v.into())).collect();
        let counter_rows: Vec<(String, Value)> =
            counters.into_iter().map(|(id, d)| (id, d.into())).collect();

        for chunk in gauge_rows.chunks(UPSERT_CHUNK_SIZE) {
            self.upsert_chunk(INSERT_GAUGES_HEAD, INSERT_GAUGES_TAIL, chunk)
                .await?;
        }
        for chunk in counter_rows.chunks(UPSERT_CHUNK_SIZE) {
            self.upsert_chunk(INSERT_COUNTERS_HEAD, INSERT_COUNTERS_TAIL, chunk)
                .await?;
        }
        Ok(())
    }

    async fn get_gauge(&self, name: &str) -> Result<f64> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT value FROM gauges WHERE id = $1",
                [name.into()],
            ))
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(row.try_get("", "value")?)
    }

    async fn get_counter(&self, name: &str) -> Result<i64> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT delta FROM counters WHERE id = $1",
                [name.into()],
            ))
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(row.try_get("", "delta")?)
    }

    async fn all_gauges(&self) -> Result<HashMap<String, f64>> {
        let rows = self
            .db
            .query_all(Statement::from_string(
                DbBackend::Postgres,
                "SELECT id, value FROM gauges",
            ))
            .await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            out.insert(row.try_get("", "id")?, row.try_get("", "value")?);
        }
        Ok(out)
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        let rows = self
            .db
            .query_all(Statement::from_string(
                DbBackend::Postgres,
                "SELECT id, delta FROM counters",
            ))
            .await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            out.insert(row.try_get("", "id")?, row.try_get("", "delta")?);
        }
        Ok(out)
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}
