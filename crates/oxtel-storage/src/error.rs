use oxtel_common::types::MetricError;
use sea_orm::{DbErr, RuntimeErr};

/// Errors produced by the storage layer.
///
/// `NotFound` and the embedded [`MetricError`] variants are sentinels: they
/// pass through the retry decorator unwrapped and the HTTP layer maps them
/// to stable statuses. Everything else is infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("metric not found")]
    NotFound,

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    DeadlineExceeded,

    #[error("pinging not supported by this repository")]
    PingUnsupported,

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("snapshot file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("operation failed after retries: {0}")]
    RetriesExhausted(#[source] Box<StorageError>),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Postgres SQLSTATE classes worth another attempt: connection failures
/// (class 08), operator intervention / shutdown (57014, 57P0x), and
/// serialisation or deadlock aborts (40001, 40P01).
const RETRYABLE_SQLSTATES: &[&str] = &[
    "08000", "08001", "08003", "08004", "08006", "57014", "57P01", "57P02", "57P03", "40001",
    "40P01",
];

impl StorageError {
    /// Whether another attempt may succeed. Only transient database
    /// failures qualify; sentinels and everything else are terminal.
    pub fn is_retryable(&self) -> bool {
        let StorageError::Database(db_err) = self else {
            return false;
        };
        match db_err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => true,
            DbErr::Exec(runtime) | DbErr::Query(runtime) => runtime_sqlstate(runtime)
                .map(|code| RETRYABLE_SQLSTATES.contains(&code.as_str()))
                .unwrap_or(false),
            _ => false,
        }
    }
}

fn runtime_sqlstate(err: &RuntimeErr) -> Option<String> {
    match err {
        RuntimeErr::SqlxError(sqlx_err) => sqlx_err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned()),
        RuntimeErr::Internal(_) => None,
    }
}
