use anyhow::{Context, Result};
use async_trait::async_trait;
use oxtel_common::types::AuditEvent;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink for post-commit audit events. Observers hold no reference back to
/// the publisher; edges stay unidirectional.
#[async_trait]
pub trait AuditObserver: Send + Sync {
    fn name(&self) -> &'static str;
    async fn notify(&self, event: &AuditEvent) -> Result<()>;
}

/// Fan-out registry. Observers attach once at startup; `notify_all` copies
/// the list under the lock, releases it and notifies in parallel under a
/// bounded deadline. Failures are logged and swallowed: audit delivery is
/// best-effort and must never fail a request.
#[derive(Default)]
pub struct AuditPublisher {
    observers: RwLock<Vec<Arc<dyn AuditObserver>>>,
}

impl AuditPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, observer: Arc<dyn AuditObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn has_observers(&self) -> bool {
        !self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    pub async fn notify_all(&self, event: AuditEvent) {
        let observers: Vec<Arc<dyn AuditObserver>> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if observers.is_empty() {
            return;
        }

        let event = Arc::new(event);
        let mut inflight = JoinSet::new();
        for observer in observers {
            let event = event.clone();
            inflight.spawn(async move {
                match timeout(NOTIFY_TIMEOUT, observer.notify(&event)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::error!(
                        observer = observer.name(),
                        error = %err,
                        "failed to notify audit observer"
                    ),
                    Err(_) => tracing::warn!(
                        observer = observer.name(),
                        "audit notification timed out"
                    ),
                }
            });
        }
        while inflight.join_next().await.is_some() {}
    }
}

/// Appends one JSON line per event. Writes are serialised so concurrent
/// notifications never interleave within a line.
pub struct FileAuditObserver {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileAuditObserver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditObserver for FileAuditObserver {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn notify(&self, event: &AuditEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event).context("failed to encode audit event")?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("failed to open audit file {:?}", self.path))?;
        file.write_all(&line).context("failed to write audit event")?;
        Ok(())
    }
}

/// POSTs each event as a JSON body; any non-2xx status is a failure.
pub struct HttpAuditObserver {
    url: String,
    client: reqwest::Client,
}

impl HttpAuditObserver {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .context("failed to build audit HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl AuditObserver for HttpAuditObserver {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn notify(&self, event: &AuditEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .context("failed to send audit event")?
            .error_for_status()
            .context("audit server returned non-success status")?;
        Ok(())
    }
}
