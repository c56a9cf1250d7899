use anyhow::{Context, Result};
use oxtel_common::crypto;
use oxtel_server::audit::{AuditPublisher, FileAuditObserver, HttpAuditObserver};
use oxtel_server::config::ServerConfig;
use oxtel_server::service::MetricsService;
use oxtel_server::state::AppState;
use oxtel_server::app;
use oxtel_storage::db::DbStorage;
use oxtel_storage::file::FileStorage;
use oxtel_storage::memory::MemStorage;
use oxtel_storage::retry::RetryRepository;
use oxtel_storage::Repository;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const HTTP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    run(config).await
}

async fn run(config: ServerConfig) -> Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    // Storage selection: database DSN wins over file backing, which wins
    // over the plain in-memory store.
    let mut db_handle: Option<Arc<DbStorage>> = None;
    let mut file_handle: Option<Arc<FileStorage>> = None;
    let mut saver_handle: Option<JoinHandle<()>> = None;

    let repo: Arc<dyn Repository> = if let Some(dsn) = &config.database_dsn {
        tracing::info!("initializing database storage");
        let db = Arc::new(DbStorage::connect(dsn).await?);
        db_handle = Some(db.clone());
        Arc::new(RetryRepository::new(db))
    } else if let Some(path) = &config.file_storage_path {
        tracing::info!(
            path = %path,
            restore = config.restore,
            synchronous = config.synchronous_store(),
            "initializing file storage"
        );
        let store = Arc::new(
            FileStorage::open(Path::new(path), config.restore, config.synchronous_store())
                .await
                .context("failed to initialize file storage")?,
        );
        file_handle = Some(store.clone());
        if !config.synchronous_store() {
            saver_handle = Some(spawn_periodic_save(
                store.clone(),
                config.store_interval,
                shutdown.clone(),
            ));
        }
        store
    } else {
        tracing::info!("initializing in-memory storage");
        Arc::new(MemStorage::new())
    };

    let audit = Arc::new(AuditPublisher::new());
    if let Some(path) = &config.audit_file {
        audit.attach(Arc::new(FileAuditObserver::new(path)));
    }
    if let Some(url) = &config.audit_url {
        audit.attach(Arc::new(HttpAuditObserver::new(url)?));
    }

    let private_key = match &config.crypto_key {
        Some(path) => Some(Arc::new(crypto::load_private_key(path)?)),
        None => None,
    };

    let state = AppState {
        service: Arc::new(MetricsService::new(repo)),
        audit,
        signing_key: config.signing_key.clone().map(Arc::new),
        private_key,
    };

    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    tracing::info!(address = %config.address, "starting server");

    let app = app::build_router(state);
    let server_token = shutdown.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { server_token.cancelled().await });
    let mut server_task = tokio::spawn(server.into_future());

    let result = tokio::select! {
        joined = &mut server_task => {
            // the server stopped without a shutdown signal
            shutdown.cancel();
            server_result(joined)
        }
        _ = shutdown.cancelled() => {
            tracing::info!("server is shutting down");
            match timeout(HTTP_SHUTDOWN_TIMEOUT, &mut server_task).await {
                Ok(joined) => server_result(joined),
                Err(_) => {
                    tracing::warn!("graceful shutdown timed out, closing connections");
                    server_task.abort();
                    Ok(())
                }
            }
        }
    };

    let drain = async {
        if let Some(saver) = saver_handle {
            let _ = saver.await;
        }
        if let Some(store) = &file_handle {
            match store.save() {
                Ok(()) => tracing::info!("final metrics snapshot written"),
                Err(err) => tracing::error!(error = %err, "failed to write final snapshot"),
            }
        }
        if let Some(db) = &db_handle {
            db.close().await;
        }
    };
    if timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("drain deadline exceeded, exiting anyway");
    }

    tracing::info!("server stopped");
    result
}

fn server_result(joined: std::result::Result<std::io::Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err).context("server failed"),
        Err(err) => Err(err).context("server task panicked"),
    }
}

/// Wakes every `store_interval` and rewrites the snapshot file; the final
/// snapshot on shutdown is taken by the drain sequence in `run`.
fn spawn_periodic_save(
    store: Arc<FileStorage>,
    store_interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval_at(Instant::now() + store_interval, store_interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match store.save() {
                        Ok(()) => tracing::debug!("metrics snapshot written"),
                        Err(err) => tracing::error!(error = %err, "failed to write snapshot"),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    })
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_termination().await;
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
