mod config;
mod poller;
mod pool;
mod reporter;

use anyhow::Result;
use oxtel_storage::memory::MemStorage;
use oxtel_storage::StorageError;
use poller::Poller;
use pool::WorkerPool;
use reporter::Reporter;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::AgentConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    run(config).await
}

async fn run(config: config::AgentConfig) -> Result<()> {
    tracing::info!(
        server = %config.address,
        poll_interval = ?config.poll_interval,
        report_interval = ?config.report_interval,
        rate_limit = config.rate_limit,
        signed = config.signing_key.is_some(),
        encrypted = config.crypto_key.is_some(),
        "oxtel-agent starting"
    );

    let store = Arc::new(MemStorage::new());
    let poller = Arc::new(tokio::sync::Mutex::new(Poller::new(store.clone())?));
    let reporter = Arc::new(Reporter::new(&config, store.clone())?);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let mut pool = WorkerPool::new(config.rate_limit);
    pool.start();

    let mut poll_tick = interval_at(Instant::now() + config.poll_interval, config.poll_interval);
    let mut report_tick = interval_at(
        Instant::now() + config.report_interval,
        config.report_interval,
    );
    let mut collect_tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("shutdown signal received, waiting for operations to complete");
                break;
            }
            _ = poll_tick.tick() => {
                let poller = poller.clone();
                let token = shutdown.clone();
                collect_tasks.spawn(async move {
                    let mut poller = poller.lock().await;
                    match poller.collect_cycle(&token).await {
                        Ok(()) => tracing::debug!("collection cycle finished"),
                        Err(StorageError::Cancelled) => tracing::debug!("collection cancelled"),
                        Err(err) => tracing::error!(error = %err, "failed to collect metrics"),
                    }
                });
            }
            _ = report_tick.tick() => {
                let reporter = reporter.clone();
                pool.submit(Box::pin(async move {
                    match reporter.send_report().await {
                        Ok(()) => tracing::info!("metrics sent successfully"),
                        Err(err) => tracing::error!(error = %err, "failed to send metrics"),
                    }
                })).await;
            }
            Some(_) = collect_tasks.join_next(), if !collect_tasks.is_empty() => {}
        }
    }

    pool.stop().await;
    while collect_tasks.join_next().await.is_some() {}
    tracing::info!("all operations completed, shutting down gracefully");
    Ok(())
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
