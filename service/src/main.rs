//! `stockguard` operations binary.
//!
//! Runs the reconciliation worker pool and the maintenance commands
//! (`sync-stock`, `migrate`, `seed`).

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use stockguard_core::{DurableLedger, ItemId};
use stockguard_postgres::{DeadLetterQueue, PostgresLedger, run_migrations};
use stockguard_redis::{RedisFastStore, RedisTaskQueue};
use stockguard_runtime::{
    MetricsServer, ReconciliationPool, ReconciliationWorker, StockSynchronizer, SyncReport,
};
use stockguard_service::{Cli, Command, Config, await_shutdown, init_tracing, shutdown_signal};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = Cli::parse().command;
    let config = Config::from_env();
    init_tracing();

    config.validate().context("Invalid configuration")?;
    info!(
        redis_url = %config.redis.url,
        command = ?command,
        "Configuration loaded"
    );

    match command {
        Command::Worker => run_worker(&config).await,
        Command::SyncStock { .. } => sync_stock(&config, command.item_id()).await,
        Command::Migrate => migrate(&config).await,
        Command::Seed => seed(&config).await,
    }
}

async fn connect_ledger(config: &Config) -> anyhow::Result<PostgresLedger> {
    info!("Connecting to ledger database...");
    let ledger = PostgresLedger::new(&config.postgres.url, config.postgres.max_connections)
        .await
        .context("Failed to connect to ledger database")?;
    info!("Ledger database connected");
    Ok(ledger)
}

async fn run_worker(config: &Config) -> anyhow::Result<()> {
    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    metrics.start().context("Failed to start metrics server")?;

    let ledger = Arc::new(connect_ledger(config).await?);

    info!("Connecting to task queue...");
    let queue = Arc::new(
        RedisTaskQueue::new(&config.redis.url)
            .await
            .context("Failed to connect to task queue")?,
    );
    queue.recover_in_flight().await?;
    info!(pending = queue.pending().await?, "Task queue connected");

    let dead_letters = Arc::new(DeadLetterQueue::new(ledger.pool().clone()));
    let backlog = dead_letters.count_pending().await?;
    if backlog > 0 {
        warn!(backlog, "Dead-lettered reconciliations awaiting an operator");
    }

    let worker = Arc::new(ReconciliationWorker::new(
        ledger,
        dead_letters,
        &config.reconciliation,
    ));
    let (shutdown_tx, _) = broadcast::channel(1);
    let handles = ReconciliationPool::new(worker, queue, config.reconciliation.worker_concurrency)
        .spawn(&shutdown_tx);

    shutdown_signal().await;
    info!("Initiating graceful shutdown...");
    let unclean = await_shutdown(&shutdown_tx, handles, config.shutdown_timeout()).await;
    if unclean > 0 {
        warn!(unclean, "Some consumers did not stop cleanly; their tasks will be redelivered");
    }
    info!("Graceful shutdown complete");
    Ok(())
}

async fn sync_stock(config: &Config, item_id: Option<ItemId>) -> anyhow::Result<()> {
    let ledger = connect_ledger(config).await?;
    let store = RedisFastStore::new(&config.redis.url)
        .await
        .context("Failed to connect to fast store")?;
    let synchronizer = StockSynchronizer::new(&store, &ledger);

    let report: SyncReport = match item_id {
        Some(item_id) => synchronizer.sync_items(&[item_id]).await,
        None => synchronizer.sync_all().await?,
    };

    info!(
        synced = report.synced,
        missing = ?report.missing,
        failed = ?report.failed,
        "Stock sync finished"
    );
    if !report.failed.is_empty() || !report.missing.is_empty() {
        anyhow::bail!(
            "{} item(s) not synced ({} missing, {} failed)",
            report.missing.len() + report.failed.len(),
            report.missing.len(),
            report.failed.len()
        );
    }
    Ok(())
}

async fn migrate(config: &Config) -> anyhow::Result<()> {
    let ledger = connect_ledger(config).await?;
    run_migrations(ledger.pool())
        .await
        .context("Failed to apply migrations")?;
    info!("Migrations applied");
    Ok(())
}

async fn seed(config: &Config) -> anyhow::Result<()> {
    let ledger = connect_ledger(config).await?;
    let inserted = ledger.seed_demo_catalog().await?;
    info!(inserted, "Demo catalog seeded");

    match ledger.list_active().await {
        Ok(items) => {
            for item in items {
                info!(item_id = %item.id, name = %item.name, stock = item.stock, "Active item");
            }
        }
        Err(e) => error!(error = %e, "Failed to list active items"),
    }
    Ok(())
}
