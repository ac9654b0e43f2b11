//! # redis-ctrl
//!
//! Keeps Redis keys in line with declared `RedisEntry` manifests.
//!
//! ## Initialization Sequence
//!
//! 1. **Configuration** - defaults, optional TOML file, environment
//! 2. **Store Client** - Redis pool (or in-memory store for `--dry-run`) plus
//!    a single readiness check
//! 3. **Entries** - manifests loaded into the in-memory entry API
//! 4. **Reconciler** - built with both collaborators injected
//! 5. **Dispatch** - every entry enqueued once; requeues follow each outcome
//!
//! With `--once`, every entry is reconciled a single time and the process
//! exits non-zero if any pass failed.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod config;
mod manifest;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::future::join_all;
use redis_ctrl_core::ResultExt;
use redis_ctrl_reconciler::{
    Dispatcher, EntryApi, EntryId, InMemoryEntryApi, InMemoryStore, RedisStore, Reconciler,
    ReconcilerBuilder, StoreClient, TracingStore,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::config::OperatorConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();
    init_tracing();

    let cli = Cli::parse();
    let config = OperatorConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let store = init_store(&config, cli.dry_run).await?;
    let api = init_entries(&cli).await?;

    let reconciler = Arc::new(
        ReconcilerBuilder::new()
            .with_api(api.clone())
            .with_store(store)
            .with_config(config.reconciler.clone())
            .build()
            .context("Failed to build reconciler")?,
    );

    info!(
        entries = api.list_ids().await.len(),
        "redis-ctrl started in {:?}",
        start_time.elapsed()
    );

    if cli.once {
        return run_once(&reconciler, &api).await;
    }

    let (dispatcher, handle) = Dispatcher::new(reconciler, config.dispatch.clone());
    let loop_handle = tokio::spawn(dispatcher.run());

    for id in api.list_ids().await {
        handle.enqueue(id).context("Dispatcher stopped during startup")?;
    }

    info!("redis-ctrl is running. Press Ctrl+C to stop.");
    wait_for_shutdown().await;

    handle.stop();
    loop_handle.await.context("Dispatcher task failed")?;
    info!(stats = ?handle.stats(), "redis-ctrl stopped gracefully");
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the store client and check readiness once.
///
/// An unreachable store does not stop startup: every pass will record the
/// failure on its entry and requeue.
async fn init_store(config: &OperatorConfig, dry_run: bool) -> Result<Arc<dyn StoreClient>> {
    let store: Arc<dyn StoreClient> = if dry_run {
        info!("Dry run: writes go to an in-memory store");
        Arc::new(TracingStore::new(InMemoryStore::new()))
    } else {
        let redis = RedisStore::connect(&config.redis).context("Failed to create Redis pool")?;
        Arc::new(TracingStore::new(redis))
    };

    match store.ping().await {
        Ok(()) => info!("Store is ready"),
        Err(e) => warn!(error = %e, "Store readiness check failed, continuing"),
    }
    Ok(store)
}

/// Load manifests into the in-memory entry API.
async fn init_entries(cli: &Cli) -> Result<Arc<InMemoryEntryApi>> {
    let entries = manifest::load_entries(&cli.entries)
        .with_context(|| format!("Failed to load entries from {}", cli.entries.display()))?;

    let api = InMemoryEntryApi::new_arc();
    for (id, spec) in entries {
        api.apply(id, spec).await;
    }
    Ok(api)
}

/// Reconcile every entry once and log a summary line per entry.
async fn run_once(reconciler: &Reconciler, api: &InMemoryEntryApi) -> Result<()> {
    let ids = api.list_ids().await;
    let results = join_all(ids.iter().map(|id| reconciler.reconcile(id))).await;

    let mut failures = 0usize;
    for (id, result) in ids.iter().zip(results) {
        if result
            .tap_err(|e| error!(%id, error = %e, "Reconcile failed"))
            .is_err()
        {
            failures = failures.saturating_add(1);
        }
        log_summary(api, id).await;
    }

    if failures > 0 {
        bail!("{failures} of {} entries failed to reconcile", ids.len());
    }
    Ok(())
}

async fn log_summary(api: &InMemoryEntryApi, id: &EntryId) {
    let Some(entry) = api
        .get(id)
        .await
        .into_option_logged("summary lookup")
    else {
        return;
    };

    let conditions: Vec<String> = entry
        .status
        .conditions
        .iter()
        .map(|c| format!("{}={}({})", c.type_, c.status, c.reason))
        .collect();
    info!(
        %id,
        key = %entry.spec.key,
        value = %entry.spec.value,
        last_updated = ?entry.status.last_updated,
        conditions = %conditions.join(","),
        "Entry summary"
    );
}

/// Wait for Ctrl+C.
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
