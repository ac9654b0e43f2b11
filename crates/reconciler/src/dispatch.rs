//! Minimal driver that feeds identities to the reconciler.
//!
//! Stands in for a real watch layer: it runs at most one pass per identity
//! at a time, runs distinct identities concurrently, and honours the requeue
//! delays returned by each pass. It does no change detection of its own.

use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::reconciler::Reconciler;
use crate::types::{Action, EntryId};

/// Configuration for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delay before retrying an error that carries no requeue hint.
    pub fallback_requeue_ms: u64,
    /// Maximum passes running at once across all identities.
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fallback_requeue_ms: 5_000,
            max_concurrent: 16,
        }
    }
}

/// Counters describing dispatcher activity.
#[derive(Debug, Default)]
pub struct DispatchStats {
    passes: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    requeued: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub passes: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub requeued: u64,
}

impl DispatchStats {
    /// Read all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle for feeding and stopping a running [`Dispatcher`].
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<EntryId>,
    stop: Arc<watch::Sender<bool>>,
    stats: Arc<DispatchStats>,
}

impl DispatchHandle {
    /// Ask for a pass over `id`.
    pub fn enqueue(&self, id: EntryId) -> Result<()> {
        self.tx.send(id).map_err(|_| Error::DispatchStopped)
    }

    /// Stop the dispatcher.
    ///
    /// In-flight passes end with [`Error::Cancelled`] at their next await
    /// point. A pass cancelled during its store write persists no status.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

type PassOutcome = (EntryId, std::thread::Result<Result<Action>>);

/// Work queue around a shared [`Reconciler`].
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
    config: DispatchConfig,
    tx: mpsc::UnboundedSender<EntryId>,
    rx: mpsc::UnboundedReceiver<EntryId>,
    stop: watch::Receiver<bool>,
    stats: Arc<DispatchStats>,
    in_flight: HashSet<EntryId>,
    dirty: HashSet<EntryId>,
    backlog: VecDeque<EntryId>,
}

impl Dispatcher {
    /// Create a dispatcher and the handle that drives it.
    pub fn new(reconciler: Arc<Reconciler>, config: DispatchConfig) -> (Self, DispatchHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = Arc::new(DispatchStats::default());

        let handle = DispatchHandle {
            tx: tx.clone(),
            stop: Arc::new(stop_tx),
            stats: stats.clone(),
        };
        let dispatcher = Self {
            reconciler,
            config,
            tx,
            rx,
            stop: stop_rx,
            stats,
            in_flight: HashSet::new(),
            dirty: HashSet::new(),
            backlog: VecDeque::new(),
        };
        (dispatcher, handle)
    }

    /// Run until stopped.
    pub async fn run(mut self) {
        info!(max_concurrent = self.config.max_concurrent, "Dispatcher starting");

        let mut passes: JoinSet<PassOutcome> = JoinSet::new();
        let mut timers: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        break;
                    }
                }
                Some(id) = self.rx.recv() => {
                    self.admit(id, &mut passes);
                }
                Some(joined) = passes.join_next(), if !passes.is_empty() => {
                    match joined {
                        Ok((id, outcome)) => self.finish(id, outcome, &mut passes, &mut timers),
                        Err(e) => error!(error = %e, "Reconcile task failed to join"),
                    }
                }
                Some(_) = timers.join_next(), if !timers.is_empty() => {}
            }
        }

        timers.abort_all();
        while let Some(joined) = passes.join_next().await {
            match joined {
                Ok((id, Ok(Err(e)))) => {
                    DispatchStats::bump(&self.stats.failed);
                    debug!(%id, error = %e, "Pass ended during shutdown");
                }
                Ok((_, Ok(Ok(_)))) => DispatchStats::bump(&self.stats.succeeded),
                Ok((id, Err(_))) => {
                    DispatchStats::bump(&self.stats.failed);
                    error!(%id, "Reconcile panicked");
                }
                Err(e) => error!(error = %e, "Reconcile task failed to join"),
            }
        }
        info!(stats = ?self.stats.snapshot(), "Dispatcher stopped");
    }

    fn admit(&mut self, id: EntryId, passes: &mut JoinSet<PassOutcome>) {
        if self.in_flight.contains(&id) {
            debug!(%id, "Pass in flight, marking dirty");
            self.dirty.insert(id);
        } else if passes.len() >= self.config.max_concurrent {
            if !self.backlog.contains(&id) {
                self.backlog.push_back(id);
            }
        } else {
            self.spawn(id, passes);
        }
    }

    fn spawn(&mut self, id: EntryId, passes: &mut JoinSet<PassOutcome>) {
        self.in_flight.insert(id.clone());
        DispatchStats::bump(&self.stats.passes);

        let reconciler = self.reconciler.clone();
        let mut stop = self.stop.clone();
        passes.spawn(async move {
            let pass = AssertUnwindSafe(reconciler.reconcile(&id)).catch_unwind();
            let outcome = tokio::select! {
                outcome = pass => outcome,
                () = async {
                    let _ = stop.wait_for(|stopped| *stopped).await;
                } => Ok(Err(Error::cancelled(&id))),
            };
            (id, outcome)
        });
    }

    fn finish(
        &mut self,
        id: EntryId,
        outcome: std::thread::Result<Result<Action>>,
        passes: &mut JoinSet<PassOutcome>,
        timers: &mut JoinSet<()>,
    ) {
        self.in_flight.remove(&id);
        let fallback = Duration::from_millis(self.config.fallback_requeue_ms);

        let requeue = match outcome {
            Ok(Ok(action)) => {
                DispatchStats::bump(&self.stats.succeeded);
                action.requeue_after
            }
            Ok(Err(e)) => {
                DispatchStats::bump(&self.stats.failed);
                warn!(%id, error = %e, "Reconcile failed");
                e.is_transient()
                    .then(|| e.requeue_after().unwrap_or(fallback))
            }
            Err(_) => {
                DispatchStats::bump(&self.stats.failed);
                error!(%id, "Reconcile panicked");
                Some(fallback)
            }
        };

        if self.dirty.remove(&id) {
            self.admit(id.clone(), passes);
        } else if let Some(delay) = requeue {
            DispatchStats::bump(&self.stats.requeued);
            debug!(%id, ?delay, "Requeueing");
            let tx = self.tx.clone();
            timers.spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(id);
            });
        }

        while passes.len() < self.config.max_concurrent {
            match self.backlog.pop_front() {
                Some(next) => self.admit(next, passes),
                None => break,
            }
        }
    }
}
