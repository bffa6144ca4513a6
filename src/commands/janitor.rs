use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::commands::organize_pipeline::{Organizer, RunSummary};
use crate::services::file_service;

struct Shared {
    organizer: Organizer,
    root: PathBuf,
    running: AtomicBool,
    passes: AtomicUsize,
    totals: Mutex<RunSummary>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

/// Resets the running flag when a pass ends or is aborted.
struct PassGuard(Arc<Shared>);

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

impl Shared {
    fn wake(self: &Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(root = %self.root.display(), "janitor pass still running, skipping wake");
            return false;
        }

        let guard = PassGuard(self.clone());
        let handle = tokio::spawn(async move {
            let shared = guard.0.clone();
            shared.run_pass().await;
            drop(guard);
        });
        *self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
        true
    }

    async fn run_pass(&self) {
        let include_hidden = self.organizer.config().include_hidden;
        let leaves = match file_service::leaf_directories(&self.root, include_hidden) {
            Ok(leaves) => leaves,
            Err(err) => {
                tracing::warn!(root = %self.root.display(), error = %err, "janitor could not scan tree");
                return;
            }
        };

        tracing::debug!(leaves = leaves.len(), "janitor pass started");

        let mut summary = RunSummary::default();
        for leaf in &leaves {
            self.organizer.organize(leaf, &mut summary).await;
        }

        self.totals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .merge(&summary);
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(pass, moved = summary.moved, renamed = summary.renamed, "janitor pass finished");
    }
}

/// Periodic leaf-directory re-convergence alongside a main run. At most one
/// pass is outstanding; a wake during a pass is dropped, not queued.
pub struct Janitor {
    shared: Arc<Shared>,
    stop: watch::Sender<bool>,
    ticker: JoinHandle<()>,
}

impl Janitor {
    pub fn spawn(organizer: Organizer, root: PathBuf, interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            organizer,
            root,
            running: AtomicBool::new(false),
            passes: AtomicUsize::new(0),
            totals: Mutex::new(RunSummary::default()),
            in_flight: Mutex::new(None),
        });
        let (stop, mut stopped) = watch::channel(false);

        let ticker_shared = shared.clone();
        let ticker = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; the main run covers t=0.
            ticks.tick().await;
            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        ticker_shared.wake();
                    }
                    _ = stopped.changed() => break,
                }
            }
        });

        Self {
            shared,
            stop,
            ticker,
        }
    }

    /// Starts a pass now unless one is running. Returns whether it started.
    pub fn wake(&self) -> bool {
        self.shared.wake()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn completed_passes(&self) -> usize {
        self.shared.passes.load(Ordering::SeqCst)
    }

    /// Stops the ticker and aborts any pass in flight. Returns what the
    /// janitor's passes changed.
    pub async fn shutdown(self) -> RunSummary {
        let _ = self.stop.send(true);
        let _ = self.ticker.await;

        let in_flight = self
            .shared
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = in_flight {
            handle.abort();
            let _ = handle.await;
        }

        let mut totals = self
            .shared
            .totals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        totals.janitor_passes = self.shared.passes.load(Ordering::SeqCst);
        tracing::debug!(passes = totals.janitor_passes, "janitor stopped");
        totals
    }
}
