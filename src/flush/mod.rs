//! Background flush coordination.
//!
//! A single dispatcher thread turns elapsed debounce deadlines into flush
//! work; a bounded worker pool performs the per-project flush cycle. Within a
//! project the queue's processing flag serializes cycles; distinct projects
//! flush concurrently.
//!
//! The flush cycle for one project:
//! 1. Claim the project and detach its pending items (`begin_flush`).
//! 2. Pre-sync via the external command; failure logs and continues.
//! 3. If the store file exists, open one connection and apply items in
//!    order; each statement commits independently and a per-item error never
//!    aborts its siblings.
//! 4. Post-sync; failure flags the cycle unsuccessful but does not block
//!    the refresh.
//! 5. Refresh the cache from the store.
//! 6. Retire items: clean ones to history, errored ones back to pending
//!    until their retry budget runs out, then to the dead-letter buffer.
//!
//! A store that does not exist yet is the designed no-op path: apply and
//! refresh are skipped and the items retire to history with no error.

use crate::cache::IssueCache;
use crate::config::SpoolConfig;
use crate::queue::{ItemStatus, QueueItem, WriteQueue};
use crate::storage::{self, apply};
use crate::sync;
use chrono::Utc;
use crossbeam::channel::{Receiver, Sender, unbounded};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Dispatcher wait when no deadline is armed.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

struct FlushInner {
    cache: Arc<IssueCache>,
    queue: Arc<WriteQueue>,
    config: SpoolConfig,
}

impl FlushInner {
    /// Run one flush cycle for a project. Returns the overall success flag
    /// also reported through `ProcessingCompleted`.
    fn flush_project(&self, project: &Path) -> bool {
        let Some(items) = self.queue.begin_flush(project) else {
            return true;
        };
        debug!(project = %project.display(), items = items.len(), "flush cycle starting");

        let mut success = true;

        if self.config.sync_before_flush {
            // Degrades to local-changes-only; never aborts the flush.
            let _ = self.run_sync_step(project, "pre");
        }

        let db_path = storage::store_path(project);
        let store_present = db_path.is_file();

        let mut completed: Vec<QueueItem> = Vec::new();
        let mut errored: Vec<QueueItem> = Vec::new();

        if store_present {
            match storage::open_store(&db_path, self.config.busy_timeout_ms) {
                Ok(conn) => {
                    for mut item in items {
                        match apply::apply_item(&conn, &item, &self.config.actor) {
                            Ok(()) => {
                                item.status = ItemStatus::Completed;
                                item.error = None;
                                item.processed_at = Some(Utc::now());
                                completed.push(item);
                            }
                            Err(e) => {
                                warn!(
                                    project = %project.display(),
                                    issue_id = %item.issue_id,
                                    op = item.op.kind(),
                                    error = %e,
                                    "failed to apply queued mutation"
                                );
                                item.error = Some(e.to_string());
                                errored.push(item);
                                success = false;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(project = %project.display(), error = %e, "cannot open store for flush");
                    success = false;
                    let message = e.to_string();
                    for mut item in items {
                        item.error = Some(message.clone());
                        errored.push(item);
                    }
                }
            }
        } else {
            // Uninitialized project: nothing to persist against, nothing to
            // report as failed.
            debug!(project = %project.display(), "store file absent, skipping apply and refresh");
            for mut item in items {
                item.status = ItemStatus::Completed;
                item.processed_at = Some(Utc::now());
                completed.push(item);
            }
        }

        if self.config.sync_after_flush && !self.run_sync_step(project, "post") {
            success = false;
        }

        if store_present
            && let Err(e) = self.cache.refresh(project)
        {
            // Applied items are retired normally; re-applying them on the
            // next cycle would double-write.
            error!(project = %project.display(), error = %e, "cache refresh failed after flush");
            success = false;
        }

        let (retry, dead) = self.split_retries(errored);
        self.queue
            .finish_flush(project, completed, retry, dead, success);

        info!(project = %project.display(), success, "flush cycle finished");
        success
    }

    /// Bump attempt counters and divide errored items into retry and
    /// dead-letter sets.
    fn split_retries(&self, errored: Vec<QueueItem>) -> (Vec<QueueItem>, Vec<QueueItem>) {
        let mut retry = Vec::new();
        let mut dead = Vec::new();
        for mut item in errored {
            item.attempts += 1;
            if item.attempts < self.config.max_retry_attempts {
                retry.push(item);
            } else {
                item.status = ItemStatus::Failed;
                item.processed_at = Some(Utc::now());
                warn!(
                    issue_id = %item.issue_id,
                    op = item.op.kind(),
                    attempts = item.attempts,
                    "retry budget exhausted, dead-lettering item"
                );
                dead.push(item);
            }
        }
        (retry, dead)
    }

    fn run_sync_step(&self, project: &Path, stage: &str) -> bool {
        match sync::run_sync(&self.config.sync_command, project) {
            Ok(outcome) if outcome.success => true,
            Ok(outcome) => {
                warn!(
                    project = %project.display(),
                    stage,
                    stderr = %outcome.failure_text(),
                    "sync command failed"
                );
                false
            }
            Err(e) => {
                warn!(project = %project.display(), stage, error = %e, "sync command could not run");
                false
            }
        }
    }
}

/// Owns the dispatcher and worker threads. Lifecycle is tied to the hosting
/// process: construct with [`FlushCoordinator::start`], stop with
/// [`FlushCoordinator::shutdown`].
pub struct FlushCoordinator {
    inner: Arc<FlushInner>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    work_tx: Option<Sender<PathBuf>>,
    stop_tx: Sender<()>,
}

impl FlushCoordinator {
    /// Spawn the dispatcher and worker pool. `wake_rx` is the queue's nudge
    /// channel; every enqueue and flush completion re-evaluates deadlines.
    #[must_use]
    pub fn start(
        cache: Arc<IssueCache>,
        queue: Arc<WriteQueue>,
        config: SpoolConfig,
        wake_rx: Receiver<()>,
    ) -> Self {
        let inner = Arc::new(FlushInner {
            cache,
            queue,
            config,
        });

        let (work_tx, work_rx) = unbounded::<PathBuf>();
        let (stop_tx, stop_rx) = unbounded::<()>();

        let workers = (0..inner.config.flush_workers)
            .map(|n| {
                let inner = Arc::clone(&inner);
                let work_rx = work_rx.clone();
                std::thread::Builder::new()
                    .name(format!("spool-flush-{n}"))
                    .spawn(move || {
                        while let Ok(project) = work_rx.recv() {
                            inner.flush_project(&project);
                        }
                    })
                    .expect("failed to spawn flush worker")
            })
            .collect();

        let dispatcher = {
            let inner = Arc::clone(&inner);
            let work_tx = work_tx.clone();
            std::thread::Builder::new()
                .name("spool-dispatch".to_string())
                .spawn(move || {
                    dispatch_loop(&inner, &work_tx, &wake_rx, &stop_rx);
                })
                .expect("failed to spawn flush dispatcher")
        };

        Self {
            inner,
            dispatcher: Some(dispatcher),
            workers,
            work_tx: Some(work_tx),
            stop_tx,
        }
    }

    /// Run a flush cycle for one project on the calling thread.
    pub fn flush_project(&self, project: &Path) -> bool {
        self.inner.flush_project(project)
    }

    /// Stop the dispatcher, drain the worker pool, and join all threads.
    pub fn shutdown(mut self) {
        self.stop_threads();
    }

    fn stop_threads(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }
        // Dropping the work sender disconnects the workers' recv loop.
        self.work_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for FlushCoordinator {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

fn dispatch_loop(
    inner: &FlushInner,
    work_tx: &Sender<PathBuf>,
    wake_rx: &Receiver<()>,
    stop_rx: &Receiver<()>,
) {
    loop {
        let timeout = inner.queue.next_deadline().map_or(IDLE_WAIT, |deadline| {
            deadline.saturating_duration_since(Instant::now())
        });

        crossbeam::select! {
            recv(wake_rx) -> msg => {
                if msg.is_err() {
                    return;
                }
            }
            recv(stop_rx) -> _ => return,
            default(timeout) => {}
        }

        for project in inner.queue.drain_due(Instant::now()) {
            if work_tx.send(project).is_err() {
                return;
            }
        }
    }
}
