//! The `Spool` facade: one value that owns the cache, the queue, and the
//! flush coordinator, with lifecycle tied to the hosting process.

use crate::cache::{IssueCache, ListFilters, NewIssue};
use crate::config::SpoolConfig;
use crate::error::Result;
use crate::flush::FlushCoordinator;
use crate::model::{Dependency, DependencyType, Issue, IssueUpdate};
use crate::queue::{QueueEvent, QueueItem, WriteQueue};
use chrono::{DateTime, Utc};
use crossbeam::channel::{Receiver, unbounded};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Write-behind issue store: optimistic in-memory reads and writes, durable
/// persistence deferred to debounced background flush cycles.
///
/// All registries are owned here and injected into the components; dropping
/// the `Spool` (or calling [`Spool::shutdown`]) stops the background threads.
pub struct Spool {
    cache: Arc<IssueCache>,
    queue: Arc<WriteQueue>,
    coordinator: Option<FlushCoordinator>,
    events_rx: Receiver<QueueEvent>,
}

impl Spool {
    /// Wire up the cache, queue, and coordinator and start the background
    /// threads.
    #[must_use]
    pub fn new(config: SpoolConfig) -> Self {
        let (events_tx, events_rx) = unbounded();
        let (wake_tx, wake_rx) = unbounded();

        let queue = Arc::new(WriteQueue::new(&config, events_tx, wake_tx));
        let cache = Arc::new(IssueCache::new(&config, Arc::clone(&queue)));
        let coordinator = FlushCoordinator::start(
            Arc::clone(&cache),
            Arc::clone(&queue),
            config,
            wake_rx,
        );

        Self {
            cache,
            queue,
            coordinator: Some(coordinator),
            events_rx,
        }
    }

    /// Tagged event stream (enqueued / debounce fired / processing done).
    /// Clone the receiver to hand it to a notification layer.
    #[must_use]
    pub fn events(&self) -> Receiver<QueueEvent> {
        self.events_rx.clone()
    }

    // === Read API (cache only, never blocks on I/O) ===

    #[must_use]
    pub fn get(&self, project: &Path, issue_id: &str) -> Option<Issue> {
        self.cache.get(project, issue_id)
    }

    #[must_use]
    pub fn list(&self, project: &Path, filters: &ListFilters) -> Vec<Issue> {
        self.cache.list(project, filters)
    }

    #[must_use]
    pub fn get_ready(&self, project: &Path) -> Vec<Issue> {
        self.cache.get_ready(project)
    }

    #[must_use]
    pub fn get_dependencies(&self, project: &Path, issue_id: &str) -> Vec<Dependency> {
        self.cache.get_dependencies(project, issue_id)
    }

    #[must_use]
    pub fn list_groups(&self, project: &Path) -> Vec<String> {
        self.cache.list_groups(project)
    }

    #[must_use]
    pub fn is_loaded(&self, project: &Path) -> bool {
        self.cache.is_loaded(project)
    }

    // === Write API (optimistic; durability via the flush cycle) ===

    #[must_use]
    pub fn create(&self, project: &Path, new: NewIssue) -> Option<Issue> {
        self.cache.create(project, new)
    }

    pub fn update(&self, project: &Path, issue_id: &str, changes: IssueUpdate) -> bool {
        self.cache.update(project, issue_id, changes)
    }

    pub fn close(&self, project: &Path, issue_id: &str, reason: Option<&str>) -> bool {
        self.cache.close(project, issue_id, reason)
    }

    pub fn reopen(&self, project: &Path, issue_id: &str) -> bool {
        self.cache.reopen(project, issue_id)
    }

    pub fn delete(&self, project: &Path, issue_id: &str) -> bool {
        self.cache.delete(project, issue_id)
    }

    pub fn add_label(&self, project: &Path, issue_id: &str, label: &str) -> bool {
        self.cache.add_label(project, issue_id, label)
    }

    pub fn remove_label(&self, project: &Path, issue_id: &str, label: &str) -> bool {
        self.cache.remove_label(project, issue_id, label)
    }

    pub fn add_dependency(
        &self,
        project: &Path,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: DependencyType,
    ) -> bool {
        self.cache
            .add_dependency(project, issue_id, depends_on_id, dep_type)
    }

    pub fn remove_dependency(&self, project: &Path, issue_id: &str, depends_on_id: &str) -> bool {
        self.cache.remove_dependency(project, issue_id, depends_on_id)
    }

    // === Status API (drives "saving..." / "saved" indicators) ===

    #[must_use]
    pub fn pending_count(&self, project: &Path) -> usize {
        self.queue.pending_count(project)
    }

    #[must_use]
    pub fn last_modified(&self, project: &Path) -> Option<DateTime<Utc>> {
        self.queue.last_modified(project)
    }

    #[must_use]
    pub fn is_debouncing(&self, project: &Path) -> bool {
        self.queue.is_debouncing(project)
    }

    #[must_use]
    pub fn is_processing(&self, project: &Path) -> bool {
        self.queue.is_processing(project)
    }

    /// Completed history, newest first.
    #[must_use]
    pub fn history(&self, project: &Path, limit: usize) -> Vec<QueueItem> {
        self.queue.history(project, limit)
    }

    /// Items whose retry budget ran out, newest first.
    #[must_use]
    pub fn dead_letters(&self, project: &Path, limit: usize) -> Vec<QueueItem> {
        self.queue.dead_letters(project, limit)
    }

    // === Control ===

    /// Run a flush cycle for one project on the calling thread, without
    /// waiting for the debounce window. Returns the cycle's success flag.
    pub fn flush_now(&self, project: &Path) -> bool {
        self.coordinator
            .as_ref()
            .is_none_or(|coordinator| coordinator.flush_project(project))
    }

    /// Reconcile a project's cache with the store immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or read.
    pub fn refresh(&self, project: &Path) -> Result<()> {
        self.cache.refresh(project)
    }

    /// Flush every project with pending changes, then stop and join the
    /// background threads.
    pub fn shutdown(mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            let projects = self.queue.projects_with_pending();
            if !projects.is_empty() {
                info!(projects = projects.len(), "flushing pending changes before shutdown");
            }
            for project in projects {
                coordinator.flush_project(&project);
            }
            coordinator.shutdown();
        }
    }
}
