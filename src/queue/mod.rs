//! Per-project write queue with trailing-edge debounce.
//!
//! Mutations land here as [`QueueItem`]s the instant the cache applies them
//! in memory. Each enqueue (re)arms the project's debounce deadline; when the
//! deadline elapses without another enqueue the flush coordinator drains the
//! project. Retired items go to a bounded completed-history ring buffer, or
//! to the dead-letter buffer once their retry budget is exhausted.
//!
//! Flush hand-off is snapshot-and-swap: `begin_flush` detaches the pending
//! list atomically, so an item enqueued mid-flush lands in a fresh list and
//! is never lost to a clear-by-reference.

use crate::config::SpoolConfig;
use crate::model::{Dependency, Issue, IssueUpdate};
use chrono::{DateTime, Utc};
use crossbeam::channel::Sender;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Operation payload of a queued mutation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueueOp {
    Create {
        issue: Issue,
    },
    Update {
        changes: IssueUpdate,
    },
    Close {
        reason: Option<String>,
        closed_at: DateTime<Utc>,
    },
    Reopen,
    Delete {
        deleted_at: DateTime<Utc>,
    },
    AddLabel {
        label: String,
    },
    RemoveLabel {
        label: String,
    },
    AddDependency {
        dependency: Dependency,
    },
    RemoveDependency {
        depends_on_id: String,
    },
}

impl QueueOp {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Close { .. } => "close",
            Self::Reopen => "reopen",
            Self::Delete { .. } => "delete",
            Self::AddLabel { .. } => "add_label",
            Self::RemoveLabel { .. } => "remove_label",
            Self::AddDependency { .. } => "add_dependency",
            Self::RemoveDependency { .. } => "remove_dependency",
        }
    }
}

/// Lifecycle of a queue item. Transitions only forward, only in the flush
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// A buffered mutation awaiting durable application.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub project: PathBuf,
    pub issue_id: String,
    #[serde(flatten)]
    pub op: QueueOp,
    /// Pre-mutation state of the issue, for undo. `None` for creates.
    pub snapshot: Option<Issue>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub queued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    #[must_use]
    pub fn new(project: &Path, issue_id: impl Into<String>, op: QueueOp, snapshot: Option<Issue>) -> Self {
        Self {
            project: project.to_path_buf(),
            issue_id: issue_id.into(),
            op,
            snapshot,
            status: ItemStatus::Pending,
            error: None,
            attempts: 0,
            queued_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// Tagged notification stream consumed by the hosting application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    ItemEnqueued {
        project: PathBuf,
        issue_id: String,
    },
    DebounceCompleted {
        project: PathBuf,
    },
    ProcessingCompleted {
        project: PathBuf,
        success: bool,
    },
}

/// Per-project queue state. One lock per project; projects never block each
/// other.
#[derive(Debug, Default)]
struct ProjectQueueState {
    pending: Vec<QueueItem>,
    history: VecDeque<QueueItem>,
    dead_letter: VecDeque<QueueItem>,
    last_modified: Option<DateTime<Utc>>,
    /// Armed debounce deadline; absent while idle or processing.
    deadline: Option<Instant>,
    processing: bool,
}

impl ProjectQueueState {
    fn push_capped(buffer: &mut VecDeque<QueueItem>, item: QueueItem, cap: usize) {
        buffer.push_back(item);
        while buffer.len() > cap {
            buffer.pop_front();
        }
    }
}

/// The write queue registry. Injected into the cache (enqueue side) and the
/// flush coordinator (drain side); owns no threads.
#[derive(Debug)]
pub struct WriteQueue {
    debounce: Duration,
    max_history: usize,
    projects: Mutex<HashMap<PathBuf, Arc<Mutex<ProjectQueueState>>>>,
    events_tx: Sender<QueueEvent>,
    wake_tx: Sender<()>,
}

impl WriteQueue {
    #[must_use]
    pub fn new(config: &SpoolConfig, events_tx: Sender<QueueEvent>, wake_tx: Sender<()>) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            max_history: config.max_history_items,
            projects: Mutex::new(HashMap::new()),
            events_tx,
            wake_tx,
        }
    }

    fn project(&self, path: &Path) -> Arc<Mutex<ProjectQueueState>> {
        let mut projects = self.projects.lock().expect("queue registry poisoned");
        Arc::clone(
            projects
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(ProjectQueueState::default()))),
        )
    }

    fn emit(&self, event: QueueEvent) {
        // The host may have dropped the receiver; events are best-effort.
        let _ = self.events_tx.send(event);
    }

    /// Append a mutation and (re)arm the project's debounce deadline.
    ///
    /// While a flush is processing the project, no deadline is armed; the
    /// flush re-arms on completion if anything is pending.
    pub fn enqueue(&self, item: QueueItem) {
        let project = item.project.clone();
        let issue_id = item.issue_id.clone();

        let state = self.project(&project);
        {
            let mut state = state.lock().expect("queue state poisoned");
            state.pending.push(item);
            state.last_modified = Some(Utc::now());
            if !state.processing {
                state.deadline = Some(Instant::now() + self.debounce);
            }
        }

        self.emit(QueueEvent::ItemEnqueued { project, issue_id });
        let _ = self.wake_tx.send(());
    }

    /// Atomically claim the project for flushing and detach its pending list.
    ///
    /// Returns `None` when the project is already being processed or has
    /// nothing pending. On `Some`, the processing flag is set and the
    /// debounce deadline cleared; the caller must pair with
    /// [`WriteQueue::finish_flush`].
    #[must_use]
    pub fn begin_flush(&self, project: &Path) -> Option<Vec<QueueItem>> {
        let state = self.project(project);
        let mut state = state.lock().expect("queue state poisoned");
        if state.processing || state.pending.is_empty() {
            return None;
        }
        state.processing = true;
        state.deadline = None;
        Some(std::mem::take(&mut state.pending))
    }

    /// Retire a flush cycle's items and release the project.
    ///
    /// `completed` goes to history, `dead` to the dead-letter buffer, and
    /// `retry` items return to the head of the pending list, ahead of
    /// anything enqueued while the flush ran. If the pending list ends up
    /// non-empty a fresh deadline is armed so retries are never stranded.
    pub fn finish_flush(
        &self,
        project: &Path,
        completed: Vec<QueueItem>,
        retry: Vec<QueueItem>,
        dead: Vec<QueueItem>,
        success: bool,
    ) {
        let state = self.project(project);
        {
            let mut state = state.lock().expect("queue state poisoned");
            for item in completed {
                ProjectQueueState::push_capped(&mut state.history, item, self.max_history);
            }
            for item in dead {
                ProjectQueueState::push_capped(&mut state.dead_letter, item, self.max_history);
            }
            if !retry.is_empty() {
                let newer = std::mem::take(&mut state.pending);
                state.pending = retry;
                state.pending.extend(newer);
            }
            state.processing = false;
            if !state.pending.is_empty() {
                state.deadline = Some(Instant::now() + self.debounce);
            }
        }

        self.emit(QueueEvent::ProcessingCompleted {
            project: project.to_path_buf(),
            success,
        });
        let _ = self.wake_tx.send(());
    }

    /// Earliest armed deadline across all projects.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let projects = self.projects.lock().expect("queue registry poisoned");
        projects
            .values()
            .filter_map(|state| state.lock().expect("queue state poisoned").deadline)
            .min()
    }

    /// Clear and return every project whose deadline has elapsed, emitting
    /// `DebounceCompleted` for each.
    pub fn drain_due(&self, now: Instant) -> Vec<PathBuf> {
        let candidates: Vec<(PathBuf, Arc<Mutex<ProjectQueueState>>)> = {
            let projects = self.projects.lock().expect("queue registry poisoned");
            projects
                .iter()
                .map(|(path, state)| (path.clone(), Arc::clone(state)))
                .collect()
        };

        let mut due = Vec::new();
        for (path, state) in candidates {
            let fired = {
                let mut state = state.lock().expect("queue state poisoned");
                if state.deadline.is_some_and(|deadline| deadline <= now) {
                    state.deadline = None;
                    true
                } else {
                    false
                }
            };
            if fired {
                self.emit(QueueEvent::DebounceCompleted {
                    project: path.clone(),
                });
                due.push(path);
            }
        }
        due
    }

    /// Projects with anything pending (used by graceful shutdown).
    #[must_use]
    pub fn projects_with_pending(&self) -> Vec<PathBuf> {
        let candidates: Vec<(PathBuf, Arc<Mutex<ProjectQueueState>>)> = {
            let projects = self.projects.lock().expect("queue registry poisoned");
            projects
                .iter()
                .map(|(path, state)| (path.clone(), Arc::clone(state)))
                .collect()
        };
        candidates
            .into_iter()
            .filter(|(_, state)| {
                !state
                    .lock()
                    .expect("queue state poisoned")
                    .pending
                    .is_empty()
            })
            .map(|(path, _)| path)
            .collect()
    }

    // === Status surface ===

    #[must_use]
    pub fn pending_count(&self, project: &Path) -> usize {
        let state = self.project(project);
        let state = state.lock().expect("queue state poisoned");
        state.pending.len()
    }

    #[must_use]
    pub fn get_pending(&self, project: &Path) -> Vec<QueueItem> {
        let state = self.project(project);
        let state = state.lock().expect("queue state poisoned");
        state.pending.clone()
    }

    #[must_use]
    pub fn is_debouncing(&self, project: &Path) -> bool {
        let state = self.project(project);
        let state = state.lock().expect("queue state poisoned");
        state.deadline.is_some()
    }

    #[must_use]
    pub fn is_processing(&self, project: &Path) -> bool {
        let state = self.project(project);
        let state = state.lock().expect("queue state poisoned");
        state.processing
    }

    #[must_use]
    pub fn last_modified(&self, project: &Path) -> Option<DateTime<Utc>> {
        let state = self.project(project);
        let state = state.lock().expect("queue state poisoned");
        state.last_modified
    }

    /// Completed history, newest first.
    #[must_use]
    pub fn history(&self, project: &Path, limit: usize) -> Vec<QueueItem> {
        let state = self.project(project);
        let state = state.lock().expect("queue state poisoned");
        state.history.iter().rev().take(limit).cloned().collect()
    }

    /// Dead-lettered items, newest first.
    #[must_use]
    pub fn dead_letters(&self, project: &Path, limit: usize) -> Vec<QueueItem> {
        let state = self.project(project);
        let state = state.lock().expect("queue state poisoned");
        state
            .dead_letter
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{Receiver, unbounded};

    fn test_queue(debounce_ms: u64) -> (WriteQueue, Receiver<QueueEvent>, Receiver<()>) {
        let (events_tx, events_rx) = unbounded();
        let (wake_tx, wake_rx) = unbounded();
        let config = SpoolConfig {
            debounce_ms,
            max_history_items: 3,
            ..Default::default()
        };
        (WriteQueue::new(&config, events_tx, wake_tx), events_rx, wake_rx)
    }

    fn item(project: &Path, issue_id: &str) -> QueueItem {
        QueueItem::new(project, issue_id, QueueOp::Reopen, None)
    }

    #[test]
    fn enqueue_arms_deadline_and_emits_event() {
        let (queue, events, wake) = test_queue(50);
        let project = PathBuf::from("/p1");

        queue.enqueue(item(&project, "is-1"));

        assert!(queue.is_debouncing(&project));
        assert_eq!(queue.pending_count(&project), 1);
        assert!(queue.last_modified(&project).is_some());
        assert!(matches!(
            events.try_recv().unwrap(),
            QueueEvent::ItemEnqueued { .. }
        ));
        assert!(wake.try_recv().is_ok());
    }

    #[test]
    fn repeated_enqueues_extend_the_deadline() {
        let (queue, _events, _wake) = test_queue(10_000);
        let project = PathBuf::from("/p1");

        queue.enqueue(item(&project, "is-1"));
        let first = queue.next_deadline().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        queue.enqueue(item(&project, "is-2"));
        let second = queue.next_deadline().unwrap();

        assert!(second > first, "deadline should restart on every enqueue");
    }

    #[test]
    fn drain_due_fires_once_per_elapsed_deadline() {
        let (queue, events, _wake) = test_queue(50);
        let project = PathBuf::from("/p1");

        queue.enqueue(item(&project, "is-1"));
        queue.enqueue(item(&project, "is-2"));
        while events.try_recv().is_ok() {}

        // Not yet due.
        assert!(queue.drain_due(Instant::now()).is_empty());

        let later = Instant::now() + Duration::from_millis(100);
        let due = queue.drain_due(later);
        assert_eq!(due, vec![project.clone()]);
        assert!(matches!(
            events.try_recv().unwrap(),
            QueueEvent::DebounceCompleted { .. }
        ));

        // Deadline consumed; nothing further fires.
        assert!(queue.drain_due(later).is_empty());
        assert!(!queue.is_debouncing(&project));
    }

    #[test]
    fn begin_flush_detaches_pending_and_claims_project() {
        let (queue, _events, _wake) = test_queue(50);
        let project = PathBuf::from("/p1");

        queue.enqueue(item(&project, "is-1"));
        let snapshot = queue.begin_flush(&project).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(queue.is_processing(&project));
        assert_eq!(queue.pending_count(&project), 0);

        // A second claim while processing is refused.
        assert!(queue.begin_flush(&project).is_none());

        // An enqueue during processing lands in the fresh list without
        // arming a deadline.
        queue.enqueue(item(&project, "is-2"));
        assert_eq!(queue.pending_count(&project), 1);
        assert!(!queue.is_debouncing(&project));
    }

    #[test]
    fn begin_flush_on_empty_project_is_none() {
        let (queue, _events, _wake) = test_queue(50);
        assert!(queue.begin_flush(Path::new("/p1")).is_none());
    }

    #[test]
    fn finish_flush_retires_and_rearms() {
        let (queue, events, _wake) = test_queue(50);
        let project = PathBuf::from("/p1");

        queue.enqueue(item(&project, "is-1"));
        let mut snapshot = queue.begin_flush(&project).unwrap();

        // Item enqueued mid-flush.
        queue.enqueue(item(&project, "is-2"));
        while events.try_recv().is_ok() {}

        let mut done = snapshot.remove(0);
        done.status = ItemStatus::Completed;
        let retry = item(&project, "is-0");
        queue.finish_flush(&project, vec![done], vec![retry], vec![], true);

        assert!(!queue.is_processing(&project));
        assert_eq!(queue.history(&project, 10).len(), 1);

        // Retry is queued ahead of the mid-flush arrival.
        let pending = queue.get_pending(&project);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].issue_id, "is-0");
        assert_eq!(pending[1].issue_id, "is-2");

        // Non-empty pending re-arms the debounce.
        assert!(queue.is_debouncing(&project));
        assert!(matches!(
            events.try_recv().unwrap(),
            QueueEvent::ProcessingCompleted { success: true, .. }
        ));
    }

    #[test]
    fn history_is_capped_and_evicts_oldest() {
        let (queue, _events, _wake) = test_queue(50);
        let project = PathBuf::from("/p1");

        for n in 0..5 {
            queue.enqueue(item(&project, &format!("is-{n}")));
            let mut snapshot = queue.begin_flush(&project).unwrap();
            let mut done = snapshot.remove(0);
            done.status = ItemStatus::Completed;
            queue.finish_flush(&project, vec![done], vec![], vec![], true);
        }

        // Cap is 3 in the test config; newest first.
        let history = queue.history(&project, 10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].issue_id, "is-4");
        assert_eq!(history[2].issue_id, "is-2");
    }

    #[test]
    fn projects_are_independent() {
        let (queue, _events, _wake) = test_queue(50);
        let p1 = PathBuf::from("/p1");
        let p2 = PathBuf::from("/p2");

        queue.enqueue(item(&p1, "is-1"));
        queue.enqueue(item(&p2, "is-2"));

        let _claimed = queue.begin_flush(&p1).unwrap();
        assert!(queue.is_processing(&p1));
        assert!(!queue.is_processing(&p2));
        assert_eq!(queue.pending_count(&p2), 1);

        let mut with_pending = queue.projects_with_pending();
        with_pending.sort();
        assert_eq!(with_pending, vec![p2.clone()]);
    }
}
