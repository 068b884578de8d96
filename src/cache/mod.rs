//! Optimistic in-memory issue cache.
//!
//! One [`ProjectCache`] per project root, created lazily and kept for the
//! process lifetime. Reads never touch the store. Every mutation applies to
//! the in-memory structures immediately, captures the pre-mutation snapshot,
//! and enqueues a [`QueueItem`] carrying it; durability is entirely the
//! queue/flush path's business. `refresh` replaces a project's state
//! wholesale with the store's ground truth.

use crate::config::SpoolConfig;
use crate::error::Result;
use crate::model::{Dependency, DependencyType, Issue, IssueType, IssueUpdate, Priority, Status};
use crate::queue::{QueueItem, QueueOp, WriteQueue};
use crate::storage;
use crate::util::id::IdGenerator;
use chrono::Utc;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Filters for [`IssueCache::list`]. All present filters must match (AND).
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub statuses: Option<Vec<Status>>,
    pub types: Option<Vec<IssueType>>,
    pub priorities: Option<Vec<Priority>>,
    pub assignee: Option<String>,
    /// Issue must carry every one of these labels.
    pub labels_all: Option<Vec<String>>,
    /// Issue must carry at least one of these labels.
    pub labels_any: Option<Vec<String>>,
    /// Case-insensitive title substring.
    pub title_contains: Option<String>,
    /// When false (default) Closed issues are hidden unless the status
    /// filter names them. Tombstones only ever show up via the status filter.
    pub include_closed: bool,
    pub limit: Option<usize>,
}

impl ListFilters {
    fn matches(&self, issue: &Issue) -> bool {
        if let Some(ref statuses) = self.statuses {
            if !statuses.contains(&issue.status) {
                return false;
            }
        } else {
            if issue.status == Status::Tombstone {
                return false;
            }
            if !self.include_closed && issue.status == Status::Closed {
                return false;
            }
        }

        if let Some(ref types) = self.types
            && !types.contains(&issue.issue_type)
        {
            return false;
        }

        if let Some(ref priorities) = self.priorities
            && !issue.priority.is_some_and(|p| priorities.contains(&p))
        {
            return false;
        }

        if let Some(ref assignee) = self.assignee
            && issue.assignee.as_deref() != Some(assignee.as_str())
        {
            return false;
        }

        if let Some(ref labels) = self.labels_all
            && !labels.iter().all(|label| issue.has_label(label))
        {
            return false;
        }

        if let Some(ref labels) = self.labels_any
            && !labels.iter().any(|label| issue.has_label(label))
        {
            return false;
        }

        if let Some(ref needle) = self.title_contains
            && !issue
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase())
        {
            return false;
        }

        true
    }
}

/// Payload for [`IssueCache::create`].
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub title: String,
    pub description: Option<String>,
    pub issue_type: IssueType,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub parent_id: Option<String>,
    pub labels: Vec<String>,
}

/// Per-project in-memory state, guarded by one lock.
#[derive(Debug, Default)]
struct ProjectCache {
    issues: HashMap<String, Issue>,
    dependencies: HashMap<String, Vec<Dependency>>,
    loaded: bool,
}

/// The cache registry. Mutations enqueue into the injected [`WriteQueue`];
/// no global state anywhere.
#[derive(Debug)]
pub struct IssueCache {
    projects: Mutex<HashMap<PathBuf, Arc<Mutex<ProjectCache>>>>,
    queue: Arc<WriteQueue>,
    id_gen: IdGenerator,
    busy_timeout_ms: u64,
    group_label_re: Regex,
}

impl IssueCache {
    /// Build a cache wired to the given queue.
    ///
    /// # Panics
    ///
    /// Never panics in practice: the group-label pattern is built from an
    /// escaped prefix and a fixed tail.
    #[must_use]
    pub fn new(config: &SpoolConfig, queue: Arc<WriteQueue>) -> Self {
        let group_label_re = Regex::new(&format!(
            "^{}:group/(.+)$",
            regex::escape(&config.group_label_prefix)
        ))
        .expect("group label pattern is well-formed");

        Self {
            projects: Mutex::new(HashMap::new()),
            queue,
            id_gen: IdGenerator::new(config.id_prefix.clone()),
            busy_timeout_ms: config.busy_timeout_ms,
            group_label_re,
        }
    }

    fn project(&self, path: &Path) -> Arc<Mutex<ProjectCache>> {
        let mut projects = self.projects.lock().expect("cache registry poisoned");
        Arc::clone(
            projects
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(ProjectCache::default()))),
        )
    }

    // === Reads ===

    #[must_use]
    pub fn get(&self, project: &Path, issue_id: &str) -> Option<Issue> {
        let cache = self.project(project);
        let cache = cache.lock().expect("project cache poisoned");
        cache.issues.get(issue_id).cloned()
    }

    /// List issues matching the filters, priority ascending (missing
    /// priority last) then newest first.
    #[must_use]
    pub fn list(&self, project: &Path, filters: &ListFilters) -> Vec<Issue> {
        let cache = self.project(project);
        let cache = cache.lock().expect("project cache poisoned");
        let mut issues: Vec<Issue> = cache
            .issues
            .values()
            .filter(|issue| filters.matches(issue))
            .cloned()
            .collect();
        sort_default(&mut issues);
        if let Some(limit) = filters.limit {
            issues.truncate(limit);
        }
        issues
    }

    /// Open issues with no unresolved `Blocks` dependency.
    ///
    /// A blocker that is absent from the cache or tombstoned is treated as
    /// resolved; only a live, non-Closed target blocks.
    #[must_use]
    pub fn get_ready(&self, project: &Path) -> Vec<Issue> {
        let cache = self.project(project);
        let cache = cache.lock().expect("project cache poisoned");
        let mut ready: Vec<Issue> = cache
            .issues
            .values()
            .filter(|issue| issue.status == Status::Open)
            .filter(|issue| {
                cache.dependencies.get(&issue.id).is_none_or(|deps| {
                    deps.iter()
                        .filter(|dep| dep.dep_type.is_blocking())
                        .all(|dep| {
                            cache.issues.get(&dep.depends_on_id).is_none_or(|target| {
                                target.status == Status::Closed || target.is_tombstone()
                            })
                        })
                })
            })
            .cloned()
            .collect();
        sort_default(&mut ready);
        ready
    }

    /// Outgoing dependencies of an issue.
    #[must_use]
    pub fn get_dependencies(&self, project: &Path, issue_id: &str) -> Vec<Dependency> {
        let cache = self.project(project);
        let cache = cache.lock().expect("project cache poisoned");
        cache
            .dependencies
            .get(issue_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Deduplicated, sorted group names extracted from group labels
    /// (`<prefix>:group/<name>`).
    #[must_use]
    pub fn list_groups(&self, project: &Path) -> Vec<String> {
        let cache = self.project(project);
        let cache = cache.lock().expect("project cache poisoned");
        let mut groups = BTreeSet::new();
        for issue in cache.issues.values() {
            if issue.is_tombstone() {
                continue;
            }
            for label in &issue.labels {
                if let Some(captures) = self.group_label_re.captures(label) {
                    groups.insert(captures[1].to_string());
                }
            }
        }
        groups.into_iter().collect()
    }

    #[must_use]
    pub fn is_loaded(&self, project: &Path) -> bool {
        let cache = self.project(project);
        let cache = cache.lock().expect("project cache poisoned");
        cache.loaded
    }

    // === Mutations (optimistic; durability via the queue) ===

    /// Create a new issue. Returns `None` if the title fails validation.
    #[must_use]
    pub fn create(&self, project: &Path, new: NewIssue) -> Option<Issue> {
        let title = new.title.trim();
        if title.is_empty() || title.len() > 500 {
            return None;
        }

        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");

        let now = Utc::now();
        let id = self
            .id_gen
            .generate(title, now, |candidate| cache.issues.contains_key(candidate));

        let mut labels: Vec<String> = Vec::new();
        for label in &new.labels {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }

        let issue = Issue {
            id: id.clone(),
            title: title.to_string(),
            description: new.description,
            status: Status::Open,
            issue_type: new.issue_type,
            priority: new.priority,
            assignee: new.assignee,
            parent_id: new.parent_id.clone(),
            labels,
            created_at: now,
            updated_at: now,
            closed_at: None,
            close_reason: None,
            deleted_at: None,
        };

        cache.issues.insert(id.clone(), issue.clone());
        if let Some(parent_id) = new.parent_id {
            cache.dependencies.entry(id.clone()).or_default().push(Dependency {
                issue_id: id.clone(),
                depends_on_id: parent_id,
                dep_type: DependencyType::ParentChild,
                created_at: now,
            });
        }

        self.queue.enqueue(QueueItem::new(
            project,
            id,
            QueueOp::Create {
                issue: issue.clone(),
            },
            None,
        ));

        Some(issue)
    }

    /// Apply a partial update. Returns `false` for unknown/tombstoned issues
    /// and empty patches.
    pub fn update(&self, project: &Path, issue_id: &str, changes: IssueUpdate) -> bool {
        if changes.is_empty() {
            return false;
        }

        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");
        let Some(issue) = live_issue_mut(&mut cache, issue_id) else {
            return false;
        };

        let snapshot = issue.clone();
        if !changes.apply_to(issue) {
            return false;
        }
        issue.updated_at = Utc::now();

        self.queue.enqueue(QueueItem::new(
            project,
            issue_id,
            QueueOp::Update { changes },
            Some(snapshot),
        ));
        true
    }

    /// Close an open issue.
    pub fn close(&self, project: &Path, issue_id: &str, reason: Option<&str>) -> bool {
        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");
        let Some(issue) = live_issue_mut(&mut cache, issue_id) else {
            return false;
        };
        if issue.status == Status::Closed {
            return false;
        }

        let snapshot = issue.clone();
        let closed_at = Utc::now();
        issue.status = Status::Closed;
        issue.closed_at = Some(closed_at);
        issue.close_reason = reason.map(str::to_string);
        issue.updated_at = closed_at;

        self.queue.enqueue(QueueItem::new(
            project,
            issue_id,
            QueueOp::Close {
                reason: reason.map(str::to_string),
                closed_at,
            },
            Some(snapshot),
        ));
        true
    }

    /// Reopen a closed issue.
    pub fn reopen(&self, project: &Path, issue_id: &str) -> bool {
        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");
        let Some(issue) = live_issue_mut(&mut cache, issue_id) else {
            return false;
        };
        if issue.status != Status::Closed {
            return false;
        }

        let snapshot = issue.clone();
        issue.status = Status::Open;
        issue.closed_at = None;
        issue.close_reason = None;
        issue.updated_at = Utc::now();

        self.queue.enqueue(QueueItem::new(
            project,
            issue_id,
            QueueOp::Reopen,
            Some(snapshot),
        ));
        true
    }

    /// Tombstone an issue. It stays in the map (invisible to list/ready)
    /// until the next refresh drops it.
    pub fn delete(&self, project: &Path, issue_id: &str) -> bool {
        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");
        let Some(issue) = live_issue_mut(&mut cache, issue_id) else {
            return false;
        };

        let snapshot = issue.clone();
        let deleted_at = Utc::now();
        issue.status = Status::Tombstone;
        issue.deleted_at = Some(deleted_at);
        issue.updated_at = deleted_at;

        self.queue.enqueue(QueueItem::new(
            project,
            issue_id,
            QueueOp::Delete { deleted_at },
            Some(snapshot),
        ));
        true
    }

    /// Add a label. `false` if the issue is unknown or already carries it.
    pub fn add_label(&self, project: &Path, issue_id: &str, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() {
            return false;
        }

        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");
        let Some(issue) = live_issue_mut(&mut cache, issue_id) else {
            return false;
        };
        if issue.has_label(label) {
            return false;
        }

        let snapshot = issue.clone();
        issue.labels.push(label.to_string());
        issue.updated_at = Utc::now();

        self.queue.enqueue(QueueItem::new(
            project,
            issue_id,
            QueueOp::AddLabel {
                label: label.to_string(),
            },
            Some(snapshot),
        ));
        true
    }

    /// Remove a label. `false` if the issue is unknown or lacks it.
    pub fn remove_label(&self, project: &Path, issue_id: &str, label: &str) -> bool {
        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");
        let Some(issue) = live_issue_mut(&mut cache, issue_id) else {
            return false;
        };
        let Some(position) = issue.labels.iter().position(|l| l == label) else {
            return false;
        };

        let snapshot = issue.clone();
        issue.labels.remove(position);
        issue.updated_at = Utc::now();

        self.queue.enqueue(QueueItem::new(
            project,
            issue_id,
            QueueOp::RemoveLabel {
                label: label.to_string(),
            },
            Some(snapshot),
        ));
        true
    }

    /// Add a dependency edge. Uniqueness on (from, to) is enforced by linear
    /// scan; self-edges are rejected.
    pub fn add_dependency(
        &self,
        project: &Path,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: DependencyType,
    ) -> bool {
        if issue_id == depends_on_id {
            return false;
        }

        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");
        if live_issue_mut(&mut cache, issue_id).is_none() {
            return false;
        }

        let deps = cache.dependencies.entry(issue_id.to_string()).or_default();
        if deps.iter().any(|d| d.depends_on_id == depends_on_id) {
            return false;
        }

        let dependency = Dependency {
            issue_id: issue_id.to_string(),
            depends_on_id: depends_on_id.to_string(),
            dep_type,
            created_at: Utc::now(),
        };
        deps.push(dependency.clone());

        let snapshot = cache.issues.get_mut(issue_id).map(|issue| {
            let snapshot = issue.clone();
            if dep_type == DependencyType::ParentChild {
                issue.parent_id = Some(depends_on_id.to_string());
            }
            issue.updated_at = Utc::now();
            snapshot
        });

        self.queue.enqueue(QueueItem::new(
            project,
            issue_id,
            QueueOp::AddDependency { dependency },
            snapshot,
        ));
        true
    }

    /// Remove a dependency edge. `false` if absent.
    pub fn remove_dependency(&self, project: &Path, issue_id: &str, depends_on_id: &str) -> bool {
        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");
        if live_issue_mut(&mut cache, issue_id).is_none() {
            return false;
        }

        let Some(deps) = cache.dependencies.get_mut(issue_id) else {
            return false;
        };
        let Some(position) = deps.iter().position(|d| d.depends_on_id == depends_on_id) else {
            return false;
        };
        let removed = deps.remove(position);

        let snapshot = cache.issues.get_mut(issue_id).map(|issue| {
            let snapshot = issue.clone();
            if removed.dep_type == DependencyType::ParentChild {
                issue.parent_id = None;
            }
            issue.updated_at = Utc::now();
            snapshot
        });

        self.queue.enqueue(QueueItem::new(
            project,
            issue_id,
            QueueOp::RemoveDependency {
                depends_on_id: depends_on_id.to_string(),
            },
            snapshot,
        ));
        true
    }

    // === Reconciliation ===

    /// Discard the project's state and rebuild it from the store in full.
    ///
    /// The only path that reconciles cache and ground truth; it overwrites
    /// rather than merges, so cache-only state not yet flushed is lost.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or read.
    pub fn refresh(&self, project: &Path) -> Result<()> {
        let db_path = storage::store_path(project);
        let conn = storage::open_store(&db_path, self.busy_timeout_ms)?;
        let snapshot = storage::load_project(&conn)?;
        debug!(
            project = %project.display(),
            issues = snapshot.issues.len(),
            "cache refreshed from store"
        );

        let cache = self.project(project);
        let mut cache = cache.lock().expect("project cache poisoned");
        cache.issues = snapshot
            .issues
            .into_iter()
            .map(|issue| (issue.id.clone(), issue))
            .collect();
        cache.dependencies = snapshot.dependencies;
        cache.loaded = true;
        Ok(())
    }
}

/// Look up a live (non-tombstoned) issue for mutation.
fn live_issue_mut<'a>(cache: &'a mut ProjectCache, issue_id: &str) -> Option<&'a mut Issue> {
    cache
        .issues
        .get_mut(issue_id)
        .filter(|issue| !issue.is_tombstone())
}

fn sort_default(issues: &mut [Issue]) {
    issues.sort_by(|a, b| {
        let pa = a.priority.map_or(i32::MAX, |p| p.0);
        let pb = b.priority.map_or(i32::MAX, |p| p.0);
        pa.cmp(&pb).then(b.created_at.cmp(&a.created_at))
    });
}
