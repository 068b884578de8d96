//! Core data types for `spool`.
//!
//! This module defines the fundamental types used throughout the crate:
//! - `Issue` - The core work item
//! - `Status` - Issue lifecycle states
//! - `IssueType` - Categories of issues
//! - `Dependency` - Relationships between issues
//! - `IssueUpdate` - Partial update payload
//! - `EventType` - Audit log entry kinds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Issue lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Deferred,
    Closed,
    Tombstone,
    Pinned,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Deferred => "deferred",
            Self::Closed => "closed",
            Self::Tombstone => "tombstone",
            Self::Pinned => "pinned",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Tombstone)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = crate::error::SpoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "deferred" => Ok(Self::Deferred),
            "closed" => Ok(Self::Closed),
            "tombstone" => Ok(Self::Tombstone),
            "pinned" => Ok(Self::Pinned),
            other => Err(crate::error::SpoolError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Issue priority (0=Critical, 4=Backlog).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const CRITICAL: Self = Self(0);
    pub const HIGH: Self = Self(1);
    pub const MEDIUM: Self = Self(2);
    pub const LOW: Self = Self(3);
    pub const BACKLOG: Self = Self(4);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = crate::error::SpoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        let val = s.strip_prefix('P').unwrap_or(&s);

        match val.parse::<i32>() {
            Ok(p) if (0..=4).contains(&p) => Ok(Self(p)),
            _ => Err(crate::error::SpoolError::InvalidPriority {
                priority: val.parse().unwrap_or(-1),
            }),
        }
    }
}

/// Issue type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    #[default]
    Task,
    Bug,
    Feature,
    Epic,
    Chore,
}

impl IssueType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Epic => "epic",
            Self::Chore => "chore",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = crate::error::SpoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "epic" => Ok(Self::Epic),
            "chore" => Ok(Self::Chore),
            other => Err(crate::error::SpoolError::InvalidType {
                issue_type: other.to_string(),
            }),
        }
    }
}

/// Dependency relationship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    Blocks,
    Related,
    ParentChild,
    DiscoveredFrom,
}

impl DependencyType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Related => "related",
            Self::ParentChild => "parent-child",
            Self::DiscoveredFrom => "discovered-from",
        }
    }

    /// Only `Blocks` edges gate readiness.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Blocks)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = crate::error::SpoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocks" => Ok(Self::Blocks),
            "related" => Ok(Self::Related),
            "parent-child" => Ok(Self::ParentChild),
            "discovered-from" => Ok(Self::DiscoveredFrom),
            other => Err(crate::error::SpoolError::Validation {
                field: "dependency_type".to_string(),
                reason: format!("unknown dependency type: {other}"),
            }),
        }
    }
}

/// Audit event type. Only the audited operations have a variant; updates,
/// deletions, and dependency edits write no event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Closed,
    Reopened,
    LabelAdded,
    LabelRemoved,
}

impl EventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::LabelAdded => "label_added",
            Self::LabelRemoved => "label_removed",
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The primary issue entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// Unique ID within a project (e.g., "is-abc123").
    pub id: String,

    /// Title (1-500 chars).
    pub title: String,

    /// Detailed description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Workflow status.
    #[serde(default)]
    pub status: Status,

    /// Issue type (bug, feature, etc.).
    #[serde(default)]
    pub issue_type: IssueType,

    /// Priority (0=Critical, 4=Backlog).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    /// Assigned user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    /// Parent issue. Derived state: persisted as a parent-child dependency
    /// row and rebuilt from the dependency map on refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Labels, deduplicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,

    /// Closure timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Reason for closure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,

    /// Tombstone timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Whether this issue has been logically removed.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.status == Status::Tombstone
    }

    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Relationship between two issues. Owned by the source issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    /// The issue that has the dependency (source).
    pub issue_id: String,

    /// The issue being depended on (target).
    pub depends_on_id: String,

    /// Type of dependency.
    #[serde(rename = "type")]
    pub dep_type: DependencyType,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Partial update for an issue.
///
/// `None` means "leave unchanged". Clearable optionals use `Option<Option<_>>`
/// so `Some(None)` clears the field. `labels` replaces the whole label set;
/// the applier diffs it against the pre-mutation snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<Priority>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl IssueUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.issue_type.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
            && self.labels.is_none()
    }

    /// Apply this patch to an issue in place. Returns `true` if any field
    /// actually changed value.
    pub fn apply_to(&self, issue: &mut Issue) -> bool {
        let mut changed = false;

        if let Some(ref title) = self.title
            && *title != issue.title
        {
            issue.title.clone_from(title);
            changed = true;
        }
        if let Some(ref description) = self.description
            && *description != issue.description
        {
            issue.description.clone_from(description);
            changed = true;
        }
        if let Some(status) = self.status
            && status != issue.status
        {
            issue.status = status;
            changed = true;
        }
        if let Some(issue_type) = self.issue_type
            && issue_type != issue.issue_type
        {
            issue.issue_type = issue_type;
            changed = true;
        }
        if let Some(priority) = self.priority
            && priority != issue.priority
        {
            issue.priority = priority;
            changed = true;
        }
        if let Some(ref assignee) = self.assignee
            && *assignee != issue.assignee
        {
            issue.assignee.clone_from(assignee);
            changed = true;
        }
        if let Some(ref labels) = self.labels {
            let mut next: Vec<String> = Vec::new();
            for label in labels {
                if !next.contains(label) {
                    next.push(label.clone());
                }
            }
            if next != issue.labels {
                issue.labels = next;
                changed = true;
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_issue() -> Issue {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Issue {
            id: "is-abc123".to_string(),
            title: "Test Issue".to_string(),
            description: None,
            status: Status::Open,
            issue_type: IssueType::Task,
            priority: Some(Priority::MEDIUM),
            assignee: None,
            parent_id: None,
            labels: vec![],
            created_at: at,
            updated_at: at,
            closed_at: None,
            close_reason: None,
            deleted_at: None,
        }
    }

    #[test]
    fn status_tokens_roundtrip() {
        for status in [
            Status::Open,
            Status::InProgress,
            Status::Blocked,
            Status::Deferred,
            Status::Closed,
            Status::Tombstone,
            Status::Pinned,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn status_serializes_to_snake_case() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn dependency_type_serializes_to_kebab_case() {
        let json = serde_json::to_string(&DependencyType::ParentChild).unwrap();
        assert_eq!(json, "\"parent-child\"");
        let json = serde_json::to_string(&DependencyType::DiscoveredFrom).unwrap();
        assert_eq!(json, "\"discovered-from\"");
    }

    #[test]
    fn only_blocks_is_blocking() {
        assert!(DependencyType::Blocks.is_blocking());
        assert!(!DependencyType::Related.is_blocking());
        assert!(!DependencyType::ParentChild.is_blocking());
        assert!(!DependencyType::DiscoveredFrom.is_blocking());
    }

    #[test]
    fn priority_parses_with_and_without_prefix() {
        assert_eq!("P1".parse::<Priority>().unwrap(), Priority::HIGH);
        assert_eq!("3".parse::<Priority>().unwrap(), Priority::LOW);
        assert!("P9".parse::<Priority>().is_err());
    }

    #[test]
    fn issue_serialization_skips_empty_fields() {
        let issue = sample_issue();
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"id\":\"is-abc123\""));
        assert!(json.contains("\"status\":\"open\""));
        assert!(!json.contains("description"));
        assert!(!json.contains("labels"));
        assert!(!json.contains("closed_at"));
    }

    #[test]
    fn update_apply_reports_changes() {
        let mut issue = sample_issue();
        let patch = IssueUpdate {
            title: Some("New title".to_string()),
            assignee: Some(Some("alice".to_string())),
            ..Default::default()
        };
        assert!(patch.apply_to(&mut issue));
        assert_eq!(issue.title, "New title");
        assert_eq!(issue.assignee.as_deref(), Some("alice"));

        // Re-applying the identical patch is a no-op.
        assert!(!patch.apply_to(&mut issue));
    }

    #[test]
    fn update_clears_optional_fields() {
        let mut issue = sample_issue();
        issue.assignee = Some("bob".to_string());
        let patch = IssueUpdate {
            assignee: Some(None),
            priority: Some(None),
            ..Default::default()
        };
        assert!(patch.apply_to(&mut issue));
        assert!(issue.assignee.is_none());
        assert!(issue.priority.is_none());
    }

    #[test]
    fn update_labels_are_deduplicated() {
        let mut issue = sample_issue();
        let patch = IssueUpdate {
            labels: Some(vec![
                "urgent".to_string(),
                "backend".to_string(),
                "urgent".to_string(),
            ]),
            ..Default::default()
        };
        assert!(patch.apply_to(&mut issue));
        assert_eq!(issue.labels, vec!["urgent", "backend"]);
    }

    #[test]
    fn empty_update_is_empty() {
        assert!(IssueUpdate::default().is_empty());
        let patch = IssueUpdate {
            status: Some(Status::Closed),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
