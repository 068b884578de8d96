//! Store access for `spool`.
//!
//! The on-disk store is a SQLite file owned by the external sync CLI; this
//! crate opens it, reads it, and applies queued mutations to it, but never
//! creates or migrates its schema. Table shapes are fixed:
//! `issues`, `labels`, `dependencies`, `events`.

pub mod apply;

use crate::error::{Result, SpoolError};
use crate::model::{Dependency, DependencyType, Issue, IssueType, Priority, Status};
use crate::util::time;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Directory under the project root holding the store and its metadata.
pub const STORE_DIR: &str = ".issues";

/// Default database filename used when metadata is missing.
const DEFAULT_DB_FILENAME: &str = "issues.db";

/// Startup metadata describing the database filename.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreMetadata {
    pub database: String,
}

impl Default for StoreMetadata {
    fn default() -> Self {
        Self {
            database: DEFAULT_DB_FILENAME.to_string(),
        }
    }
}

impl StoreMetadata {
    /// Load `metadata.json` from the store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(store_dir: &Path) -> Result<Self> {
        let path = store_dir.join("metadata.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)?;
        let mut metadata: Self = serde_json::from_str(&contents)?;
        if metadata.database.trim().is_empty() {
            metadata.database = DEFAULT_DB_FILENAME.to_string();
        }
        Ok(metadata)
    }
}

/// Resolve the store file path for a project root.
///
/// Metadata read errors fall back to the default filename; a broken
/// metadata.json should not make a project permanently unflushable.
#[must_use]
pub fn store_path(project: &Path) -> PathBuf {
    let dir = project.join(STORE_DIR);
    let metadata = StoreMetadata::load(&dir).unwrap_or_default();
    dir.join(metadata.database)
}

/// Whether the project has a store file at all.
#[must_use]
pub fn store_exists(project: &Path) -> bool {
    store_path(project).is_file()
}

/// Open an existing store with a busy-wait timeout.
///
/// Opens read-write without CREATE: an absent store is the uninitialized
/// project no-op path, never an empty database conjured by us.
///
/// # Errors
///
/// Returns [`SpoolError::StoreNotFound`] if the file does not exist, or a
/// database error if the connection cannot be established.
pub fn open_store(path: &Path, busy_timeout_ms: u64) -> Result<Connection> {
    if !path.is_file() {
        return Err(SpoolError::StoreNotFound {
            path: path.to_path_buf(),
        });
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    Ok(conn)
}

/// Everything `refresh` needs: live issues (labels attached, parent derived)
/// and the outgoing-dependency map.
#[derive(Debug, Default)]
pub struct ProjectSnapshot {
    pub issues: Vec<Issue>,
    pub dependencies: HashMap<String, Vec<Dependency>>,
}

/// Read the full project state from the store.
///
/// Issues exclude tombstoned/deleted rows; labels are joined in; dependencies
/// are loaded for all issues and `parent_id` is derived from parent-child
/// rows.
///
/// # Errors
///
/// Returns an error if any query fails.
pub fn load_project(conn: &Connection) -> Result<ProjectSnapshot> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, status, priority, issue_type, assignee,
                created_at, updated_at, closed_at, deleted_at, close_reason
         FROM issues
         WHERE status != 'tombstone' AND deleted_at IS NULL",
    )?;
    let mut issues = stmt
        .query_map([], issue_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    drop(stmt);

    let mut labels: HashMap<String, Vec<String>> = HashMap::new();
    let mut stmt = conn.prepare("SELECT issue_id, label FROM labels ORDER BY label")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (issue_id, label) = row?;
        labels.entry(issue_id).or_default().push(label);
    }
    drop(stmt);

    let mut dependencies: HashMap<String, Vec<Dependency>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT issue_id, depends_on_id, type, created_at FROM dependencies",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    for row in rows {
        let (issue_id, depends_on_id, type_str, created_at) = row?;
        // Unknown dependency types written by newer CLI versions are skipped.
        let Ok(dep_type) = DependencyType::from_str(&type_str) else {
            tracing::debug!(issue_id = %issue_id, dep_type = %type_str, "skipping unknown dependency type");
            continue;
        };
        dependencies.entry(issue_id.clone()).or_default().push(Dependency {
            issue_id,
            depends_on_id,
            dep_type,
            created_at: time::from_store(&created_at),
        });
    }
    drop(stmt);

    for issue in &mut issues {
        if let Some(issue_labels) = labels.remove(&issue.id) {
            issue.labels = issue_labels;
        }
        issue.parent_id = dependencies.get(&issue.id).and_then(|deps| {
            deps.iter()
                .find(|d| d.dep_type == DependencyType::ParentChild)
                .map(|d| d.depends_on_id.clone())
        });
    }

    Ok(ProjectSnapshot {
        issues,
        dependencies,
    })
}

fn issue_from_row(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        title: row.get(1)?,
        description: empty_to_none(row.get::<_, Option<String>>(2)?),
        status: parse_status(row.get::<_, Option<String>>(3)?.as_deref()),
        priority: row.get::<_, Option<i32>>(4)?.map(Priority),
        issue_type: parse_issue_type(row.get::<_, Option<String>>(5)?.as_deref()),
        assignee: empty_to_none(row.get::<_, Option<String>>(6)?),
        parent_id: None, // Derived from dependencies after load
        labels: vec![],  // Joined in after load
        created_at: time::from_store(&row.get::<_, String>(7)?),
        updated_at: time::from_store(&row.get::<_, String>(8)?),
        closed_at: row
            .get::<_, Option<String>>(9)?
            .as_deref()
            .map(time::from_store),
        deleted_at: row
            .get::<_, Option<String>>(10)?
            .as_deref()
            .map(time::from_store),
        close_reason: empty_to_none(row.get::<_, Option<String>>(11)?),
    })
}

fn parse_status(s: Option<&str>) -> Status {
    s.and_then(|v| Status::from_str(v).ok()).unwrap_or_default()
}

fn parse_issue_type(s: Option<&str>) -> IssueType {
    s.and_then(|v| IssueType::from_str(v).ok())
        .unwrap_or_default()
}

fn empty_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_path_defaults_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(dir.path());
        assert_eq!(path, dir.path().join(".issues").join("issues.db"));
    }

    #[test]
    fn store_path_honors_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join(STORE_DIR);
        fs::create_dir_all(&store_dir).unwrap();
        fs::write(
            store_dir.join("metadata.json"),
            r#"{"database": "tracker.db"}"#,
        )
        .unwrap();
        assert_eq!(store_path(dir.path()), store_dir.join("tracker.db"));
    }

    #[test]
    fn open_store_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_store(&dir.path().join("nope.db"), 100).unwrap_err();
        assert!(matches!(err, SpoolError::StoreNotFound { .. }));
    }

    #[test]
    fn empty_to_none_filters_empty_strings() {
        assert_eq!(empty_to_none(Some(String::new())), None);
        assert_eq!(empty_to_none(Some("x".to_string())), Some("x".to_string()));
        assert_eq!(empty_to_none(None), None);
    }
}
