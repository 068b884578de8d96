//! Durable application of queued mutations.
//!
//! One function per operation kind, each issuing parameterized statements
//! against the store. Statements commit independently; the flush cycle
//! catches per-item errors and keeps going, so nothing here opens an
//! explicit transaction.

use crate::error::{Result, SpoolError};
use crate::model::{Dependency, EventType, Issue, IssueUpdate, Status};
use crate::queue::{QueueItem, QueueOp};
use crate::util::time;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// Apply a single queued mutation to the store.
///
/// # Errors
///
/// Returns an error if a statement fails or an UPDATE targets an issue the
/// store does not have (cache and store diverged).
pub fn apply_item(conn: &Connection, item: &QueueItem, actor: &str) -> Result<()> {
    match &item.op {
        QueueOp::Create { issue } => apply_create(conn, issue, actor),
        QueueOp::Update { changes } => {
            apply_update(conn, &item.issue_id, changes, item.snapshot.as_ref())
        }
        QueueOp::Close { reason, closed_at } => apply_close(
            conn,
            &item.issue_id,
            reason.as_deref(),
            *closed_at,
            item.snapshot.as_ref(),
            actor,
        ),
        QueueOp::Reopen => apply_reopen(conn, &item.issue_id, item.snapshot.as_ref(), actor),
        QueueOp::Delete { deleted_at } => apply_delete(conn, &item.issue_id, *deleted_at),
        QueueOp::AddLabel { label } => apply_add_label(conn, &item.issue_id, label, actor),
        QueueOp::RemoveLabel { label } => apply_remove_label(conn, &item.issue_id, label, actor),
        QueueOp::AddDependency { dependency } => apply_add_dependency(conn, dependency),
        QueueOp::RemoveDependency { depends_on_id } => {
            apply_remove_dependency(conn, &item.issue_id, depends_on_id)
        }
    }
}

fn apply_create(conn: &Connection, issue: &Issue, actor: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO issues (
            id, title, description, status, priority, issue_type, assignee,
            created_at, updated_at, closed_at, deleted_at, close_reason
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            issue.id,
            issue.title,
            issue.description.as_deref().unwrap_or(""),
            issue.status.as_str(),
            issue.priority.map(|p| p.0),
            issue.issue_type.as_str(),
            issue.assignee,
            time::to_store(issue.created_at),
            time::to_store(issue.updated_at),
            issue.closed_at.map(time::to_store),
            issue.deleted_at.map(time::to_store),
            issue.close_reason.as_deref().unwrap_or(""),
        ],
    )?;

    for label in &issue.labels {
        conn.execute(
            "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?, ?)",
            rusqlite::params![issue.id, label],
        )?;
    }

    if let Some(ref parent_id) = issue.parent_id {
        conn.execute(
            "INSERT OR IGNORE INTO dependencies (issue_id, depends_on_id, type, created_at)
             VALUES (?, ?, 'parent-child', ?)",
            rusqlite::params![issue.id, parent_id, time::to_store(issue.created_at)],
        )?;
    }

    insert_event(
        conn,
        &issue.id,
        EventType::Created,
        None,
        Some(&issue.title),
        actor,
    )?;

    Ok(())
}

fn apply_update(
    conn: &Connection,
    id: &str,
    changes: &IssueUpdate,
    snapshot: Option<&Issue>,
) -> Result<()> {
    let mut set_clauses: Vec<&str> = vec![];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

    if let Some(ref title) = changes.title {
        set_clauses.push("title = ?");
        params.push(Box::new(title.clone()));
    }
    if let Some(ref description) = changes.description {
        set_clauses.push("description = ?");
        params.push(Box::new(description.as_deref().unwrap_or("").to_string()));
    }
    if let Some(status) = changes.status {
        set_clauses.push("status = ?");
        params.push(Box::new(status.as_str().to_string()));
    }
    if let Some(issue_type) = changes.issue_type {
        set_clauses.push("issue_type = ?");
        params.push(Box::new(issue_type.as_str().to_string()));
    }
    if let Some(priority) = changes.priority {
        set_clauses.push("priority = ?");
        params.push(Box::new(priority.map(|p| p.0)));
    }
    if let Some(ref assignee) = changes.assignee {
        set_clauses.push("assignee = ?");
        params.push(Box::new(assignee.clone()));
    }

    if !set_clauses.is_empty() {
        set_clauses.push("updated_at = ?");
        params.push(Box::new(time::to_store(Utc::now())));
        params.push(Box::new(id.to_string()));

        let sql = format!("UPDATE issues SET {} WHERE id = ?", set_clauses.join(", "));
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let rows = conn.execute(&sql, params_refs.as_slice())?;
        if rows == 0 {
            return Err(SpoolError::IssueNotFound { id: id.to_string() });
        }
    }

    // Label changes ride on the update as separate add/remove statements,
    // diffed against the pre-mutation snapshot.
    if let Some(ref labels) = changes.labels {
        let before: &[String] = snapshot.map_or(&[], |s| s.labels.as_slice());
        for label in labels {
            if !before.contains(label) {
                conn.execute(
                    "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?, ?)",
                    rusqlite::params![id, label],
                )?;
            }
        }
        for label in before {
            if !labels.contains(label) {
                conn.execute(
                    "DELETE FROM labels WHERE issue_id = ? AND label = ?",
                    rusqlite::params![id, label],
                )?;
            }
        }
    }

    Ok(())
}

fn apply_close(
    conn: &Connection,
    id: &str,
    reason: Option<&str>,
    closed_at: DateTime<Utc>,
    snapshot: Option<&Issue>,
    actor: &str,
) -> Result<()> {
    let rows = conn.execute(
        "UPDATE issues SET status = 'closed', closed_at = ?, close_reason = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            time::to_store(closed_at),
            reason.unwrap_or(""),
            time::to_store(Utc::now()),
            id
        ],
    )?;
    if rows == 0 {
        return Err(SpoolError::IssueNotFound { id: id.to_string() });
    }

    let old_status = snapshot.map(|s| s.status).unwrap_or_default();
    insert_event(
        conn,
        id,
        EventType::Closed,
        Some(old_status.as_str()),
        Some(Status::Closed.as_str()),
        actor,
    )?;

    Ok(())
}

fn apply_reopen(conn: &Connection, id: &str, snapshot: Option<&Issue>, actor: &str) -> Result<()> {
    let rows = conn.execute(
        "UPDATE issues SET status = 'open', closed_at = NULL, close_reason = '', updated_at = ?
         WHERE id = ?",
        rusqlite::params![time::to_store(Utc::now()), id],
    )?;
    if rows == 0 {
        return Err(SpoolError::IssueNotFound { id: id.to_string() });
    }

    let old_status = snapshot.map_or(Status::Closed, |s| s.status);
    insert_event(
        conn,
        id,
        EventType::Reopened,
        Some(old_status.as_str()),
        Some(Status::Open.as_str()),
        actor,
    )?;

    Ok(())
}

fn apply_delete(conn: &Connection, id: &str, deleted_at: DateTime<Utc>) -> Result<()> {
    let rows = conn.execute(
        "UPDATE issues SET status = 'tombstone', deleted_at = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![
            time::to_store(deleted_at),
            time::to_store(Utc::now()),
            id
        ],
    )?;
    if rows == 0 {
        return Err(SpoolError::IssueNotFound { id: id.to_string() });
    }
    Ok(())
}

fn apply_add_label(conn: &Connection, id: &str, label: &str, actor: &str) -> Result<()> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?, ?)",
        rusqlite::params![id, label],
    )?;

    if rows > 0 {
        conn.execute(
            "UPDATE issues SET updated_at = ? WHERE id = ?",
            rusqlite::params![time::to_store(Utc::now()), id],
        )?;
        insert_event(conn, id, EventType::LabelAdded, None, Some(label), actor)?;
    }

    Ok(())
}

fn apply_remove_label(conn: &Connection, id: &str, label: &str, actor: &str) -> Result<()> {
    let rows = conn.execute(
        "DELETE FROM labels WHERE issue_id = ? AND label = ?",
        rusqlite::params![id, label],
    )?;

    if rows > 0 {
        conn.execute(
            "UPDATE issues SET updated_at = ? WHERE id = ?",
            rusqlite::params![time::to_store(Utc::now()), id],
        )?;
        insert_event(conn, id, EventType::LabelRemoved, Some(label), None, actor)?;
    }

    Ok(())
}

fn apply_add_dependency(conn: &Connection, dependency: &Dependency) -> Result<()> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO dependencies (issue_id, depends_on_id, type, created_at)
         VALUES (?, ?, ?, ?)",
        rusqlite::params![
            dependency.issue_id,
            dependency.depends_on_id,
            dependency.dep_type.as_str(),
            time::to_store(dependency.created_at),
        ],
    )?;

    if rows > 0 {
        conn.execute(
            "UPDATE issues SET updated_at = ? WHERE id = ?",
            rusqlite::params![time::to_store(Utc::now()), dependency.issue_id],
        )?;
    }

    Ok(())
}

fn apply_remove_dependency(conn: &Connection, id: &str, depends_on_id: &str) -> Result<()> {
    let rows = conn.execute(
        "DELETE FROM dependencies WHERE issue_id = ? AND depends_on_id = ?",
        rusqlite::params![id, depends_on_id],
    )?;

    if rows > 0 {
        conn.execute(
            "UPDATE issues SET updated_at = ? WHERE id = ?",
            rusqlite::params![time::to_store(Utc::now()), id],
        )?;
    }

    Ok(())
}

fn insert_event(
    conn: &Connection,
    issue_id: &str,
    event_type: EventType,
    old_value: Option<&str>,
    new_value: Option<&str>,
    actor: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO events (issue_id, event_type, old_value, new_value, actor, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            issue_id,
            event_type.as_str(),
            old_value,
            new_value,
            actor,
            time::to_store(Utc::now()),
        ],
    )?;
    Ok(())
}
