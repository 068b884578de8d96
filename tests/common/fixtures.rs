#![allow(dead_code)]

use rusqlite::Connection;

/// Insert an issue row the way the external CLI writes it.
pub fn insert_issue(conn: &Connection, id: &str, title: &str, status: &str) {
    insert_issue_full(conn, id, title, status, None, "task", None);
}

pub fn insert_issue_full(
    conn: &Connection,
    id: &str,
    title: &str,
    status: &str,
    priority: Option<i32>,
    issue_type: &str,
    assignee: Option<&str>,
) {
    conn.execute(
        "INSERT INTO issues (id, title, description, status, priority, issue_type, assignee,
                             created_at, updated_at, closed_at, deleted_at, close_reason)
         VALUES (?, ?, '', ?, ?, ?, ?, '2025-01-01T00:00:00.000Z', '2025-01-01T00:00:00.000Z',
                 NULL, NULL, '')",
        rusqlite::params![id, title, status, priority, issue_type, assignee],
    )
    .expect("failed to insert issue row");
}

/// Insert a tombstoned issue row (deleted out-of-band by the CLI).
pub fn insert_tombstone(conn: &Connection, id: &str, title: &str) {
    conn.execute(
        "INSERT INTO issues (id, title, description, status, priority, issue_type, assignee,
                             created_at, updated_at, closed_at, deleted_at, close_reason)
         VALUES (?, ?, '', 'tombstone', NULL, 'task', NULL,
                 '2025-01-01T00:00:00.000Z', '2025-01-02T00:00:00.000Z',
                 NULL, '2025-01-02T00:00:00.000Z', '')",
        rusqlite::params![id, title],
    )
    .expect("failed to insert tombstone row");
}

pub fn insert_label(conn: &Connection, issue_id: &str, label: &str) {
    conn.execute(
        "INSERT INTO labels (issue_id, label) VALUES (?, ?)",
        rusqlite::params![issue_id, label],
    )
    .expect("failed to insert label row");
}

pub fn insert_dependency(conn: &Connection, issue_id: &str, depends_on_id: &str, dep_type: &str) {
    conn.execute(
        "INSERT INTO dependencies (issue_id, depends_on_id, type, created_at)
         VALUES (?, ?, ?, '2025-01-01T00:00:00.000Z')",
        rusqlite::params![issue_id, depends_on_id, dep_type],
    )
    .expect("failed to insert dependency row");
}
