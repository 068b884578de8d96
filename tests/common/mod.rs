#![allow(dead_code)]

use rusqlite::Connection;
use spool::SpoolConfig;
use std::path::Path;
use tempfile::TempDir;

pub mod fixtures;

/// The store schema as the external sync CLI creates it. The crate under
/// test never creates this; tests stand in for `tracker init`.
pub const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS issues (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        priority INTEGER,
        issue_type TEXT NOT NULL,
        assignee TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        deleted_at TEXT,
        close_reason TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS labels (
        issue_id TEXT NOT NULL,
        label TEXT NOT NULL,
        PRIMARY KEY (issue_id, label)
    );

    CREATE TABLE IF NOT EXISTS dependencies (
        issue_id TEXT NOT NULL,
        depends_on_id TEXT NOT NULL,
        type TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (issue_id, depends_on_id)
    );

    CREATE TABLE IF NOT EXISTS events (
        issue_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        old_value TEXT,
        new_value TEXT,
        actor TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
";

pub fn init_test_logging() {
    spool::logging::init_test_logging();
}

/// A temporary project root with an initialized store.
pub fn project_with_store() -> TempDir {
    init_test_logging();
    let dir = TempDir::new().expect("failed to create temp dir");
    init_store(dir.path());
    dir
}

/// A temporary project root with no store at all (uninitialized project).
pub fn project_without_store() -> TempDir {
    init_test_logging();
    TempDir::new().expect("failed to create temp dir")
}

/// Create the store file and schema, as the external CLI's init would.
pub fn init_store(project: &Path) {
    let store_dir = project.join(".issues");
    std::fs::create_dir_all(&store_dir).expect("failed to create store dir");
    let conn = Connection::open(store_dir.join("issues.db")).expect("failed to create store");
    conn.execute_batch(SCHEMA_SQL).expect("failed to apply schema");
}

/// Open a raw connection for direct assertions against the store.
pub fn open_raw(project: &Path) -> Connection {
    Connection::open(project.join(".issues").join("issues.db")).expect("failed to open store")
}

/// Config tuned for tests that drive flush cycles themselves: no external
/// sync, and a debounce long enough that the background timer never races
/// the test.
pub fn test_config() -> SpoolConfig {
    SpoolConfig {
        debounce_ms: 60_000,
        sync_before_flush: false,
        sync_after_flush: false,
        ..Default::default()
    }
}

/// Count rows matching a query with a single string parameter.
pub fn count_rows(conn: &Connection, sql: &str, param: &str) -> i64 {
    conn.query_row(sql, [param], |row| row.get(0))
        .expect("count query failed")
}
