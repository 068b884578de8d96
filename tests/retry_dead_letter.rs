//! Retry and dead-letter behavior when the cache and store diverge.

mod common;

use spool::{ItemStatus, NewIssue, Spool, SpoolConfig};

fn test_spool() -> Spool {
    Spool::new(SpoolConfig {
        max_retry_attempts: 3,
        ..common::test_config()
    })
}

#[test]
fn failing_item_is_retried_then_dead_lettered() {
    let dir = common::project_with_store();
    let spool = test_spool();

    let issue = spool
        .create(
            dir.path(),
            NewIssue {
                title: "Divergent".to_string(),
                ..Default::default()
            },
        )
        .expect("create");
    assert!(spool.flush_now(dir.path()));

    // The row vanishes out-of-band; the cache still has the issue.
    let conn = common::open_raw(dir.path());
    conn.execute("DELETE FROM issues WHERE id = ?", [&issue.id])
        .unwrap();

    assert!(spool.close(dir.path(), &issue.id, None));
    assert_eq!(spool.pending_count(dir.path()), 1);

    // Attempt 1 and 2: the item stays queued for the next cycle.
    assert!(!spool.flush_now(dir.path()));
    assert_eq!(spool.pending_count(dir.path()), 1);
    assert!(spool.dead_letters(dir.path(), 10).is_empty());

    assert!(!spool.flush_now(dir.path()));
    assert_eq!(spool.pending_count(dir.path()), 1);

    // Attempt 3 exhausts the budget.
    assert!(!spool.flush_now(dir.path()));
    assert_eq!(spool.pending_count(dir.path()), 0);

    let dead = spool.dead_letters(dir.path(), 10);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].issue_id, issue.id);
    assert_eq!(dead[0].status, ItemStatus::Failed);
    assert_eq!(dead[0].attempts, 3);
    let error = dead[0].error.as_deref().expect("error recorded");
    assert!(error.contains(&issue.id), "error should name the issue: {error}");

    // Failed items never land in completed history.
    assert!(
        spool
            .history(dir.path(), 100)
            .iter()
            .all(|i| i.status == ItemStatus::Completed)
    );

    spool.shutdown();
}

#[test]
fn failing_item_does_not_block_siblings() {
    let dir = common::project_with_store();
    let spool = test_spool();

    let doomed = spool
        .create(
            dir.path(),
            NewIssue {
                title: "Doomed".to_string(),
                ..Default::default()
            },
        )
        .expect("create");
    assert!(spool.flush_now(dir.path()));

    let conn = common::open_raw(dir.path());
    conn.execute("DELETE FROM issues WHERE id = ?", [&doomed.id])
        .unwrap();

    // One failing close plus one healthy create in the same batch.
    assert!(spool.close(dir.path(), &doomed.id, None));
    let healthy = spool
        .create(
            dir.path(),
            NewIssue {
                title: "Healthy".to_string(),
                ..Default::default()
            },
        )
        .expect("create");

    assert!(!spool.flush_now(dir.path()));

    // The healthy sibling applied despite the failure ahead of it in order.
    assert_eq!(
        common::count_rows(
            &conn,
            "SELECT count(*) FROM issues WHERE id = ?",
            &healthy.id
        ),
        1
    );
    // The failing item alone is still pending.
    let pending = spool.pending_count(dir.path());
    assert_eq!(pending, 1);

    spool.shutdown();
}

#[test]
fn corrupt_store_errors_every_item_and_retains_them() {
    let dir = common::project_without_store();
    let store_dir = dir.path().join(".issues");
    std::fs::create_dir_all(&store_dir).unwrap();
    std::fs::write(store_dir.join("issues.db"), b"this is not a database").unwrap();

    let spool = test_spool();
    let _issue = spool
        .create(
            dir.path(),
            NewIssue {
                title: "Unlucky".to_string(),
                ..Default::default()
            },
        )
        .expect("create");

    assert!(!spool.flush_now(dir.path()));
    // Errored, not silently retired: the item is retained for retry.
    assert_eq!(spool.pending_count(dir.path()), 1);
    assert!(spool.history(dir.path(), 10).is_empty());

    spool.shutdown();
}
