mod common;

use chrono::{Duration, Utc};
use common::new_task;
use partisan_core::{claim_tasks, enqueue_task, reset_orphans, TaskStatus};
use sqlx::PgPool;

#[sqlx::test(migrations = "./migrations")]
async fn claimed_tasks_are_in_process(db: PgPool) {
    let init = new_task("Echo", 10);
    enqueue_task(&db, &init, false).await.unwrap();

    let claimed = claim_tasks(&db, "test", 10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, TaskStatus::InProcess);
}

#[sqlx::test(migrations = "./migrations")]
async fn future_execute_after_is_never_claimed(db: PgPool) {
    let mut init = new_task("Echo", 10);
    init.execute_after = Utc::now() + Duration::minutes(5);
    enqueue_task(&db, &init, false).await.unwrap();

    let claimed = claim_tasks(&db, "test", 10).await.unwrap();
    assert!(claimed.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn higher_priority_is_claimed_first(db: PgPool) {
    enqueue_task(&db, &new_task("Low", 10), false).await.unwrap();
    enqueue_task(&db, &new_task("High", 100), false).await.unwrap();

    let claimed = claim_tasks(&db, "test", 1).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].processor_class, "High");
}

#[sqlx::test(migrations = "./migrations")]
async fn reset_orphans_recovers_in_process_rows(db: PgPool) {
    let init = new_task("Echo", 10);
    let id = enqueue_task(&db, &init, false).await.unwrap();
    claim_tasks(&db, "test", 10).await.unwrap();

    let reset = reset_orphans(&db, "test").await.unwrap();
    assert_eq!(reset, 1);

    let task = partisan_core::find_task(&db, id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::New);

    // Idempotent: a second call with nothing left IN_PROCESS is a no-op.
    let reset_again = reset_orphans(&db, "test").await.unwrap();
    assert_eq!(reset_again, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn unique_for_params_dedupes_while_new(db: PgPool) {
    let init = new_task("Echo", 10);
    let first = enqueue_task(&db, &init, true).await.unwrap();
    let second = enqueue_task(&db, &init, true).await.unwrap();
    assert_eq!(first, second);

    let claimed = claim_tasks(&db, "test", 10).await.unwrap();
    assert_eq!(claimed.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn unique_for_params_does_not_dedupe_in_process_tasks(db: PgPool) {
    let init = new_task("Echo", 10);
    let first = enqueue_task(&db, &init, true).await.unwrap();
    claim_tasks(&db, "test", 10).await.unwrap();

    // The first task is now IN_PROCESS, so a second delay() call with the same
    // arguments enqueues a fresh row rather than returning the claimed one.
    let second = enqueue_task(&db, &init, true).await.unwrap();
    assert_ne!(first, second);
}

#[sqlx::test(migrations = "./migrations")]
async fn complete_with_delete_on_complete_removes_the_row(db: PgPool) {
    let init = new_task("Echo", 10);
    let id = enqueue_task(&db, &init, false).await.unwrap();
    claim_tasks(&db, "test", 10).await.unwrap();

    partisan_core::complete_task(&db, id, true).await.unwrap();
    assert!(partisan_core::find_task(&db, id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn complete_without_delete_marks_finished(db: PgPool) {
    let init = new_task("Echo", 10);
    let id = enqueue_task(&db, &init, false).await.unwrap();
    claim_tasks(&db, "test", 10).await.unwrap();

    partisan_core::complete_task(&db, id, false).await.unwrap();
    let task = partisan_core::find_task(&db, id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Finished);
}

#[sqlx::test(migrations = "./migrations")]
async fn fail_task_records_message(db: PgPool) {
    let init = new_task("Echo", 10);
    let id = enqueue_task(&db, &init, false).await.unwrap();
    claim_tasks(&db, "test", 10).await.unwrap();

    partisan_core::fail_task(&db, id, "boom").await.unwrap();
    let task = partisan_core::find_task(&db, id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(task.extra.get("message").and_then(|v| v.as_str()), Some("boom"));
}

/// Concurrent claims against the same queue never return overlapping ID sets,
/// even with more claimants than rows available.
#[sqlx::test(migrations = "./migrations")]
async fn concurrent_claims_are_disjoint(db: PgPool) {
    for i in 0..20 {
        enqueue_task(&db, &new_task(&format!("Echo{i}"), 10), false)
            .await
            .unwrap();
    }

    let (a, b) = tokio::join!(
        claim_tasks(&db, "test", 10),
        claim_tasks(&db, "test", 10),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.len() + b.len(), 20);
    let a_ids: std::collections::HashSet<_> = a.iter().map(|t| t.id).collect();
    let b_ids: std::collections::HashSet<_> = b.iter().map(|t| t.id).collect();
    assert!(a_ids.is_disjoint(&b_ids));
}
