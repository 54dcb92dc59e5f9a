use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use common_metrics::inc;
use tracing::debug;

use crate::error::QueueError;
use crate::metrics_consts::{
    ORPHANS_RESET, TASKS_CLAIMED, TASKS_COMPLETED, TASKS_DEDUPED, TASKS_ENQUEUED, TASKS_FAILED,
};
use crate::types::{Task, TaskInit};

/// Enqueue a task. If `unique_for_params` is set, performs a locked lookup for
/// an existing NEW task with the same processor_class + arguments first, and
/// returns its id unchanged instead of inserting a duplicate.
pub async fn enqueue_task(
    pool: &PgPool,
    init: &TaskInit,
    unique_for_params: bool,
) -> Result<Uuid, QueueError> {
    let mut tx = pool.begin().await?;

    if unique_for_params {
        let existing = sqlx::query_scalar!(
            r#"
SELECT id FROM partisan_tasks
WHERE processor_class = $1
  AND queue_name = $2
  AND arguments = $3
  AND status = 'new'::task_status
FOR UPDATE
LIMIT 1
"#,
            init.processor_class,
            init.queue_name,
            init.arguments,
        )
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(id) = existing {
            tx.commit().await?;
            inc(TASKS_DEDUPED, &[], 1);
            return Ok(id);
        }
    }

    let id = Uuid::now_v7();
    sqlx::query!(
        r#"
INSERT INTO partisan_tasks
    (id, status, queue_name, processor_class, priority, execute_after, arguments, extra)
VALUES
    ($1, 'new'::task_status, $2, $3, $4, $5, $6, '{}'::jsonb)
"#,
        id,
        init.queue_name,
        init.processor_class,
        init.priority,
        init.execute_after,
        init.arguments,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    inc(TASKS_ENQUEUED, &[("queue_name".to_string(), init.queue_name.clone())], 1);
    Ok(id)
}

/// The producer-facing enqueue operation: build a `TaskInit` out of
/// `processor`'s own policy attributes (queue, priority, uniqueness), apply
/// the caller's optional overrides, and enqueue it. There is no way to pass
/// an existing task id in, matching the source's restriction that `delay()`
/// is for fresh enqueues only - retries/postpones go through
/// `requeue_task` instead, driven by `engine::execute`.
pub async fn delay(
    pool: &PgPool,
    processor_class: &str,
    processor: &dyn crate::processor::Processor,
    arguments: serde_json::Value,
    priority: Option<i16>,
    execute_after: Option<DateTime<Utc>>,
) -> Result<Uuid, QueueError> {
    let init = TaskInit {
        processor_class: processor_class.to_string(),
        queue_name: processor.queue_name().to_string(),
        priority: priority.unwrap_or_else(|| processor.priority()),
        execute_after: execute_after.unwrap_or_else(Utc::now),
        arguments,
    };
    enqueue_task(pool, &init, processor.unique_for_params()).await
}

/// Atomically claim up to `max` NEW, due tasks from `queue_name`, transitioning
/// them to IN_PROCESS and returning the updated rows. Ordered by priority
/// descending, so higher-priority tasks are claimed first within the batch.
pub async fn claim_tasks(
    pool: &PgPool,
    queue_name: &str,
    max: u32,
) -> Result<Vec<Task>, QueueError> {
    let claimed: Vec<Task> = sqlx::query_as(
        r#"
WITH available AS (
    SELECT id FROM partisan_tasks
    WHERE status = 'new'::task_status
      AND queue_name = $1
      AND execute_after <= NOW()
    ORDER BY priority DESC
    LIMIT $2
    FOR UPDATE SKIP LOCKED
)
UPDATE partisan_tasks
SET status = 'in_process'::task_status, updated_at = NOW()
FROM available
WHERE partisan_tasks.id = available.id
RETURNING
    partisan_tasks.id,
    partisan_tasks.status,
    partisan_tasks.queue_name,
    partisan_tasks.processor_class,
    partisan_tasks.priority,
    partisan_tasks.execute_after,
    partisan_tasks.arguments,
    partisan_tasks.extra,
    partisan_tasks.created_at,
    partisan_tasks.updated_at
"#,
    )
    .bind(queue_name)
    .bind(max as i64)
    .fetch_all(pool)
    .await?;

    debug!(queue_name, claimed = claimed.len(), "claimed tasks");
    inc(TASKS_CLAIMED, &[("queue_name".to_string(), queue_name.to_string())], claimed.len() as u64);
    Ok(claimed)
}

/// Move every IN_PROCESS row for `queue_name` back to NEW. Called once at
/// supervisor startup to recover tasks orphaned by a crashed prior run.
/// Idempotent: a second call with nothing left IN_PROCESS is a no-op.
pub async fn reset_orphans(pool: &PgPool, queue_name: &str) -> Result<u64, QueueError> {
    let result = sqlx::query!(
        r#"
UPDATE partisan_tasks
SET status = 'new'::task_status, updated_at = NOW()
WHERE queue_name = $1 AND status = 'in_process'::task_status
"#,
        queue_name,
    )
    .execute(pool)
    .await?;

    let n = result.rows_affected();
    if n > 0 {
        debug!(queue_name, reset = n, "reset orphaned tasks to new");
        inc(ORPHANS_RESET, &[("queue_name".to_string(), queue_name.to_string())], n);
    }
    Ok(n)
}

/// Mark a task finished, or delete it outright when `delete_on_complete` is set.
pub async fn complete_task(
    pool: &PgPool,
    task_id: Uuid,
    delete_on_complete: bool,
) -> Result<(), QueueError> {
    if delete_on_complete {
        sqlx::query!("DELETE FROM partisan_tasks WHERE id = $1", task_id)
            .execute(pool)
            .await?;
    } else {
        sqlx::query!(
            r#"UPDATE partisan_tasks SET status = 'finished'::task_status, updated_at = NOW() WHERE id = $1"#,
            task_id,
        )
        .execute(pool)
        .await?;
    }
    inc(TASKS_COMPLETED, &[], 1);
    Ok(())
}

/// Terminally fail a task: status=ERROR, with a short message recorded under
/// `extra.message`.
pub async fn fail_task(pool: &PgPool, task_id: Uuid, message: &str) -> Result<(), QueueError> {
    sqlx::query!(
        r#"
UPDATE partisan_tasks
SET status = 'error'::task_status,
    extra = jsonb_set(extra, '{message}', to_jsonb($2::text)),
    updated_at = NOW()
WHERE id = $1
"#,
        task_id,
        message,
    )
    .execute(pool)
    .await?;
    inc(TASKS_FAILED, &[], 1);
    Ok(())
}

/// Re-queue a task for a retry or postpone: status back to NEW, a future
/// execute_after, and the appropriate nested counter under `extra` bumped.
pub async fn requeue_task(
    pool: &PgPool,
    task_id: Uuid,
    execute_after: DateTime<Utc>,
    counter_key: CounterKey,
    new_count: i64,
) -> Result<(), QueueError> {
    let path: &[&str] = match counter_key {
        CounterKey::Retries => &["retries", "count"],
        CounterKey::Postpones => &["postpones", "count"],
    };

    sqlx::query(
        r#"
UPDATE partisan_tasks
SET status = 'new'::task_status,
    execute_after = $2,
    extra = jsonb_set(extra, $3::text[], to_jsonb($4::bigint), true),
    updated_at = NOW()
WHERE id = $1
"#,
    )
    .bind(task_id)
    .bind(execute_after)
    .bind(path)
    .bind(new_count)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub enum CounterKey {
    Retries,
    Postpones,
}

pub async fn find_task(pool: &PgPool, task_id: Uuid) -> Result<Option<Task>, QueueError> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM partisan_tasks WHERE id = $1")
        .bind(task_id)
        .fetch_optional(pool)
        .await?;
    Ok(task)
}
