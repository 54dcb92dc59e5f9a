use chrono::Utc;
use sqlx::PgPool;

use common_metrics::inc;

use crate::error::{QueueError, TaskExecError};
use crate::metrics_consts::{TASKS_POSTPONED, TASKS_RETRIED};
use crate::processor::{PostponeConfig, RunOutcome};
use crate::registry::Registry;
use crate::store::{self, CounterKey};
use crate::types::{QueueSettings, Task};

/// What happened to a task after `execute` ran it. The caller (the worker
/// process loop) logs accordingly; the store has already been updated.
#[derive(Debug)]
pub enum ExecResult {
    Completed,
    Retried,
    Postponed,
    Failed(TaskExecError),
}

/// Run `task` against its processor, looked up from `registry`, and apply
/// retry/postpone policy to the outcome. Mirrors the source's `Task.run()`:
/// the registry lookup and policy application live here, not in the worker
/// loop, which only ever drives this function and reports its result.
pub async fn execute(
    pool: &PgPool,
    registry: &Registry,
    queue_settings: &QueueSettings,
    task: &Task,
) -> Result<ExecResult, QueueError> {
    let processor = match registry.lookup(&task.processor_class) {
        Ok(p) => p,
        Err(_) => {
            let msg = format!("processor class {} is not registered", task.processor_class);
            store::fail_task(pool, task.id, &msg).await?;
            return Ok(ExecResult::Failed(TaskExecError::ProcessorNotRegistered(
                task.processor_class.clone(),
            )));
        }
    };

    match processor.run(task.arguments.clone()).await {
        Ok(RunOutcome::Success(_)) => {
            store::complete_task(pool, task.id, queue_settings.delete_tasks_on_complete).await?;
            Ok(ExecResult::Completed)
        }
        Ok(RunOutcome::Postpone { delay_seconds }) => {
            handle_postpone(pool, queue_settings, task, &processor, delay_seconds).await
        }
        Err(report) => handle_error(pool, task, &processor, report).await,
    }
}

async fn handle_postpone(
    pool: &PgPool,
    queue_settings: &QueueSettings,
    task: &Task,
    processor: &std::sync::Arc<dyn crate::processor::Processor>,
    delay_seconds: Option<i64>,
) -> Result<ExecResult, QueueError> {
    let new_count = task.postpones_count() + 1;

    let processor_cap = processor.postpone_config().and_then(|c| c.max_postpones);
    let queue_cap = queue_settings.default_postpones_count;
    let effective_cap = match (processor_cap, queue_cap) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };

    if let Some(cap) = effective_cap {
        if new_count as u32 > cap {
            let msg = format!("maximum postpones ({cap}) reached");
            store::fail_task(pool, task.id, &msg).await?;
            return Ok(ExecResult::Failed(TaskExecError::MaxPostponesReached(cap)));
        }
    }

    let delay = delay_seconds.unwrap_or_else(|| {
        i64::try_from(queue_settings.default_postpone_delay_seconds).unwrap_or(i64::MAX)
    });
    let execute_after = PostponeConfig::next_execute_after(Utc::now(), delay);

    store::requeue_task(
        pool,
        task.id,
        execute_after,
        CounterKey::Postpones,
        new_count,
    )
    .await?;
    inc(TASKS_POSTPONED, &[("processor_class".to_string(), task.processor_class.clone())], 1);
    Ok(ExecResult::Postponed)
}

async fn handle_error(
    pool: &PgPool,
    task: &Task,
    processor: &std::sync::Arc<dyn crate::processor::Processor>,
    report: eyre::Report,
) -> Result<ExecResult, QueueError> {
    let Some(retry_config) = processor.retry_config() else {
        store::fail_task(pool, task.id, &report.to_string()).await?;
        return Ok(ExecResult::Failed(TaskExecError::ExhaustedRetry(
            task.retries_count(),
        )));
    };

    if !retry_config.matches(&report) {
        store::fail_task(pool, task.id, &report.to_string()).await?;
        return Ok(ExecResult::Failed(TaskExecError::ExhaustedRetry(
            task.retries_count(),
        )));
    }

    let try_num = task.retries_count() + 1;
    match retry_config.next_execute_after(Utc::now(), try_num) {
        Some(execute_after) => {
            store::requeue_task(pool, task.id, execute_after, CounterKey::Retries, try_num).await?;
            inc(TASKS_RETRIED, &[("processor_class".to_string(), task.processor_class.clone())], 1);
            Ok(ExecResult::Retried)
        }
        None => {
            store::fail_task(pool, task.id, &report.to_string()).await?;
            Ok(ExecResult::Failed(TaskExecError::ExhaustedRetry(try_num)))
        }
    }
}
