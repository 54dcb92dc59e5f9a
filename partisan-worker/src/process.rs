use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::io::AsyncRead;
use tracing::{info, warn};

use partisan_core::{execute, ExecResult, QueueSettings, Registry};

use crate::ipc::{read_message, IpcError, Message};

/// Blocking dequeue timeout, matching the source's 5-second poll.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct WorkerConfig {
    pub queue_name: String,
    pub queue_settings: QueueSettings,
    /// Optional cap after which the worker voluntarily exits, to bound memory
    /// growth across its process lifetime. `None` means unbounded.
    pub tasks_before_death: Option<u32>,
}

/// Drive the worker's main loop: read task descriptors from `stdin` (a
/// supervisor-fed pipe), re-fetch the authoritative row, run it through the
/// execution engine, and apply its outcome. Returns once the worker should
/// exit - on the `Stop` sentinel, a closed pipe, hitting `tasks_before_death`,
/// or detecting that its parent has died.
pub async fn run<R: AsyncRead + Unpin>(
    pool: PgPool,
    registry: Arc<Registry>,
    config: WorkerConfig,
    mut stdin: R,
) -> eyre::Result<()> {
    let mut tasks_processed: u32 = 0;

    loop {
        if let Some(cap) = config.tasks_before_death {
            if tasks_processed >= cap {
                info!(tasks_processed, "worker reached its task cap, exiting");
                return Ok(());
            }
        }

        match tokio::time::timeout(DEQUEUE_TIMEOUT, read_message(&mut stdin)).await {
            Ok(Ok(Some(Message::Stop))) => {
                info!("worker stopped");
                return Ok(());
            }
            Ok(Ok(Some(Message::Task(descriptor)))) => {
                let Some(task) = partisan_core::find_task(&pool, descriptor.id).await? else {
                    warn!(task_id = %descriptor.id, "claimed task vanished before execution");
                    continue;
                };

                match execute(&pool, &registry, &config.queue_settings, &task).await {
                    Ok(ExecResult::Completed) => tasks_processed += 1,
                    Ok(ExecResult::Retried) | Ok(ExecResult::Postponed) => {}
                    Ok(ExecResult::Failed(err)) => {
                        // Any other exception: the task is already failed in the
                        // store; propagate so the outer handler exits the worker
                        // (the supervisor restarts it).
                        warn!(
                            task_id = %task.id,
                            processor_class = %task.processor_class,
                            error = %err,
                            "task failed terminally, exiting worker"
                        );
                        return Err(err.into());
                    }
                    Err(err) => {
                        warn!(task_id = %task.id, error = %err, "unexpected error running task");
                        return Err(err.into());
                    }
                }
            }
            Ok(Ok(None)) => {
                info!("supervisor pipe closed, exiting");
                return Ok(());
            }
            Ok(Err(IpcError::Io(e))) => return Err(e.into()),
            Ok(Err(e)) => return Err(e.into()),
            Err(_elapsed) => {
                if is_orphaned() {
                    info!("parent process is gone, exiting");
                    return Ok(());
                }
            }
        }
    }
}

/// Detect parent death the way the source does via `os.getppid() == 1`: on
/// Linux, a re-parented-to-init process has ppid 1. Parsed out of
/// `/proc/self/stat`'s fourth whitespace-separated field (after the
/// parenthesized, possibly-space-containing comm name).
#[cfg(target_os = "linux")]
fn is_orphaned() -> bool {
    let Ok(stat) = std::fs::read_to_string("/proc/self/stat") else {
        return false;
    };
    parent_pid_from_stat(&stat) == Some(1)
}

#[cfg(not(target_os = "linux"))]
fn is_orphaned() -> bool {
    false
}

#[cfg(target_os = "linux")]
fn parent_pid_from_stat(stat: &str) -> Option<i32> {
    let after_comm = stat.rfind(')')?;
    stat[after_comm + 1..].split_whitespace().nth(1)?.parse().ok()
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn parses_ppid_out_of_proc_stat_with_spaces_in_comm() {
        let stat = "1234 (my proc name) S 1 1234 1234 0 -1 4194304";
        assert_eq!(parent_pid_from_stat(stat), Some(1));
    }
}
