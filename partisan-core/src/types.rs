use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
pub enum TaskStatus {
    #[serde(rename = "new")]
    New,
    #[serde(rename = "in_process")]
    InProcess,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "finished")]
    Finished,
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TaskStatus::New),
            "in_process" => Ok(TaskStatus::InProcess),
            "error" => Ok(TaskStatus::Error),
            "finished" => Ok(TaskStatus::Finished),
            _ => Err(()),
        }
    }
}

pub const DEFAULT_QUEUE_NAME: &str = "default";
pub const DEFAULT_PRIORITY: i16 = 10;

/// The chunk of data needed to enqueue a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInit {
    pub processor_class: String,
    pub queue_name: String,
    pub priority: i16,
    pub execute_after: DateTime<Utc>,
    pub arguments: Value,
}

impl TaskInit {
    pub fn new(processor_class: impl Into<String>, arguments: Value) -> Self {
        Self {
            processor_class: processor_class.into(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            priority: DEFAULT_PRIORITY,
            execute_after: Utc::now(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub status: TaskStatus,
    pub queue_name: String,
    pub processor_class: String,
    pub priority: i16,
    pub execute_after: DateTime<Utc>,
    pub arguments: Value,
    pub extra: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// `extra.retries.count`, defaulting to 0 when absent.
    pub fn retries_count(&self) -> i64 {
        self.extra
            .get("retries")
            .and_then(|r| r.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// `extra.postpones.count`, defaulting to 0 when absent.
    pub fn postpones_count(&self) -> i64 {
        self.extra
            .get("postpones")
            .and_then(|p| p.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }
}

/// A self-describing frame put on the supervisor -> worker queue: enough to
/// execute the task without the worker needing its own store connection for
/// the claim itself (it still needs one to apply the outcome).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskDescriptor {
    pub id: Uuid,
    pub processor_class: String,
    pub queue_name: String,
    pub arguments: Value,
}

impl From<&Task> for TaskDescriptor {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id,
            processor_class: t.processor_class.clone(),
            queue_name: t.queue_name.clone(),
            arguments: t.arguments.clone(),
        }
    }
}

/// Per-queue configuration. Validated as a whole when loaded; see `config::load_queue_settings`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueSettings {
    pub min_queue_size: u32,
    pub max_queue_size: u32,
    pub checks_before_cleanup: u32,
    pub workers_count: u32,
    pub sleep_delay_seconds: u64,
    pub tasks_per_worker_instance: Option<u32>,
    pub delete_tasks_on_complete: bool,
    pub default_postpone_delay_seconds: u64,
    pub default_postpones_count: Option<u32>,
}

impl QueueSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_size <= self.min_queue_size {
            return Err(format!(
                "max_queue_size ({}) must be greater than min_queue_size ({})",
                self.max_queue_size, self.min_queue_size
            ));
        }
        if self.checks_before_cleanup == 0 {
            return Err("checks_before_cleanup must be >= 1".to_string());
        }
        if self.workers_count == 0 {
            return Err("workers_count must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            min_queue_size: 0,
            max_queue_size: 10,
            checks_before_cleanup: 10,
            workers_count: num_cpus(),
            sleep_delay_seconds: 1,
            tasks_per_worker_instance: None,
            delete_tasks_on_complete: false,
            default_postpone_delay_seconds: 60,
            default_postpones_count: None,
        }
    }
}

fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}
