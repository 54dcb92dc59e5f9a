// We do this pattern (privately use a module, then re-export parts of it) so we can refactor/rename or generally futz around with the internals without breaking the public API

// Types
mod types;
pub use types::{
    QueueSettings, Task, TaskDescriptor, TaskInit, TaskStatus, DEFAULT_PRIORITY,
    DEFAULT_QUEUE_NAME,
};

// Errors
mod error;
pub use error::{QueueError, RegistryError, TaskExecError};

// Config
mod config;
pub use config::{lookup_queue_settings, parse_queue_settings, PoolConfig};

// Registry
mod registry;
pub use registry::Registry;

// Processor contract and policy configs
mod processor;
pub use processor::{
    retry_on, ErrorsHandleConfig, PostponeConfig, Processor, RetryPauseStrategy, RetryPredicate,
    RunOutcome,
};

// Store adapter
mod store;
pub use store::{
    claim_tasks, complete_task, delay, enqueue_task, fail_task, find_task, requeue_task,
    reset_orphans, CounterKey,
};

// Execution engine (registry lookup + retry/postpone policy)
mod engine;
pub use engine::{execute, ExecResult};

mod metrics_consts;
