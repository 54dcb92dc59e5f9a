use thiserror::Error;
use uuid::Uuid;

/// Errors from the store itself - transient DB issues, serialization problems,
/// and violations of the claim protocol's invariants. These never mark a task
/// ERROR on their own; the supervisor retries on the next loop iteration.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("could not serialize task payload: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("task {0} not found")]
    UnknownTaskId(Uuid),
}

/// Errors from the Registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("processor class {0} cannot be found. Is it registered?")]
    NotFound(String),
    #[error("processor class {0} already registered")]
    AlreadyRegistered(String),
}

/// Outcome of `engine::execute` that leaves a task in a terminal, non-recoverable
/// state. `StoreError` and unexpected errors from the engine itself propagate as
/// `QueueError`/`eyre::Report` instead - this enum only covers the task-policy
/// taxonomy from the error handling design.
#[derive(Error, Debug)]
pub enum TaskExecError {
    #[error("processor class {0} cannot be found. Is it registered?")]
    ProcessorNotRegistered(String),
    #[error("maximum postpones ({0}) reached")]
    MaxPostponesReached(u32),
    #[error("retry count exhausted after {0} tries")]
    ExhaustedRetry(i64),
}
