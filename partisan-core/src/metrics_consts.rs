pub const TASKS_CLAIMED: &str = "partisan_tasks_claimed";
pub const TASKS_ENQUEUED: &str = "partisan_tasks_enqueued";
pub const TASKS_DEDUPED: &str = "partisan_tasks_deduped";
pub const TASKS_COMPLETED: &str = "partisan_tasks_completed";
pub const TASKS_FAILED: &str = "partisan_tasks_failed";
pub const TASKS_RETRIED: &str = "partisan_tasks_retried";
pub const TASKS_POSTPONED: &str = "partisan_tasks_postponed";
pub const ORPHANS_RESET: &str = "partisan_orphans_reset";
