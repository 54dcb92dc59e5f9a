use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::types::{DEFAULT_PRIORITY, DEFAULT_QUEUE_NAME};

/// What a processor's `run` produced, short of an unexpected error: either it
/// finished, or it's asking to be retried later. Raised control flow (Python's
/// `PostponeTask` exception) is replaced with this tagged return variant;
/// anything else still propagates as the native `eyre::Report` error channel.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Success(Value),
    Postpone { delay_seconds: Option<i64> },
}

/// The abstraction every user task implements: bound arguments plus a `run`
/// operation, and the policy attributes that govern retry/postpone/priority/
/// uniqueness. Implementors are an external collaborator - out of scope for
/// this crate beyond this contract.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Run the task body against its (already-deserialized) arguments.
    async fn run(&self, arguments: Value) -> eyre::Result<RunOutcome>;

    fn priority(&self) -> i16 {
        DEFAULT_PRIORITY
    }

    fn queue_name(&self) -> &str {
        DEFAULT_QUEUE_NAME
    }

    /// If true, enqueuing returns an existing NEW task with the same
    /// processor_class + arguments instead of inserting a duplicate.
    fn unique_for_params(&self) -> bool {
        false
    }

    fn retry_config(&self) -> Option<ErrorsHandleConfig> {
        None
    }

    fn postpone_config(&self) -> Option<PostponeConfig> {
        None
    }
}

/// A predicate over a processor error, used to classify whether it's eligible
/// for retry. Stands in for the source's tuple of exception classes, which
/// Rust's closed error types have no equivalent for.
pub type RetryPredicate = Arc<dyn Fn(&eyre::Report) -> bool + Send + Sync>;

/// Build a predicate that matches any error whose chain contains `E`.
pub fn retry_on<E>() -> RetryPredicate
where
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(|report: &eyre::Report| report.downcast_ref::<E>().is_some())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPauseStrategy {
    Constant,
    Incremental,
}

#[derive(Clone)]
pub struct ErrorsHandleConfig {
    pub retry_on_errors: Vec<RetryPredicate>,
    pub retries_count: i64,
    pub retry_pause: Duration,
    pub retry_pause_strategy: RetryPauseStrategy,
}

impl ErrorsHandleConfig {
    /// True if any of `retry_on_errors` matches this error.
    pub fn matches(&self, err: &eyre::Report) -> bool {
        self.retry_on_errors.iter().any(|pred| pred(err))
    }

    /// Next execution time for the `try_num`-th retry (1-indexed), or `None`
    /// once `try_num` exceeds `retries_count`.
    pub fn next_execute_after(&self, now: DateTime<Utc>, try_num: i64) -> Option<DateTime<Utc>> {
        if try_num > self.retries_count {
            return None;
        }
        Some(match self.retry_pause_strategy {
            RetryPauseStrategy::Constant => now + self.retry_pause,
            RetryPauseStrategy::Incremental => now + self.retry_pause * try_num as i32,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PostponeConfig {
    pub max_postpones: Option<u32>,
}

impl PostponeConfig {
    pub fn next_execute_after(now: DateTime<Utc>, delay_seconds: i64) -> DateTime<Utc> {
        now + Duration::seconds(delay_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Flaky;
    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky")
        }
    }
    impl std::error::Error for Flaky {}

    #[derive(Debug)]
    struct Other;
    impl fmt::Display for Other {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "other")
        }
    }
    impl std::error::Error for Other {}

    fn config(strategy: RetryPauseStrategy, pause_secs: i64, retries_count: i64) -> ErrorsHandleConfig {
        ErrorsHandleConfig {
            retry_on_errors: vec![retry_on::<Flaky>()],
            retries_count,
            retry_pause: Duration::seconds(pause_secs),
            retry_pause_strategy: strategy,
        }
    }

    #[test]
    fn matches_only_listed_error_kinds() {
        let cfg = config(RetryPauseStrategy::Constant, 5, 3);
        assert!(cfg.matches(&eyre::Report::new(Flaky)));
        assert!(!cfg.matches(&eyre::Report::new(Other)));
    }

    #[test]
    fn constant_strategy_ignores_try_number() {
        let cfg = config(RetryPauseStrategy::Constant, 30, 5);
        let now = Utc::now();
        for k in 1..=5 {
            let next = cfg.next_execute_after(now, k).unwrap();
            assert_eq!(next, now + Duration::seconds(30));
        }
    }

    #[test]
    fn incremental_strategy_scales_with_try_number() {
        let cfg = config(RetryPauseStrategy::Incremental, 10, 5);
        let now = Utc::now();
        assert_eq!(
            cfg.next_execute_after(now, 1).unwrap(),
            now + Duration::seconds(10)
        );
        assert_eq!(
            cfg.next_execute_after(now, 3).unwrap(),
            now + Duration::seconds(30)
        );
    }

    #[test]
    fn refuses_once_try_number_exceeds_cap() {
        let cfg = config(RetryPauseStrategy::Constant, 1, 2);
        let now = Utc::now();
        assert!(cfg.next_execute_after(now, 2).is_some());
        assert!(cfg.next_execute_after(now, 3).is_none());
    }
}
