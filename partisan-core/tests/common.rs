use chrono::{DateTime, Duration, Utc};
use partisan_core::TaskInit;
use serde_json::json;

#[allow(dead_code)]
pub fn new_task(processor_class: &str, priority: i16) -> TaskInit {
    TaskInit {
        processor_class: processor_class.to_string(),
        queue_name: "test".to_string(),
        priority,
        execute_after: Utc::now() - Duration::minutes(1),
        arguments: json!({"args": [], "kwargs": {}}),
    }
}

#[allow(dead_code)]
pub fn dates_match(left: &DateTime<Utc>, right: &DateTime<Utc>) -> bool {
    // Roundtripping a datetime through PG can leave sub-ms differences.
    let diff = *left - *right;
    diff.abs() < Duration::milliseconds(1)
}
