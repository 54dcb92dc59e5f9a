use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::{pool::PoolOptions, PgPool};

use crate::types::QueueSettings;

// A pool config object, designed to be passable across API boundaries
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    pub db_url: String,
    pub max_connections: Option<u32>,         // Default to 10
    pub min_connections: Option<u32>,         // Default to 1
    pub acquire_timeout_seconds: Option<u64>, // Default to 30
    pub max_lifetime_seconds: Option<u64>,    // Default to 300
    pub idle_timeout_seconds: Option<u64>,    // Default to 60
}

impl PoolConfig {
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        let builder = PoolOptions::new()
            .max_connections(self.max_connections.unwrap_or(10))
            .min_connections(self.min_connections.unwrap_or(1))
            .max_lifetime(Duration::from_secs(
                self.max_lifetime_seconds.unwrap_or(300),
            ))
            .idle_timeout(Duration::from_secs(self.idle_timeout_seconds.unwrap_or(60)))
            .acquire_timeout(Duration::from_secs(
                self.acquire_timeout_seconds.unwrap_or(30),
            ));

        builder.connect(&self.db_url).await
    }
}

/// The process-wide mapping from queue_name to its QueueSettings, parsed from
/// a JSON object of the shape `{"default": {...}, "emails": {...}}`. Loaded
/// once at startup; never mutated afterwards.
pub fn parse_queue_settings(raw: &str) -> Result<HashMap<String, QueueSettings>, String> {
    let parsed: HashMap<String, QueueSettings> =
        serde_json::from_str(raw).map_err(|e| format!("invalid queue settings JSON: {e}"))?;

    for (queue_name, settings) in &parsed {
        settings
            .validate()
            .map_err(|e| format!("queue {queue_name}: {e}"))?;
    }

    Ok(parsed)
}

/// Look up the settings for a named queue. A queue_name without a registered
/// entry is `MissingConfiguration`, fatal to the supervisor.
pub fn lookup_queue_settings<'a>(
    settings: &'a HashMap<String, QueueSettings>,
    queue_name: &str,
) -> Result<&'a QueueSettings, String> {
    settings
        .get(queue_name)
        .ok_or_else(|| format!("no QueueSettings configured for queue {queue_name:?}"))
}
