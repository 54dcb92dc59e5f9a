mod config;
mod http;
mod signals;
mod supervisor;
mod worker_handle;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use envconfig::Envconfig;
use health::HealthRegistry;
use partisan_core::Registry;

use config::{resolve_queue_settings, Cli, Config};
use supervisor::WorkersManager;

/// Registers every known `Processor` with the registry. Processors
/// themselves live outside this crate; this is the one place a deployment
/// wires its own task classes in before `start_partisan` runs.
fn register_processors(_registry: &mut Registry) {
    // No processors are bundled here; a real deployment adds its own
    // `registry.register("my.processor", Arc::new(MyProcessor))` calls.
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::init_from_env()?;

    let pool = config.pool_config().connect().await?;

    let settings_map = config
        .queue_settings_map()
        .map_err(|e| eyre::eyre!("invalid PARTISAN_QUEUES configuration: {e}"))?;
    let queue_settings = resolve_queue_settings(&settings_map, &cli)
        .map_err(|e| eyre::eyre!("invalid queue configuration for {}: {e}", cli.queue_name))?;

    let mut registry = Registry::new();
    register_processors(&mut registry);
    let registry = Arc::new(registry);

    if cli.worker_mode {
        let tasks_before_death = queue_settings.tasks_per_worker_instance;
        let worker_config = partisan_worker::WorkerConfig {
            queue_name: cli.queue_name,
            queue_settings,
            tasks_before_death,
        };
        return partisan_worker::run(pool, registry, worker_config, tokio::io::stdin()).await;
    }

    let liveness = HealthRegistry::new("liveness");
    let health_handle = liveness
        .register("supervisor".to_string(), Duration::from_secs(30))
        .await;

    let http_state = http::AppState {
        liveness,
        pool: pool.clone(),
    };
    let bind = format!("{}:{}", config.host, config.port);
    let http_router = http::router(http_state);

    let mut manager =
        WorkersManager::new(pool, cli.queue_name, queue_settings).with_health(health_handle);

    tokio::select! {
        result = manager.run() => result,
        result = common_metrics::serve(http_router, &bind) => Ok(result?),
    }
}
