use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use common_metrics::{gauge, inc};
use partisan_core::{claim_tasks, reset_orphans, QueueError, QueueSettings, TaskDescriptor};
use sqlx::PgPool;
use tracing::{error, info, warn};

use partisan_worker::Message;

use crate::signals;
use crate::worker_handle::WorkerHandle;

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const TERMINATION_PAUSE: Duration = Duration::from_millis(50);
const WORKER_RESTARTS: &str = "partisan_worker_restarts";
const QUEUE_DEPTH: &str = "partisan_queue_depth";

/// The orchestration loop: creates the worker pool, refills the in-memory
/// dispatch buffer from the store, restarts dead workers, and handles
/// graceful shutdown. Grounded on the source's `WorkersManager`.
pub struct WorkersManager {
    pool: PgPool,
    queue_name: String,
    settings: QueueSettings,
    workers: Vec<WorkerHandle>,
    buffer: VecDeque<TaskDescriptor>,
    cleanup_counter: u32,
    next_worker: usize,
    running: Arc<AtomicBool>,
    health: Option<HealthHandle>,
}

impl WorkersManager {
    pub fn new(pool: PgPool, queue_name: String, settings: QueueSettings) -> Self {
        Self {
            pool,
            queue_name,
            settings,
            workers: Vec::new(),
            buffer: VecDeque::new(),
            cleanup_counter: 0,
            next_worker: 0,
            running: Arc::new(AtomicBool::new(true)),
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthHandle) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn run(&mut self) -> eyre::Result<()> {
        self.running = signals::install();

        let reset = reset_orphans(&self.pool, &self.queue_name).await?;
        if reset > 0 {
            info!(reset, queue_name = %self.queue_name, "recovered orphaned tasks");
        }

        self.spawn_workers()?;

        while self.running.load(Ordering::SeqCst) {
            if let Some(health) = &self.health {
                health.report_healthy().await;
            }
            if let Err(e) = self.manage_queue().await {
                error!("database error: {e}");
                continue;
            }
            if let Err(e) = self.manage_workers().await {
                error!("unexpected error: {e}");
                break;
            }
        }

        self.flush_queue();
        self.stop_workers().await;
        Ok(())
    }

    async fn manage_queue(&mut self) -> Result<(), QueueError> {
        // Unconditional like the source's `nothing_to_do = True`: only the
        // refill branch below can flip it, so a tick that skips refill
        // outright (buffer already above MIN_QUEUE_SIZE) still sleeps.
        let mut claimed_any = false;

        if (self.buffer.len() as u32) <= self.settings.min_queue_size {
            let want = self
                .settings
                .max_queue_size
                .saturating_sub(self.buffer.len() as u32);
            let claimed = claim_tasks(&self.pool, &self.queue_name, want).await?;
            claimed_any = !claimed.is_empty();

            for task in &claimed {
                self.buffer.push_back(TaskDescriptor::from(task));
            }

            gauge(
                QUEUE_DEPTH,
                &[("queue_name".to_string(), self.queue_name.clone())],
                self.buffer.len() as f64,
            );
        }

        self.dispatch().await;

        if !claimed_any {
            tokio::time::sleep(Duration::from_secs(self.settings.sleep_delay_seconds)).await;
        }

        Ok(())
    }

    /// Push buffered tasks out to workers, round-robin. A write failure
    /// (worker gone) leaves the task at the front of the buffer for the next
    /// pass, once `manage_workers` has had a chance to replace the worker.
    async fn dispatch(&mut self) {
        while let Some(descriptor) = self.buffer.pop_front() {
            if self.workers.is_empty() {
                self.buffer.push_front(descriptor);
                break;
            }

            let idx = self.next_worker % self.workers.len();
            self.next_worker = self.next_worker.wrapping_add(1);

            if let Err(e) = self.workers[idx]
                .send(&Message::Task(descriptor.clone()))
                .await
            {
                warn!(worker = idx, error = %e, "failed to dispatch task to worker");
                self.buffer.push_front(descriptor);
                break;
            }
        }
    }

    async fn manage_workers(&mut self) -> eyre::Result<()> {
        self.cleanup_counter += 1;
        if self.cleanup_counter < self.settings.checks_before_cleanup {
            return Ok(());
        }
        self.cleanup_counter = 0;

        for slot in 0..self.workers.len() {
            if matches!(self.workers[slot].try_wait(), Ok(Some(_))) {
                warn!(worker = slot, "worker died, respawning");
                inc(
                    WORKER_RESTARTS,
                    &[("queue_name".to_string(), self.queue_name.clone())],
                    1,
                );
                self.workers[slot] = WorkerHandle::spawn(&self.queue_name)?;
            }
        }

        Ok(())
    }

    /// Drain remaining in-memory items without processing them. They remain
    /// IN_PROCESS in the store and are recovered by a future supervisor
    /// start's orphan reset.
    fn flush_queue(&mut self) {
        let n = self.buffer.len();
        self.buffer.clear();
        if n > 0 {
            info!(count = n, "flushed queued tasks without processing them");
        }
    }

    async fn stop_workers(&mut self) {
        for worker in &mut self.workers {
            let _ = worker.send(&Message::Stop).await;
        }

        for worker in &mut self.workers {
            if !worker.join(WORKER_JOIN_TIMEOUT).await {
                worker.kill();
            }
            tokio::time::sleep(TERMINATION_PAUSE).await;
        }
    }

    fn spawn_workers(&mut self) -> std::io::Result<()> {
        for _ in 0..self.settings.workers_count {
            self.workers.push(WorkerHandle::spawn(&self.queue_name)?);
        }
        Ok(())
    }
}
