use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Process-scoped flag flipped by the installed SIGTERM/SIGINT handlers. Worker
/// processes do not observe this - they rely on the `Stop` sentinel and
/// parent-liveness checks instead.
pub fn install() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));

    let sigterm_running = running.clone();
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
        info!("received SIGTERM, shutting down");
        sigterm_running.store(false, Ordering::SeqCst);
    });

    let sigint_running = running.clone();
    tokio::spawn(async move {
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        sigint.recv().await;
        info!("received SIGINT, shutting down");
        sigint_running.store(false, Ordering::SeqCst);
    });

    running
}
