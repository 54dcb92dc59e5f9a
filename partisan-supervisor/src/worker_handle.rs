use std::process::Stdio;

use partisan_worker::{write_message, Message};
use tokio::process::{Child, ChildStdin, Command};

/// A handle to a worker subprocess: the supervisor's own binary, re-exec'd in
/// worker mode, with its stdin piped so the supervisor can push task frames
/// one-way. Mirrors the source's `mp.Process` handle, minus the shared
/// multiprocessing queue, which a piped stdin replaces per-worker.
pub struct WorkerHandle {
    child: Child,
    stdin: ChildStdin,
}

impl WorkerHandle {
    pub fn spawn(queue_name: &str) -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        let mut child = Command::new(exe)
            .arg("--queue_name")
            .arg(queue_name)
            .arg("--worker-mode")
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .expect("child spawned with Stdio::piped() stdin");

        Ok(Self { child, stdin })
    }

    pub async fn send(&mut self, message: &Message) -> std::io::Result<()> {
        write_message(&mut self.stdin, message)
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))
    }

    /// Non-blocking liveness check; `Some(status)` once the child has exited.
    pub fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        self.child.try_wait()
    }

    pub async fn join(&mut self, timeout: std::time::Duration) -> bool {
        tokio::time::timeout(timeout, self.child.wait())
            .await
            .is_ok()
    }

    pub fn kill(&mut self) {
        let _ = self.child.start_kill();
    }
}
