use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

/// How long a stopping monitor is given to finish its current tick.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Handle to one background polling task: the task plus its stop signal.
#[derive(Default)]
pub(crate) struct MonitorHandle {
    task: Option<JoinHandle<()>>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl MonitorHandle {
    /// Whether the tracked task is still alive.
    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Track a freshly spawned task and its stop channel.
    pub(crate) fn track(&mut self, task: JoinHandle<()>, stop_tx: watch::Sender<bool>) {
        self.task = Some(task);
        self.stop_tx = Some(stop_tx);
    }

    /// Signal stop and join with a bounded grace period; a task that does
    /// not wind down in time is aborted.
    pub(crate) async fn stop(&mut self, name: &str) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(mut task) = self.task.take() {
            if timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!(monitor = name, "monitor did not stop in time, aborting");
                task.abort();
            }
        }
    }
}
