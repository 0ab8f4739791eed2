//! Background removal of expired cache entries.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::TemplateCache;

/// Running sweeper task; dropping it without [`SweeperHandle::stop`] leaves
/// the task running until the runtime shuts down.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!("Cache sweeper ended abnormally: {}", err);
        }
    }
}

/// Sweep `cache` every `interval` until stopped.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(cache: Arc<TemplateCache>, interval: Duration) -> SweeperHandle {
    let (shutdown, mut signal) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.sweep_expired();
                    if removed > 0 {
                        tracing::debug!("Sweeper removed {} expired cache entries", removed);
                    }
                }
                changed = signal.changed() => {
                    if changed.is_err() || *signal.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Cache sweeper stopped");
    });

    SweeperHandle { shutdown, task }
}
