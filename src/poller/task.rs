use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::poller::Poller;

/// The periodic sweep, owned by the process lifecycle.
///
/// Sweeps run inside the task body, one after another. A sweep longer
/// than the interval delays the next one instead of skipping it.
pub struct PollerTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollerTask {
    /// Spawn the task; the first sweep starts immediately
    pub fn start(poller: Arc<Poller>, interval: Duration) -> Self {
        // tokio::time::interval panics on a zero period
        let interval = interval.max(Duration::from_millis(1));
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = poller.sweep() => {}
                }
            }
        });

        info!("Poller started, sweeping every {:?}", interval);
        Self { token, handle }
    }

    /// Cancel the task, abandoning any sweep in progress, and wait for it
    pub async fn stop(self) -> Result<()> {
        self.token.cancel();
        self.handle.await.context("Poller task panicked")?;
        info!("Poller stopped");
        Ok(())
    }
}
