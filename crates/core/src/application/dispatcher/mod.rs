// Dispatcher - per-queue delivery loop

pub mod constants;
mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::engine::EngineCore;
use crate::domain::QueueName;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Periodic task that feeds one queue's items to its delivery handler.
///
/// Each tick fills the free in-flight slots; deliveries run concurrently in a
/// `JoinSet`, so freed slots are picked up on the next tick without waiting
/// for the rest of the batch.
pub struct Dispatcher {
    core: Arc<EngineCore>,
    queue: QueueName,
    interval: Duration,
}

impl Dispatcher {
    pub(crate) fn new(core: Arc<EngineCore>, queue: QueueName, interval: Duration) -> Self {
        Self {
            core,
            queue,
            interval,
        }
    }

    /// Run until shutdown, then drain in-flight deliveries
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            queue = %self.queue,
            interval_ms = self.interval.as_millis() as u64,
            "Dispatcher started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!(queue = %self.queue, "Dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.core.select_batch(&self.queue).await {
                        Ok(batch) => {
                            for item in batch {
                                let core = Arc::clone(&self.core);
                                let queue = self.queue.clone();
                                in_flight.spawn(async move { core.deliver(&queue, item).await });
                            }
                        }
                        Err(e) => error!(queue = %self.queue, error = %e, "Dispatcher tick failed"),
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(queue = %self.queue, error = %e, "Delivery task failed");
                    }
                }
            }
        }

        self.drain(in_flight).await;
        info!(queue = %self.queue, "Dispatcher stopped");
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        info!(queue = %self.queue, pending = in_flight.len(), "Draining in-flight deliveries");
        let drained = tokio::time::timeout(self.core.settings.shutdown_drain_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                queue = %self.queue,
                remaining = in_flight.len(),
                "Drain timed out, leaving deliveries running detached"
            );
            in_flight.detach_all();
        }
    }
}
