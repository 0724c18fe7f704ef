//! Periodic driver of the coordinator's monitoring pass.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info};

use crate::coordinator::PipelineCoordinator;

/// Runs [`PipelineCoordinator::monitor_active`] on a fixed interval.
pub struct MonitorService {
    coordinator: Arc<PipelineCoordinator>,
    interval: Duration,
    error_backoff: Duration,
}

impl MonitorService {
    pub fn new(coordinator: Arc<PipelineCoordinator>, interval: Duration, error_backoff: Duration) -> Self {
        Self {
            coordinator,
            interval,
            error_backoff,
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Starting pipeline monitor");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let pass = AssertUnwindSafe(self.coordinator.monitor_active())
                .catch_unwind()
                .await;
            match pass {
                Ok(summary) => debug!(?summary, "Monitor tick"),
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(
                        panic = %message,
                        backoff_secs = self.error_backoff.as_secs(),
                        "Monitoring pass panicked"
                    );
                    let stop = tokio::select! {
                        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
                        _ = sleep(self.error_backoff) => false,
                    };
                    if stop {
                        break;
                    }
                    ticker.reset();
                }
            }
        }

        info!("Pipeline monitor stopped");
    }
}
