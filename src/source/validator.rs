//! Periodic validation sweeps

use crate::health::{Component, HealthState};
use crate::queue::JobQueue;
use crate::source::{SourceRegistry, SweepReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Runs `validate_sweep` once per period until cancelled
///
/// Optionally prunes finished queue jobs on the same cadence.
pub struct ValidationTicker {
    registry: Arc<SourceRegistry>,
    period: Duration,
    health: Option<Arc<HealthState>>,
    prune: Option<(Arc<JobQueue>, chrono::Duration)>,
}

impl ValidationTicker {
    pub fn new(registry: Arc<SourceRegistry>, period: Duration) -> Self {
        Self {
            registry,
            period,
            health: None,
            prune: None,
        }
    }

    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }

    /// Deletes completed and failed jobs older than `retention` after each sweep
    pub fn with_pruning(mut self, queue: Arc<JobQueue>, retention: chrono::Duration) -> Self {
        self.prune = Some((queue, retention));
        self
    }

    /// One sweep plus pruning
    pub async fn tick(&self) -> SweepReport {
        let report = self.registry.validate_sweep().await;

        if report.probed > 0 {
            tracing::info!(
                probed = report.probed,
                alive = report.alive,
                dead = report.dead,
                deactivated = report.deactivated,
                "Validation sweep finished"
            );
        } else {
            tracing::debug!(skipped = report.skipped, "Validation sweep: nothing due");
        }

        if let Some((queue, retention)) = &self.prune {
            let cutoff = chrono::Utc::now() - *retention;
            if let Err(e) = queue.prune_terminal(cutoff) {
                tracing::warn!(error = %e, "Failed to prune finished jobs");
            }
        }

        report
    }

    /// Sweeps every period until `cancel` fires
    ///
    /// The first sweep happens one full period after the call; the caller
    /// runs the startup sweep itself.
    pub async fn run(self, cancel: CancellationToken) {
        let _alive = self
            .health
            .as_ref()
            .map(|health| health.guard(Component::Validator));

        let start = tokio::time::Instant::now() + self.period;
        let mut interval = tokio::time::interval_at(start, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Validation ticker started (every {:?})", self.period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    // A sweep in progress is allowed to finish; probes are bounded by their timeout.
                    self.tick().await;
                }
            }
        }

        tracing::info!("Validation ticker stopped");
    }
}
