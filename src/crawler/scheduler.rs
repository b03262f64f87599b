//! Periodic crawl scheduling
//!
//! Once per tick the scheduler reads the registry's active sources and puts
//! one crawl job per source on the crawl lane. Inactive sources are never
//! scheduled. With the in-flight guard on, a source that still has a
//! waiting or active crawl job is skipped for that tick.

use crate::health::{Component, HealthState};
use crate::queue::retry::{with_retry, RetryConfig};
use crate::queue::{CrawlRequest, EnqueueOptions, JobPayload, JobQueue};
use crate::source::SourceRegistry;
use crate::state::Lane;
use crate::QueueResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What one scheduling tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub enqueued: usize,
    /// Active sources skipped because a crawl was already in flight
    pub in_flight: usize,
}

pub struct CrawlScheduler {
    registry: Arc<SourceRegistry>,
    queue: Arc<JobQueue>,
    interval: Duration,
    options: EnqueueOptions,
    dedupe_in_flight: bool,
    retry: RetryConfig,
}

impl CrawlScheduler {
    pub fn new(registry: Arc<SourceRegistry>, queue: Arc<JobQueue>, interval: Duration) -> Self {
        let options = queue.defaults();
        Self {
            registry,
            queue,
            interval,
            options,
            dedupe_in_flight: true,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_dedupe(mut self, dedupe_in_flight: bool) -> Self {
        self.dedupe_in_flight = dedupe_in_flight;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn tick(&self) -> QueueResult<ScheduleReport> {
        self.tick_at(Utc::now()).await
    }

    /// Enqueues one crawl job per active source
    pub async fn tick_at(&self, now: DateTime<Utc>) -> QueueResult<ScheduleReport> {
        let mut report = ScheduleReport::default();

        for source in self.registry.active_sources() {
            if self.dedupe_in_flight {
                let busy =
                    with_retry(&self.retry, || self.queue.has_unfinished_crawl(&source.id)).await?;
                if busy {
                    tracing::debug!(source_id = %source.id, "Crawl already in flight, skipping");
                    report.in_flight += 1;
                    continue;
                }
            }

            let payload = JobPayload::Crawl(CrawlRequest {
                source_id: source.id.clone(),
                content_type: source.content_type.as_str().to_string(),
                url: source.url.to_string(),
            });

            with_retry(&self.retry, || {
                self.queue
                    .enqueue_at(Lane::Crawl, payload.clone(), self.options, now)
            })
            .await?;
            report.enqueued += 1;
        }

        Ok(report)
    }

    /// Ticks every interval until cancelled
    ///
    /// Returns early only on a queue error that survived its retries.
    pub async fn run(
        self,
        cancel: CancellationToken,
        health: Option<Arc<HealthState>>,
    ) -> QueueResult<()> {
        let _alive = health.as_ref().map(|h| h.guard(Component::Scheduler));

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Crawl scheduler started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let report = self.tick().await.map_err(|e| {
                        tracing::error!(error = %e, "Crawl scheduling failed");
                        e
                    })?;
                    if report.enqueued > 0 || report.in_flight > 0 {
                        tracing::info!(
                            enqueued = report.enqueued,
                            in_flight = report.in_flight,
                            "Scheduled crawl jobs"
                        );
                    }
                }
            }
        }

        tracing::info!("Crawl scheduler stopped");
        Ok(())
    }
}
