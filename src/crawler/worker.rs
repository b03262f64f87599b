//! The crawl worker loop
//!
//! `start` launches one browser session shared by every worker unit, the
//! crawl scheduler and a bounded pool of workers. Each worker repeatedly:
//!
//! 1. Dequeues a crawl job (sleeping the poll interval when the lane is empty)
//! 2. Opens an isolated browsing context
//! 3. Waits out the politeness delay and sets a rotated user agent
//! 4. Navigates and runs the extraction strategy for the content type
//! 5. Closes the context
//! 6. Completes the job and enqueues one processing job per extracted unit,
//!    or fails the job so the queue can retry it
//!
//! Jobs whose source was removed or went inactive after scheduling are
//! completed without navigating.
//!
//! `stop` lets every in-flight job finish before the session is torn down.
//! Jobs are never force-completed; anything left active is reclaimed on the
//! next startup.

use crate::browser::{BrowserEngine, BrowserSession, NavigateOptions, Viewport};
use crate::config::CrawlerConfig;
use crate::crawler::extract::{ExtractedContent, ExtractionStrategy};
use crate::crawler::identity::IdentityRotator;
use crate::crawler::scheduler::CrawlScheduler;
use crate::health::{Component, HealthState};
use crate::queue::retry::{with_retry, RetryConfig};
use crate::queue::{CrawlRequest, FailOutcome, Job, JobPayload, JobQueue};
use crate::source::SourceRegistry;
use crate::state::Lane;
use crate::{BrowserError, DriftnetError, ExtractionError, NavigationError, QueueResult};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Why a single crawl attempt failed
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("job on the crawl lane carries a {0} payload")]
    WrongPayload(Lane),
}

/// Tunables for the worker loop
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Number of worker units
    pub concurrency: usize,
    /// Politeness delay before each navigation
    pub request_delay: Duration,
    /// Sleep between dequeues of an empty lane
    pub poll_interval: Duration,
    pub navigation_timeout: Duration,
    pub schedule_interval: Duration,
    pub viewport: Viewport,
    pub user_agents: Vec<String>,
    pub dedupe_in_flight: bool,
}

impl From<&CrawlerConfig> for WorkerSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            concurrency: config.max_concurrent_scrapes.max(1) as usize,
            request_delay: config.request_delay(),
            poll_interval: config.poll_interval(),
            navigation_timeout: config.navigation_timeout(),
            schedule_interval: config.schedule_interval(),
            viewport: Viewport::from(&config.viewport),
            user_agents: config.user_agents.clone(),
            dedupe_in_flight: config.dedupe_in_flight,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&CrawlerConfig::default())
    }
}

/// State shared by every worker unit
struct WorkerShared {
    registry: Arc<SourceRegistry>,
    queue: Arc<JobQueue>,
    session: Arc<dyn BrowserSession>,
    identities: IdentityRotator,
    settings: WorkerSettings,
    retry: RetryConfig,
    shutdown: CancellationToken,
    fatal: CancellationToken,
}

struct Running {
    shared: Arc<WorkerShared>,
    tasks: Vec<JoinHandle<QueueResult<()>>>,
}

pub struct CrawlWorkerLoop {
    settings: WorkerSettings,
    registry: Arc<SourceRegistry>,
    queue: Arc<JobQueue>,
    engine: Arc<dyn BrowserEngine>,
    health: Arc<HealthState>,
    retry: RetryConfig,
    fatal: CancellationToken,
    running: Option<Running>,
}

impl CrawlWorkerLoop {
    pub fn new(
        settings: WorkerSettings,
        registry: Arc<SourceRegistry>,
        queue: Arc<JobQueue>,
        engine: Arc<dyn BrowserEngine>,
    ) -> Self {
        Self {
            settings,
            registry,
            queue,
            engine,
            health: Arc::new(HealthState::new()),
            retry: RetryConfig::default(),
            fatal: CancellationToken::new(),
            running: None,
        }
    }

    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = health;
        self
    }

    /// Retry budget for transient queue failures
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Fires when a task hit a queue error it could not recover from
    pub fn fatal_signal(&self) -> CancellationToken {
        self.fatal.clone()
    }

    /// Launches the browser session, the scheduler and the worker pool
    ///
    /// Calling `start` on a running loop does nothing.
    pub async fn start(&mut self) -> Result<(), DriftnetError> {
        if self.running.is_some() {
            return Ok(());
        }

        let session = self.engine.launch(self.settings.viewport).await?;
        let shutdown = CancellationToken::new();

        let shared = Arc::new(WorkerShared {
            registry: Arc::clone(&self.registry),
            queue: Arc::clone(&self.queue),
            session,
            identities: IdentityRotator::new(self.settings.user_agents.clone()),
            settings: self.settings.clone(),
            retry: self.retry.clone(),
            shutdown: shutdown.clone(),
            fatal: self.fatal.clone(),
        });

        let mut tasks = Vec::with_capacity(self.settings.concurrency + 1);

        let scheduler = CrawlScheduler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.queue),
            self.settings.schedule_interval,
        )
        .with_dedupe(self.settings.dedupe_in_flight)
        .with_retry(self.retry.clone());
        let health = Arc::clone(&self.health);
        let fatal = self.fatal.clone();
        let scheduler_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            let result = scheduler.run(scheduler_shutdown, Some(health)).await;
            if result.is_err() {
                fatal.cancel();
            }
            result
        }));

        self.health.set_expected_workers(self.settings.concurrency);
        for worker_id in 0..self.settings.concurrency {
            let shared = Arc::clone(&shared);
            let guard = self.health.guard(Component::Worker);
            tasks.push(tokio::spawn(async move {
                let _alive = guard;
                shared.run_worker(worker_id).await
            }));
        }

        tracing::info!(
            workers = self.settings.concurrency,
            "Crawl worker loop started"
        );

        self.running = Some(Running { shared, tasks });
        Ok(())
    }

    /// Stops scheduling and waits for the workers to drain
    ///
    /// Returns the first error any task ended with.
    pub async fn stop(&mut self) -> Result<(), DriftnetError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        tracing::info!("Stopping crawl worker loop");
        running.shared.shutdown.cancel();

        let mut first_error: Option<DriftnetError> = None;
        for task in running.tasks {
            let error = match task.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(DriftnetError::Queue(e)),
                Err(e) => Some(DriftnetError::Task(e.to_string())),
            };
            if first_error.is_none() {
                first_error = error;
            }
        }

        running.shared.session.close().await;
        tracing::info!("Crawl worker loop stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl WorkerShared {
    async fn run_worker(&self, worker_id: usize) -> QueueResult<()> {
        tracing::debug!(worker_id, "Worker started");

        let result = self.worker_loop(worker_id).await;
        if let Err(e) = &result {
            tracing::error!(worker_id, error = %e, "Worker stopped on a queue error");
            self.fatal.cancel();
        }

        tracing::debug!(worker_id, "Worker exited");
        result
    }

    async fn worker_loop(&self, worker_id: usize) -> QueueResult<()> {
        while !self.shutdown.is_cancelled() {
            let next = with_retry(&self.retry, || self.queue.dequeue(Lane::Crawl)).await?;

            let Some(job) = next else {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
                continue;
            };

            tracing::debug!(
                worker_id,
                job_id = %job.id,
                source_id = job.source_id(),
                attempt = job.attempt,
                "Picked up crawl job"
            );
            self.process_job(job).await?;
        }
        Ok(())
    }

    /// Runs one job to completion or failure
    ///
    /// Errors from the job itself go to `fail`; only queue errors propagate.
    async fn process_job(&self, job: Job) -> QueueResult<()> {
        match self.attempt(&job).await {
            Ok(None) => {
                with_retry(&self.retry, || self.queue.complete(job.id)).await?;
                tracing::debug!(
                    source_id = job.source_id(),
                    url = job.url(),
                    "Source no longer active, dropped crawl job"
                );
            }
            Ok(Some(units)) => {
                let processing = self.queue.defaults();
                let count = units.len();
                for unit in units {
                    let payload = JobPayload::Processing(unit);
                    with_retry(&self.retry, || {
                        self.queue
                            .enqueue(Lane::Processing, payload.clone(), processing)
                    })
                    .await?;
                }
                with_retry(&self.retry, || self.queue.complete(job.id)).await?;

                tracing::info!(
                    source_id = job.source_id(),
                    url = job.url(),
                    units = count,
                    "Crawl job completed"
                );
            }
            Err(e) => {
                let message = e.to_string();
                let outcome = with_retry(&self.retry, || self.queue.fail(job.id, &message)).await?;

                match outcome {
                    FailOutcome::Retrying { attempt, delay, .. } => tracing::warn!(
                        source_id = job.source_id(),
                        url = job.url(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Crawl attempt failed, retrying later"
                    ),
                    FailOutcome::Exhausted { attempt, error } => tracing::error!(
                        source_id = job.source_id(),
                        url = job.url(),
                        attempt,
                        error = %error,
                        "Crawl job permanently failed"
                    ),
                }
            }
        }
        Ok(())
    }

    /// One crawl attempt
    ///
    /// `None` means the source was removed or deactivated after the job was
    /// queued; nothing is fetched for it.
    async fn attempt(&self, job: &Job) -> Result<Option<Vec<ExtractedContent>>, AttemptError> {
        let request: &CrawlRequest = match &job.payload {
            JobPayload::Crawl(request) => request,
            other => return Err(AttemptError::WrongPayload(other.lane())),
        };

        let strategy = ExtractionStrategy::from_tag(&request.content_type)?;
        let url = Url::parse(&request.url).map_err(|e| NavigationError::InvalidUrl {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        match self.registry.get(&request.source_id) {
            Some(source) if source.active => {}
            _ => return Ok(None),
        }

        let mut context = self.session.new_context().await?;

        let extracted = async {
            if !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }
            context
                .set_user_agent(self.identities.next_identity())
                .await;

            let options = NavigateOptions {
                timeout: self.settings.navigation_timeout,
            };
            context.navigate(&url, &options).await?;

            let value = context.evaluate(strategy).await?;
            Ok::<_, AttemptError>(strategy.decode(value)?)
        }
        .await;

        context.close().await;
        let payload = extracted?;

        let content = ExtractedContent {
            source_id: request.source_id.clone(),
            content_type: strategy.content_type(),
            url,
            payload,
            extracted_at: Utc::now(),
        };
        Ok(Some(content.into_units()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = CrawlerConfig {
            max_concurrent_scrapes: 4,
            request_delay: 250,
            ..CrawlerConfig::default()
        };
        let settings = WorkerSettings::from(&config);
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.request_delay, Duration::from_millis(250));
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.viewport, Viewport { width: 1920, height: 1080 });
    }

    #[test]
    fn test_attempt_error_messages() {
        let err = AttemptError::from(NavigationError::Status {
            url: "https://example.com/".into(),
            status: 502,
        });
        assert_eq!(err.to_string(), "Navigation to https://example.com/ returned HTTP 502");
        assert_eq!(
            AttemptError::WrongPayload(Lane::Processing).to_string(),
            "job on the crawl lane carries a processing payload"
        );
    }
}
