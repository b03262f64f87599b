//! Coordinator - wires the registry, queue, workers and consumer together
//!
//! Startup order:
//! 1. Reclaim jobs a previous process left active
//! 2. Run the initial validation sweep
//! 3. Spawn the validation ticker, the crawl worker loop, the processing
//!    consumer and the health endpoint
//!
//! Shutdown runs in reverse once the shutdown signal fires or any task
//! reports a queue failure it could not recover from.

use crate::browser::{BrowserEngine, HttpBrowserEngine};
use crate::config::Config;
use crate::crawler::identity::IdentityRotator;
use crate::crawler::worker::{CrawlWorkerLoop, WorkerSettings};
use crate::health::{self, AppState, HealthState};
use crate::output::{open_sink, ProcessingConsumer};
use crate::queue::retry::RetryConfig;
use crate::queue::JobQueue;
use crate::source::{HttpProbe, LivenessProbe, SourceRegistry, ValidationTicker};
use crate::DriftnetError;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long finished jobs are kept before pruning
const FINISHED_JOB_RETENTION_DAYS: i64 = 7;

/// Main coordinator structure
pub struct Coordinator {
    config: Config,
    registry: Arc<SourceRegistry>,
    queue: Arc<JobQueue>,
    engine: Arc<dyn BrowserEngine>,
    health: Arc<HealthState>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `fresh` - Whether to purge the durable queue before starting
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Registry seeded and queue opened
    /// * `Err(DriftnetError)` - Failed to initialize
    pub fn new(config: Config, fresh: bool) -> Result<Self, DriftnetError> {
        let identity = IdentityRotator::new(config.crawler.user_agents.clone());
        let probe = HttpProbe::new(config.registry.probe_timeout(), identity.next_identity())?;
        Self::with_probe(config, fresh, Arc::new(probe))
    }

    /// Like `new`, with a caller-supplied liveness probe
    pub fn with_probe(
        config: Config,
        fresh: bool,
        probe: Arc<dyn LivenessProbe>,
    ) -> Result<Self, DriftnetError> {
        let registry = SourceRegistry::new(probe, &config.registry);
        let loaded = registry.load(&config.sources)?;
        tracing::info!("Loaded {} source(s)", loaded);

        let queue = JobQueue::from_config(&config.queue)?;
        if fresh {
            let removed = queue.clear()?;
            tracing::info!("Fresh start: removed {} queued job(s)", removed);
        }

        Ok(Self {
            config,
            registry: Arc::new(registry),
            queue: Arc::new(queue),
            engine: Arc::new(HttpBrowserEngine::new()),
            health: Arc::new(HealthState::new()),
        })
    }

    /// Replaces the bundled HTTP engine
    pub fn with_engine(mut self, engine: Arc<dyn BrowserEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    /// Runs until Ctrl-C
    pub async fn run(self) -> Result<(), DriftnetError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Received Ctrl-C, shutting down");
        })
        .await
    }

    /// Runs until `shutdown` completes or a task fails fatally
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), DriftnetError> {
        let retry = RetryConfig::from_config(&self.config.queue);

        let reclaimed = self.queue.reclaim_active()?;
        if reclaimed > 0 {
            tracing::info!("Returned {} interrupted job(s) to the queue", reclaimed);
        }

        let report = self.registry.validate_sweep().await;
        tracing::info!(
            alive = report.alive,
            dead = report.dead,
            "Initial validation sweep: {} of {} source(s) active",
            self.registry.active_sources().len(),
            self.registry.len()
        );

        let cancel = CancellationToken::new();
        let mut background: Vec<JoinHandle<Result<(), DriftnetError>>> = Vec::new();

        let ticker = ValidationTicker::new(
            Arc::clone(&self.registry),
            self.config.registry.sweep_interval(),
        )
        .with_health(Arc::clone(&self.health))
        .with_pruning(
            Arc::clone(&self.queue),
            chrono::Duration::days(FINISHED_JOB_RETENTION_DAYS),
        );
        let ticker_cancel = cancel.clone();
        background.push(tokio::spawn(async move {
            ticker.run(ticker_cancel).await;
            Ok(())
        }));

        let mut workers = CrawlWorkerLoop::new(
            WorkerSettings::from(&self.config.crawler),
            Arc::clone(&self.registry),
            Arc::clone(&self.queue),
            Arc::clone(&self.engine),
        )
        .with_health(Arc::clone(&self.health))
        .with_retry(retry.clone());
        let fatal = workers.fatal_signal();

        if let Err(e) = workers.start().await {
            cancel.cancel();
            return Err(e);
        }

        let sink = match open_sink(&self.config.output).await {
            Ok(sink) => sink,
            Err(e) => {
                cancel.cancel();
                let _ = workers.stop().await;
                return Err(e.into());
            }
        };
        let consumer = ProcessingConsumer::new(
            Arc::clone(&self.queue),
            sink,
            self.config.crawler.poll_interval(),
        )
        .with_retry(retry);
        let consumer_cancel = cancel.clone();
        let consumer_fatal = fatal.clone();
        let consumer_health = Arc::clone(&self.health);
        background.push(tokio::spawn(async move {
            let result = consumer.run(consumer_cancel, Some(consumer_health)).await;
            if result.is_err() {
                consumer_fatal.cancel();
            }
            result.map_err(DriftnetError::from)
        }));

        if self.config.health.enabled {
            match tokio::net::TcpListener::bind(self.config.health.bind).await {
                Ok(listener) => {
                    let state = AppState {
                        health: Arc::clone(&self.health),
                        queue: Arc::clone(&self.queue),
                    };
                    let server_cancel = cancel.clone();
                    background.push(tokio::spawn(async move {
                        health::serve(listener, state, server_cancel)
                            .await
                            .map_err(DriftnetError::from)
                    }));
                }
                Err(e) => {
                    cancel.cancel();
                    let _ = workers.stop().await;
                    return Err(e.into());
                }
            }
        }

        tracing::info!("Driftnet running");

        let fatal_stop = tokio::select! {
            _ = shutdown => false,
            _ = fatal.cancelled() => {
                tracing::error!("A queue failure could not be recovered; shutting down");
                true
            }
        };

        let mut first_error = workers.stop().await.err();

        cancel.cancel();
        for task in background {
            let error = match task.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(e) => Some(DriftnetError::Task(e.to_string())),
            };
            if first_error.is_none() {
                first_error = error;
            }
        }

        tracing::info!("Driftnet stopped");

        match first_error {
            Some(e) => Err(e),
            None if fatal_stop => Err(DriftnetError::Task(
                "stopped after an unrecoverable queue failure".to_string(),
            )),
            None => Ok(()),
        }
    }
}
