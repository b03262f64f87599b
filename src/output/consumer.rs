//! Drains the processing lane into a content sink

use crate::health::{Component, HealthState};
use crate::output::traits::ContentSink;
use crate::queue::retry::{with_retry, RetryConfig};
use crate::queue::{FailOutcome, Job, JobPayload, JobQueue};
use crate::state::Lane;
use crate::QueueResult;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct ProcessingConsumer {
    queue: Arc<JobQueue>,
    sink: Arc<dyn ContentSink>,
    poll_interval: Duration,
    retry: RetryConfig,
}

impl ProcessingConsumer {
    pub fn new(queue: Arc<JobQueue>, sink: Arc<dyn ContentSink>, poll_interval: Duration) -> Self {
        Self {
            queue,
            sink,
            poll_interval,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Handles at most one processing job
    ///
    /// Returns false when the lane had nothing eligible.
    pub async fn process_next(&self) -> QueueResult<bool> {
        let next = with_retry(&self.retry, || self.queue.dequeue(Lane::Processing)).await?;
        let Some(job) = next else {
            return Ok(false);
        };

        self.process_job(job).await?;
        Ok(true)
    }

    async fn process_job(&self, job: Job) -> QueueResult<()> {
        let delivered = match &job.payload {
            JobPayload::Processing(content) => self
                .sink
                .deliver(content)
                .await
                .map_err(|e| e.to_string()),
            other => Err(format!(
                "job on the processing lane carries a {} payload",
                other.lane()
            )),
        };

        match delivered {
            Ok(()) => {
                with_retry(&self.retry, || self.queue.complete(job.id)).await?;
            }
            Err(message) => {
                let outcome = with_retry(&self.retry, || self.queue.fail(job.id, &message)).await?;
                match outcome {
                    FailOutcome::Retrying { attempt, .. } => tracing::warn!(
                        source_id = job.source_id(),
                        url = job.url(),
                        attempt,
                        error = %message,
                        "Delivery failed, retrying later"
                    ),
                    FailOutcome::Exhausted { attempt, error } => tracing::error!(
                        source_id = job.source_id(),
                        url = job.url(),
                        attempt,
                        error = %error,
                        "Processing job permanently failed"
                    ),
                }
            }
        }
        Ok(())
    }

    /// Consumes until cancelled, then flushes the sink
    pub async fn run(
        self,
        cancel: CancellationToken,
        health: Option<Arc<HealthState>>,
    ) -> QueueResult<()> {
        let _alive = health.as_ref().map(|h| h.guard(Component::Consumer));
        tracing::info!("Processing consumer started");

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }

            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Processing consumer stopped on a queue error");
                    break Err(e);
                }
            }
        };

        if let Err(e) = self.sink.flush().await {
            tracing::warn!(error = %e, "Failed to flush content sink");
        }

        tracing::info!("Processing consumer stopped");
        result
    }
}
