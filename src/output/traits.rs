//! Sink trait and error types for extracted content

use crate::crawler::ExtractedContent;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while delivering content
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for processing-lane content
///
/// A delivery that returns an error is retried by the consumer under the
/// queue's retry policy, so sinks may see the same content more than once.
#[async_trait]
pub trait ContentSink: Send + Sync {
    async fn deliver(&self, content: &ExtractedContent) -> SinkResult<()>;

    /// Flushes buffered output; called when the consumer stops
    async fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}
