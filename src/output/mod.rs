//! Output module for delivering extracted content
//!
//! This module handles:
//! - The `ContentSink` contract and its JSON-lines and log sinks
//! - Draining the processing lane into a sink
//! - Queue statistics reporting

mod consumer;
mod sinks;
pub mod stats;
mod traits;

pub use consumer::ProcessingConsumer;
pub use sinks::{JsonLinesSink, LogSink};
pub use stats::{load_statistics, print_statistics, QueueStatistics};
pub use traits::{ContentSink, SinkError, SinkResult};

use crate::config::OutputConfig;
use std::path::Path;
use std::sync::Arc;

/// Builds the sink described by the `[output]` config section
///
/// Without a content path, content is only logged.
pub async fn open_sink(config: &OutputConfig) -> SinkResult<Arc<dyn ContentSink>> {
    match &config.content_path {
        Some(path) => {
            tracing::info!("Writing extracted content to {}", path);
            Ok(Arc::new(JsonLinesSink::open(Path::new(path)).await?))
        }
        None => {
            tracing::info!("No content path configured; extracted content is logged only");
            Ok(Arc::new(LogSink))
        }
    }
}
