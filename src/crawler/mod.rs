//! Crawler module: turning active sources into extracted content
//!
//! This module contains the crawling side of the system, including:
//! - Content-type specific extraction strategies
//! - User-agent rotation
//! - Periodic crawl scheduling from the registry's active set
//! - The bounded browser worker pool
//! - Overall process coordination

mod coordinator;
mod extract;
mod identity;
mod scheduler;
mod worker;

pub use coordinator::Coordinator;
pub use extract::{
    ExtractedContent, ExtractedPayload, ExtractionStrategy, ImageDescriptor, VideoDescriptor,
};
pub use identity::{IdentityRotator, DEFAULT_USER_AGENT};
pub use scheduler::{CrawlScheduler, ScheduleReport};
pub use worker::{CrawlWorkerLoop, WorkerSettings};

use crate::config::Config;
use crate::DriftnetError;

/// Runs driftnet until Ctrl-C
///
/// This is the main entry point. It will:
/// 1. Seed the source registry and open the job queue
/// 2. Reclaim interrupted jobs and run the first validation sweep
/// 3. Start validation, crawling, processing and the health endpoint
/// 4. Shut everything down in order on Ctrl-C
pub async fn run(config: Config, fresh: bool) -> Result<(), DriftnetError> {
    Coordinator::new(config, fresh)?.run().await
}
