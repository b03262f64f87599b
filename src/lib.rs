//! Driftnet: a crawl orchestrator for liveness-checked remote sources
//!
//! This crate keeps a registry of crawl targets and their liveness, feeds a
//! retrying two-lane job queue, and drives a bounded pool of browser workers
//! that extract text, image or video content from each active source.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod health;
pub mod output;
pub mod queue;
pub mod source;
pub mod state;

use thiserror::Error;

/// Main error type for Driftnet operations
#[derive(Debug, Error)]
pub enum DriftnetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Output error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),
}

/// Errors raised by explicit registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid source: {0}")]
    Invalid(#[from] ConfigError),

    #[error("Source already registered: {0}")]
    Duplicate(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

/// Liveness probe failures
///
/// These never escape the registry; they only deactivate a source.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Probe timed out for {url}")]
    Timeout { url: String },

    #[error("Probe request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("Probe for {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Failures while loading a target page
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("Navigation to {url} timed out")]
    Timeout { url: String },

    #[error("Navigation to {url} failed: {message}")]
    Load { url: String, message: String },

    #[error("Navigation to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid navigation target {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Failures while turning a loaded page into content
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("No page loaded in browsing context")]
    NoPage,

    #[error("Extractor failed: {0}")]
    Script(String),

    #[error("Failed to decode extractor result: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures of the browser session itself (launch, context lifecycle)
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Failed to open browsing context: {0}")]
    Context(String),

    #[error("Browser session is closed")]
    Closed,
}

/// Job queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue store unavailable: {0}")]
    Store(#[from] queue::StoreError),

    #[error("Unknown job: {0}")]
    UnknownJob(uuid::Uuid),

    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::JobState,
        to: state::JobState,
    },

    #[error("Payload for the {actual} lane enqueued on the {expected} lane")]
    LaneMismatch {
        expected: state::Lane,
        actual: state::Lane,
    },

    #[error("Queue lock poisoned")]
    Poisoned,
}

impl QueueError {
    /// Returns true if retrying the same call may succeed
    ///
    /// Only store failures can be transient, and only those that are not
    /// about the data itself; everything else is a caller error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}

/// Result type alias for Driftnet operations
pub type Result<T> = std::result::Result<T, DriftnetError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlWorkerLoop};
pub use queue::{EnqueueOptions, FailOutcome, Job, JobQueue};
pub use source::{ContentType, Source, SourceRegistry};
pub use state::{JobState, Lane};
