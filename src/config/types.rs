use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Main configuration structure for Driftnet
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceSeed>,
}

/// Crawl worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent worker units
    #[serde(rename = "max-concurrent-scrapes", default = "default_max_concurrent_scrapes")]
    pub max_concurrent_scrapes: u32,

    /// Politeness delay before each navigation (milliseconds)
    #[serde(rename = "request-delay", default = "default_request_delay")]
    pub request_delay: u64,

    /// Period of the scheduling tick (seconds)
    #[serde(rename = "schedule-interval", default = "default_schedule_interval")]
    pub schedule_interval: u64,

    /// Sleep between empty dequeues (milliseconds)
    #[serde(rename = "poll-interval", default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Upper bound on a single page load (milliseconds)
    #[serde(rename = "navigation-timeout", default = "default_navigation_timeout")]
    pub navigation_timeout: u64,

    /// Identity strings rotated across navigations
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Skip scheduling a source that already has an unfinished crawl job
    #[serde(rename = "dedupe-in-flight", default = "default_true")]
    pub dedupe_in_flight: bool,

    #[serde(default)]
    pub viewport: ViewportConfig,
}

/// Browser viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ViewportConfig {
    #[serde(default = "default_viewport_width")]
    pub width: u32,
    #[serde(default = "default_viewport_height")]
    pub height: u32,
}

/// Job queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Path to the SQLite queue database; in-memory when absent
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,

    /// Attempts before a job is marked failed
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential retry backoff (milliseconds)
    #[serde(rename = "initial-backoff", default = "default_initial_backoff")]
    pub initial_backoff: u64,

    /// Retries of a transient store error before it becomes fatal
    #[serde(rename = "transient-retries", default = "default_transient_retries")]
    pub transient_retries: u32,
}

/// Source registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Period of the validation sweep (seconds)
    #[serde(rename = "sweep-interval", default = "default_sweep_interval")]
    pub sweep_interval: u64,

    /// Liveness probe timeout (milliseconds)
    #[serde(rename = "probe-timeout", default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Validation interval for sources that don't set their own (seconds)
    #[serde(
        rename = "default-validation-interval",
        default = "default_validation_interval"
    )]
    pub default_validation_interval: u64,

    /// Probes in flight at once during a sweep
    #[serde(rename = "probe-concurrency", default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
}

/// Health endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_health_bind")]
    pub bind: SocketAddr,
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// JSON-lines file receiving extracted content; log-only when absent
    #[serde(rename = "content-path", default)]
    pub content_path: Option<String>,
}

/// A crawl target as written in the configuration file
///
/// Fields stay raw here; the registry parses and validates them on load.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSeed {
    pub id: String,

    pub name: String,

    #[serde(rename = "content-type")]
    pub content_type: String,

    pub url: String,

    /// Seconds between liveness probes
    #[serde(rename = "validation-interval", default)]
    pub validation_interval: Option<u64>,

    #[serde(default)]
    pub active: Option<bool>,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout)
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scrapes: default_max_concurrent_scrapes(),
            request_delay: default_request_delay(),
            schedule_interval: default_schedule_interval(),
            poll_interval: default_poll_interval(),
            navigation_timeout: default_navigation_timeout(),
            user_agents: default_user_agents(),
            dedupe_in_flight: true,
            viewport: ViewportConfig::default(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: default_viewport_width(),
            height: default_viewport_height(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            transient_retries: default_transient_retries(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            probe_timeout: default_probe_timeout(),
            default_validation_interval: default_validation_interval(),
            probe_concurrency: default_probe_concurrency(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_health_bind(),
        }
    }
}

fn default_max_concurrent_scrapes() -> u32 {
    50
}

fn default_request_delay() -> u64 {
    2000
}

fn default_schedule_interval() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_navigation_timeout() -> u64 {
    30_000
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".to_string(),
        "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".to_string(),
    ]
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    5000
}

fn default_transient_retries() -> u32 {
    3
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_probe_timeout() -> u64 {
    5000
}

fn default_validation_interval() -> u64 {
    3600
}

fn default_probe_concurrency() -> usize {
    8
}

fn default_health_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_true() -> bool {
    true
}
