use crate::config::types::{Config, CrawlerConfig, QueueConfig, RegistryConfig, SourceSeed};
use crate::source::validate_seed;
use crate::ConfigError;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_queue_config(&config.queue)?;
    validate_registry_config(&config.registry)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_scrapes < 1 || config.max_concurrent_scrapes > 500 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-scrapes must be between 1 and 500, got {}",
            config.max_concurrent_scrapes
        )));
    }

    if config.schedule_interval < 1 {
        return Err(ConfigError::Validation(
            "schedule-interval must be >= 1s".to_string(),
        ));
    }

    if config.poll_interval < 10 {
        return Err(ConfigError::Validation(format!(
            "poll-interval must be >= 10ms, got {}ms",
            config.poll_interval
        )));
    }

    if config.navigation_timeout < 100 {
        return Err(ConfigError::Validation(format!(
            "navigation-timeout must be >= 100ms, got {}ms",
            config.navigation_timeout
        )));
    }

    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user-agents must contain at least one entry".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain blank entries".to_string(),
        ));
    }

    if config.viewport.width == 0 || config.viewport.height == 0 {
        return Err(ConfigError::Validation(format!(
            "viewport must be non-empty, got {}x{}",
            config.viewport.width, config.viewport.height
        )));
    }

    Ok(())
}

/// Upper bound on `initial-backoff` (one day)
const MAX_INITIAL_BACKOFF_MS: u64 = 86_400_000;

/// Validates queue configuration
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    // 2^max_attempts multiplies the backoff; keep it inside u64 milliseconds
    if config.max_attempts > 32 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be <= 32, got {}",
            config.max_attempts
        )));
    }

    if config.initial_backoff < 1 {
        return Err(ConfigError::Validation(
            "initial-backoff must be >= 1ms".to_string(),
        ));
    }

    if config.initial_backoff > MAX_INITIAL_BACKOFF_MS {
        return Err(ConfigError::Validation(format!(
            "initial-backoff must be <= {}ms, got {}",
            MAX_INITIAL_BACKOFF_MS, config.initial_backoff
        )));
    }

    if let Some(path) = &config.database_path {
        if path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database-path cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates registry configuration
fn validate_registry_config(config: &RegistryConfig) -> Result<(), ConfigError> {
    if config.sweep_interval < 1 {
        return Err(ConfigError::Validation(
            "sweep-interval must be >= 1s".to_string(),
        ));
    }

    if config.probe_timeout < 1 {
        return Err(ConfigError::Validation(
            "probe-timeout must be >= 1ms".to_string(),
        ));
    }

    if config.default_validation_interval < 1 {
        return Err(ConfigError::Validation(
            "default-validation-interval must be >= 1s".to_string(),
        ));
    }

    if config.probe_concurrency < 1 {
        return Err(ConfigError::Validation(
            "probe-concurrency must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates seed sources and rejects duplicate ids
fn validate_sources(sources: &[SourceSeed]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for seed in sources {
        validate_seed(seed)?;

        if !seen.insert(seed.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate source id '{}'",
                seed.id
            )));
        }
    }

    Ok(())
}
