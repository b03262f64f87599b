//! Crawl targets and their liveness
//!
//! This module owns everything about sources:
//! - The `Source` model and its content-type tag
//! - `SourceRegistry`, the authoritative set of sources and their active flags
//! - `LivenessProbe`, the bounded-timeout reachability check behind validation
//! - `ValidationTicker`, the periodic sweep driver

mod probe;
mod registry;
mod validator;

pub use probe::{check_liveness, HttpProbe, LivenessProbe};
pub use registry::{SourceRegistry, SweepReport};
pub use validator::ValidationTicker;

use crate::config::SourceSeed;
use crate::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// The kind of content a source is crawled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Video,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Parses a content-type tag, returning None for anything outside the closed set
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered crawl target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: String,

    pub name: String,

    pub content_type: ContentType,

    pub url: Url,

    /// Only active sources are scheduled for crawling
    pub active: bool,

    /// When the last successful probe happened
    pub last_validated: Option<DateTime<Utc>>,

    /// Minimum time between probes of this source
    pub validation_interval: Duration,

    /// Error from the most recent failed probe, cleared on success
    pub last_error: Option<String>,
}

impl Source {
    /// Creates a new, never-validated source
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        content_type: ContentType,
        url: Url,
        validation_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content_type,
            url,
            active: false,
            last_validated: None,
            validation_interval,
            last_error: None,
        }
    }

    /// Builds a source from its configuration form
    ///
    /// Seeds start active unless they say otherwise, and are due for a probe
    /// on the first sweep.
    pub fn from_seed(seed: &SourceSeed, default_interval: Duration) -> Result<Self, ConfigError> {
        validate_seed(seed)?;

        let content_type = ContentType::parse(&seed.content_type)
            .ok_or_else(|| ConfigError::UnsupportedContentType(seed.content_type.clone()))?;
        let url = parse_source_url(&seed.url)?;
        let interval = seed
            .validation_interval
            .map(Duration::from_secs)
            .unwrap_or(default_interval);

        let mut source = Source::new(seed.id.trim(), seed.name.trim(), content_type, url, interval);
        source.active = seed.active.unwrap_or(true);
        Ok(source)
    }

    /// Checks whether the source needs a fresh probe at `now`
    ///
    /// Never-validated sources are always due. A `last_validated` in the
    /// future (clock skew) counts as not due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_validated {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= self.validation_interval,
                Err(_) => false,
            },
        }
    }
}

/// Partial update for an existing source
#[derive(Debug, Clone, Default)]
pub struct SourcePatch {
    pub name: Option<String>,
    pub content_type: Option<ContentType>,
    pub url: Option<Url>,
    pub validation_interval: Option<Duration>,
}

impl SourcePatch {
    /// Returns a copy of `source` with every set field replaced
    pub fn apply_to(&self, source: &Source) -> Source {
        let mut merged = source.clone();
        if let Some(name) = &self.name {
            merged.name = name.clone();
        }
        if let Some(content_type) = self.content_type {
            merged.content_type = content_type;
        }
        if let Some(url) = &self.url {
            merged.url = url.clone();
        }
        if let Some(interval) = self.validation_interval {
            merged.validation_interval = interval;
        }
        merged
    }
}

/// Validates a seed source without building it
pub fn validate_seed(seed: &SourceSeed) -> Result<(), ConfigError> {
    let id = seed.id.trim();
    if id.is_empty() {
        return Err(ConfigError::Validation(
            "source id cannot be empty".to_string(),
        ));
    }

    if id.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "source id '{}' cannot contain whitespace",
            id
        )));
    }

    if seed.name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "source '{}' must have a name",
            id
        )));
    }

    if ContentType::parse(&seed.content_type).is_none() {
        return Err(ConfigError::UnsupportedContentType(format!(
            "'{}' for source '{}'",
            seed.content_type, id
        )));
    }

    if seed.validation_interval == Some(0) {
        return Err(ConfigError::Validation(format!(
            "validation-interval for source '{}' must be >= 1s",
            id
        )));
    }

    parse_source_url(&seed.url)?;

    Ok(())
}

/// Parses a source URL, accepting only http and https
pub fn parse_source_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidUrl(format!("'{}': {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl(format!(
            "'{}': unsupported scheme '{}'",
            raw, other
        ))),
    }
}
