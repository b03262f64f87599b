//! Source registry
//!
//! The registry owns the map of sources keyed by id. Probes always run
//! outside the lock; results are committed afterwards and only if the source
//! still exists with the URL that was probed.

use crate::config::{RegistryConfig, SourceSeed};
use crate::source::probe::{check_liveness, LivenessProbe};
use crate::source::{Source, SourcePatch};
use crate::{ConfigError, RegistryError, ValidationError};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use url::Url;

/// Outcome counts of one validation sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sources that were due and got probed
    pub probed: usize,
    /// Probed sources now active
    pub alive: usize,
    /// Probed sources now inactive
    pub dead: usize,
    /// Sources that flipped from active to inactive in this sweep
    pub deactivated: usize,
    /// Sources not yet due, left untouched
    pub skipped: usize,
}

/// The authoritative set of crawl targets
pub struct SourceRegistry {
    sources: RwLock<BTreeMap<String, Source>>,
    probe: Arc<dyn LivenessProbe>,
    default_interval: Duration,
    probe_concurrency: usize,
}

impl SourceRegistry {
    /// Creates an empty registry
    pub fn new(probe: Arc<dyn LivenessProbe>, config: &RegistryConfig) -> Self {
        Self {
            sources: RwLock::new(BTreeMap::new()),
            probe,
            default_interval: Duration::from_secs(config.default_validation_interval),
            probe_concurrency: config.probe_concurrency.max(1),
        }
    }

    /// Creates an empty registry with default intervals
    pub fn with_probe(probe: Arc<dyn LivenessProbe>) -> Self {
        Self::new(probe, &RegistryConfig::default())
    }

    // Every write replaces whole `Source` values, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Source>> {
        self.sources.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Source>> {
        self.sources.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds the registry
    ///
    /// All seeds are validated before any is inserted, so a malformed entry
    /// leaves the registry unchanged.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of sources loaded
    /// * `Err(ConfigError)` - A seed was malformed or reused an id
    pub fn load(&self, seeds: &[SourceSeed]) -> Result<usize, ConfigError> {
        let mut parsed = Vec::with_capacity(seeds.len());
        for seed in seeds {
            parsed.push(Source::from_seed(seed, self.default_interval)?);
        }

        let mut sources = self.write();
        let mut incoming = std::collections::HashSet::new();
        for source in &parsed {
            if sources.contains_key(&source.id) || !incoming.insert(source.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate source id '{}'",
                    source.id
                )));
            }
        }

        let count = parsed.len();
        for source in parsed {
            sources.insert(source.id.clone(), source);
        }

        tracing::info!("Loaded {} sources into registry", count);
        Ok(count)
    }

    /// Re-validates every source that is due, using the current time
    pub async fn validate_sweep(&self) -> SweepReport {
        self.validate_sweep_at(Utc::now()).await
    }

    /// Re-validates every source whose interval has elapsed at `now`
    ///
    /// Sources not yet due keep their active flag. Probe failures deactivate
    /// the source and are logged; they never surface as errors.
    pub async fn validate_sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let (due, skipped): (Vec<Source>, usize) = {
            let sources = self.read();
            let due: Vec<Source> = sources.values().filter(|s| s.is_due(now)).cloned().collect();
            let skipped = sources.len() - due.len();
            (due, skipped)
        };

        let probe = self.probe.clone();
        let results: Vec<(String, Url, Result<u16, ValidationError>)> = stream::iter(due)
            .map(|source| {
                let probe = probe.clone();
                async move {
                    let result = check_liveness(probe.as_ref(), &source.url).await;
                    (source.id, source.url, result)
                }
            })
            .buffer_unordered(self.probe_concurrency)
            .collect()
            .await;

        let mut report = SweepReport {
            skipped,
            ..Default::default()
        };

        let mut sources = self.write();
        for (id, probed_url, result) in results {
            let Some(source) = sources.get_mut(&id) else {
                tracing::debug!(source_id = %id, "Source removed during sweep, dropping probe result");
                continue;
            };

            if source.url != probed_url {
                tracing::debug!(source_id = %id, "Source URL changed during sweep, dropping probe result");
                continue;
            }

            report.probed += 1;
            match result {
                Ok(status) => {
                    if !source.active {
                        tracing::info!(source_id = %id, url = %probed_url, status, "Source is reachable again");
                    }
                    source.active = true;
                    source.last_validated = Some(now);
                    source.last_error = None;
                    report.alive += 1;
                }
                Err(e) => {
                    if source.active {
                        report.deactivated += 1;
                    }
                    tracing::warn!(
                        source_id = %id,
                        url = %probed_url,
                        error = %e,
                        "Source failed liveness probe, marking inactive"
                    );
                    source.active = false;
                    source.last_error = Some(e.to_string());
                    report.dead += 1;
                }
            }
        }

        tracing::debug!(
            "Validation sweep: {} probed, {} alive, {} dead, {} skipped",
            report.probed,
            report.alive,
            report.dead,
            report.skipped
        );

        report
    }

    /// Registers a new source if its probe succeeds
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Source was reachable and is now registered and active
    /// * `Ok(false)` - Probe failed; nothing was registered
    /// * `Err(RegistryError)` - Malformed source or id already taken
    pub async fn add_source(&self, seed: &SourceSeed) -> Result<bool, RegistryError> {
        self.add_source_at(seed, Utc::now()).await
    }

    pub async fn add_source_at(
        &self,
        seed: &SourceSeed,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        let mut source = Source::from_seed(seed, self.default_interval)?;

        if self.read().contains_key(&source.id) {
            return Err(RegistryError::Duplicate(source.id));
        }

        if let Err(e) = check_liveness(self.probe.as_ref(), &source.url).await {
            tracing::warn!(source_id = %source.id, url = %source.url, error = %e, "Rejected new source");
            return Ok(false);
        }

        source.active = true;
        source.last_validated = Some(now);

        let mut sources = self.write();
        if sources.contains_key(&source.id) {
            return Err(RegistryError::Duplicate(source.id));
        }
        tracing::info!(source_id = %source.id, url = %source.url, "Registered source");
        sources.insert(source.id.clone(), source);
        Ok(true)
    }

    /// Merges `patch` into an existing source after re-validating it
    ///
    /// On probe failure the patch is discarded and the prior state remains.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Patched source was reachable and has been committed
    /// * `Ok(false)` - Probe failed; source unchanged
    /// * `Err(RegistryError)` - Unknown id or invalid patch
    pub async fn update_source(&self, id: &str, patch: &SourcePatch) -> Result<bool, RegistryError> {
        self.update_source_at(id, patch, Utc::now()).await
    }

    pub async fn update_source_at(
        &self,
        id: &str,
        patch: &SourcePatch,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        let current = self
            .get(id)
            .ok_or_else(|| RegistryError::UnknownSource(id.to_string()))?;

        let mut merged = patch.apply_to(&current);
        if !matches!(merged.url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "'{}': unsupported scheme '{}'",
                merged.url,
                merged.url.scheme()
            ))
            .into());
        }
        if merged.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!("source '{}' must have a name", id)).into());
        }
        if merged.validation_interval.is_zero() {
            return Err(ConfigError::Validation(format!(
                "validation-interval for source '{}' must be >= 1s",
                id
            ))
            .into());
        }

        if let Err(e) = check_liveness(self.probe.as_ref(), &merged.url).await {
            tracing::warn!(source_id = %id, url = %merged.url, error = %e, "Discarded source update");
            return Ok(false);
        }

        merged.active = true;
        merged.last_validated = Some(now);
        merged.last_error = None;

        let mut sources = self.write();
        match sources.get_mut(id) {
            Some(slot) => {
                *slot = merged;
                tracing::info!(source_id = %id, "Updated source");
                Ok(true)
            }
            None => Err(RegistryError::UnknownSource(id.to_string())),
        }
    }

    /// Unconditionally removes a source
    ///
    /// The returned copy has its active flag cleared.
    pub fn remove_source(&self, id: &str) -> Option<Source> {
        let removed = self.write().remove(id).map(|mut source| {
            source.active = false;
            source
        });

        if removed.is_some() {
            tracing::info!(source_id = %id, "Removed source");
        }
        removed
    }

    /// Snapshot of the active sources, ordered by id
    pub fn active_sources(&self) -> Vec<Source> {
        self.read().values().filter(|s| s.active).cloned().collect()
    }

    /// Snapshot of every source, ordered by id
    pub fn sources(&self) -> Vec<Source> {
        self.read().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Source> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
