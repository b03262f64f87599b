//! Shared fixtures for the integration tests

use async_trait::async_trait;
use driftnet::browser::{
    BrowserEngine, BrowserSession, BrowsingContext, NavigateOptions, Viewport,
};
use driftnet::config::SourceSeed;
use driftnet::crawler::ExtractionStrategy;
use driftnet::source::LivenessProbe;
use driftnet::{BrowserError, ExtractionError, NavigationError, ValidationError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub fn seed(id: &str, content_type: &str, url: &str) -> SourceSeed {
    SourceSeed {
        id: id.to_string(),
        name: format!("Source {}", id),
        content_type: content_type.to_string(),
        url: url.to_string(),
        validation_interval: None,
        active: None,
    }
}

/// Probe answering from a per-URL status table; unknown URLs are unreachable
#[derive(Default)]
pub struct TableProbe {
    statuses: Mutex<HashMap<String, u16>>,
    calls: AtomicUsize,
}

impl TableProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, status: u16) {
        let url = Url::parse(url).unwrap().to_string();
        self.statuses.lock().unwrap().insert(url, status);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for TableProbe {
    async fn probe(&self, url: &Url) -> Result<u16, ValidationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.statuses.lock().unwrap().get(url.as_str()) {
            Some(status) => Ok(*status),
            None => Err(ValidationError::Request {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// What every page served by a `FakeEngine` does
#[derive(Clone)]
pub enum PageBehavior {
    /// Navigation fails with the given HTTP status
    Status(u16),
    /// Navigation succeeds and `evaluate` returns the value
    Value(serde_json::Value),
    /// Like `Value`, but navigation takes a while
    Slow(Duration, serde_json::Value),
}

/// Counters shared between a `FakeEngine` and the test that owns it
#[derive(Default)]
pub struct EngineLog {
    pub launches: AtomicUsize,
    pub navigations: AtomicUsize,
    pub open_contexts: AtomicUsize,
    pub session_closed: AtomicBool,
    pub user_agents: Mutex<Vec<String>>,
}

impl EngineLog {
    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    pub fn open_contexts(&self) -> usize {
        self.open_contexts.load(Ordering::SeqCst)
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }
}

/// Scriptable in-process browser
pub struct FakeEngine {
    behavior: PageBehavior,
    log: Arc<EngineLog>,
}

impl FakeEngine {
    pub fn new(behavior: PageBehavior) -> (Arc<Self>, Arc<EngineLog>) {
        let log = Arc::new(EngineLog::default());
        let engine = Arc::new(Self {
            behavior,
            log: Arc::clone(&log),
        });
        (engine, log)
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn launch(&self, _viewport: Viewport) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            behavior: self.behavior.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSession {
    behavior: PageBehavior,
    log: Arc<EngineLog>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_context(&self) -> Result<Box<dyn BrowsingContext>, BrowserError> {
        if self.log.session_closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        self.log.open_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            behavior: self.behavior.clone(),
            log: Arc::clone(&self.log),
            user_agent: None,
        }))
    }

    async fn close(&self) {
        self.log.session_closed.store(true, Ordering::SeqCst);
    }
}

struct FakeContext {
    behavior: PageBehavior,
    log: Arc<EngineLog>,
    user_agent: Option<String>,
}

#[async_trait]
impl BrowsingContext for FakeContext {
    async fn set_user_agent(&mut self, user_agent: &str) {
        self.user_agent = Some(user_agent.to_string());
    }

    async fn navigate(
        &mut self,
        url: &Url,
        _options: &NavigateOptions,
    ) -> Result<(), NavigationError> {
        self.log.navigations.fetch_add(1, Ordering::SeqCst);
        if let Some(user_agent) = &self.user_agent {
            self.log.user_agents.lock().unwrap().push(user_agent.clone());
        }

        match &self.behavior {
            PageBehavior::Status(status) => Err(NavigationError::Status {
                url: url.to_string(),
                status: *status,
            }),
            PageBehavior::Value(_) => Ok(()),
            PageBehavior::Slow(delay, _) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
        }
    }

    async fn evaluate(
        &mut self,
        _strategy: ExtractionStrategy,
    ) -> Result<serde_json::Value, ExtractionError> {
        match &self.behavior {
            PageBehavior::Value(value) | PageBehavior::Slow(_, value) => Ok(value.clone()),
            PageBehavior::Status(_) => Err(ExtractionError::NoPage),
        }
    }

    async fn close(self: Box<Self>) {
        self.log.open_contexts.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Polls `check` every 10ms until it holds or `limit` runs out
pub async fn wait_for<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
