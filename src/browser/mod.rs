//! Browser automation contract
//!
//! The worker loop talks to a browser through three layers:
//! - `BrowserEngine` launches one shared session per worker loop run
//! - `BrowserSession` hands out isolated browsing contexts
//! - `BrowsingContext` navigates one page and runs one extraction
//!
//! Contexts never share cookies or storage with each other.

mod http;

pub use http::HttpBrowserEngine;

use crate::config::ViewportConfig;
use crate::crawler::ExtractionStrategy;
use crate::{BrowserError, ExtractionError, NavigationError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Window size handed to the engine at launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl From<&ViewportConfig> for Viewport {
    fn from(config: &ViewportConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Upper bound on loading the page
    pub timeout: Duration,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self, viewport: Viewport) -> Result<Arc<dyn BrowserSession>, BrowserError>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Opens a fresh context with its own cookies and storage
    async fn new_context(&self) -> Result<Box<dyn BrowsingContext>, BrowserError>;

    /// Tears the session down; later `new_context` calls fail with `Closed`
    async fn close(&self);
}

#[async_trait]
pub trait BrowsingContext: Send {
    /// Identity string sent with every request from this context
    async fn set_user_agent(&mut self, user_agent: &str);

    async fn navigate(&mut self, url: &Url, options: &NavigateOptions)
        -> Result<(), NavigationError>;

    /// Runs `strategy` against the loaded page and returns its raw result
    ///
    /// Script-capable engines evaluate `strategy.script()`; the value is
    /// decoded with `strategy.decode`.
    async fn evaluate(
        &mut self,
        strategy: ExtractionStrategy,
    ) -> Result<serde_json::Value, ExtractionError>;

    async fn close(self: Box<Self>);
}
