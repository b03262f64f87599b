//! Static-DOM browser engine
//!
//! Loads pages with `reqwest` and extracts from the served HTML with
//! `scraper`. Nothing on the page is executed, so content injected by
//! scripts is invisible to it and video durations are never known.

use crate::browser::{BrowserEngine, BrowserSession, BrowsingContext, NavigateOptions, Viewport};
use crate::crawler::ExtractionStrategy;
use crate::{BrowserError, ExtractionError, NavigationError};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Elements whose text is never rendered
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Engine that fetches pages over plain HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpBrowserEngine;

impl HttpBrowserEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserEngine for HttpBrowserEngine {
    async fn launch(&self, viewport: Viewport) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        tracing::debug!(
            width = viewport.width,
            height = viewport.height,
            "Launched HTTP browser session"
        );
        Ok(Arc::new(HttpSession {
            closed: AtomicBool::new(false),
        }))
    }
}

struct HttpSession {
    closed: AtomicBool,
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn new_context(&self) -> Result<Box<dyn BrowsingContext>, BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        Ok(Box::new(HttpContext::default()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A loaded document
struct Page {
    url: Url,
    html: String,
}

/// One isolated context; the client (and its cookie jar) lives and dies with it
#[derive(Default)]
struct HttpContext {
    user_agent: Option<String>,
    client: Option<Client>,
    page: Option<Page>,
}

impl HttpContext {
    fn client(&mut self, options: &NavigateOptions) -> Result<Client, reqwest::Error> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .cookie_store(true)
            .timeout(options.timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .brotli(true);
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        let client = builder.build()?;
        self.client = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl BrowsingContext for HttpContext {
    async fn set_user_agent(&mut self, user_agent: &str) {
        if self.user_agent.as_deref() != Some(user_agent) {
            self.user_agent = Some(user_agent.to_string());
            // Rebuilt on the next navigation with the new identity
            self.client = None;
        }
    }

    async fn navigate(
        &mut self,
        url: &Url,
        options: &NavigateOptions,
    ) -> Result<(), NavigationError> {
        self.page = None;

        let client = self.client(options).map_err(|e| NavigationError::Load {
            url: url.to_string(),
            message: format!("failed to build client: {}", e),
        })?;

        let response = client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                NavigationError::Timeout {
                    url: url.to_string(),
                }
            } else {
                NavigationError::Load {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(NavigationError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| {
            if e.is_timeout() {
                NavigationError::Timeout {
                    url: url.to_string(),
                }
            } else {
                NavigationError::Load {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        self.page = Some(Page {
            url: final_url,
            html,
        });
        Ok(())
    }

    async fn evaluate(&mut self, strategy: ExtractionStrategy) -> Result<Value, ExtractionError> {
        let page = self.page.as_ref().ok_or(ExtractionError::NoPage)?;
        extract_static(strategy, &page.html, &page.url)
    }

    async fn close(self: Box<Self>) {}
}

/// Produces the JSON `strategy.script()` would return, from static HTML
pub(crate) fn extract_static(
    strategy: ExtractionStrategy,
    html: &str,
    base_url: &Url,
) -> Result<Value, ExtractionError> {
    let document = Html::parse_document(html);

    match strategy {
        ExtractionStrategy::Text => Ok(Value::String(visible_text(&document))),
        ExtractionStrategy::Images => {
            let selector = parse_selector("img[src]")?;
            let images: Vec<Value> = document
                .select(&selector)
                .filter_map(|img| {
                    let src = resolve_src(img.value().attr("src")?, base_url)?;
                    Some(json!({
                        "src": src,
                        "alt": img.value().attr("alt"),
                        "width": dimension(img, "width"),
                        "height": dimension(img, "height"),
                    }))
                })
                .collect();
            Ok(Value::Array(images))
        }
        ExtractionStrategy::Videos => {
            let video_selector = parse_selector("video")?;
            let source_selector = parse_selector("source[src]")?;
            let videos: Vec<Value> = document
                .select(&video_selector)
                .filter_map(|video| {
                    let source = video.select(&source_selector).next();
                    let raw = video
                        .value()
                        .attr("src")
                        .or_else(|| source.and_then(|s| s.value().attr("src")))?;
                    let src = resolve_src(raw, base_url)?;
                    let mime_type = source.and_then(|s| s.value().attr("type"));
                    Some(json!({
                        "src": src,
                        "mime_type": mime_type,
                        "duration": Value::Null,
                    }))
                })
                .collect();
            Ok(Value::Array(videos))
        }
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector)
        .map_err(|e| ExtractionError::Script(format!("bad selector '{}': {:?}", selector, e)))
}

/// Text of the body, skipping elements that never render
fn visible_text(document: &Html) -> String {
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());

    let mut chunks = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if !words.is_empty() {
            chunks.push(words.join(" "));
        }
    }

    chunks.join("\n")
}

fn dimension(element: ElementRef<'_>, attr: &str) -> Option<u32> {
    element
        .value()
        .attr(attr)
        .and_then(|value| value.trim().trim_end_matches("px").parse().ok())
}

/// Resolves a media `src` against the page URL
fn resolve_src(src: &str, base_url: &Url) -> Option<String> {
    let src = src.trim();
    if src.is_empty() {
        return None;
    }

    match base_url.join(src) {
        Ok(absolute) => match absolute.scheme() {
            "http" | "https" | "data" | "blob" => Some(absolute.to_string()),
            _ => None,
        },
        Err(_) => None,
    }
}
