//! Liveness probing for sources
//!
//! A probe is a lightweight HEAD request with a bounded timeout. Anything
//! below HTTP 400 counts as alive.

use crate::ValidationError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Reachability check used by the registry
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Probes `url` and returns the response status code
    ///
    /// Transport failures (timeout, connection, TLS) are errors; HTTP error
    /// statuses are returned as codes and judged by the caller.
    async fn probe(&self, url: &Url) -> Result<u16, ValidationError>;
}

/// Probes `url` and maps the outcome to alive / not alive
pub async fn check_liveness(probe: &dyn LivenessProbe, url: &Url) -> Result<u16, ValidationError> {
    let status = probe.probe(url).await?;
    if status < 400 {
        Ok(status)
    } else {
        Err(ValidationError::Status {
            url: url.to_string(),
            status,
        })
    }
}

/// HEAD-request probe over reqwest
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Builds a probe whose requests give up after `timeout`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use driftnet::source::HttpProbe;
    /// use std::time::Duration;
    ///
    /// let probe = HttpProbe::new(Duration::from_secs(5), "driftnet/0.1").unwrap();
    /// ```
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn probe(&self, url: &Url) -> Result<u16, ValidationError> {
        match self.client.head(url.clone()).send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) if e.is_timeout() => Err(ValidationError::Timeout {
                url: url.to_string(),
            }),
            Err(e) => Err(ValidationError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
