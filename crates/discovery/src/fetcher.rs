//! Discovery endpoint client

use crate::error::{FetchError, PollerError};
use async_trait::async_trait;
use sdpoller_common::MetricsSink;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// A source of raw discovery responses.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Location shown in log lines.
    fn url(&self) -> &str;

    /// Fetch one response body. Never retries.
    async fn fetch(&self) -> Result<Vec<u8>, FetchError>;
}

/// Fetches the target list with a single bounded GET per call.
///
/// Every call observes its latency on the metrics sink, failures included,
/// and failed calls also increment the failure counter.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: Url,
    metrics: Arc<dyn MetricsSink>,
}

impl HttpFetcher {
    pub fn new(
        url: &str,
        timeout: Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, PollerError> {
        let url = Url::parse(url).map_err(|e| PollerError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PollerError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sdpoller/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PollerError::Client)?;

        Ok(Self {
            client,
            url,
            metrics,
        })
    }

    async fn get(&self) -> Result<Vec<u8>, FetchError> {
        let url = self.url.as_str();
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|source| request_error(url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| {
            if source.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    source,
                }
            }
        })?;
        Ok(body.to_vec())
    }
}

fn request_error(url: &str, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            source,
        }
    }
}

#[async_trait]
impl DiscoverySource for HttpFetcher {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        let start = Instant::now();
        let result = self.get().await;
        let elapsed = start.elapsed();

        self.metrics.observe_fetch_latency(elapsed);

        match &result {
            Ok(body) => debug!(
                "Fetched {} bytes from {} in {:?}",
                body.len(),
                self.url,
                elapsed
            ),
            Err(e) => {
                self.metrics.increment_fetch_failure();
                debug!("Fetch from {} failed after {:?}: {}", self.url, elapsed, e);
            }
        }

        result
    }
}
