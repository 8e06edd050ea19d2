// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::transport::traits::{FetchStatus, Transport, TransportError};
use crate::utils::atomic_file::PartFile;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// HTTP transport with retries and conditional requests
pub struct HttpTransport {
    client: Client,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration, max_attempts: u32) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gem-mirror/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            max_attempts: max_attempts.max(1),
            retry_base_delay: Duration::from_secs(1),
        })
    }

    /// Base of the exponential back-off between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    async fn fetch_once(&self, url: &str, destination: &Path) -> Result<FetchStatus, TransportError> {
        let mut request = self.client.get(url);
        if let Some(since) = modified_since(destination).await {
            request = request.header(IF_MODIFIED_SINCE, since);
        }

        let mut response = request.send().await.map_err(|e| network(url, e))?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!(url = %url, "Not modified");
            return Ok(FetchStatus::NotModified);
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(TransportError::NotFound { url: url.to_string() });
        }
        if !status.is_success() {
            return Err(TransportError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_http_date);

        let write_error = |source| TransportError::Write {
            path: destination.to_path_buf(),
            source,
        };

        let mut part = PartFile::create(destination).await.map_err(write_error)?;
        while let Some(chunk) = response.chunk().await.map_err(|e| network(url, e))? {
            part.write(&chunk).await.map_err(write_error)?;
        }
        let bytes = part.commit(last_modified).await.map_err(write_error)?;

        debug!(url = %url, path = %destination.display(), bytes, "Fetched");
        Ok(FetchStatus::Downloaded { bytes })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<FetchStatus, TransportError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url, destination).await {
                Ok(status) => {
                    if attempt > 1 {
                        info!(url = %url, attempt, "Fetch succeeded after retry");
                    }
                    return Ok(status);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(url = %url, attempt, error = %e, "Fetch attempt failed");
                    tokio::time::sleep(backoff(self.retry_base_delay, attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Delay before retrying after failed attempt number `attempt`, doubling each time
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

fn network(url: &str, error: reqwest::Error) -> TransportError {
    TransportError::Network {
        url: url.to_string(),
        message: error.to_string(),
    }
}

async fn modified_since(destination: &Path) -> Option<String> {
    let modified = tokio::fs::metadata(destination).await.ok()?.modified().ok()?;
    Some(format_http_date(modified))
}

fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}

fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| SystemTime::from(date.with_timezone(&Utc)))
}
