//! HTTP client for provider listings and file downloads

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HttpSettings;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("HTTP {code} from {url}")]
    Status { code: u16, url: String },

    #[error("Too many redirects")]
    TooManyRedirects,
}

impl DownloadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DownloadError::Status { code, .. } if *code == StatusCode::NOT_FOUND.as_u16())
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// Fetches remote bytes
#[async_trait]
pub trait DownloadExecutor: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub listing_timeout: Duration,
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry
    pub backoff_base: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&HttpSettings::default())
    }
}

impl From<&HttpSettings> for HttpConfig {
    fn from(settings: &HttpSettings) -> Self {
        Self {
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            listing_timeout: Duration::from_secs(settings.listing_timeout_secs),
            max_retries: settings.max_retries.max(1),
            backoff_base: Duration::from_secs(1),
            user_agent: settings.user_agent.clone(),
        }
    }
}

/// HTTP downloader
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Download a resource with retry
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.download_once(url, self.config.request_timeout).await {
                Ok(bytes) => {
                    if attempts > 1 {
                        debug!(url, attempts, "Download succeeded after retry");
                    }
                    return Ok(bytes);
                }
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) => {
                    if attempts >= self.config.max_retries {
                        warn!(url, attempts, error = %e, "Download failed after retries");
                        return Err(e);
                    }

                    warn!(url, attempts, error = %e, "Download failed, retrying");

                    // Exponential backoff: base, 2x base, 4x base
                    let backoff = self.config.backoff_base * 2u32.pow(attempts - 1);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Fetch a directory listing page once, under the short listing timeout
    pub async fn fetch_listing(&self, url: &str) -> Result<String> {
        let bytes = self.download_once(url, self.config.listing_timeout).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Download once (no retry)
    async fn download_once(&self, url: &str, timeout: Duration) -> Result<Bytes> {
        debug!(url, "Starting download");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DownloadError::Timeout
                } else if e.is_redirect() {
                    DownloadError::TooManyRedirects
                } else {
                    DownloadError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout
            } else {
                DownloadError::RequestFailed(format!("Failed to read body: {}", e))
            }
        })?;

        debug!(url, size = bytes.len(), "Download completed");

        Ok(bytes)
    }
}

#[async_trait]
impl DownloadExecutor for HttpClient {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.download(url).await
    }
}
