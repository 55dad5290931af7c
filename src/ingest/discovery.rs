//! Listing provider endpoints for manifest files

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::debug;

use crate::config::{ProviderDefinition, Transport, join_url};
use crate::worker::http::{DownloadError, HttpClient};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Listing {url} timed out")]
    Timeout { url: String },

    #[error("Listing {url} not found")]
    NotFound { url: String },

    #[error("Listing {url} returned HTTP {code}")]
    Status { url: String, code: u16 },

    #[error("Listing {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Transport '{0:?}' is not implemented")]
    Unimplemented(Transport),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// A manifest file found on a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPdr {
    pub name: String,
    pub url: String,
}

#[async_trait]
pub trait DiscoverySource: Send + Sync {
    async fn discover(&self) -> Result<Vec<DiscoveredPdr>>;
}

static PDR_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a href="([^"]*PDR)""#).expect("static regex"));

/// Manifest links on an HTML index page, deduplicated, in page order
pub fn scrape_pdr_links(html: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PDR_LINK.captures_iter(html) {
        let href = &caps[1];
        let name = href.rsplit('/').next().unwrap_or(href).to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// HTTP directory index of a provider
pub struct HttpListing {
    client: Arc<HttpClient>,
    endpoint: String,
}

impl HttpListing {
    pub fn new(client: Arc<HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DiscoverySource for HttpListing {
    async fn discover(&self) -> Result<Vec<DiscoveredPdr>> {
        let url = self.endpoint.clone();
        let html = self.client.fetch_listing(&url).await.map_err(|e| match e {
            DownloadError::Timeout => DiscoveryError::Timeout { url: url.clone() },
            DownloadError::Status { code: 404, .. } => DiscoveryError::NotFound { url: url.clone() },
            DownloadError::Status { code, .. } => DiscoveryError::Status {
                url: url.clone(),
                code,
            },
            other => DiscoveryError::Request {
                url: url.clone(),
                message: other.to_string(),
            },
        })?;

        let found: Vec<DiscoveredPdr> = scrape_pdr_links(&html)
            .into_iter()
            .map(|name| DiscoveredPdr {
                url: join_url(&url, &name),
                name,
            })
            .collect();
        debug!(url = %url, count = found.len(), "Listing scraped");
        Ok(found)
    }
}

/// Stand-in for transports without a client
pub struct UnimplementedSource(pub Transport);

#[async_trait]
impl DiscoverySource for UnimplementedSource {
    async fn discover(&self) -> Result<Vec<DiscoveredPdr>> {
        Err(DiscoveryError::Unimplemented(self.0))
    }
}

/// Listing source for a provider's transport
pub fn source_for(provider: &ProviderDefinition, client: Arc<HttpClient>) -> Arc<dyn DiscoverySource> {
    match provider.transport {
        Transport::Http => Arc::new(HttpListing::new(client, provider.endpoint())),
        other => Arc::new(UnimplementedSource(other)),
    }
}
