//! Manifest discovery: list, dedup, stage, queue, record

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::discovery::{self, DiscoveredPdr, DiscoveryError, DiscoverySource};
use crate::config::{Catalog, ProviderDefinition};
use crate::ledger::{LifecycleError, LifecycleManager, NewManifest, PdrRecord, PdrStatus};
use crate::observability::Metrics;
use crate::queue::{MessageQueue, PdrMessage, QueueError};
use crate::storage::{StorageClient, StorageError};
use crate::worker::http::{DownloadError, DownloadExecutor, HttpClient};

/// Error text stored on manifests whose file could not be staged
pub const UNREACHABLE_PDR: &str = "PDR file was not reachable";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("Collection '{0}' has no provider")]
    CollectionWithoutProvider(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// What a discovery run lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryScope {
    /// The collection's provider; manifests are tagged with the collection
    Collection(String),
    Provider(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub found: usize,
    pub new: usize,
    pub queued: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct PdrIngest {
    lifecycle: LifecycleManager,
    queue: Arc<dyn MessageQueue>,
    storage: StorageClient,
    catalog: Arc<Catalog>,
    downloader: Arc<dyn DownloadExecutor>,
    pdr_queue: String,
    metrics: Arc<Metrics>,
}

impl PdrIngest {
    pub fn new(
        lifecycle: LifecycleManager,
        queue: Arc<dyn MessageQueue>,
        storage: StorageClient,
        catalog: Arc<Catalog>,
        downloader: Arc<dyn DownloadExecutor>,
        pdr_queue: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            lifecycle,
            queue,
            storage,
            catalog,
            downloader,
            pdr_queue: pdr_queue.into(),
            metrics,
        }
    }

    /// Provider to list and the collection tag for its manifests
    pub fn resolve(
        &self,
        scope: &DiscoveryScope,
    ) -> Result<(Arc<ProviderDefinition>, Option<String>)> {
        match scope {
            DiscoveryScope::Provider(name) => {
                let provider = self
                    .catalog
                    .provider(name)
                    .ok_or_else(|| IngestError::UnknownProvider(name.clone()))?;
                Ok((provider, None))
            }
            DiscoveryScope::Collection(name) => {
                let collection = self
                    .catalog
                    .collection(name)
                    .ok_or_else(|| IngestError::UnknownCollection(name.clone()))?;
                let provider_name = collection
                    .provider
                    .as_deref()
                    .ok_or_else(|| IngestError::CollectionWithoutProvider(name.clone()))?;
                let provider = self
                    .catalog
                    .provider(provider_name)
                    .ok_or_else(|| IngestError::UnknownProvider(provider_name.to_string()))?;
                Ok((provider, Some(collection.name.clone())))
            }
        }
    }

    /// List the provider of `scope` over its configured transport
    pub async fn discover(
        &self,
        scope: &DiscoveryScope,
        client: Arc<HttpClient>,
    ) -> Result<DiscoveryReport> {
        let (provider, collection) = self.resolve(scope)?;
        let source = discovery::source_for(&provider, client);
        self.discover_with(source.as_ref(), &provider, collection.as_deref())
            .await
    }

    /// Discovery against an explicit listing source
    pub async fn discover_with(
        &self,
        source: &dyn DiscoverySource,
        provider: &ProviderDefinition,
        collection: Option<&str>,
    ) -> Result<DiscoveryReport> {
        if !self.lifecycle.provider_is_active(&provider.name).await? {
            warn!(provider = %provider.name, "Provider is marked inactive, listing anyway");
        }

        let found = match source.discover().await {
            Ok(found) => found,
            Err(e @ DiscoveryError::NotFound { .. }) => {
                self.lifecycle
                    .deactivate_provider(&provider.name, &e.to_string())
                    .await?;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut report = DiscoveryReport {
            found: found.len(),
            ..Default::default()
        };
        let fresh = self
            .lifecycle
            .find_new_manifests(found, |pdr| pdr.name.as_str())
            .await?;
        report.new = fresh.len();

        for pdr in &fresh {
            let record = self
                .upload_and_queue(pdr, &provider.name, collection)
                .await?;
            if record.status == PdrStatus::Failed {
                report.failed += 1;
            } else {
                report.queued += 1;
            }
        }

        info!(
            provider = %provider.name,
            found = report.found,
            new = report.new,
            queued = report.queued,
            failed = report.failed,
            "Discovery finished"
        );
        Ok(report)
    }

    /// Stage one manifest, queue it for parsing and record it
    ///
    /// A manifest whose file cannot be fetched is recorded as failed and not
    /// queued. One that cannot be queued is failed too, so no record is left
    /// `discovered` without a message behind it.
    pub async fn upload_and_queue(
        &self,
        pdr: &DiscoveredPdr,
        provider_name: &str,
        collection_name: Option<&str>,
    ) -> Result<PdrRecord> {
        let key = self.storage.pdr_key(&pdr.name);
        let mut manifest = NewManifest {
            pdr_name: pdr.name.clone(),
            original_url: pdr.url.clone(),
            provider_name: provider_name.to_string(),
            collection_name: collection_name.map(str::to_string),
            address: None,
        };

        if let Err(e) = self.stage(pdr, &key).await {
            warn!(pdr_name = %pdr.name, url = %pdr.url, error = %e, "Could not stage manifest");
            self.metrics.pdr_failed();
            return Ok(self
                .lifecycle
                .record_manifest(manifest, Some(UNREACHABLE_PDR.to_string()))
                .await?);
        }

        manifest.address = Some(self.storage.uri(&key));
        self.lifecycle.record_manifest(manifest, None).await?;

        let message = PdrMessage {
            pdr_name: pdr.name.clone(),
            provider_name: provider_name.to_string(),
            url: pdr.url.clone(),
            address: key,
            collection_name: collection_name.map(str::to_string),
        };
        if let Err(e) = self.queue.send_message(&self.pdr_queue, &message).await {
            warn!(pdr_name = %pdr.name, error = %e, "Could not queue manifest");
            self.metrics.pdr_failed();
            return Ok(self
                .lifecycle
                .fail_manifest(&pdr.name, &format!("Failed to queue manifest: {e}"))
                .await?);
        }

        let record = self
            .lifecycle
            .advance_manifest_status(&pdr.name, PdrStatus::Queued)
            .await?;
        self.metrics.pdr_discovered();
        info!(pdr_name = %pdr.name, "Manifest queued");
        Ok(record)
    }

    async fn stage(&self, pdr: &DiscoveredPdr, key: &str) -> Result<()> {
        let bytes = self.downloader.fetch(&pdr.url).await?;
        self.storage.upload(key, bytes).await?;
        Ok(())
    }
}
