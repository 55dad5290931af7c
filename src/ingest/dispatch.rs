//! Fan-out of manifest file groups into queued file transfers
//!
//! Groups are processed in chunks of `concurrency`. The groups of one chunk
//! run concurrently and the next chunk starts only after every group of the
//! current one has settled. The first group error fails the manifest and
//! stops the dispatch. Completion of a manifest is only judged once it is
//! parsed, so granules finishing mid-dispatch never deactivate it early.

use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::classifier::{ClassifyError, classify};
use super::granule::{self, BuildError, DiscoveredFile};
use crate::config::{
    Catalog, CollectionDefinition, ProviderDefinition, UnmatchedFilePolicy, join_url,
};
use crate::ledger::{GranuleKey, LifecycleError, LifecycleManager, PdrRecord, PdrStatus};
use crate::observability::Metrics;
use crate::pdr::{FileGroup, Manifest};
use crate::queue::{FileTransfer, GranuleDispatch, MessageQueue, QueueError};
use crate::storage::StorageClient;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Failed to enqueue: {0}")]
    Queue(#[from] QueueError),

    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// How the collection of each file group is found
#[derive(Debug, Clone)]
pub enum DispatchTarget {
    /// Every group belongs to this collection
    Collection(Arc<CollectionDefinition>),
    /// Classify each group's first file with the provider's pattern table
    Provider(Arc<ProviderDefinition>),
}

/// Hook around each chunk
pub trait DispatchObserver: Send + Sync {
    fn chunk_started(&self, _index: usize, _size: usize) {}
    fn chunk_settled(&self, _index: usize, _size: usize) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Group count of each chunk, in order
    pub chunks: Vec<usize>,
    pub granules_queued: usize,
    pub granules_skipped: usize,
    pub empty_groups: usize,
    pub files_queued: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupOutcome {
    Empty,
    AlreadyIngested,
    Queued { files: usize },
}

/// Queue names used by the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchQueues {
    pub files: String,
    pub granules: String,
}

#[derive(Clone)]
pub struct DispatchEngine {
    lifecycle: LifecycleManager,
    queue: Arc<dyn MessageQueue>,
    storage: StorageClient,
    catalog: Arc<Catalog>,
    queues: DispatchQueues,
    policy: UnmatchedFilePolicy,
    metrics: Arc<Metrics>,
    observer: Option<Arc<dyn DispatchObserver>>,
}

impl DispatchEngine {
    pub fn new(
        lifecycle: LifecycleManager,
        queue: Arc<dyn MessageQueue>,
        storage: StorageClient,
        catalog: Arc<Catalog>,
        queues: DispatchQueues,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            lifecycle,
            queue,
            storage,
            catalog,
            queues,
            policy: UnmatchedFilePolicy::default(),
            metrics,
            observer: None,
        }
    }

    pub fn with_policy(mut self, policy: UnmatchedFilePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Target implied by a manifest record: its collection when discovery was
    /// collection-driven, its provider otherwise
    pub fn target_for(&self, pdr: &PdrRecord) -> Result<DispatchTarget> {
        match pdr.collection_name {
            Some(ref name) => self
                .catalog
                .collection(name)
                .map(DispatchTarget::Collection)
                .ok_or_else(|| DispatchError::UnknownCollection(name.clone())),
            None => self
                .catalog
                .provider(&pdr.provider_name)
                .map(DispatchTarget::Provider)
                .ok_or_else(|| DispatchError::UnknownProvider(pdr.provider_name.clone())),
        }
    }

    /// Queue every file group of `manifest`, then mark it parsed
    ///
    /// Any error fails the manifest before it is returned. A parsed manifest
    /// whose granules were all ingested already is complete at once.
    pub async fn dispatch(
        &self,
        pdr: &PdrRecord,
        manifest: &Manifest,
        target: &DispatchTarget,
        concurrency: usize,
    ) -> Result<DispatchReport> {
        match self.dispatch_groups(pdr, manifest, target, concurrency).await {
            Ok(report) => Ok(report),
            Err(error) => {
                let message = error.to_string();
                match self.lifecycle.fail_manifest(&pdr.pdr_name, &message).await {
                    Ok(record) if record.error.as_deref() == Some(message.as_str()) => {
                        self.metrics.pdr_failed()
                    }
                    Ok(_) => {}
                    Err(mark) => {
                        warn!(pdr_name = %pdr.pdr_name, error = %mark, "Could not mark manifest failed")
                    }
                }
                Err(error)
            }
        }
    }

    async fn dispatch_groups(
        &self,
        pdr: &PdrRecord,
        manifest: &Manifest,
        target: &DispatchTarget,
        concurrency: usize,
    ) -> Result<DispatchReport> {
        let provider = self
            .catalog
            .provider(&pdr.provider_name)
            .ok_or_else(|| DispatchError::UnknownProvider(pdr.provider_name.clone()))?;
        let concurrency = concurrency.max(1);
        let mut report = DispatchReport::default();

        info!(
            pdr_name = %pdr.pdr_name,
            groups = manifest.file_groups.len(),
            concurrency,
            "Dispatching manifest"
        );

        for (index, chunk) in manifest.file_groups.chunks(concurrency).enumerate() {
            if let Some(ref observer) = self.observer {
                observer.chunk_started(index, chunk.len());
            }

            let results = join_all(
                chunk
                    .iter()
                    .map(|group| self.dispatch_group(pdr, group, target, &provider)),
            )
            .await;

            if let Some(ref observer) = self.observer {
                observer.chunk_settled(index, chunk.len());
            }
            report.chunks.push(chunk.len());

            let mut first_error = None;
            for result in results {
                match result {
                    Ok(GroupOutcome::Empty) => report.empty_groups += 1,
                    Ok(GroupOutcome::AlreadyIngested) => report.granules_skipped += 1,
                    Ok(GroupOutcome::Queued { files }) => {
                        report.granules_queued += 1;
                        report.files_queued += files;
                    }
                    Err(e) if first_error.is_none() => first_error = Some(e),
                    Err(e) => warn!(pdr_name = %pdr.pdr_name, error = %e, "Additional group failure"),
                }
            }

            if let Some(error) = first_error {
                return Err(error);
            }
        }

        self.lifecycle
            .advance_manifest_status(&pdr.pdr_name, PdrStatus::Parsed)
            .await?;
        // Granules staged during dispatch could not complete the manifest
        self.lifecycle
            .refresh_manifest_completion(&pdr.pdr_name)
            .await?;
        info!(
            pdr_name = %pdr.pdr_name,
            queued = report.granules_queued,
            skipped = report.granules_skipped,
            files = report.files_queued,
            "Manifest parsed"
        );
        Ok(report)
    }

    fn resolve_collection(
        &self,
        group: &FileGroup,
        target: &DispatchTarget,
    ) -> Result<Arc<CollectionDefinition>> {
        match target {
            DispatchTarget::Collection(collection) => Ok(Arc::clone(collection)),
            DispatchTarget::Provider(provider) => {
                let first = &group.specs[0].file_id;
                let name = classify(first, &provider.patterns)?;
                self.catalog
                    .collection(name)
                    .ok_or_else(|| DispatchError::UnknownCollection(name.to_string()))
            }
        }
    }

    async fn dispatch_group(
        &self,
        pdr: &PdrRecord,
        group: &FileGroup,
        target: &DispatchTarget,
        provider: &ProviderDefinition,
    ) -> Result<GroupOutcome> {
        if group.specs.is_empty() {
            debug!(pdr_name = %pdr.pdr_name, "Skipping file group without files");
            return Ok(GroupOutcome::Empty);
        }

        let collection = self.resolve_collection(group, target)?;
        let granule_id = granule::extract_granule_id(
            &collection,
            group.granule_id.as_deref(),
            &group.specs[0].file_id,
        )?;
        let key = GranuleKey::new(&collection.name, &granule_id);

        if self.lifecycle.granule_already_ingested(&key).await? {
            info!(granule_id = %granule_id, collection = %collection.name, "Granule already ingested, skipping");
            self.metrics.granule_skipped();
            return Ok(GroupOutcome::AlreadyIngested);
        }

        let files: Vec<DiscoveredFile> = group
            .specs
            .iter()
            .map(|spec| DiscoveredFile::sip(join_url(&provider.host, &spec.path())))
            .collect();
        let record = granule::build(&collection, &pdr.pdr_name, &granule_id, &files, self.policy)?;

        self.lifecycle.save_granule(&record).await?;
        self.lifecycle
            .mark_granule_in_manifest(&pdr.pdr_name, &granule_id, false)
            .await?;

        let mut queued = 0;
        for slot in record.files.values() {
            let (Some(file_name), Some(url)) = (&slot.name, &slot.sip_file) else {
                continue;
            };
            let transfer = FileTransfer {
                granule: key.clone(),
                pdr_name: pdr.pdr_name.clone(),
                file_name: file_name.clone(),
                url: url.clone(),
                staging_key: self.storage.staging_key(&collection.name, file_name),
            };
            self.queue.send_message(&self.queues.files, &transfer).await?;
            queued += 1;
        }

        if provider.bulk_dispatch {
            let message = GranuleDispatch {
                granule: key.clone(),
                pdr_name: pdr.pdr_name.clone(),
                provider_name: provider.name.clone(),
                files: record.files.values().filter_map(|s| s.name.clone()).collect(),
                recipe: record.recipe.clone(),
            };
            self.queue
                .send_message(&self.queues.granules, &message)
                .await?;
        }

        self.metrics.granule_queued();
        info!(granule_id = %granule_id, collection = %collection.name, files = queued, "Granule queued");
        Ok(GroupOutcome::Queued { files: queued })
    }
}
