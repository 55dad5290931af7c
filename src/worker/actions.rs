//! Per-message work run by the queue consumers

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::http::{DownloadError, DownloadExecutor};
use crate::ingest::{DispatchEngine, DispatchError};
use crate::ledger::{LifecycleError, LifecycleManager, PdrStatus};
use crate::observability::Metrics;
use crate::pdr::Manifest;
use crate::queue::{FileTransfer, PdrMessage, QueueError, ReceivedMessage};
use crate::storage::{StorageClient, StorageError};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Undecodable message: {0}")]
    Decode(#[from] QueueError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Action panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, ActionError>;

/// Work for one received message
///
/// `Ok` acknowledges the message; `Err` leaves it for redelivery. Actions
/// must be safe to run more than once for the same message.
#[async_trait]
pub trait MessageAction: Send + Sync {
    async fn execute(&self, message: &ReceivedMessage) -> Result<()>;
}

/// Download one granule file into staging and fold it into the granule record
pub struct StageFileAction {
    storage: StorageClient,
    downloader: Arc<dyn DownloadExecutor>,
    lifecycle: LifecycleManager,
    metrics: Arc<Metrics>,
}

impl StageFileAction {
    pub fn new(
        storage: StorageClient,
        downloader: Arc<dyn DownloadExecutor>,
        lifecycle: LifecycleManager,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            storage,
            downloader,
            lifecycle,
            metrics,
        }
    }
}

#[async_trait]
impl MessageAction for StageFileAction {
    async fn execute(&self, message: &ReceivedMessage) -> Result<()> {
        let transfer: FileTransfer = message.decode()?;

        if self.storage.exists(&transfer.staging_key).await? {
            debug!(file = %transfer.file_name, key = %transfer.staging_key, "Already staged");
            self.metrics.file_skipped();
        } else {
            let bytes = self.downloader.fetch(&transfer.url).await?;
            self.storage.upload(&transfer.staging_key, bytes).await?;
            self.metrics.file_staged();
        }

        let granule = self
            .lifecycle
            .record_file_staged(
                &transfer.granule,
                &transfer.file_name,
                &self.storage.uri(&transfer.staging_key),
            )
            .await?;
        info!(
            file = %transfer.file_name,
            granule = %transfer.granule,
            status = %granule.status,
            "File staged"
        );
        Ok(())
    }
}

/// Parse a staged manifest and dispatch its file groups
pub struct ParsePdrAction {
    storage: StorageClient,
    lifecycle: LifecycleManager,
    dispatcher: DispatchEngine,
    concurrency: usize,
    metrics: Arc<Metrics>,
}

impl ParsePdrAction {
    pub fn new(
        storage: StorageClient,
        lifecycle: LifecycleManager,
        dispatcher: DispatchEngine,
        concurrency: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            storage,
            lifecycle,
            dispatcher,
            concurrency,
            metrics,
        }
    }

    /// Mark the manifest failed; the message is then acknowledged
    async fn give_up(&self, pdr_name: &str, error: &str) -> Result<()> {
        let record = self.lifecycle.fail_manifest(pdr_name, error).await?;
        if record.error.as_deref() == Some(error) {
            self.metrics.pdr_failed();
        }
        Ok(())
    }
}

#[async_trait]
impl MessageAction for ParsePdrAction {
    async fn execute(&self, message: &ReceivedMessage) -> Result<()> {
        let pdr_message: PdrMessage = message.decode()?;
        let pdr_name = pdr_message.pdr_name.as_str();

        let record = self.lifecycle.get_manifest(pdr_name).await?;
        match record.status {
            PdrStatus::Failed => {
                info!(pdr_name, "Manifest already failed, dropping message");
                return Ok(());
            }
            PdrStatus::Parsed => {
                info!(pdr_name, "Manifest already parsed, dropping message");
                return Ok(());
            }
            PdrStatus::Discovered | PdrStatus::Queued => {}
        }

        let bytes = self.storage.download(&pdr_message.address).await?;
        let text = String::from_utf8_lossy(&bytes);

        let manifest = match Manifest::parse(&text) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(pdr_name, error = %e, "Manifest is malformed");
                return self.give_up(pdr_name, &e.to_string()).await;
            }
        };

        let target = match self.dispatcher.target_for(&record) {
            Ok(target) => target,
            Err(e) => return self.give_up(pdr_name, &e.to_string()).await,
        };

        match self
            .dispatcher
            .dispatch(&record, &manifest, &target, self.concurrency)
            .await
        {
            Ok(report) => {
                debug!(pdr_name, chunks = ?report.chunks, "Dispatch report");
                Ok(())
            }
            Err(e) => {
                warn!(pdr_name, error = %e, "Dispatch failed");
                // The dispatcher fails the manifest; redeliver if that did not stick
                let record = self.lifecycle.get_manifest(pdr_name).await?;
                if record.status != PdrStatus::Failed {
                    return Err(e.into());
                }
                Ok(())
            }
        }
    }
}
