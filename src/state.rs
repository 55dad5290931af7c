use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Catalog, Config, ConfigError};
use crate::ingest::{DispatchEngine, DispatchQueues, PdrIngest};
use crate::ledger::{FjallStore, LifecycleManager, RecordStore, StoreError};
use crate::observability::Metrics;
use crate::queue::{FjallQueue, MessageQueue, QueueError};
use crate::storage::{StorageClient, StorageError};
use crate::worker::{
    DownloadError, DownloadExecutor, HttpClient, HttpConfig, ParsePdrAction, QueueConsumer,
    StageFileAction,
};

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Http(#[from] DownloadError),
}

/// Everything a pipeline stage needs, built once per process
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub store: Arc<dyn RecordStore>,
    pub lifecycle: LifecycleManager,
    pub queue: Arc<dyn MessageQueue>,
    pub storage: StorageClient,
    pub http: Arc<HttpClient>,
    pub downloader: Arc<dyn DownloadExecutor>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Open the Fjall ledger and queue and the configured object store
    pub fn open(config: Config) -> Result<Self, StateError> {
        let store = FjallStore::open(&config.store.path)?;
        let queue = FjallQueue::open(&config.queue.path)?;
        let storage = StorageClient::from_config(&config.storage)?;
        let http = Arc::new(HttpClient::new(HttpConfig::from(&config.http))?);

        Self::with_parts(config, Arc::new(store), Arc::new(queue), storage, http.clone(), http)
    }

    /// Assemble from explicit collaborators
    pub fn with_parts(
        config: Config,
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn MessageQueue>,
        storage: StorageClient,
        http: Arc<HttpClient>,
        downloader: Arc<dyn DownloadExecutor>,
    ) -> Result<Self, StateError> {
        let catalog = Arc::new(config.catalog()?);
        let lifecycle = LifecycleManager::new(Arc::clone(&store)).with_batch_size(config.ingest.batch_size);

        Ok(Self {
            config: Arc::new(config),
            catalog,
            store,
            lifecycle,
            queue,
            storage,
            http,
            downloader,
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn pdr_ingest(&self) -> PdrIngest {
        PdrIngest::new(
            self.lifecycle.clone(),
            Arc::clone(&self.queue),
            self.storage.clone(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.downloader),
            self.config.queue.pdr_queue.clone(),
            Arc::clone(&self.metrics),
        )
    }

    pub fn dispatcher(&self) -> DispatchEngine {
        DispatchEngine::new(
            self.lifecycle.clone(),
            Arc::clone(&self.queue),
            self.storage.clone(),
            Arc::clone(&self.catalog),
            DispatchQueues {
                files: self.config.queue.file_queue.clone(),
                granules: self.config.queue.granule_queue.clone(),
            },
            Arc::clone(&self.metrics),
        )
        .with_policy(self.config.ingest.unmatched_files)
    }

    /// Consumer of the manifest queue; `concurrency` bounds file groups per chunk
    pub fn pdr_consumer(&self, dispatcher: DispatchEngine, concurrency: usize) -> QueueConsumer {
        let action = ParsePdrAction::new(
            self.storage.clone(),
            self.lifecycle.clone(),
            dispatcher,
            concurrency,
            Arc::clone(&self.metrics),
        );
        self.consumer(&self.config.queue.pdr_queue, Arc::new(action))
    }

    /// Consumer of the file transfer queue
    pub fn file_consumer(&self) -> QueueConsumer {
        let action = StageFileAction::new(
            self.storage.clone(),
            Arc::clone(&self.downloader),
            self.lifecycle.clone(),
            Arc::clone(&self.metrics),
        );
        self.consumer(&self.config.queue.file_queue, Arc::new(action))
    }

    fn consumer(
        &self,
        queue_name: &str,
        action: Arc<dyn crate::worker::MessageAction>,
    ) -> QueueConsumer {
        QueueConsumer::new(
            Arc::clone(&self.queue),
            queue_name,
            action,
            Arc::clone(&self.metrics),
        )
        .with_poll_interval(self.config.queue.poll_interval())
    }

    /// Make ledger and queue writes durable; called before the process exits
    pub fn persist(&self) -> Result<(), StateError> {
        self.store.persist()?;
        self.queue.flush()?;
        Ok(())
    }

    pub fn pdr_visibility(&self) -> Duration {
        Duration::from_secs(self.config.consumer.pdr_visibility_timeout_secs)
    }

    pub fn file_visibility(&self) -> Duration {
        Duration::from_secs(self.config.consumer.file_visibility_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::NewManifest;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_state(temp_dir: &TempDir) -> AppState {
        let config = Config::from_toml_str("").unwrap();
        let store = FjallStore::open(temp_dir.path().join("ledger")).unwrap();
        let queue = FjallQueue::open(temp_dir.path().join("queue")).unwrap();
        let http = Arc::new(HttpClient::new(HttpConfig::default()).unwrap());
        AppState::with_parts(
            config,
            Arc::new(store),
            Arc::new(queue),
            StorageClient::in_memory(),
            http.clone(),
            http,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_persisted_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let state = open_state(&temp_dir);
            state
                .lifecycle
                .record_manifest(
                    NewManifest {
                        pdr_name: "A.PDR".to_string(),
                        original_url: "https://host/PDR/A.PDR".to_string(),
                        provider_name: "LP".to_string(),
                        collection_name: None,
                        address: None,
                    },
                    None,
                )
                .await
                .unwrap();
            state
                .queue
                .send(&state.config.queue.pdr_queue, json!({"pdrName": "A.PDR"}))
                .await
                .unwrap();
            state.persist().unwrap();
        }

        let state = open_state(&temp_dir);
        let record = state.lifecycle.get_manifest("A.PDR").await.unwrap();
        assert_eq!(record.pdr_name, "A.PDR");
        let received = state
            .queue
            .receive(&state.config.queue.pdr_queue, 10, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body["pdrName"], "A.PDR");
    }
}
