#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pdrbox::config::Config;
use pdrbox::ingest::{DiscoveredPdr, DiscoveryError, DiscoverySource};
use pdrbox::ledger::FjallStore;
use pdrbox::queue::{FjallQueue, MessageQueue, QueueError, ReceivedMessage};
use pdrbox::state::AppState;
use pdrbox::storage::StorageClient;
use pdrbox::worker::{DownloadError, DownloadExecutor, HttpClient, HttpConfig};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const HOST: &str = "https://provider.test";

pub const CONFIG: &str = r#"
[queue]
poll_interval_ms = 5

[ingest]
concurrency = 5

[[providers]]
name = "LPDAAC"
host = "https://provider.test"
path = "/PDR"

[[providers.patterns]]
collection = "MOD09GQ"
regex = '^MOD09GQ\.'

[[collections]]
name = "MOD09GQ"
provider = "LPDAAC"
recipe = { process = "modis" }

[collections.granule_definition]
granule_id = '^MOD09GQ\.A\d{7}\.h\d{2}v\d{2}\.006$'
granule_id_extraction = '^(MOD09GQ\.A\d{7}\.h\d{2}v\d{2}\.006)\.'

[collections.granule_definition.files]
data = '^MOD09GQ\..*\.hdf$'
meta = '^MOD09GQ\..*\.hdf\.met$'
"#;

/// Remote files by URL; records every fetch
#[derive(Default)]
pub struct FakeRemote {
    files: Mutex<HashMap<String, Bytes>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn put(&self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.files.lock().unwrap().insert(url.into(), body.into());
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl DownloadExecutor for FakeRemote {
    async fn fetch(&self, url: &str) -> Result<Bytes, DownloadError> {
        self.fetches.lock().unwrap().push(url.to_string());
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::Status {
                code: 404,
                url: url.to_string(),
            })
    }
}

/// Listing that returns a fixed result
pub struct FixedListing(pub Result<Vec<DiscoveredPdr>, String>);

#[async_trait]
impl DiscoverySource for FixedListing {
    async fn discover(&self) -> Result<Vec<DiscoveredPdr>, DiscoveryError> {
        match &self.0 {
            Ok(found) => Ok(found.clone()),
            Err(url) => Err(DiscoveryError::NotFound { url: url.clone() }),
        }
    }
}

/// Front of the harness queue: logs every completed send and can refuse
/// sends
pub struct RecordingQueue {
    inner: Arc<FjallQueue>,
    log: Mutex<Vec<String>>,
    refused_sends: AtomicUsize,
}

impl RecordingQueue {
    pub fn new(inner: Arc<FjallQueue>) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
            refused_sends: AtomicUsize::new(0),
        }
    }

    /// The next `n` sends fail without storing anything
    pub fn refuse_sends(&self, n: usize) {
        self.refused_sends.store(n, Ordering::SeqCst);
    }

    /// Add an entry to the shared log
    pub fn note(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageQueue for RecordingQueue {
    async fn send(&self, queue: &str, body: Value) -> Result<String, QueueError> {
        // Let the other sends of a concurrent batch run first
        tokio::task::yield_now().await;
        if self
            .refused_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let down = std::io::Error::other("network down");
            return Err(QueueError::Fjall(fjall::Error::Io(down)));
        }

        let subject = body["granule"]["granuleId"]
            .as_str()
            .or_else(|| body["pdrName"].as_str())
            .unwrap_or_default()
            .to_string();
        let id = self.inner.send(queue, body).await?;
        self.note(format!("sent {queue} {subject}"));
        Ok(id)
    }

    async fn receive(
        &self,
        queue: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.inner.receive(queue, max, visibility).await
    }

    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.inner.delete(queue, receipt_handle).await
    }

    fn flush(&self) -> Result<(), QueueError> {
        self.inner.flush()
    }
}

pub struct Harness {
    pub state: AppState,
    /// The stored queue, for depth and peeks
    pub queue: Arc<FjallQueue>,
    /// What the pipeline sends through
    pub sends: Arc<RecordingQueue>,
    pub remote: Arc<FakeRemote>,
    _temp_dir: TempDir,
}

pub fn harness() -> Harness {
    harness_with(CONFIG)
}

pub fn harness_with(config: &str) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::from_toml_str(config).unwrap();
    let store = FjallStore::open(temp_dir.path().join("ledger")).unwrap();
    let queue = Arc::new(FjallQueue::open(temp_dir.path().join("queue")).unwrap());
    let sends = Arc::new(RecordingQueue::new(queue.clone()));
    let remote = Arc::new(FakeRemote::default());
    let http = Arc::new(HttpClient::new(HttpConfig::default()).unwrap());

    let state = AppState::with_parts(
        config,
        Arc::new(store),
        sends.clone(),
        StorageClient::in_memory(),
        http,
        remote.clone(),
    )
    .unwrap();

    Harness {
        state,
        queue,
        sends,
        remote,
        _temp_dir: temp_dir,
    }
}

/// PDR text with one FILE_GROUP per entry, files under `/MODIS`
pub fn pdr_text(groups: &[Vec<String>]) -> String {
    let total: usize = groups.iter().map(Vec::len).sum();
    let mut text = format!("ORIGINATING_SYSTEM = LPDAAC;\nTOTAL_FILE_COUNT = {total};\n");
    for files in groups {
        text.push_str("OBJECT = FILE_GROUP;\n  DATA_TYPE = MOD09GQ;\n");
        for file in files {
            text.push_str(&format!(
                "  OBJECT = FILE_SPEC;\n    DIRECTORY_ID = /MODIS;\n    FILE_ID = {file};\n    FILE_SIZE = 10;\n  END_OBJECT = FILE_SPEC;\n"
            ));
        }
        text.push_str("END_OBJECT = FILE_GROUP;\n");
    }
    text
}

pub fn granule_id(day: usize) -> String {
    format!("MOD09GQ.A2017{day:03}.h01v01.006")
}

pub fn file_url(file: &str) -> String {
    format!("{HOST}/MODIS/{file}")
}

pub fn pdr_url(name: &str) -> String {
    format!("{HOST}/PDR/{name}")
}

/// Place a PDR and the data/meta files of each granule on the fake remote
pub fn publish(harness: &Harness, pdr_name: &str, days: &[usize]) -> DiscoveredPdr {
    let groups: Vec<Vec<String>> = days
        .iter()
        .map(|day| {
            let id = granule_id(*day);
            vec![format!("{id}.hdf"), format!("{id}.hdf.met")]
        })
        .collect();
    for file in groups.iter().flatten() {
        harness.remote.put(file_url(file), format!("contents of {file}"));
    }

    let url = pdr_url(pdr_name);
    harness.remote.put(url.clone(), pdr_text(&groups));
    DiscoveredPdr {
        name: pdr_name.to_string(),
        url,
    }
}
