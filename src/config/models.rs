use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub http: HttpSettings,
    /// Providers in configuration order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

/// Record store (Fjall ledger) location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Queue location and queue identifiers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,
    /// Manifests waiting to be parsed
    #[serde(default = "default_pdr_queue")]
    pub pdr_queue: String,
    /// Per-file download work
    #[serde(default = "default_file_queue")]
    pub file_queue: String,
    /// Whole-granule messages for bulk-dispatch providers
    #[serde(default = "default_granule_queue")]
    pub granule_queue: String,
    /// Pause between empty polls in unbounded mode
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            pdr_queue: default_pdr_queue(),
            file_queue: default_file_queue(),
            granule_queue: default_granule_queue(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("data/queue")
}

fn default_pdr_queue() -> String {
    "pdrs".to_string()
}

fn default_file_queue() -> String {
    "files".to_string()
}

fn default_granule_queue() -> String {
    "granules".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
    S3,
}

/// Object storage used for staging manifests and granule files
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory for the local provider
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,
    #[serde(default = "default_pdr_prefix")]
    pub pdr_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: default_bucket(),
            root: default_storage_root(),
            endpoint: None,
            region: None,
            access_key: None,
            secret_key: None,
            staging_prefix: default_staging_prefix(),
            pdr_prefix: default_pdr_prefix(),
        }
    }
}

fn default_bucket() -> String {
    "pdrbox-internal".to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/objects")
}

fn default_staging_prefix() -> String {
    "staging".to_string()
}

fn default_pdr_prefix() -> String {
    "pdrs".to_string()
}

/// What to do with a file that matches no slot of its collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedFilePolicy {
    /// Leave the file out of the granule record and log it
    #[default]
    Drop,
    /// Reject the granule
    Fail,
}

/// Dispatch settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// File groups dispatched per chunk
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Keys per batch lookup when searching for new PDRs
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub unmatched_files: UnmatchedFilePolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            unmatched_files: UnmatchedFilePolicy::default(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}

fn default_batch_size() -> usize {
    60
}

/// Defaults for the two consumer loops, overridable per invocation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_pdr_messages")]
    pub pdr_messages: usize,
    #[serde(default = "default_pdr_visibility_timeout_secs")]
    pub pdr_visibility_timeout_secs: u64,
    #[serde(default = "default_file_concurrency")]
    pub file_concurrency: usize,
    #[serde(default = "default_file_visibility_timeout_secs")]
    pub file_visibility_timeout_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            pdr_messages: default_pdr_messages(),
            pdr_visibility_timeout_secs: default_pdr_visibility_timeout_secs(),
            file_concurrency: default_file_concurrency(),
            file_visibility_timeout_secs: default_file_visibility_timeout_secs(),
        }
    }
}

fn default_pdr_messages() -> usize {
    1
}

fn default_pdr_visibility_timeout_secs() -> u64 {
    20
}

fn default_file_concurrency() -> usize {
    1
}

fn default_file_visibility_timeout_secs() -> u64 {
    200
}

/// HTTP client settings for listings and downloads
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_listing_timeout_secs")]
    pub listing_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            listing_timeout_secs: default_listing_timeout_secs(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_listing_timeout_secs() -> u64 {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    "pdrbox/0.1.0".to_string()
}

/// How a provider's PDR listing is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Http,
    Ftp,
}

/// Remote source of PDRs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub transport: Transport,
    /// Also queue one message per granule for the processing pipeline
    #[serde(default)]
    pub bulk_dispatch: bool,
    /// Classification table; order is significant (first match wins)
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternConfig {
    pub collection: String,
    pub regex: String,
}

/// Dataset definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Provider used for collection-driven discovery
    pub provider: Option<String>,
    pub granule_definition: GranuleDefinitionConfig,
    /// Processing pipeline descriptor, copied into granule records untouched
    #[serde(default)]
    pub recipe: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GranuleDefinitionConfig {
    /// Validity test for granule identifiers
    pub granule_id: String,
    /// Extraction pattern; the first capture group is the identifier
    pub granule_id_extraction: String,
    /// Slot name -> file name pattern
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}
