//! Event payloads accepted by the handlers

use serde::{Deserialize, Serialize};

/// `discover-pdrs`: list one provider, either directly or through a collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverPdrsEvent {
    pub collection_name: Option<String>,
    pub provider_name: Option<String>,
}

/// `parse-pdrs`: consume the manifest queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsePdrsEvent {
    /// Messages per poll
    pub num_of_messages: Option<usize>,
    /// Seconds
    pub visibility_timeout: Option<u64>,
    /// File groups per dispatch chunk
    pub concurrency: Option<usize>,
    /// Empty polls tolerated before returning; negative runs forever
    pub max_iterations: Option<i64>,
}

/// `ingest-granules`: consume the file transfer queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestGranulesEvent {
    /// Files staged concurrently
    pub concurrency: Option<usize>,
    /// Seconds
    pub visibility_timeout: Option<u64>,
    pub max_iterations: Option<i64>,
}

/// Budget used when an event leaves `maxIterations` out
pub const DEFAULT_MAX_ITERATIONS: i64 = 0;
