//! Message bodies carried between the pipeline stages

use serde::{Deserialize, Serialize};

use crate::ledger::GranuleKey;

/// A staged manifest waiting to be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdrMessage {
    pub pdr_name: String,
    pub provider_name: String,
    /// Source URL on the provider
    pub url: String,
    /// Object store key of the staged copy
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

/// One file to download and stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransfer {
    pub granule: GranuleKey,
    pub pdr_name: String,
    pub file_name: String,
    pub url: String,
    pub staging_key: String,
}

/// Whole granule handed to the processing pipeline of a bulk-dispatch provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranuleDispatch {
    pub granule: GranuleKey,
    pub pdr_name: String,
    pub provider_name: String,
    pub files: Vec<String>,
    #[serde(default)]
    pub recipe: serde_json::Value,
}
