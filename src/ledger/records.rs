//! Persistent record shapes
//!
//! Records are stored as JSON with camelCase field names. Partial updates are
//! JSON merge patches, so optional fields tolerate being absent on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordering relation between two statuses of the same lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Same status; nothing to write
    Unchanged,
    /// Allowed move
    Forward,
    /// Regression or move out of a terminal status
    Rejected,
}

/// Monotonic status set
pub trait Lifecycle: Copy + Eq + fmt::Display {
    /// Position along the happy path
    fn rank(self) -> u8;
    fn is_terminal(self) -> bool;
    fn is_failure(self) -> bool;

    fn step_to(self, next: Self) -> Step {
        if self == next {
            Step::Unchanged
        } else if self.is_terminal() {
            Step::Rejected
        } else if next.is_failure() || next.rank() > self.rank() {
            Step::Forward
        } else {
            Step::Rejected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdrStatus {
    Discovered,
    Queued,
    Parsed,
    Failed,
}

impl Lifecycle for PdrStatus {
    fn rank(self) -> u8 {
        match self {
            PdrStatus::Discovered => 0,
            PdrStatus::Queued => 1,
            PdrStatus::Parsed => 2,
            PdrStatus::Failed => 3,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, PdrStatus::Failed)
    }

    fn is_failure(self) -> bool {
        matches!(self, PdrStatus::Failed)
    }
}

impl fmt::Display for PdrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PdrStatus::Discovered => "discovered",
            PdrStatus::Queued => "queued",
            PdrStatus::Parsed => "parsed",
            PdrStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranuleStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Lifecycle for GranuleStatus {
    fn rank(self) -> u8 {
        match self {
            GranuleStatus::Pending => 0,
            GranuleStatus::Processing => 1,
            GranuleStatus::Completed | GranuleStatus::Failed => 2,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, GranuleStatus::Completed | GranuleStatus::Failed)
    }

    fn is_failure(self) -> bool {
        matches!(self, GranuleStatus::Failed)
    }
}

impl fmt::Display for GranuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GranuleStatus::Pending => "pending",
            GranuleStatus::Processing => "processing",
            GranuleStatus::Completed => "completed",
            GranuleStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Manifest (PDR) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdrRecord {
    pub pdr_name: String,
    pub original_url: String,
    pub provider_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    pub status: PdrStatus,
    /// Granule identifier -> fully processed
    #[serde(default)]
    pub granules: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PdrRecord {
    /// Parsed, and every listed granule has been processed
    ///
    /// Until parsing finishes the granule map is still growing, so only a
    /// parsed manifest can be complete. A parsed manifest with an empty map
    /// (every group skipped as already ingested) is complete.
    pub fn is_complete(&self) -> bool {
        self.status == PdrStatus::Parsed && self.granules.values().all(|done| *done)
    }
}

/// One named file position of a granule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSlot {
    pub name: Option<String>,
    pub sip_file: Option<String>,
    pub staging_file: Option<String>,
    pub archived_file: Option<String>,
    pub regex: String,
}

impl FileSlot {
    pub fn empty(regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            ..Self::default()
        }
    }

    pub fn is_populated(&self) -> bool {
        self.name.is_some()
    }

    pub fn is_staged(&self) -> bool {
        self.staging_file.is_some()
    }
}

/// Granule record, unique per `(collection_name, granule_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranuleRecord {
    pub granule_id: String,
    pub collection_name: String,
    pub pdr_name: String,
    pub files: BTreeMap<String, FileSlot>,
    #[serde(default)]
    pub recipe: serde_json::Value,
    pub status: GranuleStatus,
    /// Seconds between creation and completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_ended: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GranuleRecord {
    /// Every populated slot has a staged copy
    pub fn all_staged(&self) -> bool {
        let populated: Vec<&FileSlot> = self
            .files
            .values()
            .filter(|slot| slot.is_populated())
            .collect();
        !populated.is_empty() && populated.iter().all(|slot| slot.is_staged())
    }
}

/// Health of a remote provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}
