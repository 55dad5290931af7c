//! Record lifecycle
//!
//! `LifecycleManager` is the only writer of manifest, granule and provider
//! records. Status changes go through [`Lifecycle::step_to`]: repeating the
//! current status writes nothing, and regressions are rejected.
//! `RecordNotFound` is turned into a branch by every operation here except the
//! plain `get_*` lookups.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{LifecycleError, StoreError};
use super::partitions::{GranuleKey, RecordKey};
use super::records::{
    GranuleRecord, GranuleStatus, Lifecycle, PdrRecord, PdrStatus, ProviderStatus, Step,
};
use super::store::RecordStore;
use crate::config::MAX_BATCH_SIZE;

pub type Result<T> = std::result::Result<T, LifecycleError>;

const DEFAULT_BATCH_SIZE: usize = 60;

/// Fields of a manifest record known at discovery time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewManifest {
    pub pdr_name: String,
    pub original_url: String,
    pub provider_name: String,
    pub collection_name: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn RecordStore>,
    batch_size: usize,
    /// Held across read-check-write status transitions
    transitions: Arc<Mutex<()>>,
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            transitions: Arc::new(Mutex::new(())),
        }
    }

    /// Keys per lookup in [`find_new_manifests`](Self::find_new_manifests)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub async fn get_manifest(&self, pdr_name: &str) -> Result<PdrRecord> {
        decode(self.store.get(&RecordKey::pdr(pdr_name)).await?)
    }

    pub async fn get_granule(&self, key: &GranuleKey) -> Result<GranuleRecord> {
        decode(self.store.get(&RecordKey::Granule(key.clone())).await?)
    }

    pub async fn get_provider(&self, name: &str) -> Result<ProviderStatus> {
        decode(self.store.get(&RecordKey::provider(name)).await?)
    }

    /// True only when the record exists and is `completed`
    pub async fn granule_already_ingested(&self, key: &GranuleKey) -> Result<bool> {
        match self.get_granule(key).await {
            Ok(record) => Ok(record.status == GranuleStatus::Completed),
            Err(LifecycleError::Store(StoreError::RecordNotFound(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Candidates with no manifest record yet, in their original order
    pub async fn find_new_manifests<T, F>(&self, candidates: Vec<T>, name_of: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&T) -> &str + Send + Sync,
    {
        let mut fresh = Vec::with_capacity(candidates.len());
        let mut pending = candidates.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<T> = pending.by_ref().take(self.batch_size).collect();
            let keys: Vec<RecordKey> = batch.iter().map(|c| RecordKey::pdr(name_of(c))).collect();
            let existing = self.store.batch_get(&keys).await?;
            debug!(
                batch = batch.len(),
                existing = existing.len(),
                "Checked manifest batch"
            );

            for candidate in batch {
                let key = RecordKey::pdr(name_of(&candidate));
                if !existing.iter().any(|(k, _)| *k == key) {
                    fresh.push(candidate);
                }
            }
        }

        Ok(fresh)
    }

    /// Persist a new manifest record; `error` records it as failed
    pub async fn record_manifest(
        &self,
        manifest: NewManifest,
        error: Option<String>,
    ) -> Result<PdrRecord> {
        let now = Utc::now();
        let failed = error.is_some();
        let record = PdrRecord {
            pdr_name: manifest.pdr_name,
            original_url: manifest.original_url,
            provider_name: manifest.provider_name,
            collection_name: manifest.collection_name,
            status: if failed {
                PdrStatus::Failed
            } else {
                PdrStatus::Discovered
            },
            granules: Default::default(),
            address: manifest.address,
            error,
            is_active: !failed,
            created_at: now,
            updated_at: now,
        };

        self.store
            .put(&RecordKey::pdr(&record.pdr_name), serde_json::to_value(&record)?)
            .await?;
        info!(pdr_name = %record.pdr_name, status = %record.status, "Recorded manifest");
        Ok(record)
    }

    pub async fn advance_manifest_status(
        &self,
        pdr_name: &str,
        status: PdrStatus,
    ) -> Result<PdrRecord> {
        let _guard = self.transitions.lock().await;
        let record = self.get_manifest(pdr_name).await?;
        match record.status.step_to(status) {
            Step::Unchanged => Ok(record),
            Step::Rejected => Err(LifecycleError::InvalidTransition {
                record: format!("pdr {}", pdr_name),
                from: record.status.to_string(),
                to: status.to_string(),
            }),
            Step::Forward => {
                let mut patch = json!({"status": status, "updatedAt": Utc::now()});
                if status == PdrStatus::Failed {
                    patch["isActive"] = json!(false);
                }
                let updated = self.store.update(&RecordKey::pdr(pdr_name), patch).await?;
                debug!(pdr_name, from = %record.status, to = %status, "Manifest advanced");
                decode(updated)
            }
        }
    }

    /// Move a manifest to `failed` and keep the error text
    ///
    /// A manifest that already failed keeps its first error.
    pub async fn fail_manifest(&self, pdr_name: &str, error: &str) -> Result<PdrRecord> {
        let _guard = self.transitions.lock().await;
        let record = self.get_manifest(pdr_name).await?;
        if record.status == PdrStatus::Failed {
            return Ok(record);
        }

        let patch = json!({
            "status": PdrStatus::Failed,
            "error": error,
            "isActive": false,
            "updatedAt": Utc::now(),
        });
        let updated = self.store.update(&RecordKey::pdr(pdr_name), patch).await?;
        warn!(pdr_name, error, "Manifest failed");
        decode(updated)
    }

    pub async fn mark_granule_in_manifest(
        &self,
        pdr_name: &str,
        granule_id: &str,
        processed: bool,
    ) -> Result<PdrRecord> {
        let patch = json!({
            "granules": { granule_id: processed },
            "updatedAt": Utc::now(),
        });
        decode(self.store.update(&RecordKey::pdr(pdr_name), patch).await?)
    }

    /// Deactivate a manifest once it is parsed and every listed granule is
    /// processed
    ///
    /// Returns whether the manifest is complete; see [`PdrRecord::is_complete`].
    pub async fn refresh_manifest_completion(&self, pdr_name: &str) -> Result<bool> {
        let _guard = self.transitions.lock().await;
        let record = self.get_manifest(pdr_name).await?;
        let complete = record.is_complete();
        if complete && record.is_active {
            self.store
                .update(
                    &RecordKey::pdr(pdr_name),
                    json!({"isActive": false, "updatedAt": Utc::now()}),
                )
                .await?;
            info!(pdr_name, granules = record.granules.len(), "Manifest complete");
        }
        Ok(complete)
    }

    /// Insert or overwrite a granule record
    pub async fn save_granule(&self, record: &GranuleRecord) -> Result<()> {
        let key = RecordKey::granule(&record.collection_name, &record.granule_id);
        self.store.put(&key, serde_json::to_value(record)?).await?;
        debug!(granule_id = %record.granule_id, collection = %record.collection_name, "Saved granule");
        Ok(())
    }

    pub async fn advance_granule_status(
        &self,
        key: &GranuleKey,
        status: GranuleStatus,
    ) -> Result<GranuleRecord> {
        let _guard = self.transitions.lock().await;
        let record = self.get_granule(key).await?;
        match record.status.step_to(status) {
            Step::Unchanged => Ok(record),
            Step::Rejected => Err(LifecycleError::InvalidTransition {
                record: format!("granule {}", key),
                from: record.status.to_string(),
                to: status.to_string(),
            }),
            Step::Forward => {
                let now = Utc::now();
                let mut patch = json!({"status": status, "updatedAt": now});
                if status == GranuleStatus::Completed {
                    let elapsed = (now - record.created_at).num_milliseconds() as f64 / 1000.0;
                    patch["duration"] = json!(elapsed);
                    patch["ingestEnded"] = json!(now);
                }
                let updated = self
                    .store
                    .update(&RecordKey::Granule(key.clone()), patch)
                    .await?;
                debug!(granule = %key, from = %record.status, to = %status, "Granule advanced");
                decode(updated)
            }
        }
    }

    /// Fold a staged file back into its granule
    ///
    /// Fills the slot holding `file_name`, moves the granule to `processing`,
    /// and to `completed` once every populated slot is staged. Completion also
    /// marks the granule processed in its manifest. Repeating the call for a
    /// completed granule changes nothing.
    pub async fn record_file_staged(
        &self,
        key: &GranuleKey,
        file_name: &str,
        staging_uri: &str,
    ) -> Result<GranuleRecord> {
        let record = self.get_granule(key).await?;
        if record.status == GranuleStatus::Completed {
            return Ok(record);
        }

        let slot = record
            .files
            .iter()
            .find(|(_, slot)| slot.name.as_deref() == Some(file_name))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| LifecycleError::UnknownFile {
                granule: key.to_string(),
                file_name: file_name.to_string(),
            })?;

        let patch = json!({
            "files": { slot: { "stagingFile": staging_uri } },
            "updatedAt": Utc::now(),
        });
        let merged: GranuleRecord = decode(
            self.store
                .update(&RecordKey::Granule(key.clone()), patch)
                .await?,
        )?;

        let mut current = merged.clone();
        if current.status == GranuleStatus::Pending {
            // A concurrent staging may already have completed the granule
            current = match self
                .advance_granule_status(key, GranuleStatus::Processing)
                .await
            {
                Err(LifecycleError::InvalidTransition { .. }) => self.get_granule(key).await?,
                other => other?,
            };
        }

        if merged.all_staged() {
            current = self
                .advance_granule_status(key, GranuleStatus::Completed)
                .await?;
            self.mark_granule_in_manifest(&current.pdr_name, &current.granule_id, true)
                .await?;
            self.refresh_manifest_completion(&current.pdr_name).await?;
            info!(granule = %key, duration = ?current.duration, "Granule completed");
        }

        Ok(current)
    }

    pub async fn deactivate_provider(&self, name: &str, error: &str) -> Result<ProviderStatus> {
        let status = ProviderStatus {
            name: name.to_string(),
            is_active: false,
            error: Some(error.to_string()),
            updated_at: Utc::now(),
        };
        self.store
            .put(&RecordKey::provider(name), serde_json::to_value(&status)?)
            .await?;
        warn!(provider = name, error, "Provider deactivated");
        Ok(status)
    }

    /// Providers without a status record are active
    pub async fn provider_is_active(&self, name: &str) -> Result<bool> {
        match self.get_provider(name).await {
            Ok(status) => Ok(status.is_active),
            Err(LifecycleError::Store(StoreError::RecordNotFound(_))) => Ok(true),
            Err(e) => Err(e),
        }
    }
}
