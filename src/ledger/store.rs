use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::{Result, StoreError};
use super::partitions::{GRANULE_PARTITION, PDR_PARTITION, PROVIDER_PARTITION, RecordKey};
use crate::config::MAX_BATCH_SIZE;

/// Key/value record store
///
/// Items are JSON objects. `update` applies a JSON merge patch and returns the
/// merged item; a missing key is `RecordNotFound`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &RecordKey) -> Result<Value>;

    async fn put(&self, key: &RecordKey, item: Value) -> Result<()>;

    async fn update(&self, key: &RecordKey, partial: Value) -> Result<Value>;

    /// Existing items among `keys`, in key order; at most [`MAX_BATCH_SIZE`] keys
    async fn batch_get(&self, keys: &[RecordKey]) -> Result<Vec<(RecordKey, Value)>>;

    /// Make every acknowledged write durable
    fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// Apply `patch` to `target` as a JSON merge patch (RFC 7386)
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Fjall-backed record store with one partition per record kind
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    pdrs: PartitionHandle,
    granules: PartitionHandle,
    providers: PartitionHandle,
    write_lock: Arc<Mutex<()>>,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening record store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let pdrs = keyspace.open_partition(PDR_PARTITION, PartitionCreateOptions::default())?;
        let granules =
            keyspace.open_partition(GRANULE_PARTITION, PartitionCreateOptions::default())?;
        let providers =
            keyspace.open_partition(PROVIDER_PARTITION, PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            pdrs,
            granules,
            providers,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn partition(&self, key: &RecordKey) -> &PartitionHandle {
        match key {
            RecordKey::Pdr(_) => &self.pdrs,
            RecordKey::Granule(_) => &self.granules,
            RecordKey::Provider(_) => &self.providers,
        }
    }

    fn read(&self, key: &RecordKey) -> Result<Option<Value>> {
        match self.partition(key).get(key.encode())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &RecordKey, item: &Value) -> Result<()> {
        if !item.is_object() {
            return Err(StoreError::NotAnObject(key.clone()));
        }
        self.partition(key)
            .insert(key.encode(), serde_json::to_vec(item)?)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FjallStore {
    async fn get(&self, key: &RecordKey) -> Result<Value> {
        self.read(key)?
            .ok_or_else(|| StoreError::RecordNotFound(key.clone()))
    }

    async fn put(&self, key: &RecordKey, item: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(key, &item)?;
        debug!(%key, "Stored record");
        Ok(())
    }

    async fn update(&self, key: &RecordKey, partial: Value) -> Result<Value> {
        let _guard = self.write_lock.lock().await;
        let mut item = self
            .read(key)?
            .ok_or_else(|| StoreError::RecordNotFound(key.clone()))?;
        merge_patch(&mut item, &partial);
        self.write(key, &item)?;
        debug!(%key, "Updated record");
        Ok(item)
    }

    async fn batch_get(&self, keys: &[RecordKey]) -> Result<Vec<(RecordKey, Value)>> {
        if keys.len() > MAX_BATCH_SIZE {
            return Err(StoreError::BatchTooLarge {
                requested: keys.len(),
                limit: MAX_BATCH_SIZE,
            });
        }

        let mut found = Vec::new();
        for key in keys {
            if let Some(item) = self.read(key)? {
                found.push((key.clone(), item));
            }
        }
        Ok(found)
    }

    fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (FjallStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallStore::open(temp_dir.path().join("test_ledger")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_merge_patch() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": "x"});
        merge_patch(&mut target, &json!({"b": {"c": 5, "d": null}, "e": null, "f": [1]}));
        assert_eq!(target, json!({"a": 1, "b": {"c": 5}, "f": [1]}));
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, _temp) = create_test_store();
        let key = RecordKey::pdr("A.PDR");

        store.put(&key, json!({"pdrName": "A.PDR"})).await.unwrap();
        let item = store.get(&key).await.unwrap();
        assert_eq!(item["pdrName"], "A.PDR");

        // Same name in another partition is a different record
        let other = RecordKey::provider("A.PDR");
        assert!(store.get(&other).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_merges() {
        let (store, _temp) = create_test_store();
        let key = RecordKey::pdr("A.PDR");
        store
            .put(&key, json!({"status": "queued", "granules": {"g1": false}}))
            .await
            .unwrap();

        let updated = store
            .update(&key, json!({"granules": {"g2": true}, "status": "parsed"}))
            .await
            .unwrap();
        assert_eq!(updated["status"], "parsed");
        assert_eq!(updated["granules"], json!({"g1": false, "g2": true}));
        assert_eq!(store.get(&key).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let (store, _temp) = create_test_store();
        let err = store
            .update(&RecordKey::pdr("missing"), json!({"status": "parsed"}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_batch_get() {
        let (store, _temp) = create_test_store();
        store
            .put(&RecordKey::pdr("b"), json!({"pdrName": "b"}))
            .await
            .unwrap();

        let keys = vec![RecordKey::pdr("a"), RecordKey::pdr("b")];
        let found = store.batch_get(&keys).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, RecordKey::pdr("b"));

        let too_many: Vec<_> = (0..101).map(|i| RecordKey::pdr(i.to_string())).collect();
        assert!(matches!(
            store.batch_get(&too_many).await,
            Err(StoreError::BatchTooLarge { requested: 101, .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let (store, _temp) = create_test_store();
        let key = RecordKey::pdr("A.PDR");
        store.put(&key, json!({"granules": {}})).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    store
                        .update(&key, json!({"granules": {format!("g{}", i): true}}))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let item = store.get(&key).await.unwrap();
        assert_eq!(item["granules"].as_object().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_persisted_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger");
        {
            let store = FjallStore::open(&path).unwrap();
            store
                .put(&RecordKey::granule("C", "g"), json!({"status": "pending"}))
                .await
                .unwrap();
            store.persist().unwrap();
        }

        let store = FjallStore::open(&path).unwrap();
        let item = store.get(&RecordKey::granule("C", "g")).await.unwrap();
        assert_eq!(item["status"], "pending");
        assert!(store.get(&RecordKey::pdr("A.PDR")).await.is_err());
    }
}
