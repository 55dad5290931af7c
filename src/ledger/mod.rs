/// Fjall-based persistence for manifest, granule and provider records
///
/// Records are JSON documents in three partitions of an embedded Fjall
/// keyspace. Everything above this module talks to the [`RecordStore`] trait;
/// [`FjallStore`] is the shipped implementation.
///
/// [`LifecycleManager`] is the only writer. It performs the dedup lookups
/// and enforces monotonic status transitions:
///
/// - PDR: `discovered -> queued -> parsed`, or `failed` from any state
/// - Granule: `pending -> processing -> completed | failed`
///
/// ## Usage
///
/// ```rust,ignore
/// use pdrbox::ledger::{FjallStore, LifecycleManager, PdrStatus};
///
/// let store = FjallStore::open("data/ledger")?;
/// let lifecycle = LifecycleManager::new(Arc::new(store));
/// lifecycle.advance_manifest_status("PDN.ID1703151100.PDR", PdrStatus::Queued).await?;
/// ```
pub mod error;
pub mod lifecycle;
pub mod partitions;
pub mod records;
pub mod store;

pub use error::{LifecycleError, Result, StoreError};
pub use lifecycle::{LifecycleManager, NewManifest};
pub use partitions::{GranuleKey, RecordKey};
pub use records::{
    FileSlot, GranuleRecord, GranuleStatus, Lifecycle, PdrRecord, PdrStatus, ProviderStatus, Step,
};
pub use store::{FjallStore, RecordStore, merge_patch};
