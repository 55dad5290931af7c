//! Tracing setup and pipeline counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (tests, embedded use) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    pdrs_discovered: AtomicU64,
    pdrs_failed: AtomicU64,
    granules_queued: AtomicU64,
    granules_skipped: AtomicU64,
    files_staged: AtomicU64,
    files_skipped: AtomicU64,
    messages_failed: AtomicU64,
}

macro_rules! counter {
    ($method:ident, $field:ident) => {
        pub fn $method(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(counter = stringify!($field), "Metric incremented");
        }
    };
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(pdr_discovered, pdrs_discovered);
    counter!(pdr_failed, pdrs_failed);
    counter!(granule_queued, granules_queued);
    counter!(granule_skipped, granules_skipped);
    counter!(file_staged, files_staged);
    counter!(file_skipped, files_skipped);
    counter!(message_failed, messages_failed);

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pdrs_discovered: self.pdrs_discovered.load(Ordering::Relaxed),
            pdrs_failed: self.pdrs_failed.load(Ordering::Relaxed),
            granules_queued: self.granules_queued.load(Ordering::Relaxed),
            granules_skipped: self.granules_skipped.load(Ordering::Relaxed),
            files_staged: self.files_staged.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub pdrs_discovered: u64,
    pub pdrs_failed: u64,
    pub granules_queued: u64,
    pub granules_skipped: u64,
    pub files_staged: u64,
    pub files_skipped: u64,
    pub messages_failed: u64,
}
