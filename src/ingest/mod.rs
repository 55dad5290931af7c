//! Manifest ingest: discovery, classification, granule building and dispatch

pub mod classifier;
pub mod discovery;
pub mod dispatch;
pub mod granule;
pub mod pdrs;

pub use classifier::{ClassifyError, PatternTable, classify};
pub use discovery::{
    DiscoveredPdr, DiscoveryError, DiscoverySource, HttpListing, UnimplementedSource,
};
pub use dispatch::{
    DispatchEngine, DispatchError, DispatchObserver, DispatchQueues, DispatchReport,
    DispatchTarget,
};
pub use granule::{BuildError, DiscoveredFile, FileRole};
pub use pdrs::{DiscoveryReport, DiscoveryScope, IngestError, PdrIngest, UNREACHABLE_PDR};
