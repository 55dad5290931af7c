//! Queue workers
//!
//! Consumers poll a queue, run a [`MessageAction`] for each message and
//! delete only what succeeded. Two actions ship: parsing staged manifests
//! and staging granule files.

pub mod actions;
pub mod http;
pub mod runner;

pub use actions::{ActionError, MessageAction, ParsePdrAction, StageFileAction};
pub use http::{DownloadError, DownloadExecutor, HttpClient, HttpConfig};
pub use runner::{ConsumerState, PollReport, QueueConsumer, RunSummary, bounded};
