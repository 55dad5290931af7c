//! Event handlers
//!
//! Each pipeline stage is reachable as a named [`Handler`] taking a JSON
//! event and producing a JSON summary. [`invoke`] runs a handler on its own
//! task and reports through a callback, so a panic inside a stage reaches
//! the caller as [`HandlerError::Panicked`] instead of unwinding into it.
//!
//! ```rust,ignore
//! let registry = HandlerRegistry::with_defaults(state);
//! registry
//!     .invoke("parse-pdrs", json!({"maxIterations": 0}), |err, msg| {
//!         if let Some(err) = err {
//!             eprintln!("{err}");
//!         }
//!         msg
//!     })
//!     .await;
//! ```

mod default;
mod registry;
mod traits;
pub(crate) mod types;

use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use crate::worker::runner::panic_message;

pub use default::{DiscoverPdrsHandler, IngestGranulesHandler, ParsePdrsHandler};
pub use registry::HandlerRegistry;
pub use traits::{Handler, HandlerError};
pub use types::{DEFAULT_MAX_ITERATIONS, DiscoverPdrsEvent, IngestGranulesEvent, ParsePdrsEvent};

/// Run `handler` and hand the outcome to `callback` as `(error, message)`
///
/// Exactly one side is `Some`.
pub async fn invoke<F, R>(handler: Arc<dyn Handler>, event: Value, callback: F) -> R
where
    F: FnOnce(Option<HandlerError>, Option<Value>) -> R,
{
    let name = handler.name();
    let outcome = tokio::spawn(async move { handler.handle(event).await }).await;

    match outcome {
        Ok(Ok(message)) => callback(None, Some(message)),
        Ok(Err(e)) => {
            error!(handler = name, error = %e, "Handler failed");
            callback(Some(e), None)
        }
        Err(join_error) => {
            let reason = if join_error.is_panic() {
                panic_message(join_error.into_panic())
            } else {
                "task cancelled".to_string()
            };
            error!(handler = name, reason = %reason, "Handler panicked");
            callback(Some(HandlerError::Panicked(reason)), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ingest::IngestError;
    use crate::ledger::FjallStore;
    use crate::queue::FjallQueue;
    use crate::state::AppState;
    use crate::storage::StorageClient;
    use crate::worker::{HttpClient, HttpConfig};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    struct Exploding;

    #[async_trait]
    impl Handler for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        async fn handle(&self, _event: Value) -> Result<Value, HandlerError> {
            panic!("boom");
        }
    }

    fn state(temp_dir: &TempDir) -> AppState {
        let config = Config::from_toml_str(
            r#"
[queue]
poll_interval_ms = 5

[[providers]]
name = "LPDAAC"
host = "https://e4ftl01.cr.usgs.gov"
path = "/PDR"
"#,
        )
        .unwrap();
        let store = FjallStore::open(temp_dir.path().join("ledger")).unwrap();
        let queue = FjallQueue::open(temp_dir.path().join("queue")).unwrap();
        let http = Arc::new(HttpClient::new(HttpConfig::default()).unwrap());
        AppState::with_parts(
            config,
            Arc::new(store),
            Arc::new(queue),
            StorageClient::in_memory(),
            http.clone(),
            http,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_panic_reaches_callback() {
        let outcome = invoke(Arc::new(Exploding), Value::Null, |err, msg| (err, msg)).await;
        match outcome {
            (Some(HandlerError::Panicked(reason)), None) => assert_eq!(reason, "boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_registry_defaults_and_unknown_name() {
        let temp_dir = TempDir::new().unwrap();
        let registry = HandlerRegistry::with_defaults(state(&temp_dir));

        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["discover-pdrs", "ingest-granules", "parse-pdrs"]);

        let err = registry
            .invoke("nope", json!({}), |err, _| err)
            .await
            .unwrap();
        assert!(matches!(err, HandlerError::NotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_discover_requires_a_scope() {
        let temp_dir = TempDir::new().unwrap();
        let registry = HandlerRegistry::with_defaults(state(&temp_dir));

        let err = registry
            .invoke("discover-pdrs", json!({}), |err, _| err)
            .await
            .unwrap();
        assert!(matches!(err, HandlerError::MissingField(_)));

        let err = registry
            .invoke("discover-pdrs", json!({"providerName": "GHOST"}), |err, _| err)
            .await
            .unwrap();
        assert!(matches!(
            err,
            HandlerError::Ingest(IngestError::UnknownProvider(name)) if name == "GHOST"
        ));
    }

    #[tokio::test]
    async fn test_parse_pdrs_on_empty_queue_returns_summary() {
        let temp_dir = TempDir::new().unwrap();
        let registry = HandlerRegistry::with_defaults(state(&temp_dir));

        let message = registry
            .invoke("parse-pdrs", Value::Null, |err, msg| {
                assert!(err.is_none());
                msg
            })
            .await
            .unwrap();
        assert_eq!(message["handler"], "parse-pdrs");
        assert_eq!(message["summary"]["iterations"], 1);
        assert_eq!(message["summary"]["received"], 0);
    }

    #[tokio::test]
    async fn test_malformed_event_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let registry = HandlerRegistry::with_defaults(state(&temp_dir));

        let err = registry
            .invoke("ingest-granules", json!({"concurrency": "lots"}), |err, _| err)
            .await
            .unwrap();
        assert!(matches!(err, HandlerError::InvalidEvent(_)));
    }
}
