use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::ingest::IngestError;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] serde_json::Error),

    #[error("event must name one of: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("handler not found: {0}")]
    NotFound(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// JSON-event entry point
///
/// A handler returns a JSON summary on success. Callers normally go through
/// [`invoke`](super::invoke), which also turns panics into errors.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: Value) -> Result<Value, HandlerError>;
}
