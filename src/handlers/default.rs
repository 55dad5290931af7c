//! Built-in pipeline handlers

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use super::traits::{Handler, HandlerError};
use super::types::{DEFAULT_MAX_ITERATIONS, DiscoverPdrsEvent, IngestGranulesEvent, ParsePdrsEvent};
use crate::ingest::DiscoveryScope;
use crate::state::AppState;

/// A missing event reads as `{}`
fn decode_event<T: DeserializeOwned + Default>(event: Value) -> Result<T, HandlerError> {
    if event.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(event)?)
}

/// Lists a provider and queues new manifests
pub struct DiscoverPdrsHandler {
    state: AppState,
}

impl DiscoverPdrsHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Handler for DiscoverPdrsHandler {
    fn name(&self) -> &'static str {
        "discover-pdrs"
    }

    async fn handle(&self, event: Value) -> Result<Value, HandlerError> {
        let event: DiscoverPdrsEvent = decode_event(event)?;
        // A collection carries its provider, so it wins when both are given
        let scope = match (event.collection_name, event.provider_name) {
            (Some(collection), _) => DiscoveryScope::Collection(collection),
            (None, Some(provider)) => DiscoveryScope::Provider(provider),
            (None, None) => return Err(HandlerError::MissingField("collectionName, providerName")),
        };

        let report = self
            .state
            .pdr_ingest()
            .discover(&scope, self.state.http.clone())
            .await?;
        info!(?scope, found = report.found, queued = report.queued, "Discovery finished");

        Ok(json!({
            "handler": self.name(),
            "report": report,
        }))
    }
}

/// Drains the manifest queue into granule dispatches
pub struct ParsePdrsHandler {
    state: AppState,
}

impl ParsePdrsHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Handler for ParsePdrsHandler {
    fn name(&self) -> &'static str {
        "parse-pdrs"
    }

    async fn handle(&self, event: Value) -> Result<Value, HandlerError> {
        let event: ParsePdrsEvent = decode_event(event)?;
        let config = &self.state.config;

        let messages = event.num_of_messages.unwrap_or(config.consumer.pdr_messages);
        let visibility = event
            .visibility_timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.state.pdr_visibility());
        let concurrency = event.concurrency.unwrap_or(config.ingest.concurrency);
        let max_iterations = event.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);

        let consumer = self
            .state
            .pdr_consumer(self.state.dispatcher(), concurrency);
        let summary = consumer.run(messages, visibility, max_iterations).await;

        Ok(json!({
            "handler": self.name(),
            "summary": summary,
            "metrics": self.state.metrics.snapshot(),
        }))
    }
}

/// Drains the file transfer queue into staging
pub struct IngestGranulesHandler {
    state: AppState,
}

impl IngestGranulesHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Handler for IngestGranulesHandler {
    fn name(&self) -> &'static str {
        "ingest-granules"
    }

    async fn handle(&self, event: Value) -> Result<Value, HandlerError> {
        let event: IngestGranulesEvent = decode_event(event)?;

        let concurrency = event
            .concurrency
            .unwrap_or(self.state.config.consumer.file_concurrency);
        let visibility = event
            .visibility_timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.state.file_visibility());
        let max_iterations = event.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);

        let summary = self
            .state
            .file_consumer()
            .run(concurrency, visibility, max_iterations)
            .await;

        Ok(json!({
            "handler": self.name(),
            "summary": summary,
            "metrics": self.state.metrics.snapshot(),
        }))
    }
}
