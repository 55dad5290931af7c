use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::default::{DiscoverPdrsHandler, IngestGranulesHandler, ParsePdrsHandler};
use super::invoke;
use super::traits::{Handler, HandlerError};
use crate::state::AppState;

/// Handlers by name
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under `handler.name()`, replacing any previous entry
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Handler>, HandlerError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| HandlerError::NotFound(name.to_string()))
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// The three pipeline stages over one shared state
    pub fn with_defaults(state: AppState) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DiscoverPdrsHandler::new(state.clone())));
        registry.register(Arc::new(ParsePdrsHandler::new(state.clone())));
        registry.register(Arc::new(IngestGranulesHandler::new(state)));
        registry
    }

    /// Look up `name` and [`invoke`] it; an unknown name reaches the callback too
    pub async fn invoke<F, R>(&self, name: &str, event: Value, callback: F) -> R
    where
        F: FnOnce(Option<HandlerError>, Option<Value>) -> R,
    {
        match self.get(name) {
            Ok(handler) => invoke(handler, event, callback).await,
            Err(e) => callback(Some(e), None),
        }
    }
}
