//! Compiled collection and provider definitions
//!
//! The catalog is built once per run from [`Config`] and shared by `Arc`.
//! Nothing mutates it after construction.

use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use super::models::{CollectionConfig, Config, ProviderConfig, Transport};
use super::validation::{ValidationError, compile};
use crate::ingest::classifier::PatternTable;

/// Named file slot of a granule
#[derive(Debug, Clone)]
pub struct SlotDefinition {
    pub name: String,
    pub regex: Regex,
}

/// Dataset definition with compiled patterns
#[derive(Debug, Clone)]
pub struct CollectionDefinition {
    pub name: String,
    pub provider: Option<String>,
    pub granule_id: Regex,
    pub granule_id_extraction: Regex,
    /// Slots sorted by name
    pub slots: Vec<SlotDefinition>,
    pub recipe: serde_json::Value,
}

impl CollectionDefinition {
    pub fn from_config(config: &CollectionConfig) -> Result<Self, ValidationError> {
        let def = &config.granule_definition;
        let granule_id = compile(&def.granule_id, || {
            format!("collection '{}' granule_id", config.name)
        })?;
        let granule_id_extraction = compile(&def.granule_id_extraction, || {
            format!("collection '{}' granule_id_extraction", config.name)
        })?;

        let slots = def
            .files
            .iter()
            .map(|(slot, pattern)| {
                compile(pattern, || {
                    format!("collection '{}' slot '{}'", config.name, slot)
                })
                .map(|regex| SlotDefinition {
                    name: slot.clone(),
                    regex,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            provider: config.provider.clone(),
            granule_id,
            granule_id_extraction,
            slots,
            recipe: config.recipe.clone(),
        })
    }
}

/// Provider definition with its compiled classification table
#[derive(Debug, Clone)]
pub struct ProviderDefinition {
    pub name: String,
    pub host: String,
    pub path: String,
    pub transport: Transport,
    pub bulk_dispatch: bool,
    pub patterns: PatternTable,
}

impl ProviderDefinition {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ValidationError> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                compile(&p.regex, || {
                    format!("provider '{}' pattern '{}'", config.name, p.collection)
                })
                .map(|regex| (p.collection.clone(), regex))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            host: config.host.clone(),
            path: config.path.clone(),
            transport: config.transport,
            bulk_dispatch: config.bulk_dispatch,
            patterns: PatternTable::new(patterns),
        })
    }

    /// Listing URL: host joined with path
    pub fn endpoint(&self) -> String {
        join_url(&self.host, &self.path)
    }
}

/// Join URL segments with exactly one `/` between them
pub fn join_url(base: &str, segment: &str) -> String {
    let base = base.trim_end_matches('/');
    let segment = segment.trim_start_matches('/');
    if segment.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, segment)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    collections: HashMap<String, Arc<CollectionDefinition>>,
    providers: HashMap<String, Arc<ProviderDefinition>>,
}

impl Catalog {
    pub fn from_config(config: &Config) -> Result<Self, ValidationError> {
        let mut catalog = Self::default();
        for collection in &config.collections {
            catalog.insert_collection(CollectionDefinition::from_config(collection)?);
        }
        for provider in &config.providers {
            catalog.insert_provider(ProviderDefinition::from_config(provider)?);
        }
        Ok(catalog)
    }

    pub fn insert_collection(&mut self, collection: CollectionDefinition) {
        self.collections
            .insert(collection.name.clone(), Arc::new(collection));
    }

    pub fn insert_provider(&mut self, provider: ProviderDefinition) {
        self.providers
            .insert(provider.name.clone(), Arc::new(provider));
    }

    pub fn collection(&self, name: &str) -> Option<Arc<CollectionDefinition>> {
        self.collections.get(name).cloned()
    }

    pub fn provider(&self, name: &str) -> Option<Arc<ProviderDefinition>> {
        self.providers.get(name).cloned()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}
