//! Configuration management for pdrbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use pdrbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! let catalog = config.catalog().expect("Invalid collection definitions");
//! println!("{} collections configured", catalog.collection_count());
//! ```
//!
//! # Environment Variables
//!
//! Scalar settings can be overridden with `PDRBOX__<section>__<key>`:
//! - `PDRBOX__INGEST__CONCURRENCY=10`
//! - `PDRBOX__QUEUE__PDR_QUEUE=pdrs-prod`
//! - `PDRBOX__STORAGE__PROVIDER=s3`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/pdrbox.toml`.
//! This can be overridden using the `PDRBOX_CONFIG` environment variable.
//! Providers and collections are arrays of tables so that classification
//! order is exactly the order written in the file.

mod catalog;
mod models;
mod sources;
mod validation;

pub use catalog::{
    Catalog, CollectionDefinition, ProviderDefinition, SlotDefinition, join_url,
};
pub use models::{
    CollectionConfig, Config, ConsumerConfig, GranuleDefinitionConfig, HttpSettings,
    IngestConfig, PatternConfig, ProviderConfig, QueueConfig, StorageConfig, StorageProvider,
    StoreConfig, Transport, UnmatchedFilePolicy,
};
pub use validation::{MAX_BATCH_SIZE, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails
    /// (unknown references, bad regexes, out-of-range limits).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load(sources::config_path())?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Parse and validate TOML text without the file and environment layers
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Compile collection and provider definitions
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        Ok(Catalog::from_config(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const FULL_CONFIG: &str = r#"
[store]
path = "data/ledger"

[queue]
path = "data/queue"
pdr_queue = "pdrs"
file_queue = "files"
granule_queue = "granules"

[storage]
provider = "memory"
bucket = "internal"

[ingest]
concurrency = 5
batch_size = 60

[[providers]]
name = "LPDAAC"
host = "https://e4ftl01.cr.usgs.gov"
path = "/PDR"

[[providers.patterns]]
collection = "MOD09GQ"
regex = "^MOD09GQ"

[[collections]]
name = "MOD09GQ"
provider = "LPDAAC"
recipe = { process = "modis" }

[collections.granule_definition]
granule_id = "^MOD09GQ\\.A[\\d]{7}\\.[\\S]{6}\\.006\\.[\\d]{13}$"
granule_id_extraction = "(MOD09GQ\\..*)\\.hdf"

[collections.granule_definition.files]
data = "^MOD09GQ\\.A[\\d]{7}\\.[\\S]{6}\\.006\\.[\\d]{13}\\.hdf$"
meta = "^MOD09GQ\\.A[\\d]{7}\\.[\\S]{6}\\.006\\.[\\d]{13}\\.hdf\\.met$"
"#;

    #[test]
    fn test_load_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");
        fs::write(&config_path, FULL_CONFIG).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.collections.len(), 1);
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert_eq!(config.collections[0].recipe["process"], "modis");

        let catalog = config.catalog().unwrap();
        let collection = catalog.collection("MOD09GQ").unwrap();
        assert!(
            collection
                .granule_id
                .is_match("MOD09GQ.A2017025.h21v00.006.2017034065104")
        );
        assert_eq!(collection.slots.len(), 2);
    }

    #[test]
    fn test_from_toml_str_matches_file_loading() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();
        assert_eq!(config.providers[0].patterns[0].collection, "MOD09GQ");
        assert_eq!(config.queue.granule_queue, "granules");
    }

    #[test]
    fn test_validation_catches_unknown_collection() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[[providers]]
name = "LPDAAC"
host = "https://e4ftl01.cr.usgs.gov"

[[providers.patterns]]
collection = "NOPE"
regex = "^X"
        "#;
        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::UnknownPatternCollection { .. })
        ));
    }
}
