use super::models::{Config, StorageProvider};
use std::collections::HashSet;
use thiserror::Error;

/// Largest key count a single batch lookup may carry
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Provider '{provider}' pattern references unknown collection '{collection}'")]
    UnknownPatternCollection { provider: String, collection: String },

    #[error("Collection '{collection}' references unknown provider '{provider}'")]
    UnknownProvider { collection: String, provider: String },

    #[error("Invalid regex for {context}: {source}")]
    InvalidRegex {
        context: String,
        #[source]
        source: regex::Error,
    },

    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("ingest.batch_size ({actual}) must be between 1 and {limit}")]
    BatchSizeOutOfRange { actual: usize, limit: usize },

    #[error("Queue names must be distinct, non-empty and free of ':'")]
    InvalidQueueNames,

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_limits(config)?;
    validate_queues(config)?;
    validate_storage(config)?;
    validate_references(config)?;
    validate_patterns(config)?;
    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    if config.ingest.concurrency == 0 {
        return Err(ValidationError::NotPositive {
            field: "ingest.concurrency",
        });
    }
    if config.ingest.batch_size == 0 || config.ingest.batch_size > MAX_BATCH_SIZE {
        return Err(ValidationError::BatchSizeOutOfRange {
            actual: config.ingest.batch_size,
            limit: MAX_BATCH_SIZE,
        });
    }
    if config.consumer.pdr_messages == 0 {
        return Err(ValidationError::NotPositive {
            field: "consumer.pdr_messages",
        });
    }
    if config.consumer.file_concurrency == 0 {
        return Err(ValidationError::NotPositive {
            field: "consumer.file_concurrency",
        });
    }
    Ok(())
}

fn validate_queues(config: &Config) -> Result<(), ValidationError> {
    let names = [
        &config.queue.pdr_queue,
        &config.queue.file_queue,
        &config.queue.granule_queue,
    ];
    let unique: HashSet<_> = names.iter().collect();
    // ':' separates the queue name from the sequence in stored keys
    if names.iter().any(|n| n.is_empty() || n.contains(':')) || unique.len() != names.len() {
        return Err(ValidationError::InvalidQueueNames);
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::S3
        && (config.storage.access_key.is_none() || config.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }
    Ok(())
}

/// Names are unique and every cross reference resolves
fn validate_references(config: &Config) -> Result<(), ValidationError> {
    let mut providers = HashSet::new();
    for provider in &config.providers {
        if !providers.insert(provider.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                kind: "provider",
                name: provider.name.clone(),
            });
        }
    }

    let mut collections = HashSet::new();
    for collection in &config.collections {
        if !collections.insert(collection.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                kind: "collection",
                name: collection.name.clone(),
            });
        }
        if let Some(ref provider) = collection.provider {
            if !providers.contains(provider.as_str()) {
                return Err(ValidationError::UnknownProvider {
                    collection: collection.name.clone(),
                    provider: provider.clone(),
                });
            }
        }
    }

    for provider in &config.providers {
        for pattern in &provider.patterns {
            if !collections.contains(pattern.collection.as_str()) {
                return Err(ValidationError::UnknownPatternCollection {
                    provider: provider.name.clone(),
                    collection: pattern.collection.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Every configured regex compiles
fn validate_patterns(config: &Config) -> Result<(), ValidationError> {
    super::catalog::Catalog::from_config(config).map(|_| ())
}

pub(crate) fn compile(
    pattern: &str,
    context: impl FnOnce() -> String,
) -> Result<regex::Regex, ValidationError> {
    regex::Regex::new(pattern).map_err(|source| ValidationError::InvalidRegex {
        context: context(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{
        CollectionConfig, GranuleDefinitionConfig, PatternConfig, ProviderConfig, Transport,
    };

    fn collection(name: &str) -> CollectionConfig {
        CollectionConfig {
            name: name.to_string(),
            provider: None,
            granule_definition: GranuleDefinitionConfig {
                granule_id: "^.*$".to_string(),
                granule_id_extraction: "^(.*)\\.hdf".to_string(),
                files: [("data".to_string(), "\\.hdf$".to_string())].into(),
            },
            recipe: serde_json::Value::Null,
        }
    }

    fn provider(name: &str, patterns: &[(&str, &str)]) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            host: "http://localhost".to_string(),
            path: "/pdrs".to_string(),
            transport: Transport::Http,
            bulk_dispatch: false,
            patterns: patterns
                .iter()
                .map(|(c, r)| PatternConfig {
                    collection: c.to_string(),
                    regex: r.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let mut config = Config::default();
        config.collections.push(collection("MOD09GQ"));
        config.providers.push(provider("LP", &[("MOD09GQ", "^MOD09GQ")]));

        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_pattern_collection() {
        let mut config = Config::default();
        config.providers.push(provider("LP", &[("MISSING", "^x")]));

        assert!(matches!(
            validate(&config),
            Err(ValidationError::UnknownPatternCollection { .. })
        ));
    }

    #[test]
    fn test_unknown_collection_provider() {
        let mut config = Config::default();
        let mut c = collection("MOD09GQ");
        c.provider = Some("nowhere".to_string());
        config.collections.push(c);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::UnknownProvider { .. })
        ));
    }

    #[test]
    fn test_invalid_regex() {
        let mut config = Config::default();
        let mut c = collection("MOD09GQ");
        c.granule_definition.granule_id = "([".to_string();
        config.collections.push(c);

        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRegex { .. }));
        assert!(err.to_string().contains("granule_id"));
    }

    #[test]
    fn test_duplicate_collection() {
        let mut config = Config::default();
        config.collections.push(collection("A"));
        config.collections.push(collection("A"));

        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateName { kind: "collection", .. })
        ));
    }

    #[test]
    fn test_limits() {
        let mut config = Config::default();
        config.ingest.concurrency = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::NotPositive { .. })
        ));

        let mut config = Config::default();
        config.ingest.batch_size = 101;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::BatchSizeOutOfRange { actual: 101, .. })
        ));
    }

    #[test]
    fn test_queue_names_must_differ() {
        let mut config = Config::default();
        config.queue.file_queue = config.queue.pdr_queue.clone();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidQueueNames)
        ));
    }

    #[test]
    fn test_queue_names_reject_key_separator() {
        let mut config = Config::default();
        config.queue.file_queue = "pdrs:files".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidQueueNames)
        ));
    }

    #[test]
    fn test_s3_requires_credentials() {
        let mut config = Config::default();
        config.storage.provider = StorageProvider::S3;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingS3Credentials)
        ));
    }
}
