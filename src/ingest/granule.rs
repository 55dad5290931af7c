//! Granule record construction
//!
//! A granule record is built from its collection's slot template and the
//! files discovered for it. The granule identifier must pass the collection's
//! `granule_id` regex as-is.

use chrono::Utc;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use crate::config::{CollectionDefinition, UnmatchedFilePolicy};
use crate::ledger::{FileSlot, GranuleRecord, GranuleStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Invalid granule id '{granule_id}': expected to match '{pattern}'")]
    InvalidGranuleId { granule_id: String, pattern: String },

    #[error("Cannot extract a granule id from '{file_name}' with '{pattern}'")]
    GranuleIdExtraction { file_name: String, pattern: String },

    #[error("File '{file_name}' matches no slot of collection '{collection}'")]
    UnmatchedFile {
        collection: String,
        file_name: String,
    },
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Which location field of a slot a discovered file fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Sip,
    Staging,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Base name of `uri`
    pub name: String,
    pub uri: String,
    pub role: FileRole,
}

impl DiscoveredFile {
    pub fn new(uri: impl Into<String>, role: FileRole) -> Self {
        let uri = uri.into();
        Self {
            name: base_name(&uri).to_string(),
            uri,
            role,
        }
    }

    /// File as listed at its source
    pub fn sip(uri: impl Into<String>) -> Self {
        Self::new(uri, FileRole::Sip)
    }
}

/// Last path segment of a URL or path, ignoring any query string
pub fn base_name(uri: &str) -> &str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    path.rsplit('/').next().unwrap_or(path)
}

/// Explicit identifiers are used verbatim; otherwise the first capture group of
/// the collection's extraction pattern applied to `first_file`
pub fn extract_granule_id(
    collection: &CollectionDefinition,
    explicit: Option<&str>,
    first_file: &str,
) -> Result<String> {
    if let Some(id) = explicit {
        return Ok(id.to_string());
    }

    collection
        .granule_id_extraction
        .captures(first_file)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| BuildError::GranuleIdExtraction {
            file_name: first_file.to_string(),
            pattern: collection.granule_id_extraction.as_str().to_string(),
        })
}

/// Build a `pending` granule record
pub fn build(
    collection: &CollectionDefinition,
    pdr_name: &str,
    granule_id: &str,
    files: &[DiscoveredFile],
    policy: UnmatchedFilePolicy,
) -> Result<GranuleRecord> {
    if !collection.granule_id.is_match(granule_id) {
        return Err(BuildError::InvalidGranuleId {
            granule_id: granule_id.to_string(),
            pattern: collection.granule_id.as_str().to_string(),
        });
    }

    let mut slots: BTreeMap<String, FileSlot> = collection
        .slots
        .iter()
        .map(|slot| (slot.name.clone(), FileSlot::empty(slot.regex.as_str())))
        .collect();

    for file in files {
        let matched = collection
            .slots
            .iter()
            .filter(|slot| slot.regex.is_match(&file.name))
            .map(|slot| slot.name.as_str())
            .collect::<Vec<_>>();

        if matched.is_empty() {
            match policy {
                UnmatchedFilePolicy::Drop => {
                    warn!(
                        collection = %collection.name,
                        granule_id,
                        file = %file.name,
                        "File matches no slot; leaving it out of the granule"
                    );
                    continue;
                }
                UnmatchedFilePolicy::Fail => {
                    return Err(BuildError::UnmatchedFile {
                        collection: collection.name.clone(),
                        file_name: file.name.clone(),
                    });
                }
            }
        }

        for name in matched {
            let Some(slot) = slots.get_mut(name) else {
                continue;
            };
            // First file to land in a slot keeps it
            if slot.is_populated() {
                continue;
            }
            slot.name = Some(file.name.clone());
            let location = Some(file.uri.clone());
            match file.role {
                FileRole::Sip => slot.sip_file = location,
                FileRole::Staging => slot.staging_file = location,
                FileRole::Archived => slot.archived_file = location,
            }
        }
    }

    let now = Utc::now();
    Ok(GranuleRecord {
        granule_id: granule_id.to_string(),
        collection_name: collection.name.clone(),
        pdr_name: pdr_name.to_string(),
        files: slots,
        recipe: collection.recipe.clone(),
        status: GranuleStatus::Pending,
        duration: None,
        ingest_ended: None,
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotDefinition;
    use regex::Regex;

    const GRANULE: &str = "MOD09GQ.A2017025.h21v00.006.2017034065104";

    fn collection() -> CollectionDefinition {
        CollectionDefinition {
            name: "MOD09GQ".to_string(),
            provider: None,
            granule_id: Regex::new(r"^MOD09GQ\.A[\d]{7}\.[\S]{6}\.006\.[\d]{13}$").unwrap(),
            granule_id_extraction: Regex::new(r"(MOD09GQ\..*)\.hdf").unwrap(),
            slots: vec![
                SlotDefinition {
                    name: "data".to_string(),
                    regex: Regex::new(r"^MOD09GQ\.A[\d]{7}\.[\S]{6}\.006\.[\d]{13}\.hdf$")
                        .unwrap(),
                },
                SlotDefinition {
                    name: "meta".to_string(),
                    regex: Regex::new(r"^MOD09GQ\.A[\d]{7}\.[\S]{6}\.006\.[\d]{13}\.hdf\.met$")
                        .unwrap(),
                },
            ],
            recipe: serde_json::json!({"process": "modis"}),
        }
    }

    fn files() -> Vec<DiscoveredFile> {
        vec![
            DiscoveredFile::sip(format!("https://host/MOLT/{}.hdf", GRANULE)),
            DiscoveredFile::sip(format!("https://host/MOLT/{}.hdf.met", GRANULE)),
        ]
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("https://host/a/b/file.hdf"), "file.hdf");
        assert_eq!(base_name("https://host/a/file.hdf?x=1"), "file.hdf");
        assert_eq!(base_name("file.hdf"), "file.hdf");
    }

    #[test]
    fn test_build_populates_both_slots() {
        let record = build(
            &collection(),
            "A.PDR",
            GRANULE,
            &files(),
            UnmatchedFilePolicy::Drop,
        )
        .unwrap();

        assert_eq!(record.status, GranuleStatus::Pending);
        assert_eq!(record.pdr_name, "A.PDR");
        assert_eq!(record.recipe["process"], "modis");

        let data = &record.files["data"];
        assert_eq!(data.name.as_deref(), Some(format!("{}.hdf", GRANULE).as_str()));
        assert!(data.sip_file.as_deref().unwrap().starts_with("https://host/MOLT/"));
        assert!(data.staging_file.is_none());

        let meta = &record.files["meta"];
        assert_eq!(
            meta.name.as_deref(),
            Some(format!("{}.hdf.met", GRANULE).as_str())
        );
    }

    #[test]
    fn test_invalid_granule_id_is_not_coerced() {
        let truncated = &GRANULE[..GRANULE.len() - 1];
        let err = build(
            &collection(),
            "A.PDR",
            truncated,
            &files(),
            UnmatchedFilePolicy::Drop,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::InvalidGranuleId { .. }));
    }

    #[test]
    fn test_unmatched_file_policy() {
        let mut with_extra = files();
        with_extra.push(DiscoveredFile::sip("https://host/MOLT/browse.jpg"));

        let record = build(
            &collection(),
            "A.PDR",
            GRANULE,
            &with_extra,
            UnmatchedFilePolicy::Drop,
        )
        .unwrap();
        assert_eq!(record.files.len(), 2);

        let err = build(
            &collection(),
            "A.PDR",
            GRANULE,
            &with_extra,
            UnmatchedFilePolicy::Fail,
        )
        .unwrap_err();
        assert_eq!(
            err,
            BuildError::UnmatchedFile {
                collection: "MOD09GQ".to_string(),
                file_name: "browse.jpg".to_string()
            }
        );
    }

    #[test]
    fn test_extract_granule_id() {
        let c = collection();
        let file = format!("{}.hdf", GRANULE);

        assert_eq!(extract_granule_id(&c, None, &file).unwrap(), GRANULE);
        assert_eq!(
            extract_granule_id(&c, Some("explicit-id"), &file).unwrap(),
            "explicit-id"
        );
        assert!(matches!(
            extract_granule_id(&c, None, "other.bin"),
            Err(BuildError::GranuleIdExtraction { .. })
        ));
    }
}
