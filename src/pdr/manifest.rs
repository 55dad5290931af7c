use thiserror::Error;
use tracing::warn;

use super::parser::{self, ParseError};
use super::tree::PvlNode;

pub const FILE_GROUP: &str = "FILE_GROUP";
pub const FILE_SPEC: &str = "FILE_SPEC";
pub const XAR_ENTRY: &str = "XAR_ENTRY";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("PDR parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{object} is missing required field {field}")]
    MissingField {
        object: &'static str,
        field: &'static str,
    },

    #[error("{field} is not a valid number: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

/// One physical file listed in a `FILE_SPEC` object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub directory_id: String,
    pub file_id: String,
    pub file_type: Option<String>,
    pub file_size: Option<u64>,
}

impl FileSpec {
    /// `DIRECTORY_ID/FILE_ID` without duplicate separators
    pub fn path(&self) -> String {
        let dir = self.directory_id.trim_end_matches('/');
        if dir.is_empty() {
            self.file_id.clone()
        } else {
            format!("{}/{}", dir, self.file_id)
        }
    }
}

/// A `FILE_GROUP`: the files of one granule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    pub data_type: Option<String>,
    pub data_version: Option<String>,
    /// Explicit identifier from an `XAR_ENTRY`, used instead of filename extraction
    pub granule_id: Option<String>,
    pub specs: Vec<FileSpec>,
}

/// Typed view of a parsed PDR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub originating_system: Option<String>,
    pub total_file_count: Option<u64>,
    pub file_groups: Vec<FileGroup>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let root = parser::parse(text)?;
        Self::from_tree(&root)
    }

    /// Decompose a parsed tree into file groups.
    ///
    /// When the document wraps its content in groups, only the first group is
    /// read. Additional groups are reported with a warning and ignored.
    pub fn from_tree(root: &PvlNode) -> Result<Self, ManifestError> {
        let groups = root.groups();
        let scope = match groups.as_slice() {
            [] => root,
            [first] => first,
            [first, rest @ ..] => {
                warn!(
                    used = first.name(),
                    ignored = rest.len(),
                    "PDR has more than one top-level group, only the first is ingested"
                );
                first
            }
        };

        let total_file_count = scope
            .get("TOTAL_FILE_COUNT")
            .or_else(|| root.get("TOTAL_FILE_COUNT"))
            .map(|attr| {
                attr.as_u64().ok_or_else(|| ManifestError::InvalidNumber {
                    field: "TOTAL_FILE_COUNT",
                    value: attr.value.clone(),
                })
            })
            .transpose()?;

        let file_groups = scope
            .objects(FILE_GROUP)
            .into_iter()
            .map(file_group)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            originating_system: root
                .value("ORIGINATING_SYSTEM")
                .or_else(|| scope.value("ORIGINATING_SYSTEM"))
                .map(str::to_string),
            total_file_count,
            file_groups,
        })
    }

    /// Number of file specs across all groups
    pub fn file_count(&self) -> usize {
        self.file_groups.iter().map(|g| g.specs.len()).sum()
    }
}

fn file_group(node: &PvlNode) -> Result<FileGroup, ManifestError> {
    let specs = node
        .objects(FILE_SPEC)
        .into_iter()
        .map(file_spec)
        .collect::<Result<Vec<_>, _>>()?;

    let granule_id = node
        .objects(XAR_ENTRY)
        .first()
        .and_then(|entry| entry.value("GRANULE_ID"))
        .map(str::to_string);

    Ok(FileGroup {
        data_type: node.value("DATA_TYPE").map(str::to_string),
        data_version: node.value("DATA_VERSION").map(str::to_string),
        granule_id,
        specs,
    })
}

fn file_spec(node: &PvlNode) -> Result<FileSpec, ManifestError> {
    let directory_id = node.value("DIRECTORY_ID").ok_or(ManifestError::MissingField {
        object: FILE_SPEC,
        field: "DIRECTORY_ID",
    })?;
    let file_id = node.value("FILE_ID").ok_or(ManifestError::MissingField {
        object: FILE_SPEC,
        field: "FILE_ID",
    })?;

    let file_size = node
        .get("FILE_SIZE")
        .map(|attr| {
            attr.as_u64().ok_or_else(|| ManifestError::InvalidNumber {
                field: "FILE_SIZE",
                value: attr.value.clone(),
            })
        })
        .transpose()?;

    Ok(FileSpec {
        directory_id: directory_id.to_string(),
        file_id: file_id.to_string(),
        file_type: node.value("FILE_TYPE").map(str::to_string),
        file_size,
    })
}
