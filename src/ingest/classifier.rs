//! Ordered file-name classification
//!
//! A provider carries a table of `(collection, regex)` rows. A file name is
//! tested against the rows in configuration order and the first row that
//! matches names the collection.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("No collection pattern matches file '{file_name}'")]
    NoMatchingCollection { file_name: String },
}

pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Ordered classification table
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    rows: Vec<(String, Regex)>,
}

impl PatternTable {
    pub fn new(rows: Vec<(String, Regex)>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in match order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Regex)> {
        self.rows.iter().map(|(name, regex)| (name.as_str(), regex))
    }
}

/// Return the collection of the first row whose regex matches `file_name`
pub fn classify<'a>(file_name: &str, table: &'a PatternTable) -> Result<&'a str> {
    table
        .iter()
        .find(|(_, regex)| regex.is_match(file_name))
        .map(|(collection, _)| collection)
        .ok_or_else(|| ClassifyError::NoMatchingCollection {
            file_name: file_name.to_string(),
        })
}
