use thiserror::Error;

use super::partitions::RecordKey;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordKey),

    #[error("Batch of {requested} keys exceeds the limit of {limit}")]
    BatchTooLarge { requested: usize, limit: usize },

    #[error("Record {0} is not a JSON object")]
    NotAnObject(RecordKey),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::RecordNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid transition for {record}: {from} -> {to}")]
    InvalidTransition {
        record: String,
        from: String,
        to: String,
    },

    #[error("File '{file_name}' matches no slot of granule {granule}")]
    UnknownFile { granule: String, file_name: String },
}
