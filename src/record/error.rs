use crate::file::FileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Table file missing for table '{0}'")]
    MissingTableFile(String),

    #[error("Incompatible table file: {0}")]
    IncompatibleFile(String),

    #[error("Attribute '{attr}' not found in table '{table}'")]
    AttributeNotFound { attr: String, table: String },

    #[error("Record at offset {0} is already deleted")]
    AlreadyDeleted(u32),

    #[error("Invalid record offset: {0}")]
    InvalidOffset(u32),

    #[error("Table file {0} has no offset left for another record")]
    TableFull(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Value '{value}' exceeds CHAR({max})")]
    CharTooLong { value: String, max: usize },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

pub type RecordResult<T> = Result<T, RecordError>;
