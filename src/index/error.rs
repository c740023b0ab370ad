use thiserror::Error;

use crate::file::FileError;
use crate::record::RecordError;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur during index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Key error: {0}")]
    Key(#[from] RecordError),

    #[error("Index file missing for index '{0}'")]
    MissingIndexFile(String),

    #[error("Index not open: {0}")]
    IndexNotOpen(String),

    #[error("Incompatible index file: {0}")]
    IncompatibleFile(String),

    #[error("Invalid fanout {fanout}: must be between 3 and {max}")]
    InvalidFanout { fanout: usize, max: usize },

    #[error("Key type mismatch: index holds {expected}, got {actual}")]
    KeyTypeMismatch { expected: String, actual: String },

    #[error("Corrupted node at block {0}")]
    CorruptedNode(u32),

    #[error("Invalid tree state: {0}")]
    InvalidState(String),
}
