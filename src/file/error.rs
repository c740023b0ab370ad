use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Block not cached: {0}")]
    BlockNotCached(String),

    #[error("Write of {len} bytes at offset {offset} runs past the end of the block")]
    BlockOverflow { offset: usize, len: usize },

    #[error("Header of {0} bytes does not fit in a block")]
    HeaderTooLarge(usize),

    #[error("Invalid block size: expected {expected}, got {actual}")]
    InvalidBlockSize { expected: usize, actual: usize },
}

pub type FileResult<T> = Result<T, FileError>;
