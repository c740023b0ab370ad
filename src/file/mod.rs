mod buffer_manager;
mod error;
mod file_manager;
pub mod layout;

pub use buffer_manager::{Block, BlockId, BufferManager};
pub use error::{FileError, FileResult};
pub use file_manager::PagedFileManager;
pub use layout::FileType;

/// Block size in bytes (4KB)
pub const BLOCK_SIZE: usize = 4096;

/// Default number of blocks held by the block cache
pub const CACHE_CAPACITY: usize = 1024;

/// Default number of simultaneously open backing files
pub const MAX_OPEN_FILES: usize = 128;

/// Block index within a file
pub type BlockIndex = u32;
