pub mod catalog;
pub mod config;
pub mod database;
pub mod file;
pub mod index;
pub mod record;

pub use catalog::{CatalogError, CatalogManager, CatalogResult, IndexDef};
pub use config::{ConfigError, EngineConfig, EngineConfigBuilder};
pub use database::{Database, DatabaseError, DatabaseResult};
pub use file::{BLOCK_SIZE, BlockId, BufferManager, FileError, FileResult, PagedFileManager};
pub use index::{BPlusTree, IndexError, IndexManager, IndexResult};
pub use record::{
    Attribute, CmpOp, DataType, Predicate, Record, RecordError, RecordManager, RecordResult,
    TableSchema, Value,
};
