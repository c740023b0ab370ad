//! Index management module

mod btree;
mod error;
mod node;

pub use btree::{BPlusTree, IndexHeader, SearchResult};
pub use error::{IndexError, IndexResult};
pub use node::{MIN_FANOUT, NODE_HEADER_SIZE, Node, max_fanout};

use std::collections::HashMap;

use tracing::debug;

use crate::file::BufferManager;
use crate::record::{DataType, Value};

/// Name of the file backing an index
pub fn index_file_name(index: &str) -> String {
    format!("minisql_{index}.idx")
}

/// Index store: one B+Tree file per index
pub struct IndexManager {
    /// Requested fanout; `None` uses the largest one the key type allows
    fanout: Option<usize>,

    /// Open indexes by index name
    open_indexes: HashMap<String, BPlusTree>,
}

impl IndexManager {
    /// Open the trees of the given indexes; each file must exist
    pub fn init<'a>(
        buffer_mgr: &mut BufferManager,
        indexes: impl IntoIterator<Item = &'a str>,
        fanout: Option<usize>,
    ) -> IndexResult<Self> {
        if let Some(requested) = fanout
            && requested < MIN_FANOUT
        {
            return Err(IndexError::InvalidFanout {
                fanout: requested,
                max: max_fanout(&DataType::Int),
            });
        }

        let mut open_indexes = HashMap::new();

        for index in indexes {
            let file_name = index_file_name(index);
            if !buffer_mgr.file_exists(&file_name) {
                return Err(IndexError::MissingIndexFile(index.to_string()));
            }
            let tree = BPlusTree::open(buffer_mgr, &file_name)?;
            open_indexes.insert(index.to_string(), tree);
        }

        debug!(indexes = open_indexes.len(), "index manager ready");
        Ok(Self {
            fanout,
            open_indexes,
        })
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.open_indexes.contains_key(index)
    }

    /// Fanout a new index on `key_type` gets
    pub fn fanout_for(&self, key_type: &DataType) -> usize {
        let max = max_fanout(key_type);
        self.fanout.unwrap_or(max).min(max)
    }

    /// Fanout a new index on `key_type` gets, or the error creating it would hit
    pub fn check_fanout(&self, key_type: &DataType) -> IndexResult<usize> {
        let fanout = self.fanout_for(key_type);
        if fanout < MIN_FANOUT {
            return Err(IndexError::InvalidFanout {
                fanout,
                max: max_fanout(key_type),
            });
        }
        Ok(fanout)
    }

    /// Create an empty index file
    pub fn create_index(
        &mut self,
        buffer_mgr: &mut BufferManager,
        index: &str,
        key_type: DataType,
    ) -> IndexResult<()> {
        let file_name = index_file_name(index);
        let tree = BPlusTree::create(buffer_mgr, &file_name, key_type, self.check_fanout(&key_type)?)?;
        self.open_indexes.insert(index.to_string(), tree);
        Ok(())
    }

    /// Delete an index file
    pub fn drop_index(&mut self, buffer_mgr: &mut BufferManager, index: &str) -> IndexResult<()> {
        self.open_indexes.remove(index);

        let file_name = index_file_name(index);
        if !buffer_mgr.file_exists(&file_name) {
            return Err(IndexError::MissingIndexFile(index.to_string()));
        }
        buffer_mgr.delete_file(&file_name)?;
        debug!(index, "dropped index file");
        Ok(())
    }

    /// Map `key` to a record offset, replacing any previous mapping
    pub fn insert(
        &mut self,
        buffer_mgr: &mut BufferManager,
        index: &str,
        key: Value,
        offset: u32,
    ) -> IndexResult<()> {
        self.tree_mut(index)?.insert(buffer_mgr, key, offset)
    }

    pub fn find(
        &self,
        buffer_mgr: &mut BufferManager,
        index: &str,
        key: &Value,
    ) -> IndexResult<SearchResult> {
        self.tree(index)?.find(buffer_mgr, key)
    }

    pub fn has_key(
        &self,
        buffer_mgr: &mut BufferManager,
        index: &str,
        key: &Value,
    ) -> IndexResult<bool> {
        self.tree(index)?.has_key(buffer_mgr, key)
    }

    /// Remove a key; returns whether it was present
    pub fn remove(
        &mut self,
        buffer_mgr: &mut BufferManager,
        index: &str,
        key: &Value,
    ) -> IndexResult<bool> {
        self.tree_mut(index)?.remove(buffer_mgr, key)
    }

    /// Remove every key
    pub fn clear(&mut self, buffer_mgr: &mut BufferManager, index: &str) -> IndexResult<()> {
        self.tree_mut(index)?.clear(buffer_mgr)
    }

    /// Every `(key, offset)` pair in key order
    pub fn entries(
        &self,
        buffer_mgr: &mut BufferManager,
        index: &str,
    ) -> IndexResult<Vec<(Value, u32)>> {
        self.tree(index)?.entries(buffer_mgr)
    }

    pub fn tree(&self, index: &str) -> IndexResult<&BPlusTree> {
        self.open_indexes
            .get(index)
            .ok_or_else(|| IndexError::IndexNotOpen(index.to_string()))
    }

    fn tree_mut(&mut self, index: &str) -> IndexResult<&mut BPlusTree> {
        self.open_indexes
            .get_mut(index)
            .ok_or_else(|| IndexError::IndexNotOpen(index.to_string()))
    }
}
