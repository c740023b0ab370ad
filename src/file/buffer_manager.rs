use std::fmt;

use lru::LruCache;
use tracing::{debug, trace};

use super::error::{FileError, FileResult};
use super::file_manager::PagedFileManager;
use super::{BLOCK_SIZE, BlockIndex, CACHE_CAPACITY};

/// Identifies a block: the file it belongs to and its index within that file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    file: String,
    index: BlockIndex,
}

impl BlockId {
    pub fn new(file: impl Into<String>, index: BlockIndex) -> Self {
        Self {
            file: file.into(),
            index,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn index(&self) -> BlockIndex {
        self.index
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file, self.index)
    }
}

/// A cached block
pub struct Block {
    /// The block contents, always `BLOCK_SIZE` bytes
    data: Vec<u8>,
    /// Modified since it was loaded or last flushed
    dirty: bool,
    /// Outstanding pins; a pinned block is never evicted
    pin_count: u32,
}

impl Block {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            dirty: false,
            pin_count: 0,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }
}

/// Block cache with LRU eviction, write-back of dirty blocks and pinning.
///
/// Capacity is a soft limit: when every cached block is pinned a new block
/// is admitted anyway, and the pool shrinks back on later loads once blocks
/// are unpinned.
pub struct BufferManager {
    /// Underlying file manager
    file_manager: PagedFileManager,
    /// Cached blocks, most recently used first
    pool: LruCache<BlockId, Block>,
    /// Nominal number of cached blocks
    capacity: usize,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(file_manager: PagedFileManager) -> Self {
        Self::with_capacity(file_manager, CACHE_CAPACITY)
    }

    /// Create a new buffer manager with specified capacity
    pub fn with_capacity(file_manager: PagedFileManager, capacity: usize) -> Self {
        Self {
            file_manager,
            // Eviction is driven here, not by the cache, so pinned blocks can be skipped
            pool: LruCache::unbounded(),
            capacity: capacity.max(1),
        }
    }

    /// Get a reference to the file manager
    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    /// Get a mutable reference to the file manager
    pub fn file_manager_mut(&mut self) -> &mut PagedFileManager {
        &mut self.file_manager
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.file_manager.exists(name)
    }

    /// Create a file whose block 0 holds `header` followed by zeros.
    ///
    /// Block 0 is installed in the cache as dirty; it reaches disk on
    /// eviction or flush.
    pub fn create_file(&mut self, name: &str, header: &[u8]) -> FileResult<()> {
        if header.len() > BLOCK_SIZE {
            return Err(FileError::HeaderTooLarge(header.len()));
        }

        self.file_manager.create_file(name)?;
        self.discard_file(name);
        self.make_room()?;

        let mut block = Block::new(vec![0u8; BLOCK_SIZE]);
        block.data[..header.len()].copy_from_slice(header);
        block.dirty = true;
        self.pool.put(BlockId::new(name, 0), block);

        Ok(())
    }

    /// Delete a file and drop all of its cached blocks without writing them
    pub fn delete_file(&mut self, name: &str) -> FileResult<()> {
        self.discard_file(name);
        self.file_manager.remove_file(name)
    }

    /// Get a block, loading it from disk if necessary; marks it most recently used
    pub fn read_block(&mut self, id: &BlockId) -> FileResult<&Block> {
        if self.pool.get(id).is_none() {
            self.load_block(id)?;
        }

        self.pool
            .peek(id)
            .ok_or_else(|| FileError::BlockNotCached(id.to_string()))
    }

    /// Copy `payload` into a block at `offset` and mark the block dirty
    pub fn write_block(&mut self, id: &BlockId, offset: usize, payload: &[u8]) -> FileResult<()> {
        let end = offset + payload.len();
        if end > BLOCK_SIZE {
            return Err(FileError::BlockOverflow {
                offset,
                len: payload.len(),
            });
        }

        self.read_block(id)?;
        let block = self
            .pool
            .peek_mut(id)
            .ok_or_else(|| FileError::BlockNotCached(id.to_string()))?;

        block.data[offset..end].copy_from_slice(payload);
        block.dirty = true;
        Ok(())
    }

    /// Pin a block, loading it first if necessary
    pub fn pin(&mut self, id: &BlockId) -> FileResult<()> {
        self.read_block(id)?;
        if let Some(block) = self.pool.peek_mut(id) {
            block.pin_count += 1;
        }
        Ok(())
    }

    /// Release one pin on a block; unknown or unpinned blocks are ignored
    pub fn unpin(&mut self, id: &BlockId) {
        if let Some(block) = self.pool.peek_mut(id) {
            block.pin_count = block.pin_count.saturating_sub(1);
        }
    }

    /// Flush a specific block to disk if it's dirty
    pub fn flush_block(&mut self, id: &BlockId) -> FileResult<()> {
        if let Some(block) = self.pool.peek_mut(id)
            && block.dirty
        {
            self.file_manager
                .write_block(id.file(), id.index(), &block.data)?;
            block.dirty = false;
        }
        Ok(())
    }

    /// Flush all dirty blocks to disk and sync the files
    pub fn flush_all(&mut self) -> FileResult<()> {
        let dirty: Vec<BlockId> = self
            .pool
            .iter()
            .filter(|(_, block)| block.dirty)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &dirty {
            self.flush_block(id)?;
        }

        self.file_manager.sync_all()?;
        debug!(blocks = dirty.len(), "flushed block cache");
        Ok(())
    }

    /// Number of blocks currently cached
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if a block is cached without touching its recency
    pub fn is_cached(&self, id: &BlockId) -> bool {
        self.pool.contains(id)
    }

    pub fn is_pinned(&self, id: &BlockId) -> bool {
        self.pool.peek(id).is_some_and(Block::is_pinned)
    }

    /// Get the number of dirty blocks in the cache
    pub fn dirty_count(&self) -> usize {
        self.pool.iter().filter(|(_, block)| block.dirty).count()
    }

    fn load_block(&mut self, id: &BlockId) -> FileResult<()> {
        self.make_room()?;

        let mut data = vec![0u8; BLOCK_SIZE];
        self.file_manager
            .read_block(id.file(), id.index(), &mut data)?;
        self.pool.put(id.clone(), Block::new(data));

        trace!(block = %id, "loaded block");
        Ok(())
    }

    /// Evict until below capacity, stopping early when only pinned blocks remain
    fn make_room(&mut self) -> FileResult<()> {
        while self.pool.len() >= self.capacity {
            if !self.evict_one()? {
                debug!(
                    cached = self.pool.len(),
                    capacity = self.capacity,
                    "all cached blocks pinned, exceeding capacity"
                );
                break;
            }
        }
        Ok(())
    }

    /// Evict the least recently used unpinned block, writing it back if dirty
    fn evict_one(&mut self) -> FileResult<bool> {
        let victim = self
            .pool
            .iter()
            .rev()
            .find(|(_, block)| !block.is_pinned())
            .map(|(id, _)| id.clone());

        let Some(victim) = victim else {
            return Ok(false);
        };

        self.flush_block(&victim)?;
        self.pool.pop(&victim);
        trace!(block = %victim, "evicted block");
        Ok(true)
    }

    fn discard_file(&mut self, name: &str) {
        let stale: Vec<BlockId> = self
            .pool
            .iter()
            .filter(|(id, _)| id.file() == name)
            .map(|(id, _)| id.clone())
            .collect();

        for id in stale {
            self.pool.pop(&id);
        }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        // Flush all dirty blocks when the buffer manager is dropped
        let _ = self.flush_all();
    }
}
