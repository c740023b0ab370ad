use std::cmp::Ordering;

use tracing::{debug, trace, warn};

use super::error::{IndexError, IndexResult};
use super::node::{MIN_FANOUT, Node, max_fanout};
use crate::catalog::{decode_properties, encode_properties};
use crate::file::layout::{FileType, NULL_OFFSET, read_u32, write_u32};
use crate::file::{BlockId, BufferManager};
use crate::record::{DataType, Value};

/// Deepest tree walked before the file is considered corrupted
const MAX_HEIGHT: usize = 64;

/// Block 0 of an index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    /// Root node block, 0 when the tree is empty
    pub root: u32,
    /// Blocks allocated so far, header included
    pub block_count: u32,
    pub key_type: DataType,
    pub fanout: usize,
}

impl IndexHeader {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 20];
        write_u32(&mut buf, 0, self.root);
        write_u32(&mut buf, 4, self.block_count);
        write_u32(&mut buf, 8, FileType::Index.word());
        write_u32(&mut buf, 12, encode_properties(&self.key_type, false));
        write_u32(&mut buf, 16, self.fanout as u32);
        buf
    }

    fn from_bytes(file: &str, buf: &[u8]) -> IndexResult<Self> {
        let incompatible = || IndexError::IncompatibleFile(file.to_string());

        if FileType::from_word(read_u32(buf, 8)) != Some(FileType::Index) {
            return Err(incompatible());
        }
        let (key_type, _) = decode_properties(read_u32(buf, 12)).map_err(|_| incompatible())?;
        let fanout = read_u32(buf, 16) as usize;
        if fanout < MIN_FANOUT || fanout > max_fanout(&key_type) {
            return Err(incompatible());
        }

        Ok(Self {
            root: read_u32(buf, 0),
            block_count: read_u32(buf, 4),
            key_type,
            fanout,
        })
    }
}

/// Outcome of a point lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    /// Leaf where the key is or would be, 0 for an empty tree
    pub leaf: u32,
    /// Record offset stored with the key
    pub value: Option<u32>,
}

impl SearchResult {
    pub fn found(&self) -> bool {
        self.value.is_some()
    }
}

/// Disk-resident B+Tree mapping unique keys to record offsets.
///
/// Fanout `F` means:
/// - Internal nodes have at most `F` children and, except the root, at least `ceil(F/2)`
/// - Leaves hold at most `F-1` entries and, except the root, at least `ceil((F-1)/2)`
///
/// Nodes are addressed by block index; 0 is the header block and doubles as
/// the null pointer. Blocks released by merges are not reused.
pub struct BPlusTree {
    file_name: String,
    header: IndexHeader,
}

impl BPlusTree {
    /// Create an empty tree in a new file; an existing file is reset
    pub fn create(
        buffer_mgr: &mut BufferManager,
        file_name: &str,
        key_type: DataType,
        fanout: usize,
    ) -> IndexResult<Self> {
        let max = max_fanout(&key_type);
        if fanout < MIN_FANOUT || fanout > max {
            return Err(IndexError::InvalidFanout { fanout, max });
        }

        let header = IndexHeader {
            root: NULL_OFFSET,
            block_count: 1,
            key_type,
            fanout,
        };

        if buffer_mgr.file_exists(file_name) {
            warn!(file = file_name, "index file already exists, resetting it");
            buffer_mgr.write_block(&BlockId::new(file_name, 0), 0, &header.to_bytes())?;
        } else {
            buffer_mgr.create_file(file_name, &header.to_bytes())?;
        }

        debug!(file = file_name, %key_type, fanout, "created index file");
        Ok(Self {
            file_name: file_name.to_string(),
            header,
        })
    }

    /// Open the tree stored in an existing file
    pub fn open(buffer_mgr: &mut BufferManager, file_name: &str) -> IndexResult<Self> {
        let block = buffer_mgr.read_block(&BlockId::new(file_name, 0))?;
        let header = IndexHeader::from_bytes(file_name, block.data())?;
        Ok(Self {
            file_name: file_name.to_string(),
            header,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn key_type(&self) -> DataType {
        self.header.key_type
    }

    pub fn fanout(&self) -> usize {
        self.header.fanout
    }

    pub fn is_empty(&self) -> bool {
        self.header.root == NULL_OFFSET
    }

    /// Locate the leaf for `key` and the value stored with it, if any
    pub fn find(&self, buffer_mgr: &mut BufferManager, key: &Value) -> IndexResult<SearchResult> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(SearchResult {
                leaf: NULL_OFFSET,
                value: None,
            });
        }

        let (leaf, node) = self.descend(buffer_mgr, key)?;
        let mut value = None;
        for (i, k) in node.keys.iter().enumerate() {
            if k.compare(key)? == Ordering::Equal {
                value = Some(node.pointers[i]);
                break;
            }
        }
        Ok(SearchResult { leaf, value })
    }

    pub fn has_key(&self, buffer_mgr: &mut BufferManager, key: &Value) -> IndexResult<bool> {
        Ok(self.find(buffer_mgr, key)?.found())
    }

    /// Insert a key, overwriting the value of an existing equal key
    pub fn insert(
        &mut self,
        buffer_mgr: &mut BufferManager,
        key: Value,
        value: u32,
    ) -> IndexResult<()> {
        self.check_key(&key)?;

        if self.is_empty() {
            let root = self.allocate();
            let mut leaf = Node::new_leaf(NULL_OFFSET);
            leaf.keys.push(key);
            leaf.pointers.insert(0, value);
            self.write_node(buffer_mgr, root, &leaf)?;
            self.header.root = root;
            return self.save_header(buffer_mgr);
        }

        let (leaf_ptr, mut leaf) = self.descend(buffer_mgr, &key)?;
        let pos = lower_bound(&leaf.keys, &key)?;

        if pos < leaf.keys.len() && leaf.keys[pos].compare(&key)? == Ordering::Equal {
            leaf.pointers[pos] = value;
            return self.write_node(buffer_mgr, leaf_ptr, &leaf);
        }

        leaf.keys.insert(pos, key);
        leaf.pointers.insert(pos, value);

        if leaf.keys.len() < self.header.fanout {
            return self.write_node(buffer_mgr, leaf_ptr, &leaf);
        }

        // Leaf holds F entries: keep the low half, move the rest to a new right sibling
        let keep = (self.header.fanout + 1) / 2;
        let right_ptr = self.allocate();
        let right = Node {
            is_leaf: true,
            parent: leaf.parent,
            keys: leaf.keys.split_off(keep),
            pointers: leaf.pointers.split_off(keep),
        };
        leaf.pointers.push(right_ptr);

        self.write_node(buffer_mgr, leaf_ptr, &leaf)?;
        self.write_node(buffer_mgr, right_ptr, &right)?;
        trace!(file = %self.file_name, leaf = leaf_ptr, right = right_ptr, "split leaf");

        let separator = right.keys[0].clone();
        self.insert_in_parent(buffer_mgr, leaf_ptr, leaf.parent, separator, right_ptr)?;
        self.save_header(buffer_mgr)
    }

    /// Hook `right` into the tree next to `left` after a split, with `key`
    /// separating them; splits ancestors as needed.
    fn insert_in_parent(
        &mut self,
        buffer_mgr: &mut BufferManager,
        left: u32,
        left_parent: u32,
        key: Value,
        right: u32,
    ) -> IndexResult<()> {
        if left == self.header.root {
            let root = self.allocate();
            let node = Node::new_internal(NULL_OFFSET, vec![key], vec![left, right]);
            self.write_node(buffer_mgr, root, &node)?;
            self.set_parent(buffer_mgr, left, root)?;
            self.set_parent(buffer_mgr, right, root)?;
            self.header.root = root;
            debug!(file = %self.file_name, root, "tree grew a level");
            return Ok(());
        }

        let parent_ptr = left_parent;
        let mut parent = self.read_node(buffer_mgr, parent_ptr)?;
        let idx = parent.child_index(left).ok_or_else(|| {
            IndexError::InvalidState(format!("block {left} missing from its parent {parent_ptr}"))
        })?;

        parent.keys.insert(idx, key);
        parent.pointers.insert(idx + 1, right);

        if parent.keys.len() < self.header.fanout {
            return self.write_node(buffer_mgr, parent_ptr, &parent);
        }

        // Parent holds F keys and F+1 children: the middle key moves up
        let half = (self.header.fanout + 1) / 2;
        let mut right_keys = parent.keys.split_off(half - 1);
        let middle = right_keys.remove(0);
        let right_pointers = parent.pointers.split_off(half);

        let sibling_ptr = self.allocate();
        let sibling = Node::new_internal(parent.parent, right_keys, right_pointers);

        self.write_node(buffer_mgr, parent_ptr, &parent)?;
        self.write_node(buffer_mgr, sibling_ptr, &sibling)?;
        for &child in &sibling.pointers {
            self.set_parent(buffer_mgr, child, sibling_ptr)?;
        }
        trace!(file = %self.file_name, node = parent_ptr, sibling = sibling_ptr, "split internal node");

        self.insert_in_parent(buffer_mgr, parent_ptr, parent.parent, middle, sibling_ptr)
    }

    /// Remove a key; returns whether it was present
    pub fn remove(&mut self, buffer_mgr: &mut BufferManager, key: &Value) -> IndexResult<bool> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(false);
        }

        let (leaf_ptr, mut leaf) = self.descend(buffer_mgr, key)?;
        let pos = lower_bound(&leaf.keys, key)?;
        if pos == leaf.keys.len() || leaf.keys[pos].compare(key)? != Ordering::Equal {
            return Ok(false);
        }

        leaf.keys.remove(pos);
        leaf.pointers.remove(pos);

        self.rebalance(buffer_mgr, leaf_ptr, leaf)?;
        self.save_header(buffer_mgr)?;
        Ok(true)
    }

    /// Restore occupancy bounds from `ptr` upward after an entry was removed from it
    fn rebalance(
        &mut self,
        buffer_mgr: &mut BufferManager,
        mut ptr: u32,
        mut node: Node,
    ) -> IndexResult<()> {
        loop {
            if ptr == self.header.root {
                return self.shrink_root(buffer_mgr, ptr, node);
            }

            let min = if node.is_leaf {
                self.min_leaf_keys()
            } else {
                self.min_internal_keys()
            };
            if node.keys.len() >= min {
                return self.write_node(buffer_mgr, ptr, &node);
            }

            let parent_ptr = node.parent;
            let mut parent = self.read_node(buffer_mgr, parent_ptr)?;
            let idx = parent.child_index(ptr).ok_or_else(|| {
                IndexError::InvalidState(format!("block {ptr} missing from its parent {parent_ptr}"))
            })?;

            // Prefer the left sibling; the leftmost child uses its right one
            let sibling_is_left = idx > 0;
            let sibling_idx = if sibling_is_left { idx - 1 } else { idx + 1 };
            let sibling_ptr = *parent.pointers.get(sibling_idx).ok_or_else(|| {
                IndexError::InvalidState(format!("block {parent_ptr} has a single child"))
            })?;
            let mut sibling = self.read_node(buffer_mgr, sibling_ptr)?;

            let merged_keys = node.keys.len() + sibling.keys.len() + usize::from(!node.is_leaf);
            if merged_keys >= self.header.fanout {
                self.redistribute(buffer_mgr, ptr, &mut node, &mut sibling, &mut parent, idx, sibling_is_left)?;
                self.write_node(buffer_mgr, ptr, &node)?;
                self.write_node(buffer_mgr, sibling_ptr, &sibling)?;
                return self.write_node(buffer_mgr, parent_ptr, &parent);
            }

            let (left_ptr, left, right, sep_idx) = if sibling_is_left {
                (sibling_ptr, sibling, node, idx - 1)
            } else {
                (ptr, node, sibling, idx)
            };
            self.merge(buffer_mgr, left_ptr, left, right, &mut parent, sep_idx)?;

            ptr = parent_ptr;
            node = parent;
        }
    }

    /// Move one entry from `sibling` into the underflowing `node`
    #[allow(clippy::too_many_arguments)]
    fn redistribute(
        &mut self,
        buffer_mgr: &mut BufferManager,
        ptr: u32,
        node: &mut Node,
        sibling: &mut Node,
        parent: &mut Node,
        idx: usize,
        sibling_is_left: bool,
    ) -> IndexResult<()> {
        match (node.is_leaf, sibling_is_left) {
            (true, true) => {
                let last = sibling.keys.len() - 1;
                let key = sibling.keys.remove(last);
                let value = sibling.pointers.remove(last);
                parent.keys[idx - 1] = key.clone();
                node.keys.insert(0, key);
                node.pointers.insert(0, value);
            }
            (true, false) => {
                let key = sibling.keys.remove(0);
                let value = sibling.pointers.remove(0);
                let at = node.keys.len();
                node.keys.push(key);
                node.pointers.insert(at, value);
                parent.keys[idx] = sibling.keys[0].clone();
            }
            (false, true) => {
                let key = sibling.keys.pop().ok_or_else(empty_sibling)?;
                let child = sibling.pointers.pop().ok_or_else(empty_sibling)?;
                let separator = std::mem::replace(&mut parent.keys[idx - 1], key);
                node.keys.insert(0, separator);
                node.pointers.insert(0, child);
                self.set_parent(buffer_mgr, child, ptr)?;
            }
            (false, false) => {
                let key = sibling.keys.remove(0);
                let child = sibling.pointers.remove(0);
                let separator = std::mem::replace(&mut parent.keys[idx], key);
                node.keys.push(separator);
                node.pointers.push(child);
                self.set_parent(buffer_mgr, child, ptr)?;
            }
        }
        Ok(())
    }

    /// Fold `right` into `left` and drop the separator at `sep_idx` from the parent
    fn merge(
        &mut self,
        buffer_mgr: &mut BufferManager,
        left_ptr: u32,
        mut left: Node,
        right: Node,
        parent: &mut Node,
        sep_idx: usize,
    ) -> IndexResult<()> {
        let separator = parent.keys.remove(sep_idx);
        parent.pointers.remove(sep_idx + 1);

        if left.is_leaf {
            // Left's sibling link is replaced by right's
            left.pointers.pop();
        } else {
            left.keys.push(separator);
            for &child in &right.pointers {
                self.set_parent(buffer_mgr, child, left_ptr)?;
            }
        }
        left.keys.extend(right.keys);
        left.pointers.extend(right.pointers);

        trace!(file = %self.file_name, node = left_ptr, "merged nodes");
        self.write_node(buffer_mgr, left_ptr, &left)
    }

    /// Drop an empty leaf root, or replace an internal root left with one child
    fn shrink_root(&mut self, buffer_mgr: &mut BufferManager, ptr: u32, node: Node) -> IndexResult<()> {
        if !node.keys.is_empty() {
            return self.write_node(buffer_mgr, ptr, &node);
        }

        if node.is_leaf {
            self.header.root = NULL_OFFSET;
        } else {
            let child = node.pointers[0];
            self.set_parent(buffer_mgr, child, NULL_OFFSET)?;
            self.header.root = child;
            debug!(file = %self.file_name, root = child, "tree lost a level");
        }
        Ok(())
    }

    /// Forget every entry
    pub fn clear(&mut self, buffer_mgr: &mut BufferManager) -> IndexResult<()> {
        self.header.root = NULL_OFFSET;
        self.header.block_count = 1;
        self.save_header(buffer_mgr)
    }

    /// All entries in key order, following the leaf chain
    pub fn entries(&self, buffer_mgr: &mut BufferManager) -> IndexResult<Vec<(Value, u32)>> {
        let mut entries = Vec::new();
        if self.is_empty() {
            return Ok(entries);
        }

        let mut ptr = self.header.root;
        let mut node = self.read_node(buffer_mgr, ptr)?;
        for _ in 0..MAX_HEIGHT {
            if node.is_leaf {
                break;
            }
            ptr = node.pointers[0];
            node = self.read_node(buffer_mgr, ptr)?;
        }

        let mut visited = 0;
        loop {
            visited += 1;
            if visited > self.header.block_count {
                return Err(IndexError::CorruptedNode(ptr));
            }
            let next = node.next_leaf();
            entries.extend(node.keys.into_iter().zip(node.pointers));
            if next == NULL_OFFSET {
                break;
            }
            ptr = next;
            node = self.read_node(buffer_mgr, ptr)?;
        }

        Ok(entries)
    }

    /// Levels from the root to the leaves; 0 for an empty tree
    pub fn height(&self, buffer_mgr: &mut BufferManager) -> IndexResult<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let mut node = self.read_node(buffer_mgr, self.header.root)?;
        let mut height = 1;
        while !node.is_leaf && height < MAX_HEIGHT {
            node = self.read_node(buffer_mgr, node.pointers[0])?;
            height += 1;
        }
        Ok(height)
    }

    /// Walk from the root to the leaf responsible for `key`
    fn descend(&self, buffer_mgr: &mut BufferManager, key: &Value) -> IndexResult<(u32, Node)> {
        let mut ptr = self.header.root;
        let mut node = self.read_node(buffer_mgr, ptr)?;

        for _ in 0..MAX_HEIGHT {
            if node.is_leaf {
                return Ok((ptr, node));
            }

            let mut child = node.pointers[node.keys.len()];
            for (i, k) in node.keys.iter().enumerate() {
                match k.compare(key)? {
                    Ordering::Equal => {
                        child = node.pointers[i + 1];
                        break;
                    }
                    Ordering::Greater => {
                        child = node.pointers[i];
                        break;
                    }
                    Ordering::Less => {}
                }
            }

            ptr = child;
            node = self.read_node(buffer_mgr, ptr)?;
        }

        Err(IndexError::CorruptedNode(ptr))
    }

    fn min_leaf_keys(&self) -> usize {
        (self.header.fanout - 1).div_ceil(2)
    }

    fn min_internal_keys(&self) -> usize {
        self.header.fanout.div_ceil(2) - 1
    }

    fn allocate(&mut self) -> u32 {
        let block = self.header.block_count;
        self.header.block_count += 1;
        block
    }

    fn check_key(&self, key: &Value) -> IndexResult<()> {
        if !key.is_kind_of(&self.header.key_type) {
            return Err(IndexError::KeyTypeMismatch {
                expected: self.header.key_type.to_string(),
                actual: key.type_name().to_string(),
            });
        }
        Ok(())
    }

    fn read_node(&self, buffer_mgr: &mut BufferManager, ptr: u32) -> IndexResult<Node> {
        if ptr == NULL_OFFSET || ptr >= self.header.block_count {
            return Err(IndexError::CorruptedNode(ptr));
        }
        let block = buffer_mgr.read_block(&self.block_id(ptr))?;
        Node::decode(ptr, block.data(), &self.header.key_type)
    }

    fn write_node(&self, buffer_mgr: &mut BufferManager, ptr: u32, node: &Node) -> IndexResult<()> {
        let bytes = node.encode(&self.header.key_type)?;
        buffer_mgr.write_block(&self.block_id(ptr), 0, &bytes)?;
        Ok(())
    }

    fn set_parent(&self, buffer_mgr: &mut BufferManager, ptr: u32, parent: u32) -> IndexResult<()> {
        buffer_mgr.write_block(&self.block_id(ptr), 8, &parent.to_le_bytes())?;
        Ok(())
    }

    fn save_header(&self, buffer_mgr: &mut BufferManager) -> IndexResult<()> {
        buffer_mgr.write_block(&self.block_id(0), 0, &self.header.to_bytes())?;
        Ok(())
    }

    fn block_id(&self, ptr: u32) -> BlockId {
        BlockId::new(&self.file_name, ptr)
    }
}

/// First position whose key is not less than `key`
fn lower_bound(keys: &[Value], key: &Value) -> IndexResult<usize> {
    for (i, k) in keys.iter().enumerate() {
        if k.compare(key)? != Ordering::Less {
            return Ok(i);
        }
    }
    Ok(keys.len())
}

fn empty_sibling() -> IndexError {
    IndexError::InvalidState("redistributing from an empty sibling".to_string())
}
