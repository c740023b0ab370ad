use super::error::{IndexError, IndexResult};
use crate::file::BLOCK_SIZE;
use crate::file::layout::{NULL_OFFSET, read_u32, write_u32};
use crate::record::{DataType, Value};

/// `{key count, is leaf, parent}`
pub const NODE_HEADER_SIZE: usize = 12;

/// Smallest fanout a tree can split with
pub const MIN_FANOUT: usize = 3;

/// Largest fanout whose full node still fits in one block
pub fn max_fanout(key_type: &DataType) -> usize {
    let key_size = key_type.size();
    (BLOCK_SIZE - NODE_HEADER_SIZE + key_size) / (4 + key_size)
}

/// One B+Tree node, stored in its own block.
///
/// `pointers` always holds `keys.len() + 1` entries. In an internal node
/// they are child block indices; in a leaf the first `keys.len()` are the
/// record offsets paired with the keys and the last one links to the next
/// leaf (0 at the right end).
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub is_leaf: bool,
    pub parent: u32,
    pub keys: Vec<Value>,
    pub pointers: Vec<u32>,
}

impl Node {
    pub fn new_leaf(parent: u32) -> Self {
        Self {
            is_leaf: true,
            parent,
            keys: Vec::new(),
            pointers: vec![NULL_OFFSET],
        }
    }

    pub fn new_internal(parent: u32, keys: Vec<Value>, pointers: Vec<u32>) -> Self {
        Self {
            is_leaf: false,
            parent,
            keys,
            pointers,
        }
    }

    /// Sibling link of a leaf
    pub fn next_leaf(&self) -> u32 {
        self.pointers[self.keys.len()]
    }

    /// Position of a child pointer within an internal node
    pub fn child_index(&self, child: u32) -> Option<usize> {
        self.pointers.iter().position(|&p| p == child)
    }

    pub fn encode(&self, key_type: &DataType) -> IndexResult<Vec<u8>> {
        let count = self.keys.len();
        let mut buf = vec![0u8; NODE_HEADER_SIZE];
        write_u32(&mut buf, 0, count as u32);
        write_u32(&mut buf, 4, self.is_leaf as u32);
        write_u32(&mut buf, 8, self.parent);

        for pointer in &self.pointers {
            buf.extend_from_slice(&pointer.to_le_bytes());
        }
        for key in &self.keys {
            buf.extend_from_slice(&key.serialize(key_type)?);
        }

        if buf.len() > BLOCK_SIZE || self.pointers.len() != count + 1 {
            return Err(IndexError::InvalidState(format!(
                "node with {count} keys does not fit a block"
            )));
        }
        Ok(buf)
    }

    pub fn decode(block: u32, data: &[u8], key_type: &DataType) -> IndexResult<Self> {
        let count = read_u32(data, 0) as usize;
        let key_size = key_type.size();
        let keys_at = NODE_HEADER_SIZE + (count + 1) * 4;

        if keys_at + count * key_size > BLOCK_SIZE {
            return Err(IndexError::CorruptedNode(block));
        }

        let pointers = (0..=count)
            .map(|i| read_u32(data, NODE_HEADER_SIZE + i * 4))
            .collect();
        let keys = (0..count)
            .map(|i| {
                let at = keys_at + i * key_size;
                Value::deserialize(&data[at..at + key_size], key_type)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            is_leaf: read_u32(data, 4) != 0,
            parent: read_u32(data, 8),
            keys,
            pointers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_fanout_fits_block() {
        for key_type in [DataType::Int, DataType::Float, DataType::Char(255), DataType::Char(1)] {
            let fanout = max_fanout(&key_type);
            let full = NODE_HEADER_SIZE + fanout * 4 + (fanout - 1) * key_type.size();
            assert!(full <= BLOCK_SIZE);
            let over = NODE_HEADER_SIZE + (fanout + 1) * 4 + fanout * key_type.size();
            assert!(over > BLOCK_SIZE);
        }
        assert_eq!(max_fanout(&DataType::Int), 511);
        assert_eq!(max_fanout(&DataType::Char(255)), 16);
    }

    #[test]
    fn test_leaf_layout() {
        let mut leaf = Node::new_leaf(3);
        leaf.keys = vec![Value::Int(10), Value::Int(20)];
        leaf.pointers = vec![4096, 4124, 9];

        let buf = leaf.encode(&DataType::Int).unwrap();
        assert_eq!(read_u32(&buf, 0), 2);
        assert_eq!(read_u32(&buf, 4), 1);
        assert_eq!(read_u32(&buf, 8), 3);
        assert_eq!(read_u32(&buf, 12), 4096);
        assert_eq!(read_u32(&buf, 20), 9);
        assert_eq!(read_u32(&buf, 24), 10);
        assert_eq!(leaf.next_leaf(), 9);

        let mut block = buf.clone();
        block.resize(BLOCK_SIZE, 0);
        assert_eq!(Node::decode(1, &block, &DataType::Int).unwrap(), leaf);
    }

    #[test]
    fn test_char_keys() {
        let node = Node::new_internal(0, vec![Value::from("m")], vec![1, 2]);
        let mut block = node.encode(&DataType::Char(4)).unwrap();
        block.resize(BLOCK_SIZE, 0);
        assert_eq!(Node::decode(5, &block, &DataType::Char(4)).unwrap(), node);
    }

    #[test]
    fn test_corrupted_count() {
        let mut block = vec![0u8; BLOCK_SIZE];
        write_u32(&mut block, 0, 10_000);
        assert!(matches!(
            Node::decode(2, &block, &DataType::Int),
            Err(IndexError::CorruptedNode(2))
        ));
    }
}
