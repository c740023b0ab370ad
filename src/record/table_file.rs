use tracing::{debug, warn};

use super::error::{RecordError, RecordResult};
use super::record::Record;
use super::schema::{RECORD_LINK_SIZE, TableSchema};
use crate::file::layout::{
    FileType, NULL_OFFSET, OFFSET_MASK, TOMBSTONE, is_tombstoned, link_of, read_u32, write_u32,
};
use crate::file::{BLOCK_SIZE, BlockId, BufferManager};

/// Name of the heap file backing a table
pub fn table_file_name(table: &str) -> String {
    format!("minisql_{table}.tbl")
}

/// Block 0 of a table file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHeader {
    /// Blocks in use, header included
    pub block_count: u32,
    /// Offset of the most recently inserted record, 0 when empty
    pub head: u32,
    /// Offset where the next record is written
    pub available_offset: u32,
    /// Live records
    pub record_count: u32,
}

impl TableHeader {
    const SIZE: usize = 20;

    pub fn empty() -> Self {
        Self {
            block_count: 1,
            head: NULL_OFFSET,
            available_offset: BLOCK_SIZE as u32,
            record_count: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        write_u32(&mut buf, 0, self.block_count);
        write_u32(&mut buf, 4, self.head);
        write_u32(&mut buf, 8, self.available_offset);
        write_u32(&mut buf, 12, self.record_count);
        write_u32(&mut buf, 16, FileType::Table.word());
        buf
    }

    pub fn from_bytes(file: &str, buf: &[u8]) -> RecordResult<Self> {
        if FileType::from_word(read_u32(buf, 16)) != Some(FileType::Table) {
            return Err(RecordError::IncompatibleFile(file.to_string()));
        }
        Ok(Self {
            block_count: read_u32(buf, 0),
            head: read_u32(buf, 4),
            available_offset: read_u32(buf, 8),
            record_count: read_u32(buf, 12),
        })
    }
}

/// Heap file of one table.
///
/// Records are fixed-size `{link, values}` slots appended at the available
/// offset and never straddle a block boundary. The link of a live record is
/// the offset of the previously inserted one, so the chain runs newest to
/// oldest from the header's head. Deletion sets the tombstone bit on the
/// link and leaves the slot in place.
pub struct TableFile {
    file_name: String,
}

impl TableFile {
    pub fn for_table(table: &str) -> Self {
        Self {
            file_name: table_file_name(table),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn exists(&self, buffer_mgr: &BufferManager) -> bool {
        buffer_mgr.file_exists(&self.file_name)
    }

    /// Create the file with an empty header; an existing file is reset
    pub fn create(&self, buffer_mgr: &mut BufferManager) -> RecordResult<()> {
        if self.exists(buffer_mgr) {
            warn!(file = %self.file_name, "table file already exists, resetting it");
            return self.write_header(buffer_mgr, &TableHeader::empty());
        }

        buffer_mgr.create_file(&self.file_name, &TableHeader::empty().to_bytes())?;
        debug!(file = %self.file_name, "created table file");
        Ok(())
    }

    pub fn remove(&self, buffer_mgr: &mut BufferManager) -> RecordResult<()> {
        buffer_mgr.delete_file(&self.file_name)?;
        debug!(file = %self.file_name, "removed table file");
        Ok(())
    }

    pub fn read_header(&self, buffer_mgr: &mut BufferManager) -> RecordResult<TableHeader> {
        let block = buffer_mgr.read_block(&self.header_id())?;
        TableHeader::from_bytes(&self.file_name, block.data())
    }

    pub fn write_header(
        &self,
        buffer_mgr: &mut BufferManager,
        header: &TableHeader,
    ) -> RecordResult<()> {
        buffer_mgr.write_block(&self.header_id(), 0, &header.to_bytes())?;
        Ok(())
    }

    /// Append a record and return its offset
    pub fn insert(
        &self,
        buffer_mgr: &mut BufferManager,
        schema: &TableSchema,
        record: &Record,
    ) -> RecordResult<u32> {
        let values = record.serialize(schema)?;
        let header_id = self.header_id();

        buffer_mgr.pin(&header_id)?;
        let result = self.append(buffer_mgr, schema.record_size(), &values);
        buffer_mgr.unpin(&header_id);
        result
    }

    fn append(
        &self,
        buffer_mgr: &mut BufferManager,
        record_size: usize,
        values: &[u8],
    ) -> RecordResult<u32> {
        let mut header = self.read_header(buffer_mgr)?;

        let mut offset = header.available_offset as usize;
        if offset % BLOCK_SIZE + record_size > BLOCK_SIZE {
            offset = (offset / BLOCK_SIZE + 1) * BLOCK_SIZE;
        }
        if offset + record_size > OFFSET_MASK as usize {
            return Err(RecordError::TableFull(self.file_name.clone()));
        }

        let (block_id, in_block) = self.locate(offset as u32);
        let mut slot = Vec::with_capacity(record_size);
        slot.extend_from_slice(&header.head.to_le_bytes());
        slot.extend_from_slice(values);
        buffer_mgr.write_block(&block_id, in_block, &slot)?;

        header.head = offset as u32;
        header.available_offset = (offset + record_size) as u32;
        header.block_count = header.block_count.max(block_id.index() + 1);
        header.record_count += 1;
        self.write_header(buffer_mgr, &header)?;

        Ok(offset as u32)
    }

    /// Forget every record in O(1); returns how many there were
    pub fn truncate(&self, buffer_mgr: &mut BufferManager) -> RecordResult<u32> {
        let header = self.read_header(buffer_mgr)?;
        self.write_header(buffer_mgr, &TableHeader::empty())?;
        Ok(header.record_count)
    }

    /// Tombstone the records at `offsets`.
    ///
    /// Every offset is checked before any record is touched, so an invalid,
    /// repeated or already deleted offset leaves the file unchanged.
    pub fn delete_at(&self, buffer_mgr: &mut BufferManager, offsets: &[u32]) -> RecordResult<usize> {
        let mut header = self.read_header(buffer_mgr)?;

        let mut links = Vec::with_capacity(offsets.len());
        for (i, &offset) in offsets.iter().enumerate() {
            self.check_offset(&header, offset)?;
            let (block_id, in_block) = self.locate(offset);
            let link = read_u32(buffer_mgr.read_block(&block_id)?.data(), in_block);
            if is_tombstoned(link) || offsets[..i].contains(&offset) {
                return Err(RecordError::AlreadyDeleted(offset));
            }
            links.push((block_id, in_block, link));
        }

        for (block_id, in_block, link) in &links {
            buffer_mgr.write_block(block_id, *in_block, &(link | TOMBSTONE).to_le_bytes())?;
        }
        header.record_count = header.record_count.saturating_sub(links.len() as u32);

        self.write_header(buffer_mgr, &header)?;
        Ok(links.len())
    }

    /// Every live record with its offset, newest first
    pub fn scan(
        &self,
        buffer_mgr: &mut BufferManager,
        schema: &TableSchema,
    ) -> RecordResult<Vec<(u32, Record)>> {
        let header = self.read_header(buffer_mgr)?;
        let record_size = schema.record_size();
        let mut records = Vec::with_capacity(header.record_count as usize);

        let mut offset = header.head;
        while offset != NULL_OFFSET {
            self.check_offset(&header, offset)?;
            let (block_id, in_block) = self.locate(offset);
            let data = buffer_mgr.read_block(&block_id)?.data();
            let link = read_u32(data, in_block);

            if !is_tombstoned(link) {
                let values = &data[in_block + RECORD_LINK_SIZE..in_block + record_size];
                records.push((offset, Record::deserialize(values, schema)?));
            }
            // Links always point to an earlier slot
            let next = link_of(link);
            if next >= offset {
                return Err(RecordError::InvalidOffset(next));
            }
            offset = next;
        }

        Ok(records)
    }

    fn check_offset(&self, header: &TableHeader, offset: u32) -> RecordResult<()> {
        let offset_usize = offset as usize;
        if offset_usize < BLOCK_SIZE || offset >= header.available_offset {
            return Err(RecordError::InvalidOffset(offset));
        }
        Ok(())
    }

    fn header_id(&self) -> BlockId {
        BlockId::new(&self.file_name, 0)
    }

    fn locate(&self, offset: u32) -> (BlockId, usize) {
        let offset = offset as usize;
        (
            BlockId::new(&self.file_name, (offset / BLOCK_SIZE) as u32),
            offset % BLOCK_SIZE,
        )
    }
}
