mod error;
mod predicate;
mod record;
mod schema;
mod table_file;
mod value;

pub use error::{RecordError, RecordResult};
pub use predicate::{CmpOp, Filter, Predicate};
pub use record::Record;
pub use schema::{Attribute, RECORD_LINK_SIZE, TableSchema};
pub use table_file::{TableFile, TableHeader, table_file_name};
pub use value::{DataType, MAX_CHAR_LENGTH, Value};

use crate::file::BufferManager;
use std::collections::HashMap;
use tracing::debug;

/// Record store: one heap file per table
pub struct RecordManager {
    open_tables: HashMap<String, TableFile>,
}

impl RecordManager {
    /// Open the heap files of the given tables; each one must exist
    pub fn init<'a>(
        buffer_mgr: &BufferManager,
        tables: impl IntoIterator<Item = &'a str>,
    ) -> RecordResult<Self> {
        let mut open_tables = HashMap::new();

        for table in tables {
            let table_file = TableFile::for_table(table);
            if !table_file.exists(buffer_mgr) {
                return Err(RecordError::MissingTableFile(table.to_string()));
            }
            open_tables.insert(table.to_string(), table_file);
        }

        debug!(tables = open_tables.len(), "record manager ready");
        Ok(Self { open_tables })
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.open_tables.contains_key(table)
    }

    /// Create the heap file of a new table
    pub fn create_table(&mut self, buffer_mgr: &mut BufferManager, table: &str) -> RecordResult<()> {
        let table_file = TableFile::for_table(table);
        table_file.create(buffer_mgr)?;
        self.open_tables.insert(table.to_string(), table_file);
        Ok(())
    }

    /// Delete the heap file of a table
    pub fn drop_table(&mut self, buffer_mgr: &mut BufferManager, table: &str) -> RecordResult<()> {
        let table_file = self
            .open_tables
            .remove(table)
            .unwrap_or_else(|| TableFile::for_table(table));

        if !table_file.exists(buffer_mgr) {
            return Err(RecordError::MissingTableFile(table.to_string()));
        }
        table_file.remove(buffer_mgr)
    }

    /// Insert a record and return its offset in the heap file
    pub fn insert_record(
        &mut self,
        buffer_mgr: &mut BufferManager,
        schema: &TableSchema,
        record: &Record,
    ) -> RecordResult<u32> {
        self.table(schema.table_name())?
            .insert(buffer_mgr, schema, record)
    }

    /// Remove every record of a table; returns how many were removed
    pub fn delete_all_records(
        &mut self,
        buffer_mgr: &mut BufferManager,
        table: &str,
    ) -> RecordResult<u32> {
        self.table(table)?.truncate(buffer_mgr)
    }

    /// Delete the records at the given offsets
    pub fn delete_records_at(
        &mut self,
        buffer_mgr: &mut BufferManager,
        table: &str,
        offsets: &[u32],
    ) -> RecordResult<usize> {
        self.table(table)?.delete_at(buffer_mgr, offsets)
    }

    /// Delete the records satisfying every predicate; returns how many were deleted
    pub fn delete_records(
        &mut self,
        buffer_mgr: &mut BufferManager,
        schema: &TableSchema,
        predicates: &[Predicate],
    ) -> RecordResult<usize> {
        Ok(self.delete_matching(buffer_mgr, schema, predicates)?.len())
    }

    /// Delete the records satisfying every predicate and return them with their offsets
    pub fn delete_matching(
        &mut self,
        buffer_mgr: &mut BufferManager,
        schema: &TableSchema,
        predicates: &[Predicate],
    ) -> RecordResult<Vec<(u32, Record)>> {
        let matches = self.select_with_offsets(buffer_mgr, schema, predicates)?;
        let offsets: Vec<u32> = matches.iter().map(|(offset, _)| *offset).collect();
        self.table(schema.table_name())?
            .delete_at(buffer_mgr, &offsets)?;
        Ok(matches)
    }

    /// Records satisfying every predicate, in insertion order
    pub fn select_records(
        &mut self,
        buffer_mgr: &mut BufferManager,
        schema: &TableSchema,
        predicates: &[Predicate],
    ) -> RecordResult<Vec<Record>> {
        Ok(self
            .select_with_offsets(buffer_mgr, schema, predicates)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Like `select_records`, keeping each record's offset
    pub fn select_with_offsets(
        &mut self,
        buffer_mgr: &mut BufferManager,
        schema: &TableSchema,
        predicates: &[Predicate],
    ) -> RecordResult<Vec<(u32, Record)>> {
        let filter = Filter::new(schema, predicates)?;
        let mut matches = Vec::new();

        for (offset, record) in self.table(schema.table_name())?.scan(buffer_mgr, schema)? {
            if filter.matches(&record)? {
                matches.push((offset, record));
            }
        }

        // The chain runs newest first
        matches.reverse();
        Ok(matches)
    }

    /// Live record count from the table header
    pub fn record_count(&mut self, buffer_mgr: &mut BufferManager, table: &str) -> RecordResult<u32> {
        Ok(self.table(table)?.read_header(buffer_mgr)?.record_count)
    }

    /// Restrict and reorder records to the named attributes; no names keeps everything
    pub fn project(
        records: Vec<Record>,
        schema: &TableSchema,
        attr_names: &[String],
    ) -> RecordResult<Vec<Record>> {
        if attr_names.is_empty() {
            return Ok(records);
        }

        let positions = attr_names
            .iter()
            .map(|name| schema.require_attribute(name))
            .collect::<RecordResult<Vec<_>>>()?;

        Ok(records
            .into_iter()
            .map(|record| {
                let values = record.into_values();
                Record::new(positions.iter().map(|&i| values[i].clone()).collect())
            })
            .collect())
    }

    fn table(&self, table: &str) -> RecordResult<&TableFile> {
        self.open_tables
            .get(table)
            .ok_or_else(|| RecordError::MissingTableFile(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::layout::{OFFSET_MASK, TOMBSTONE};
    use crate::file::{BLOCK_SIZE, BlockId, PagedFileManager};
    use tempfile::TempDir;

    fn setup() -> (TempDir, BufferManager, RecordManager, TableSchema) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_manager = PagedFileManager::new(temp_dir.path()).unwrap();
        let mut bm = BufferManager::with_capacity(file_manager, 16);
        let mut rm = RecordManager::init(&bm, Vec::<&str>::new()).unwrap();

        let schema = TableSchema::new(
            "people",
            "id",
            vec![
                Attribute::new("id", DataType::Int, true),
                Attribute::new("name", DataType::Char(16), false),
                Attribute::new("score", DataType::Float, false),
            ],
        );
        rm.create_table(&mut bm, "people").unwrap();
        (temp_dir, bm, rm, schema)
    }

    fn person(id: i32, name: &str, score: f32) -> Record {
        Record::new(vec![Value::Int(id), Value::from(name), Value::Float(score)])
    }

    #[test]
    fn test_insert_returns_offsets_in_layout_order() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();

        let first = rm.insert_record(&mut bm, &schema, &person(1, "a", 1.0)).unwrap();
        let second = rm.insert_record(&mut bm, &schema, &person(2, "b", 2.0)).unwrap();

        assert_eq!(first as usize, BLOCK_SIZE);
        assert_eq!(second as usize, BLOCK_SIZE + schema.record_size());
        assert_eq!(rm.record_count(&mut bm, "people").unwrap(), 2);
    }

    #[test]
    fn test_select_in_insertion_order() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();
        let rows = vec![person(1, "r1", 1.0), person(2, "r2", 2.0), person(3, "r3", 3.0)];
        for row in &rows {
            rm.insert_record(&mut bm, &schema, row).unwrap();
        }

        let selected = rm.select_records(&mut bm, &schema, &[]).unwrap();
        assert_eq!(selected, rows);
    }

    #[test]
    fn test_delete_by_predicate() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();
        for row in [person(1, "r1", 1.0), person(2, "r2", 2.0), person(3, "r3", 3.0)] {
            rm.insert_record(&mut bm, &schema, &row).unwrap();
        }

        let deleted = rm
            .delete_records(&mut bm, &schema, &[Predicate::equals("id", 2)])
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = rm.select_records(&mut bm, &schema, &[]).unwrap();
        assert_eq!(remaining, vec![person(1, "r1", 1.0), person(3, "r3", 3.0)]);
        assert_eq!(rm.record_count(&mut bm, "people").unwrap(), 2);
    }

    #[test]
    fn test_select_with_predicates() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();
        for i in 0..10 {
            rm.insert_record(&mut bm, &schema, &person(i, &format!("p{i}"), i as f32))
                .unwrap();
        }

        let preds = vec![
            Predicate::new("id", CmpOp::Ge, 3),
            Predicate::new("score", CmpOp::Lt, 6.0f32),
        ];
        let selected = rm.select_records(&mut bm, &schema, &preds).unwrap();
        let ids: Vec<_> = selected.iter().map(|r| r.get(0).cloned()).collect();
        assert_eq!(
            ids,
            vec![Some(Value::Int(3)), Some(Value::Int(4)), Some(Value::Int(5))]
        );

        let mismatched = vec![Predicate::equals("id", "three")];
        assert!(matches!(
            rm.select_records(&mut bm, &schema, &mismatched),
            Err(RecordError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_delete_all_records() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();
        for i in 0..5 {
            rm.insert_record(&mut bm, &schema, &person(i, "x", 0.0)).unwrap();
        }

        assert_eq!(rm.delete_all_records(&mut bm, "people").unwrap(), 5);
        assert!(rm.select_records(&mut bm, &schema, &[]).unwrap().is_empty());

        let offset = rm.insert_record(&mut bm, &schema, &person(9, "y", 0.0)).unwrap();
        assert_eq!(offset as usize, BLOCK_SIZE);
        assert_eq!(
            rm.select_records(&mut bm, &schema, &[]).unwrap(),
            vec![person(9, "y", 0.0)]
        );
    }

    #[test]
    fn test_delete_at_offsets() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();
        let offsets: Vec<u32> = (0..3)
            .map(|i| rm.insert_record(&mut bm, &schema, &person(i, "x", 0.0)).unwrap())
            .collect();

        assert_eq!(rm.delete_records_at(&mut bm, "people", &offsets[..1]).unwrap(), 1);

        let (block, in_block) = (offsets[0] as usize / BLOCK_SIZE, offsets[0] as usize % BLOCK_SIZE);
        let data = bm
            .read_block(&BlockId::new(table_file_name("people"), block as u32))
            .unwrap()
            .data();
        assert_ne!(
            u32::from_le_bytes(data[in_block..in_block + 4].try_into().unwrap()) & TOMBSTONE,
            0
        );

        let again = rm.delete_records_at(&mut bm, "people", &offsets[..1]);
        assert!(matches!(again, Err(RecordError::AlreadyDeleted(_))));
        assert_eq!(rm.record_count(&mut bm, "people").unwrap(), 2);
    }

    #[test]
    fn test_records_roll_over_to_next_block() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();
        let per_block = BLOCK_SIZE / schema.record_size();

        let mut offsets = Vec::new();
        for i in 0..(per_block * 3) as i32 {
            offsets.push(rm.insert_record(&mut bm, &schema, &person(i, "row", 0.5)).unwrap());
        }

        for offset in &offsets {
            let in_block = *offset as usize % BLOCK_SIZE;
            assert!(in_block + schema.record_size() <= BLOCK_SIZE);
        }
        assert_eq!(offsets[per_block] as usize, 2 * BLOCK_SIZE);

        let header = TableFile::for_table("people").read_header(&mut bm).unwrap();
        assert_eq!(header.block_count, 4);

        let all = rm.select_records(&mut bm, &schema, &[]).unwrap();
        assert_eq!(all.len(), per_block * 3);
        assert_eq!(all[0].get(0), Some(&Value::Int(0)));
    }

    #[test]
    fn test_project() {
        let (_temp_dir, _bm, _rm, schema) = setup();
        let records = vec![person(1, "a", 1.5), person(2, "b", 2.5)];

        let same = RecordManager::project(records.clone(), &schema, &[]).unwrap();
        assert_eq!(same, records);

        let names = vec!["score".to_string(), "id".to_string()];
        let projected = RecordManager::project(records.clone(), &schema, &names).unwrap();
        assert_eq!(
            projected,
            vec![
                Record::new(vec![Value::Float(1.5), Value::Int(1)]),
                Record::new(vec![Value::Float(2.5), Value::Int(2)]),
            ]
        );

        let unknown = vec!["nope".to_string()];
        assert!(RecordManager::project(records, &schema, &unknown).is_err());
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let schema = TableSchema::new(
            "t",
            "k",
            vec![Attribute::new("k", DataType::Int, true)],
        );
        {
            let mut bm = BufferManager::new(PagedFileManager::new(temp_dir.path()).unwrap());
            let mut rm = RecordManager::init(&bm, Vec::<&str>::new()).unwrap();
            rm.create_table(&mut bm, "t").unwrap();
            rm.insert_record(&mut bm, &schema, &Record::new(vec![Value::Int(5)]))
                .unwrap();
            bm.flush_all().unwrap();
        }

        let mut bm = BufferManager::new(PagedFileManager::new(temp_dir.path()).unwrap());
        let mut rm = RecordManager::init(&bm, ["t"]).unwrap();
        assert_eq!(
            rm.select_records(&mut bm, &schema, &[]).unwrap(),
            vec![Record::new(vec![Value::Int(5)])]
        );

        let missing = RecordManager::init(&bm, ["t", "ghost"]);
        assert!(matches!(missing, Err(RecordError::MissingTableFile(_))));
    }

    #[test]
    fn test_create_existing_file_resets_it() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();
        rm.insert_record(&mut bm, &schema, &person(1, "a", 1.0)).unwrap();

        rm.create_table(&mut bm, "people").unwrap();
        assert_eq!(rm.record_count(&mut bm, "people").unwrap(), 0);
        assert!(rm.select_records(&mut bm, &schema, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_delete_at_checks_every_offset_first() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();
        let a = rm.insert_record(&mut bm, &schema, &person(1, "a", 1.0)).unwrap();
        let b = rm.insert_record(&mut bm, &schema, &person(2, "b", 2.0)).unwrap();
        let c = rm.insert_record(&mut bm, &schema, &person(3, "c", 3.0)).unwrap();
        rm.delete_records_at(&mut bm, "people", &[b]).unwrap();

        let result = rm.delete_records_at(&mut bm, "people", &[a, b]);
        assert!(matches!(result, Err(RecordError::AlreadyDeleted(offset)) if offset == b));

        let result = rm.delete_records_at(&mut bm, "people", &[c, c]);
        assert!(matches!(result, Err(RecordError::AlreadyDeleted(offset)) if offset == c));

        let result = rm.delete_records_at(&mut bm, "people", &[a, 7]);
        assert!(matches!(result, Err(RecordError::InvalidOffset(7))));

        assert_eq!(rm.record_count(&mut bm, "people").unwrap(), 2);
        let selected = rm.select_records(&mut bm, &schema, &[]).unwrap();
        assert_eq!(selected, vec![person(1, "a", 1.0), person(3, "c", 3.0)]);
    }

    #[test]
    fn test_insert_fails_when_offsets_run_out() {
        let (_temp_dir, mut bm, mut rm, schema) = setup();
        rm.insert_record(&mut bm, &schema, &person(1, "a", 1.0)).unwrap();

        let file = TableFile::for_table("people");
        let mut header = file.read_header(&mut bm).unwrap();
        header.available_offset = OFFSET_MASK - 10;
        file.write_header(&mut bm, &header).unwrap();

        let result = rm.insert_record(&mut bm, &schema, &person(2, "b", 2.0));
        assert!(matches!(result, Err(RecordError::TableFull(_))));
        assert_eq!(file.read_header(&mut bm).unwrap(), header);
        assert_eq!(rm.record_count(&mut bm, "people").unwrap(), 1);
    }
}
