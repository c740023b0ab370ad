mod entry;
pub mod properties;

pub use entry::{CATALOG_FILE, CatalogHeader, MAX_ATTRIBUTES};
pub use properties::{decode_properties, encode_properties};

use ahash::AHashMap;
use thiserror::Error;
use tracing::debug;

use crate::file::layout::{NAME_LENGTH, NULL_OFFSET, TOMBSTONE, is_tombstoned, link_of, read_u32};
use crate::file::{BLOCK_SIZE, BlockId, BufferManager, FileError};
use crate::record::{Attribute, DataType, MAX_CHAR_LENGTH, Predicate, TableSchema};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Index '{0}' already exists")]
    IndexExists(String),

    #[error("Index '{0}' does not exist")]
    IndexNotFound(String),

    #[error("Cannot find attribute '{attr}' in table '{table}'")]
    AttributeNotFound { attr: String, table: String },

    #[error("Attribute '{0}' is defined more than once")]
    DuplicateAttribute(String),

    #[error("Type mismatch on '{attr}': expected {expected}, got {actual}")]
    TypeMismatch {
        attr: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid name '{0}': names must be 1 to 63 bytes")]
    InvalidName(String),

    #[error("Invalid CHAR length {len} for '{attr}'")]
    InvalidCharLength { attr: String, len: usize },

    #[error("Table '{0}' has no attributes")]
    NoAttributes(String),

    #[error("Table '{table}' has {count} attributes, at most {max} are allowed")]
    TooManyAttributes {
        table: String,
        count: usize,
        max: usize,
    },

    #[error("Records of table '{table}' take {size} bytes, more than a block")]
    RecordTooLarge { table: String, size: usize },

    #[error("Incompatible catalog file: {0}")]
    IncompatibleFile(String),

    #[error("Corrupted catalog: {0}")]
    Corrupted(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Secondary index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub index_name: String,
    pub table_name: String,
    pub attr_name: String,
}

impl IndexDef {
    pub fn new(
        index_name: impl Into<String>,
        table_name: impl Into<String>,
        attr_name: impl Into<String>,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            table_name: table_name.into(),
            attr_name: attr_name.into(),
        }
    }
}

/// Persistent table and index definitions.
///
/// Each definition occupies one catalog block; the blocks of each kind form
/// a singly linked chain headed from the catalog header, newest first.
/// Dropping tombstones the entry in place and keeps its link so the chain
/// stays walkable. The maps mirror the live entries with their block indices.
pub struct CatalogManager {
    schemas: AHashMap<String, TableSchema>,
    schema_blocks: AHashMap<String, u32>,
    indexes: AHashMap<String, IndexDef>,
    index_blocks: AHashMap<String, u32>,
}

impl CatalogManager {
    /// Load the catalog, creating an empty one if the file does not exist
    pub fn init(buffer_mgr: &mut BufferManager) -> CatalogResult<Self> {
        let mut catalog = Self {
            schemas: AHashMap::new(),
            schema_blocks: AHashMap::new(),
            indexes: AHashMap::new(),
            index_blocks: AHashMap::new(),
        };

        if !buffer_mgr.file_exists(CATALOG_FILE) {
            buffer_mgr.create_file(CATALOG_FILE, &CatalogHeader::empty().to_bytes())?;
            debug!("created empty catalog");
            return Ok(catalog);
        }

        let header = read_header(buffer_mgr)?;

        for (block, data) in live_entries(buffer_mgr, &header, header.table_head)? {
            let schema = entry::decode_table(&data)?;
            catalog
                .schema_blocks
                .insert(schema.table_name().to_string(), block);
            catalog
                .schemas
                .insert(schema.table_name().to_string(), schema);
        }

        for (block, data) in live_entries(buffer_mgr, &header, header.index_head)? {
            let index = entry::decode_index(&data);
            catalog.index_blocks.insert(index.index_name.clone(), block);
            catalog.indexes.insert(index.index_name.clone(), index);
        }

        debug!(
            tables = catalog.schemas.len(),
            indexes = catalog.indexes.len(),
            "loaded catalog"
        );
        Ok(catalog)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    pub fn schema(&self, table: &str) -> CatalogResult<&TableSchema> {
        self.schemas
            .get(table)
            .ok_or_else(|| CatalogError::TableNotFound(table.to_string()))
    }

    pub fn index(&self, name: &str) -> CatalogResult<&IndexDef> {
        self.indexes
            .get(name)
            .ok_or_else(|| CatalogError::IndexNotFound(name.to_string()))
    }

    /// Table names, sorted
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Index definitions, sorted by index name
    pub fn index_defs(&self) -> Vec<&IndexDef> {
        let mut defs: Vec<&IndexDef> = self.indexes.values().collect();
        defs.sort_unstable_by(|a, b| a.index_name.cmp(&b.index_name));
        defs
    }

    /// Indexes defined on a table, sorted by index name
    pub fn indexes_on(&self, table: &str) -> Vec<&IndexDef> {
        self.index_defs()
            .into_iter()
            .filter(|index| index.table_name == table)
            .collect()
    }

    /// Define a table; the primary key attribute is made unique
    pub fn create_table(
        &mut self,
        buffer_mgr: &mut BufferManager,
        name: &str,
        primary_key: &str,
        mut attributes: Vec<Attribute>,
    ) -> CatalogResult<&TableSchema> {
        if self.has_table(name) {
            return Err(CatalogError::TableExists(name.to_string()));
        }
        validate_name(name)?;
        if attributes.is_empty() {
            return Err(CatalogError::NoAttributes(name.to_string()));
        }

        let pk = attributes
            .iter()
            .position(|attr| attr.name == primary_key)
            .ok_or_else(|| CatalogError::AttributeNotFound {
                attr: primary_key.to_string(),
                table: name.to_string(),
            })?;
        attributes[pk].unique = true;

        let schema = TableSchema::new(name, primary_key, attributes);
        validate_schema(&schema)?;

        let block = self.append_entry(buffer_mgr, Chain::Tables, |next| {
            entry::encode_table(next, &schema)
        })?;
        debug!(table = name, block, "catalog: created table");

        self.schema_blocks.insert(name.to_string(), block);
        Ok(self.schemas.entry(name.to_string()).or_insert(schema))
    }

    /// Remove a table definition
    pub fn drop_table(&mut self, buffer_mgr: &mut BufferManager, name: &str) -> CatalogResult<()> {
        let block = *self
            .schema_blocks
            .get(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))?;

        tombstone_entry(buffer_mgr, block)?;
        self.schemas.remove(name);
        self.schema_blocks.remove(name);
        debug!(table = name, block, "catalog: dropped table");
        Ok(())
    }

    /// Define an index on an existing table attribute
    pub fn create_index(
        &mut self,
        buffer_mgr: &mut BufferManager,
        name: &str,
        table: &str,
        attr: &str,
    ) -> CatalogResult<&IndexDef> {
        if self.has_index(name) {
            return Err(CatalogError::IndexExists(name.to_string()));
        }
        validate_name(name)?;

        let schema = self.schema(table)?;
        if schema.find_attribute(attr).is_none() {
            return Err(CatalogError::AttributeNotFound {
                attr: attr.to_string(),
                table: table.to_string(),
            });
        }

        let index = IndexDef::new(name, table, attr);
        let block = self.append_entry(buffer_mgr, Chain::Indexes, |next| {
            entry::encode_index(next, &index)
        })?;
        debug!(index = name, table, attr, block, "catalog: created index");

        self.index_blocks.insert(name.to_string(), block);
        Ok(self.indexes.entry(name.to_string()).or_insert(index))
    }

    /// Remove an index definition
    pub fn drop_index(&mut self, buffer_mgr: &mut BufferManager, name: &str) -> CatalogResult<()> {
        let block = *self
            .index_blocks
            .get(name)
            .ok_or_else(|| CatalogError::IndexNotFound(name.to_string()))?;

        tombstone_entry(buffer_mgr, block)?;
        self.indexes.remove(name);
        self.index_blocks.remove(name);
        debug!(index = name, block, "catalog: dropped index");
        Ok(())
    }

    /// Check every predicate names an attribute of the table with the value's type
    pub fn check_predicates(&self, table: &str, predicates: &[Predicate]) -> CatalogResult<()> {
        let schema = self.schema(table)?;

        for pred in predicates {
            let attr = schema
                .find_attribute(&pred.attr_name)
                .and_then(|i| schema.attribute(i))
                .ok_or_else(|| CatalogError::AttributeNotFound {
                    attr: pred.attr_name.clone(),
                    table: table.to_string(),
                })?;

            if !pred.value.is_kind_of(&attr.data_type) {
                return Err(CatalogError::TypeMismatch {
                    attr: attr.name.clone(),
                    expected: attr.data_type.to_string(),
                    actual: pred.value.type_name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Write a new entry block and link it at the front of a chain
    fn append_entry(
        &self,
        buffer_mgr: &mut BufferManager,
        chain: Chain,
        encode: impl FnOnce(u32) -> Vec<u8>,
    ) -> CatalogResult<u32> {
        let header_id = BlockId::new(CATALOG_FILE, 0);
        buffer_mgr.pin(&header_id)?;
        let result = link_new_entry(buffer_mgr, chain, encode);
        buffer_mgr.unpin(&header_id);
        result
    }
}

#[derive(Debug, Clone, Copy)]
enum Chain {
    Tables,
    Indexes,
}

fn link_new_entry(
    buffer_mgr: &mut BufferManager,
    chain: Chain,
    encode: impl FnOnce(u32) -> Vec<u8>,
) -> CatalogResult<u32> {
    let mut header = read_header(buffer_mgr)?;
    let block = header.block_count;

    let head = match chain {
        Chain::Tables => &mut header.table_head,
        Chain::Indexes => &mut header.index_head,
    };
    let bytes = encode(*head);
    *head = block;
    header.block_count += 1;

    buffer_mgr.write_block(&BlockId::new(CATALOG_FILE, block), 0, &bytes)?;
    buffer_mgr.write_block(&BlockId::new(CATALOG_FILE, 0), 0, &header.to_bytes())?;
    Ok(block)
}

fn tombstone_entry(buffer_mgr: &mut BufferManager, block: u32) -> CatalogResult<()> {
    let id = BlockId::new(CATALOG_FILE, block);
    let next = read_u32(buffer_mgr.read_block(&id)?.data(), 0);
    buffer_mgr.write_block(&id, 0, &(next | TOMBSTONE).to_le_bytes())?;
    Ok(())
}

fn read_header(buffer_mgr: &mut BufferManager) -> CatalogResult<CatalogHeader> {
    let block = buffer_mgr.read_block(&BlockId::new(CATALOG_FILE, 0))?;
    CatalogHeader::from_bytes(block.data())
}

/// Walk a chain from `head`, returning the block index and contents of each live entry
fn live_entries(
    buffer_mgr: &mut BufferManager,
    header: &CatalogHeader,
    head: u32,
) -> CatalogResult<Vec<(u32, Vec<u8>)>> {
    let mut entries = Vec::new();
    let mut current = head;
    let mut steps = 0;

    while current != NULL_OFFSET {
        steps += 1;
        if current >= header.block_count || steps > header.block_count {
            return Err(CatalogError::Corrupted(format!(
                "chain reaches block {current} of {}",
                header.block_count
            )));
        }

        let data = buffer_mgr
            .read_block(&BlockId::new(CATALOG_FILE, current))?
            .data();
        let next = read_u32(data, 0);
        if !is_tombstoned(next) {
            entries.push((current, data.to_vec()));
        }
        current = link_of(next);
    }

    Ok(entries)
}

fn validate_name(name: &str) -> CatalogResult<()> {
    if name.is_empty() || name.len() >= NAME_LENGTH || name.contains('\0') {
        return Err(CatalogError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn validate_schema(schema: &TableSchema) -> CatalogResult<()> {
    let table = schema.table_name();

    if schema.attribute_count() == 0 {
        return Err(CatalogError::NoAttributes(table.to_string()));
    }
    if schema.attribute_count() > MAX_ATTRIBUTES {
        return Err(CatalogError::TooManyAttributes {
            table: table.to_string(),
            count: schema.attribute_count(),
            max: MAX_ATTRIBUTES,
        });
    }

    for (i, attr) in schema.attributes().iter().enumerate() {
        validate_name(&attr.name)?;
        if schema.attributes()[..i].iter().any(|a| a.name == attr.name) {
            return Err(CatalogError::DuplicateAttribute(attr.name.clone()));
        }
        if let DataType::Char(len) = attr.data_type
            && !(1..=MAX_CHAR_LENGTH).contains(&len)
        {
            return Err(CatalogError::InvalidCharLength {
                attr: attr.name.clone(),
                len,
            });
        }
    }

    if schema.record_size() > BLOCK_SIZE {
        return Err(CatalogError::RecordTooLarge {
            table: table.to_string(),
            size: schema.record_size(),
        });
    }
    Ok(())
}
