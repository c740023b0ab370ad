use std::path::Path;

use csv::ReaderBuilder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, CatalogManager, IndexDef};
use crate::config::{ConfigError, EngineConfig};
use crate::file::{BufferManager, FileError, PagedFileManager};
use crate::index::{IndexError, IndexManager};
use crate::record::{
    Attribute, DataType, Predicate, Record, RecordError, RecordManager, TableSchema, Value,
};


#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Duplicate value {value} for unique attribute {attr} of table {table}")]
    UniqueViolation {
        table: String,
        attr: String,
        value: String,
    },

    #[error("NaN cannot be stored in unique attribute {attr} of table {table}")]
    NanInUniqueAttribute { table: String, attr: String },

    #[error("Cannot index {attr} of table {table}: attribute is not unique")]
    IndexOnNonUnique { table: String, attr: String },

    #[error("Line {line}: {message}")]
    Import { line: u64, message: String },
}

impl DatabaseError {
    /// Whether the error means the files on disk disagree with each other or
    /// with the format, as opposed to a rejected request
    pub fn is_consistency_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::Record(
                RecordError::MissingTableFile(_)
                    | RecordError::IncompatibleFile(_)
                    | RecordError::Deserialization(_)
                    | RecordError::InvalidOffset(_)
            ) | DatabaseError::Index(
                IndexError::MissingIndexFile(_)
                    | IndexError::IncompatibleFile(_)
                    | IndexError::CorruptedNode(_)
                    | IndexError::InvalidState(_)
            ) | DatabaseError::Catalog(
                CatalogError::IncompatibleFile(_) | CatalogError::Corrupted(_)
            )
        )
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// A storage engine instance over one data directory.
///
/// Owns the block cache and the three stores; every operation goes through
/// here so the catalog, heap files and indexes stay in step. Dropping the
/// value flushes every dirty block.
pub struct Database {
    config: EngineConfig,
    catalog: CatalogManager,
    record_manager: RecordManager,
    index_manager: IndexManager,
    buffer_mgr: BufferManager,
}

impl Database {
    /// Open (or initialise) the data directory named by `config`.
    ///
    /// Fails if a table or index listed in the catalog has no file, or if
    /// any file has the wrong format.
    pub fn open(config: EngineConfig) -> DatabaseResult<Self> {
        let file_manager =
            PagedFileManager::with_max_files(&config.data_dir, config.max_open_files)?;
        let mut buffer_mgr = BufferManager::with_capacity(file_manager, config.cache_capacity);

        let catalog = CatalogManager::init(&mut buffer_mgr)?;
        let record_manager = RecordManager::init(&buffer_mgr, catalog.table_names())?;
        let index_manager = IndexManager::init(
            &mut buffer_mgr,
            catalog.index_defs().into_iter().map(|def| def.index_name.as_str()),
            config.index_fanout,
        )?;

        info!(
            data_dir = %config.data_dir.display(),
            tables = catalog.table_names().len(),
            indexes = catalog.index_defs().len(),
            "opened database"
        );

        Ok(Self {
            config,
            catalog,
            record_manager,
            index_manager,
            buffer_mgr,
        })
    }

    /// Open a data directory with default settings
    pub fn open_dir(data_dir: impl AsRef<Path>) -> DatabaseResult<Self> {
        Self::open(EngineConfig::builder().data_dir(data_dir.as_ref()).build())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Schema operations

    pub fn create_table(
        &mut self,
        name: &str,
        primary_key: &str,
        attributes: Vec<Attribute>,
    ) -> DatabaseResult<()> {
        self.catalog
            .create_table(&mut self.buffer_mgr, name, primary_key, attributes)?;
        self.record_manager.create_table(&mut self.buffer_mgr, name)?;
        info!(table = name, "created table");
        Ok(())
    }

    /// Drop a table together with every index defined on it
    pub fn drop_table(&mut self, name: &str) -> DatabaseResult<()> {
        self.catalog.schema(name)?;

        let index_names: Vec<String> = self
            .catalog
            .indexes_on(name)
            .into_iter()
            .map(|def| def.index_name.clone())
            .collect();
        for index in &index_names {
            self.drop_index(index)?;
        }

        self.catalog.drop_table(&mut self.buffer_mgr, name)?;
        self.record_manager.drop_table(&mut self.buffer_mgr, name)?;
        info!(table = name, "dropped table");
        Ok(())
    }

    /// Index a unique attribute, loading the table's current records
    pub fn create_index(&mut self, name: &str, table: &str, attr: &str) -> DatabaseResult<()> {
        if self.catalog.has_index(name) {
            return Err(CatalogError::IndexExists(name.to_string()).into());
        }

        let schema = self.catalog.schema(table)?;
        let position = schema
            .find_attribute(attr)
            .ok_or_else(|| CatalogError::AttributeNotFound {
                attr: attr.to_string(),
                table: table.to_string(),
            })?;
        let attribute = &schema.attributes()[position];
        if !attribute.unique {
            return Err(DatabaseError::IndexOnNonUnique {
                table: table.to_string(),
                attr: attr.to_string(),
            });
        }
        let key_type = attribute.data_type;
        self.index_manager.check_fanout(&key_type)?;

        self.catalog
            .create_index(&mut self.buffer_mgr, name, table, attr)?;
        if let Err(e) = self.build_index(name, table, position, key_type) {
            warn!(index = name, error = %e, "index build failed, removing it");
            if let Err(drop_err) = self.index_manager.drop_index(&mut self.buffer_mgr, name) {
                debug!(index = name, error = %drop_err, "no index file to remove");
            }
            self.catalog.drop_index(&mut self.buffer_mgr, name)?;
            return Err(e);
        }

        info!(index = name, table, attr, "created index");
        Ok(())
    }

    /// Create the tree of a cataloged index and load the table into it
    fn build_index(
        &mut self,
        name: &str,
        table: &str,
        position: usize,
        key_type: DataType,
    ) -> DatabaseResult<()> {
        self.index_manager
            .create_index(&mut self.buffer_mgr, name, key_type)?;

        let schema = self.catalog.schema(table)?;
        let rows = self
            .record_manager
            .select_with_offsets(&mut self.buffer_mgr, schema, &[])?;
        for (offset, record) in rows {
            let key = record.into_values().swap_remove(position);
            self.index_manager
                .insert(&mut self.buffer_mgr, name, key, offset)?;
        }
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> DatabaseResult<()> {
        self.catalog.index(name)?;
        self.index_manager.drop_index(&mut self.buffer_mgr, name)?;
        self.catalog.drop_index(&mut self.buffer_mgr, name)?;
        info!(index = name, "dropped index");
        Ok(())
    }

    // Data operations

    /// Insert one record; returns its offset in the table file
    pub fn insert(&mut self, table: &str, values: Vec<Value>) -> DatabaseResult<u32> {
        let schema = self.catalog.schema(table)?;
        schema.validate_record(&values)?;
        let record = Record::new(values);

        for (position, attr) in schema.attributes().iter().enumerate() {
            if !attr.unique {
                continue;
            }
            let value = &record.values()[position];
            if matches!(value, Value::Float(f) if f.is_nan()) {
                return Err(DatabaseError::NanInUniqueAttribute {
                    table: table.to_string(),
                    attr: attr.name.clone(),
                });
            }
            let index = self
                .catalog
                .indexes_on(table)
                .into_iter()
                .find(|def| def.attr_name == attr.name);

            let duplicate = match index {
                Some(def) => {
                    self.index_manager
                        .has_key(&mut self.buffer_mgr, &def.index_name, value)?
                }
                None => !self
                    .record_manager
                    .select_records(
                        &mut self.buffer_mgr,
                        schema,
                        &[Predicate::equals(attr.name.as_str(), value.clone())],
                    )?
                    .is_empty(),
            };

            if duplicate {
                return Err(DatabaseError::UniqueViolation {
                    table: table.to_string(),
                    attr: attr.name.clone(),
                    value: value.to_string(),
                });
            }
        }

        let offset = self
            .record_manager
            .insert_record(&mut self.buffer_mgr, schema, &record)?;

        for def in self.catalog.indexes_on(table) {
            if let Some(position) = schema.find_attribute(&def.attr_name) {
                self.index_manager.insert(
                    &mut self.buffer_mgr,
                    &def.index_name,
                    record.values()[position].clone(),
                    offset,
                )?;
            }
        }

        debug!(table, offset, "inserted record");
        Ok(offset)
    }

    /// Records satisfying every predicate, restricted to `attr_names` (all
    /// attributes when empty), in insertion order
    pub fn select(
        &mut self,
        attr_names: &[String],
        table: &str,
        predicates: &[Predicate],
    ) -> DatabaseResult<Vec<Record>> {
        self.catalog.check_predicates(table, predicates)?;
        let schema = self.catalog.schema(table)?;

        let records = self
            .record_manager
            .select_records(&mut self.buffer_mgr, schema, predicates)?;
        Ok(RecordManager::project(records, schema, attr_names)?)
    }

    /// Delete the records satisfying every predicate (all records when there
    /// are none); returns how many were deleted
    pub fn delete_from(&mut self, table: &str, predicates: &[Predicate]) -> DatabaseResult<usize> {
        self.catalog.check_predicates(table, predicates)?;
        let schema = self.catalog.schema(table)?;

        if predicates.is_empty() {
            let count = self
                .record_manager
                .delete_all_records(&mut self.buffer_mgr, table)?;
            for def in self.catalog.indexes_on(table) {
                self.index_manager
                    .clear(&mut self.buffer_mgr, &def.index_name)?;
            }
            debug!(table, count, "deleted all records");
            return Ok(count as usize);
        }

        let deleted = self
            .record_manager
            .delete_matching(&mut self.buffer_mgr, schema, predicates)?;

        for def in self.catalog.indexes_on(table) {
            let Some(position) = schema.find_attribute(&def.attr_name) else {
                continue;
            };
            for (_, record) in &deleted {
                self.index_manager.remove(
                    &mut self.buffer_mgr,
                    &def.index_name,
                    &record.values()[position],
                )?;
            }
        }

        debug!(table, count = deleted.len(), "deleted records");
        Ok(deleted.len())
    }

    /// Insert every row of a delimited file, typed by the table's schema;
    /// returns how many rows were inserted
    pub fn load_csv(
        &mut self,
        table: &str,
        path: impl AsRef<Path>,
        delimiter: u8,
    ) -> DatabaseResult<usize> {
        let types: Vec<DataType> = self
            .catalog
            .schema(table)?
            .attributes()
            .iter()
            .map(|attr| attr.data_type)
            .collect();

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(path.as_ref())?;

        let mut inserted = 0;
        for row in reader.records() {
            let row = row?;
            let line = row.position().map_or(inserted as u64 + 1, |pos| pos.line());

            if row.len() != types.len() {
                return Err(DatabaseError::Import {
                    line,
                    message: format!("expected {} fields, found {}", types.len(), row.len()),
                });
            }

            let values = row
                .iter()
                .zip(&types)
                .map(|(field, data_type)| parse_field(field, data_type))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|message| DatabaseError::Import { line, message })?;

            self.insert(table, values)?;
            inserted += 1;
        }

        info!(table, rows = inserted, "loaded csv");
        Ok(inserted)
    }

    // Introspection

    pub fn schema(&self, table: &str) -> DatabaseResult<&TableSchema> {
        Ok(self.catalog.schema(table)?)
    }

    /// Table names, sorted
    pub fn table_names(&self) -> Vec<&str> {
        self.catalog.table_names()
    }

    /// Index definitions, sorted by index name
    pub fn index_defs(&self) -> Vec<&IndexDef> {
        self.catalog.index_defs()
    }

    pub fn record_count(&mut self, table: &str) -> DatabaseResult<u32> {
        self.catalog.schema(table)?;
        Ok(self.record_manager.record_count(&mut self.buffer_mgr, table)?)
    }

    /// Keys of an index with the offsets of their records, in key order
    pub fn index_entries(&mut self, index: &str) -> DatabaseResult<Vec<(Value, u32)>> {
        self.catalog.index(index)?;
        Ok(self.index_manager.entries(&mut self.buffer_mgr, index)?)
    }

    // Lifecycle

    /// Write every dirty block back to disk
    pub fn flush(&mut self) -> DatabaseResult<()> {
        self.buffer_mgr.flush_all()?;
        Ok(())
    }

    /// Flush and release the database
    pub fn close(mut self) -> DatabaseResult<()> {
        self.flush()?;
        debug!(data_dir = %self.config.data_dir.display(), "closed database");
        Ok(())
    }
}

/// Numbers may be padded with whitespace; CHAR fields are kept verbatim
fn parse_field(field: &str, data_type: &DataType) -> Result<Value, String> {
    match data_type {
        DataType::Int => field
            .trim()
            .parse::<i32>()
            .map(Value::Int)
            .map_err(|e| format!("invalid INT '{field}': {e}")),
        DataType::Float => field
            .trim()
            .parse::<f32>()
            .map(Value::Float)
            .map_err(|e| format!("invalid FLOAT '{field}': {e}")),
        DataType::Char(_) => Ok(Value::Char(field.to_string())),
    }
}
