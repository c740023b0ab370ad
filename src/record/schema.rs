use super::error::{RecordError, RecordResult};
use super::value::{DataType, Value};

/// Size of the link word heading every stored record
pub const RECORD_LINK_SIZE: usize = 4;

/// Attribute (column) definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub data_type: DataType,
    pub unique: bool,
}

impl Attribute {
    /// Create a new attribute
    pub fn new(name: impl Into<String>, data_type: DataType, unique: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            unique,
        }
    }

    /// Get the size of this attribute in bytes
    pub fn size(&self) -> usize {
        self.data_type.size()
    }
}

/// Table schema: name, primary key and ordered attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table_name: String,
    primary_key: String,
    attributes: Vec<Attribute>,
}

impl TableSchema {
    /// Create a new table schema
    pub fn new(
        table_name: impl Into<String>,
        primary_key: impl Into<String>,
        attributes: Vec<Attribute>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key: primary_key.into(),
            attributes,
        }
    }

    /// Get table name
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Get all attributes
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute(&self, idx: usize) -> Option<&Attribute> {
        self.attributes.get(idx)
    }

    /// Find attribute index by name
    pub fn find_attribute(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Like `find_attribute`, failing for unknown names
    pub fn require_attribute(&self, name: &str) -> RecordResult<usize> {
        self.find_attribute(name)
            .ok_or_else(|| RecordError::AttributeNotFound {
                attr: name.to_string(),
                table: self.table_name.clone(),
            })
    }

    /// Bytes taken by the values of one record
    pub fn values_size(&self) -> usize {
        self.attributes.iter().map(Attribute::size).sum()
    }

    /// Stored record size: link word plus values
    pub fn record_size(&self) -> usize {
        RECORD_LINK_SIZE + self.values_size()
    }

    /// Validate a record against this schema
    pub fn validate_record(&self, values: &[Value]) -> RecordResult<()> {
        if values.len() != self.attributes.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "Expected {} values, got {}",
                self.attributes.len(),
                values.len()
            )));
        }

        for (value, attr) in values.iter().zip(&self.attributes) {
            value.check_fits(&attr.data_type)?;
        }

        Ok(())
    }
}
