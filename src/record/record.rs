use super::error::{RecordError, RecordResult};
use super::schema::TableSchema;
use super::value::Value;

/// A single record (row) with typed values
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Create a new record
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get the number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if record is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by index
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get all values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Serialize the values in schema order (the link word is not included)
    pub fn serialize(&self, schema: &TableSchema) -> RecordResult<Vec<u8>> {
        schema.validate_record(&self.values)?;

        let mut result = Vec::with_capacity(schema.values_size());
        for (value, attr) in self.values.iter().zip(schema.attributes()) {
            result.extend_from_slice(&value.serialize(&attr.data_type)?);
        }

        Ok(result)
    }

    /// Deserialize the values of a record laid out by `serialize`
    pub fn deserialize(data: &[u8], schema: &TableSchema) -> RecordResult<Self> {
        if data.len() != schema.values_size() {
            return Err(RecordError::Deserialization(format!(
                "Expected {} bytes, got {}",
                schema.values_size(),
                data.len()
            )));
        }

        let mut offset = 0;
        let mut values = Vec::with_capacity(schema.attribute_count());

        for attr in schema.attributes() {
            let size = attr.size();
            values.push(Value::deserialize(
                &data[offset..offset + size],
                &attr.data_type,
            )?);
            offset += size;
        }

        Ok(Record { values })
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Record::new(values)
    }
}
