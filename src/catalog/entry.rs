use super::properties::{decode_properties, encode_properties};
use super::{CatalogError, CatalogResult, IndexDef};
use crate::file::BLOCK_SIZE;
use crate::file::layout::{FileType, NAME_LENGTH, get_name, put_name, read_u32, write_u32};
use crate::record::{Attribute, TableSchema};

/// Name of the catalog file
pub const CATALOG_FILE: &str = "minisql.ctl";

const TABLE_FIXED_SIZE: usize = 4 + 4 + NAME_LENGTH + NAME_LENGTH;
const ATTRIBUTE_SIZE: usize = NAME_LENGTH + 4;

/// Most attributes a table entry can hold in one block
pub const MAX_ATTRIBUTES: usize = (BLOCK_SIZE - TABLE_FIXED_SIZE) / ATTRIBUTE_SIZE;

/// Block 0 of the catalog file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogHeader {
    pub block_count: u32,
    pub table_head: u32,
    pub index_head: u32,
}

impl CatalogHeader {
    pub fn empty() -> Self {
        Self {
            block_count: 1,
            table_head: 0,
            index_head: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 16];
        write_u32(&mut buf, 0, self.block_count);
        write_u32(&mut buf, 4, self.table_head);
        write_u32(&mut buf, 8, self.index_head);
        write_u32(&mut buf, 12, FileType::Catalog.word());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> CatalogResult<Self> {
        if FileType::from_word(read_u32(buf, 12)) != Some(FileType::Catalog) {
            return Err(CatalogError::IncompatibleFile(CATALOG_FILE.to_string()));
        }
        Ok(Self {
            block_count: read_u32(buf, 0),
            table_head: read_u32(buf, 4),
            index_head: read_u32(buf, 8),
        })
    }
}

/// `{next, attr count, table name, primary key, (attr name, props)*}`
pub fn encode_table(next: u32, schema: &TableSchema) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TABLE_FIXED_SIZE + schema.attribute_count() * ATTRIBUTE_SIZE);
    buf.extend_from_slice(&next.to_le_bytes());
    buf.extend_from_slice(&(schema.attribute_count() as u32).to_le_bytes());
    put_name(&mut buf, schema.table_name());
    put_name(&mut buf, schema.primary_key());
    for attr in schema.attributes() {
        put_name(&mut buf, &attr.name);
        buf.extend_from_slice(&encode_properties(&attr.data_type, attr.unique).to_le_bytes());
    }
    buf
}

pub fn decode_table(buf: &[u8]) -> CatalogResult<TableSchema> {
    let count = read_u32(buf, 4) as usize;
    if count > MAX_ATTRIBUTES {
        return Err(CatalogError::Corrupted(format!(
            "table entry claims {count} attributes"
        )));
    }

    let table_name = get_name(buf, 8);
    let primary_key = get_name(buf, 8 + NAME_LENGTH);

    let mut attributes = Vec::with_capacity(count);
    for i in 0..count {
        let at = TABLE_FIXED_SIZE + i * ATTRIBUTE_SIZE;
        let (data_type, unique) = decode_properties(read_u32(buf, at + NAME_LENGTH))?;
        attributes.push(Attribute::new(get_name(buf, at), data_type, unique));
    }

    Ok(TableSchema::new(table_name, primary_key, attributes))
}

/// `{next, index name, table name, attr name}`
pub fn encode_index(next: u32, index: &IndexDef) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + 3 * NAME_LENGTH);
    buf.extend_from_slice(&next.to_le_bytes());
    put_name(&mut buf, &index.index_name);
    put_name(&mut buf, &index.table_name);
    put_name(&mut buf, &index.attr_name);
    buf
}

pub fn decode_index(buf: &[u8]) -> IndexDef {
    IndexDef {
        index_name: get_name(buf, 4),
        table_name: get_name(buf, 4 + NAME_LENGTH),
        attr_name: get_name(buf, 4 + 2 * NAME_LENGTH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DataType;

    #[test]
    fn test_max_attributes_fit_in_block() {
        assert_eq!(MAX_ATTRIBUTES, 58);
        assert!(TABLE_FIXED_SIZE + MAX_ATTRIBUTES * ATTRIBUTE_SIZE <= BLOCK_SIZE);
    }

    #[test]
    fn test_table_entry_layout() {
        let schema = TableSchema::new(
            "book",
            "isbn",
            vec![
                Attribute::new("isbn", DataType::Char(13), true),
                Attribute::new("pages", DataType::Int, false),
            ],
        );
        let buf = encode_table(7, &schema);

        assert_eq!(buf.len(), TABLE_FIXED_SIZE + 2 * ATTRIBUTE_SIZE);
        assert_eq!(read_u32(&buf, 0), 7);
        assert_eq!(read_u32(&buf, 4), 2);
        assert_eq!(decode_table(&buf).unwrap(), schema);
    }

    #[test]
    fn test_index_entry_layout() {
        let index = IndexDef::new("by_isbn", "book", "isbn");
        let buf = encode_index(0, &index);
        assert_eq!(buf.len(), 4 + 3 * NAME_LENGTH);
        assert_eq!(decode_index(&buf), index);
    }
}
