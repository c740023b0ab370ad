//! Packing of an attribute's type, CHAR length and uniqueness into one word.

use super::{CatalogError, CatalogResult};
use crate::record::DataType;

pub const INT_TAG: u32 = 0x0100;
pub const FLOAT_TAG: u32 = 0x0200;
pub const CHAR_TAG: u32 = 0x0400;
pub const CHAR_LENGTH_MASK: u32 = 0x00FF;
pub const UNIQUE_FLAG: u32 = 0x1000;

pub fn encode_properties(data_type: &DataType, unique: bool) -> u32 {
    let mut word = match data_type {
        DataType::Int => INT_TAG,
        DataType::Float => FLOAT_TAG,
        DataType::Char(len) => CHAR_TAG | (*len as u32 & CHAR_LENGTH_MASK),
    };
    if unique {
        word |= UNIQUE_FLAG;
    }
    word
}

pub fn decode_properties(word: u32) -> CatalogResult<(DataType, bool)> {
    let data_type = if word & INT_TAG != 0 {
        DataType::Int
    } else if word & FLOAT_TAG != 0 {
        DataType::Float
    } else if word & CHAR_TAG != 0 {
        DataType::Char((word & CHAR_LENGTH_MASK) as usize)
    } else {
        return Err(CatalogError::Corrupted(format!(
            "unknown attribute type in property word {word:#06x}"
        )));
    };
    Ok((data_type, word & UNIQUE_FLAG != 0))
}
