use std::cmp::Ordering;
use std::fmt;

use super::error::{RecordError, RecordResult};

/// Longest CHAR column, in bytes
pub const MAX_CHAR_LENGTH: usize = 255;

/// Represents a column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,         // 4 bytes, i32
    Float,       // 4 bytes, f32
    Char(usize), // n bytes, NUL padded
}

impl DataType {
    /// Get the size in bytes for this data type
    pub fn size(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Float => 4,
            DataType::Char(n) => *n,
        }
    }

    /// Same type tag, ignoring CHAR length
    pub fn same_kind(&self, other: &DataType) -> bool {
        matches!(
            (self, other),
            (DataType::Int, DataType::Int)
                | (DataType::Float, DataType::Float)
                | (DataType::Char(_), DataType::Char(_))
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Char(n) => write!(f, "CHAR({n})"),
        }
    }
}

/// Represents a single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Char(String),
}

impl Value {
    /// Name of the value's type tag, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "INT",
            Value::Float(_) => "FLOAT",
            Value::Char(_) => "CHAR",
        }
    }

    /// Whether this value may be stored in a column of `data_type`, ignoring length
    pub fn is_kind_of(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Int(_), DataType::Int)
                | (Value::Float(_), DataType::Float)
                | (Value::Char(_), DataType::Char(_))
        )
    }

    /// Check the value fits a column of `data_type`
    pub fn check_fits(&self, data_type: &DataType) -> RecordResult<()> {
        if !self.is_kind_of(data_type) {
            return Err(RecordError::TypeMismatch {
                expected: data_type.to_string(),
                actual: self.type_name().to_string(),
            });
        }
        if let (Value::Char(s), DataType::Char(len)) = (self, data_type)
            && s.len() > *len
        {
            return Err(RecordError::CharTooLong {
                value: s.clone(),
                max: *len,
            });
        }
        Ok(())
    }

    /// Serialize value to bytes; CHAR values are NUL padded to the column length
    pub fn serialize(&self, data_type: &DataType) -> RecordResult<Vec<u8>> {
        self.check_fits(data_type)?;

        match self {
            Value::Int(i) => Ok(i.to_le_bytes().to_vec()),
            Value::Float(f) => Ok(f.to_le_bytes().to_vec()),
            Value::Char(s) => {
                let mut result = vec![0u8; data_type.size()];
                result[..s.len()].copy_from_slice(s.as_bytes());
                Ok(result)
            }
        }
    }

    /// Deserialize value from bytes
    pub fn deserialize(bytes: &[u8], data_type: &DataType) -> RecordResult<Self> {
        if bytes.len() != data_type.size() {
            return Err(RecordError::Deserialization(format!(
                "Expected {} bytes for {}, got {}",
                data_type.size(),
                data_type,
                bytes.len()
            )));
        }

        match data_type {
            DataType::Int => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Value::Int(i32::from_le_bytes(buf)))
            }
            DataType::Float => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Value::Float(f32::from_le_bytes(buf)))
            }
            DataType::Char(_) => {
                // Find the first null byte (string terminator)
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let s = String::from_utf8(bytes[..end].to_vec())
                    .map_err(|e| RecordError::Deserialization(format!("Invalid UTF-8: {}", e)))?;
                Ok(Value::Char(s))
            }
        }
    }

    /// Total order between values of the same type.
    ///
    /// CHAR values compare bytewise up to the first NUL. Floats follow
    /// `f32::total_cmp` except that `-0.0` equals `0.0`, matching `=` in
    /// predicates for every non-NaN value.
    pub fn compare(&self, other: &Value) -> RecordResult<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) if a == b => Ok(Ordering::Equal),
            (Value::Float(a), Value::Float(b)) => Ok(a.total_cmp(b)),
            (Value::Char(a), Value::Char(b)) => Ok(c_bytes(a).cmp(c_bytes(b))),
            _ => Err(RecordError::TypeMismatch {
                expected: self.type_name().to_string(),
                actual: other.type_name().to_string(),
            }),
        }
    }
}

/// Bytes of a CHAR value up to its first NUL
pub(crate) fn c_bytes(s: &str) -> &[u8] {
    let bytes = s.as_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Char(s) => write!(f, "{s}"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Char(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Char(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_size() {
        assert_eq!(DataType::Int.size(), 4);
        assert_eq!(DataType::Float.size(), 4);
        assert_eq!(DataType::Char(10).size(), 10);
        assert_eq!(DataType::Char(255).size(), 255);
    }

    #[test]
    fn test_int_serialization() {
        let val = Value::Int(-42);
        let bytes = val.serialize(&DataType::Int).unwrap();
        assert_eq!(bytes, (-42i32).to_le_bytes().to_vec());
        assert_eq!(Value::deserialize(&bytes, &DataType::Int).unwrap(), val);
    }

    #[test]
    fn test_float_serialization() {
        let val = Value::Float(3.5);
        let bytes = val.serialize(&DataType::Float).unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(Value::deserialize(&bytes, &DataType::Float).unwrap(), val);
    }

    #[test]
    fn test_char_serialization() {
        let val = Value::from("hello");
        let dt = DataType::Char(10);
        let bytes = val.serialize(&dt).unwrap();
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[..5], b"hello");
        assert_eq!(&bytes[5..], &[0u8; 5]);
        assert_eq!(Value::deserialize(&bytes, &dt).unwrap(), val);
    }

    #[test]
    fn test_char_too_long() {
        let result = Value::from("hello world").serialize(&DataType::Char(5));
        assert!(matches!(result, Err(RecordError::CharTooLong { max: 5, .. })));
    }

    #[test]
    fn test_type_mismatch() {
        let result = Value::Int(42).serialize(&DataType::Float);
        assert!(matches!(result, Err(RecordError::TypeMismatch { .. })));
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            Value::Int(1).compare(&Value::Int(2)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::Float(2.5).compare(&Value::Float(2.5)).unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            Value::from("b").compare(&Value::from("abc")).unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            Value::from("ab\0zz").compare(&Value::from("ab")).unwrap(),
            Ordering::Equal
        );
        assert!(Value::Int(1).compare(&Value::Float(1.0)).is_err());
    }

    #[test]
    fn test_compare_signed_zero() {
        assert_eq!(
            Value::Float(-0.0).compare(&Value::Float(0.0)).unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            Value::Float(-1.0).compare(&Value::Float(-0.0)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::Float(0.0).compare(&Value::Float(f32::MIN_POSITIVE)).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::from("x").to_string(), "x");
        assert_eq!(DataType::Char(8).to_string(), "CHAR(8)");
    }
}
