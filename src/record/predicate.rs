use std::cmp::Ordering;
use std::fmt;

use super::error::{RecordError, RecordResult};
use super::record::Record;
use super::schema::TableSchema;
use super::value::{Value, c_bytes};

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// Evaluate `lhs op rhs`; both operands must have the same type.
    ///
    /// Floats follow IEEE comparison, so NaN satisfies only `Ne`.
    pub fn apply(self, lhs: &Value, rhs: &Value) -> RecordResult<bool> {
        let ord = match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Char(a), Value::Char(b)) => Some(c_bytes(a).cmp(c_bytes(b))),
            _ => {
                return Err(RecordError::TypeMismatch {
                    expected: lhs.type_name().to_string(),
                    actual: rhs.type_name().to_string(),
                });
            }
        };

        Ok(match (self, ord) {
            (CmpOp::Ne, None) => true,
            (_, None) => false,
            (CmpOp::Eq, Some(o)) => o == Ordering::Equal,
            (CmpOp::Ne, Some(o)) => o != Ordering::Equal,
            (CmpOp::Lt, Some(o)) => o == Ordering::Less,
            (CmpOp::Le, Some(o)) => o != Ordering::Greater,
            (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
            (CmpOp::Ge, Some(o)) => o != Ordering::Less,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// `attribute op constant`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub attr_name: String,
    pub op: CmpOp,
    pub value: Value,
}

impl Predicate {
    pub fn new(attr_name: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Self {
            attr_name: attr_name.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(attr_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attr_name, CmpOp::Eq, value)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attr_name, self.op.symbol(), self.value)
    }
}

/// A conjunction of predicates resolved against a schema
pub struct Filter<'a> {
    terms: Vec<(usize, &'a Predicate)>,
}

impl<'a> Filter<'a> {
    /// Resolve attribute names; unknown attributes fail
    pub fn new(schema: &TableSchema, predicates: &'a [Predicate]) -> RecordResult<Self> {
        let terms = predicates
            .iter()
            .map(|p| Ok((schema.require_attribute(&p.attr_name)?, p)))
            .collect::<RecordResult<Vec<_>>>()?;
        Ok(Self { terms })
    }

    /// Whether the record satisfies every predicate; an empty filter matches all
    pub fn matches(&self, record: &Record) -> RecordResult<bool> {
        for (idx, pred) in &self.terms {
            let value = record.get(*idx).ok_or_else(|| {
                RecordError::SchemaMismatch(format!("record has no value at position {idx}"))
            })?;
            if !pred.op.apply(value, &pred.value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
