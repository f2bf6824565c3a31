//! The dynamically-typed value that flows through match criteria,
//! calibrators, and parsed packet fields.
//!
//! XTCE parameter types are statically known ahead of time, but match
//! criteria compare values of whatever type the *referenced* parameter
//! happens to be, and calibrators operate numerically regardless of whether
//! the raw value came from an integer or a float encoding. A small tagged
//! union, rather than generics, keeps that dynamism contained to one place.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "{v:02x?}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl Value {
    /// Best-effort numeric coercion, used by calibrators and numeric
    /// comparisons. Strings are not numerically coercible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Str(_) | Value::Bytes(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Int(v) => Some(*v),
            Value::Float(v) => Some(*v as i64),
            Value::Bool(v) => Some(if *v { 1 } else { 0 }),
            Value::Str(_) | Value::Bytes(_) => None,
        }
    }

    /// Python-style truthiness, used by `BooleanParameterType` when the
    /// underlying encoding isn't numeric.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::UInt(v) => *v != 0,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Bool(v) => *v,
            Value::Str(v) => !v.is_empty(),
            Value::Bytes(v) => !v.is_empty(),
        }
    }

    /// Coerce a literal comparison string to this value's own runtime type,
    /// as XTCE's `Comparison.required_value` coercion does.
    pub fn coerce_like(&self, literal: &str) -> Result<Value> {
        match self {
            Value::UInt(_) => literal
                .parse::<u64>()
                .map(Value::UInt)
                .map_err(|e| Error::Comparison(format!("can't coerce {literal:?} to unsigned: {e}"))),
            Value::Int(_) => literal
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| Error::Comparison(format!("can't coerce {literal:?} to signed: {e}"))),
            Value::Float(_) => literal
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| Error::Comparison(format!("can't coerce {literal:?} to float: {e}"))),
            Value::Bool(_) => match literal {
                "true" | "True" | "1" => Ok(Value::Bool(true)),
                "false" | "False" | "0" => Ok(Value::Bool(false)),
                other => Err(Error::Comparison(format!("can't coerce {other:?} to bool"))),
            },
            Value::Str(_) => Ok(Value::Str(literal.to_string())),
            Value::Bytes(_) => Ok(Value::Bytes(literal.as_bytes().to_vec())),
        }
    }

    /// Ordering for the six comparison operators. Numeric variants compare
    /// numerically (mixed int/float/bool is fine); strings and bytes compare
    /// lexicographically; mismatched non-numeric kinds can't be compared.
    pub fn partial_compare(&self, other: &Value) -> Result<Ordering> {
        if let (Value::Str(a), Value::Str(b)) = (self, other) {
            return Ok(a.cmp(b));
        }
        if let (Value::Bytes(a), Value::Bytes(b)) = (self, other) {
            return Ok(a.cmp(b));
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| Error::Comparison(format!("cannot order {self} and {other} (NaN?)"))),
            _ => Err(Error::Comparison(format!(
                "cannot compare incompatible values {self:?} and {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_python_style() {
        assert!(Value::UInt(1).is_truthy());
        assert!(!Value::UInt(0).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::Bytes(vec![]).is_truthy());
    }

    #[test]
    fn coerce_like_preserves_operand_type() {
        let v = Value::UInt(5).coerce_like("10").unwrap();
        assert_eq!(v, Value::UInt(10));
    }
}
