//! Semantic wrappers around a [`DataEncoding`]: each variant's `parse_value`
//! produces the `(raw, derived)` pair that becomes a packet's parsed-value
//! record.
//!
//! `Boolean` over a non-numeric encoding is allowed but logged
//! (`tracing::warn!`), matching `BooleanParameterType.__init__`'s warning
//! that XTCE doesn't specify what makes a string truthy; we use Python-style
//! truthiness. `Enumerated` always keys its lookup on the raw value, never
//! the calibrated one, per `EnumeratedParameterType.parse_value`.

use std::collections::HashMap;

use crate::bitcursor::BitCursor;
use crate::data_encoding::DataEncoding;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct TimeEpoch {
    pub epoch: String,
    pub offset_from: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ParameterType {
    Integer {
        encoding: DataEncoding,
        unit: Option<String>,
    },
    Float {
        encoding: DataEncoding,
        unit: Option<String>,
    },
    String {
        encoding: DataEncoding,
        unit: Option<String>,
    },
    Binary {
        encoding: DataEncoding,
        unit: Option<String>,
    },
    Boolean {
        encoding: DataEncoding,
        unit: Option<String>,
    },
    Enumerated {
        encoding: DataEncoding,
        enumeration: HashMap<i64, String>,
        unit: Option<String>,
    },
    AbsoluteTime {
        encoding: DataEncoding,
        unit: Option<String>,
        epoch: TimeEpoch,
    },
    RelativeTime {
        encoding: DataEncoding,
        unit: Option<String>,
        epoch: TimeEpoch,
    },
}

impl ParameterType {
    /// Emits the construction-time warning for a Boolean type built over a
    /// non-numeric encoding. Called once, at definition-build time.
    pub fn validate(&self, name: &str) -> Result<()> {
        if let ParameterType::Boolean { encoding, .. } = self {
            if matches!(encoding, DataEncoding::String(_) | DataEncoding::Binary(_)) {
                tracing::warn!(
                    parameter_type = name,
                    "boolean parameter type built over a string/binary encoding; XTCE doesn't \
                     specify what makes such a value truthy, falling back to Python-style truthiness"
                );
            }
        }
        Ok(())
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            ParameterType::Integer { unit, .. }
            | ParameterType::Float { unit, .. }
            | ParameterType::String { unit, .. }
            | ParameterType::Binary { unit, .. }
            | ParameterType::Boolean { unit, .. }
            | ParameterType::Enumerated { unit, .. }
            | ParameterType::AbsoluteTime { unit, .. }
            | ParameterType::RelativeTime { unit, .. } => unit.as_deref(),
        }
    }

    pub fn parse_value(&self, cursor: &mut BitCursor, packet: &Packet) -> Result<(Value, Option<Value>)> {
        match self {
            ParameterType::Integer { encoding, .. } | ParameterType::Float { encoding, .. } => {
                let (raw, derived) = parse_numeric(encoding, cursor, packet)?;
                Ok((raw, Some(derived)))
            }
            ParameterType::String { encoding, .. } => match encoding {
                DataEncoding::String(s) => {
                    let (raw, derived) = s.parse_value(cursor, packet)?;
                    Ok((raw, Some(derived)))
                }
                _ => Err(Error::Validation("String parameter type requires a StringDataEncoding".into())),
            },
            ParameterType::Binary { encoding, .. } => match encoding {
                DataEncoding::Binary(b) => {
                    let (raw, derived) = b.parse_value(cursor, packet)?;
                    Ok((raw, derived))
                }
                _ => Err(Error::Validation("Binary parameter type requires a BinaryDataEncoding".into())),
            },
            ParameterType::Boolean { encoding, .. } => {
                let raw = read_encoding_raw(encoding, cursor, packet)?;
                let truthy = raw.0.is_truthy();
                Ok((raw.0, Some(Value::Bool(truthy))))
            }
            ParameterType::Enumerated { encoding, enumeration, .. } => {
                let (raw, _derived) = read_encoding_raw(encoding, cursor, packet)?;
                let key = raw.as_i64().ok_or_else(|| {
                    Error::Validation("enumerated parameter type requires a numeric encoding".into())
                })?;
                let label = enumeration
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| Error::Enumeration { raw: key.to_string() })?;
                Ok((raw, Some(Value::Str(label))))
            }
            ParameterType::AbsoluteTime { encoding, .. } | ParameterType::RelativeTime { encoding, .. } => {
                let (raw, derived) = parse_numeric(encoding, cursor, packet)?;
                Ok((raw, Some(derived)))
            }
        }
    }
}

fn parse_numeric(encoding: &DataEncoding, cursor: &mut BitCursor, packet: &Packet) -> Result<(Value, Value)> {
    match encoding {
        DataEncoding::Integer(i) => i.parse_value(cursor, packet),
        DataEncoding::Float(f) => f.parse_value(cursor, packet),
        _ => Err(Error::Validation(
            "Integer/Float/AbsoluteTime/RelativeTime parameter types require a numeric encoding".into(),
        )),
    }
}

/// Boolean/Enumerated read the raw value through whatever concrete encoding
/// is configured, discarding any calibration (Boolean ignores it entirely;
/// Enumerated looks the raw value up directly).
fn read_encoding_raw(encoding: &DataEncoding, cursor: &mut BitCursor, packet: &Packet) -> Result<(Value, Value)> {
    match encoding {
        DataEncoding::Integer(i) => i.parse_value(cursor, packet),
        DataEncoding::Float(f) => f.parse_value(cursor, packet),
        DataEncoding::String(s) => s.parse_value(cursor, packet),
        DataEncoding::Binary(b) => {
            let (raw, _) = b.parse_value(cursor, packet)?;
            Ok((raw.clone(), raw))
        }
    }
}

/// Synthesizes a polynomial calibrator from `scale`/`offset` time attributes,
/// per `TimeParameterType.get_time_unit_linear_scaler`: both → `offset +
/// scale*x`; offset only → `offset + x`; scale only → `scale*x`; neither →
/// no calibrator.
pub fn synthesize_time_calibrator(
    scale: Option<f64>,
    offset: Option<f64>,
) -> Option<crate::calibrator::Calibrator> {
    match (scale, offset) {
        (None, None) => None,
        (Some(s), None) => Some(crate::calibrator::Calibrator::polynomial(vec![(s, 1)])),
        (None, Some(o)) => Some(crate::calibrator::Calibrator::polynomial(vec![(o, 0), (1.0, 1)])),
        (Some(s), Some(o)) => Some(crate::calibrator::Calibrator::polynomial(vec![(o, 0), (s, 1)])),
    }
}
