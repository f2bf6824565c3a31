//! Bit-level codecs: integer, float, string, and binary-blob encodings.
//!
//! Little-endian integer fields are realized by reading `ceil(n/8)` bytes
//! big-endian and byte-reversing before interpretation (`IntegerDataEncoding
//! ._get_raw_value` in the original implementation), so [`crate::bitcursor`]
//! only ever has to support one bit order. MIL-1750A mantissa/exponent are
//! both two's complement with no bias; string termination scans the
//! byte-aligned remainder of the buffer and restores the cursor position
//! before returning, so a failed search leaves nothing consumed.

use crate::bitcursor::BitCursor;
use crate::calibrator::{apply_calibration_chain, Calibrator, ContextCalibrator};
use crate::error::{Error, Result};
use crate::match_criteria::DiscreteLookup;
use crate::packet::Packet;
use crate::value::Value;

/// How the bit-length (or byte-length, for binary) of a field is
/// determined.
#[derive(Debug, Clone)]
pub enum Size {
    Fixed(usize),
    LeadingSize(usize),
    DynamicRef {
        parameter_name: String,
        use_calibrated: bool,
        linear_adjust: Option<LinearAdjust>,
    },
    DiscreteLookup(Vec<DiscreteLookup>),
    /// Strings only: scan for this byte pattern, advance past it.
    Terminated(Vec<u8>),
}

#[derive(Debug, Clone, Copy)]
pub struct LinearAdjust {
    pub slope: i64,
    pub intercept: i64,
}

impl LinearAdjust {
    fn apply(self, x: i64) -> i64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerEncoding {
    Unsigned,
    TwosComplement,
    SignMagnitude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatFamily {
    Ieee754,
    Mil1750A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringCharEncoding {
    UsAscii,
    Iso8859_1,
    Windows1252,
    Utf8,
    Utf16Be,
    Utf16Le,
    Utf32Be,
    Utf32Le,
}

impl StringCharEncoding {
    /// How many bytes a single character occupies in this encoding, used to
    /// validate termination-character length. `None` for variable-width
    /// encodings (none are supported here, so always `Some`).
    fn char_width_bytes(self) -> usize {
        match self {
            StringCharEncoding::UsAscii
            | StringCharEncoding::Iso8859_1
            | StringCharEncoding::Windows1252
            | StringCharEncoding::Utf8 => 1,
            StringCharEncoding::Utf16Be | StringCharEncoding::Utf16Le => 2,
            StringCharEncoding::Utf32Be | StringCharEncoding::Utf32Le => 4,
        }
    }

    fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            StringCharEncoding::UsAscii => {
                if bytes.iter().any(|b| *b >= 0x80) {
                    return Err(Error::Validation("non-ASCII byte in US-ASCII string field".into()));
                }
                Ok(bytes.iter().map(|&b| b as char).collect())
            }
            StringCharEncoding::Iso8859_1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            StringCharEncoding::Windows1252 => {
                let (s, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
                if had_errors {
                    return Err(Error::Validation("invalid Windows-1252 byte sequence".into()));
                }
                Ok(s.into_owned())
            }
            StringCharEncoding::Utf8 => Ok(String::from_utf8(bytes.to_vec())?),
            StringCharEncoding::Utf16Be => decode_utf16(bytes, true),
            StringCharEncoding::Utf16Le => decode_utf16(bytes, false),
            StringCharEncoding::Utf32Be => decode_utf32(bytes, true),
            StringCharEncoding::Utf32Le => decode_utf32(bytes, false),
        }
    }
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Validation("odd byte count for UTF-16 string field".into()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| {
            if big_endian {
                u16::from_be_bytes([c[0], c[1]])
            } else {
                u16::from_le_bytes([c[0], c[1]])
            }
        })
        .collect();
    String::from_utf16(&units).map_err(|_| Error::Validation("invalid UTF-16 sequence".into()))
}

fn decode_utf32(bytes: &[u8], big_endian: bool) -> Result<String> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Validation("byte count not a multiple of 4 for UTF-32 string field".into()));
    }
    bytes
        .chunks_exact(4)
        .map(|c| {
            let u = if big_endian {
                u32::from_be_bytes([c[0], c[1], c[2], c[3]])
            } else {
                u32::from_le_bytes([c[0], c[1], c[2], c[3]])
            };
            char::from_u32(u).ok_or_else(|| Error::Validation(format!("invalid UTF-32 code point {u:#x}")))
        })
        .collect()
}

fn twos_complement(val: u64, bit_width: usize) -> i64 {
    if bit_width == 0 || bit_width > 64 {
        return val as i64;
    }
    if val & (1u64 << (bit_width - 1)) != 0 {
        (val as i64) - (1i64 << bit_width)
    } else {
        val as i64
    }
}

fn read_raw_int(cursor: &mut BitCursor, n: usize, byte_order: ByteOrder) -> Result<u64> {
    if byte_order == ByteOrder::BigEndian {
        return cursor.read_int(n);
    }
    let bytes = cursor.read_bytes(n)?;
    let n_bytes = bytes.len();
    let mut reversed = bytes;
    reversed.reverse();
    let mut value: u64 = 0;
    for b in &reversed {
        value = (value << 8) | u64::from(*b);
    }
    // `read_bytes` left-aligns and zero-pads the final byte when n isn't a
    // multiple of 8; after byte-reversal that padding ends up in the high
    // bits, so shift it back out.
    let pad_bits = n_bytes * 8 - n;
    Ok(value >> pad_bits)
}

#[derive(Debug, Clone)]
pub struct IntegerDataEncoding {
    pub size_in_bits: usize,
    pub byte_order: ByteOrder,
    pub encoding: IntegerEncoding,
    pub default_calibrator: Option<Calibrator>,
    pub context_calibrators: Vec<ContextCalibrator>,
}

impl IntegerDataEncoding {
    pub fn read_raw(&self, cursor: &mut BitCursor) -> Result<Value> {
        let raw = read_raw_int(cursor, self.size_in_bits, self.byte_order)?;
        match self.encoding {
            IntegerEncoding::Unsigned => Ok(Value::UInt(raw)),
            IntegerEncoding::TwosComplement => {
                Ok(Value::Int(twos_complement(raw, self.size_in_bits)))
            }
            IntegerEncoding::SignMagnitude => {
                let sign_bit = 1u64 << (self.size_in_bits - 1);
                if raw & sign_bit != 0 {
                    Ok(Value::Int(-((raw & !sign_bit) as i64)))
                } else {
                    Ok(Value::Int(raw as i64))
                }
            }
        }
    }

    pub fn parse_value(&self, cursor: &mut BitCursor, packet: &Packet) -> Result<(Value, Value)> {
        let raw = self.read_raw(cursor)?;
        let derived = apply_calibration_chain(
            &self.context_calibrators,
            self.default_calibrator.as_ref(),
            &raw,
            packet,
        )?;
        Ok((raw, derived))
    }
}

#[derive(Debug, Clone)]
pub struct FloatDataEncoding {
    pub size_in_bits: usize,
    pub byte_order: ByteOrder,
    pub family: FloatFamily,
    pub default_calibrator: Option<Calibrator>,
    pub context_calibrators: Vec<ContextCalibrator>,
}

impl FloatDataEncoding {
    pub fn read_raw(&self, cursor: &mut BitCursor) -> Result<f64> {
        let mut bytes = cursor.read_bytes(self.size_in_bits)?;
        if self.byte_order == ByteOrder::LittleEndian {
            bytes.reverse();
        }
        match self.family {
            FloatFamily::Ieee754 => match self.size_in_bits {
                16 => {
                    let bits = u16::from_be_bytes([bytes[0], bytes[1]]);
                    Ok(half_to_f64(bits))
                }
                32 => {
                    let bits = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    Ok(f32::from_bits(bits) as f64)
                }
                64 => {
                    let mut a = [0u8; 8];
                    a.copy_from_slice(&bytes[..8]);
                    Ok(f64::from_bits(u64::from_be_bytes(a)))
                }
                other => Err(Error::NotImplemented(format!(
                    "IEEE-754 float size {other} bits is not supported (must be 16, 32, or 64)"
                ))),
            },
            FloatFamily::Mil1750A => {
                let as_int = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                let exponent_raw = as_int & 0xFF;
                let mantissa_raw = (as_int >> 8) & 0x00FF_FFFF;
                let exponent = twos_complement(exponent_raw as u64, 8);
                let mantissa = twos_complement(mantissa_raw as u64, 24);
                Ok(mantissa as f64 * 2f64.powi((exponent - 23) as i32))
            }
        }
    }

    pub fn parse_value(&self, cursor: &mut BitCursor, packet: &Packet) -> Result<(Value, Value)> {
        let raw = Value::Float(self.read_raw(cursor)?);
        let derived = apply_calibration_chain(
            &self.context_calibrators,
            self.default_calibrator.as_ref(),
            &raw,
            packet,
        )?;
        Ok((raw, derived))
    }
}

/// Minimal IEEE-754 half-precision to double conversion; no half-float
/// crate is part of this stack, and the bit math is small and self-
/// contained.
fn half_to_f64(bits: u16) -> f64 {
    let sign = (bits >> 15) & 1;
    let exponent = (bits >> 10) & 0x1F;
    let fraction = bits & 0x3FF;
    let sign_mul = if sign == 1 { -1.0 } else { 1.0 };
    if exponent == 0 {
        sign_mul * (fraction as f64) * 2f64.powi(-24)
    } else if exponent == 0x1F {
        if fraction == 0 {
            sign_mul * f64::INFINITY
        } else {
            f64::NAN
        }
    } else {
        sign_mul * (1.0 + fraction as f64 / 1024.0) * 2f64.powi(exponent as i32 - 15)
    }
}

#[derive(Debug, Clone)]
pub struct StringDataEncoding {
    pub char_encoding: StringCharEncoding,
    pub size: Size,
}

impl StringDataEncoding {
    pub fn validate(&self) -> Result<()> {
        if let Size::Terminated(pattern) = &self.size {
            let width = self.char_encoding.char_width_bytes();
            if pattern.len() != width {
                return Err(Error::Validation(format!(
                    "termination pattern is {} bytes but {:?} characters are {} bytes wide",
                    pattern.len(),
                    self.char_encoding,
                    width
                )));
            }
            if self.char_encoding.decode(pattern)?.chars().count() != 1 {
                return Err(Error::Validation(
                    "termination pattern must decode to exactly one character".into(),
                ));
            }
        }
        Ok(())
    }

    fn size_bits(&self, cursor: &mut BitCursor, packet: &Packet) -> Result<usize> {
        let bits = match &self.size {
            Size::Fixed(n) => *n,
            Size::LeadingSize(len_field_bits) => {
                let n = cursor.read_int(*len_field_bits)? as usize;
                if n % 8 != 0 {
                    tracing::warn!(bits = n, "string length in bits is not a multiple of 8");
                }
                return Ok(n);
            }
            Size::DiscreteLookup(lookups) => {
                let mut found = None;
                for l in lookups {
                    if let Some(v) = l.evaluate(packet, None)? {
                        found = Some(v as usize);
                        break;
                    }
                }
                found.ok_or_else(|| {
                    Error::Validation("no discrete lookup entry matched for string length".into())
                })?
            }
            Size::DynamicRef {
                parameter_name,
                use_calibrated,
                linear_adjust,
            } => {
                let entry = packet.get(parameter_name).ok_or_else(|| {
                    Error::Validation(format!("dynamic length reference {parameter_name} not yet parsed"))
                })?;
                let v = if *use_calibrated {
                    entry.derived_value.as_ref().unwrap_or(&entry.raw_value)
                } else {
                    &entry.raw_value
                };
                let mut n = v.as_i64().ok_or_else(|| {
                    Error::Validation(format!("dynamic length reference {parameter_name} is not numeric"))
                })?;
                if let Some(adj) = linear_adjust {
                    n = adj.apply(n);
                }
                return Ok(n as usize);
            }
            Size::Terminated(pattern) => {
                let start = cursor.pos();
                let remaining = cursor.remaining_bits();
                let aligned_bits = remaining - remaining % 8;
                let lookahead = cursor.read_bytes(aligned_bits)?;
                cursor.set_pos(start);
                let idx = find_subslice(&lookahead, pattern).ok_or_else(|| {
                    Error::Truncation
                })?;
                return Ok(idx * 8);
            }
        };
        // Linear adjuster never applies to termination-based sizing; that
        // case already returned above.
        Ok(bits)
    }

    pub fn parse_value(&self, cursor: &mut BitCursor, packet: &Packet) -> Result<(Value, Value)> {
        let bits = self.size_bits(cursor, packet)?;
        let bytes = cursor.read_bytes(bits)?;
        if let Size::Terminated(pattern) = &self.size {
            cursor.read_bytes(pattern.len() * 8)?;
        }
        let s = self.char_encoding.decode(&bytes)?;
        Ok((Value::Str(s.clone()), Value::Str(s)))
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[derive(Debug, Clone)]
pub struct BinaryDataEncoding {
    pub size: Size,
    pub word_size_bits: Option<usize>,
}

impl BinaryDataEncoding {
    fn size_bits(&self, packet: &Packet) -> Result<usize> {
        match &self.size {
            Size::Fixed(n) => Ok(*n),
            Size::LeadingSize(_) | Size::Terminated(_) => Err(Error::NotImplemented(
                "binary fields don't support leading-length or termination sizing".into(),
            )),
            Size::DiscreteLookup(lookups) => {
                for l in lookups {
                    if let Some(v) = l.evaluate(packet, None)? {
                        return Ok(v as usize);
                    }
                }
                Err(Error::Validation("no discrete lookup entry matched for binary length".into()))
            }
            Size::DynamicRef {
                parameter_name,
                use_calibrated,
                linear_adjust,
            } => {
                let entry = packet.get(parameter_name).ok_or_else(|| {
                    Error::Validation(format!("dynamic length reference {parameter_name} not yet parsed"))
                })?;
                let v = if *use_calibrated {
                    entry.derived_value.as_ref().unwrap_or(&entry.raw_value)
                } else {
                    &entry.raw_value
                };
                let mut n = v.as_i64().ok_or_else(|| {
                    Error::Validation(format!("dynamic length reference {parameter_name} is not numeric"))
                })?;
                if let Some(adj) = linear_adjust {
                    n = adj.apply(n);
                }
                Ok(n as usize)
            }
        }
    }

    pub fn parse_value(&self, cursor: &mut BitCursor, packet: &Packet) -> Result<(Value, Option<Value>)> {
        let bits = self.size_bits(packet)?;
        let bytes = cursor.read_bytes(bits)?;
        if let Some(word_size) = self.word_size_bits {
            cursor.align_to(word_size);
        }
        Ok((Value::Bytes(bytes), None))
    }
}

#[derive(Debug, Clone)]
pub enum DataEncoding {
    Integer(IntegerDataEncoding),
    Float(FloatDataEncoding),
    String(StringDataEncoding),
    Binary(BinaryDataEncoding),
}
