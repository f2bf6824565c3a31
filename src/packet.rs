//! A decoded packet: raw bytes, primary header, and an insertion-ordered
//! mapping from parameter name to parsed value.
//!
//! The ordered map is a small hand-rolled type (`Vec` plus a name→index
//! index) rather than an external ordered-map crate, in keeping with
//! pcarp's preference for purpose-built internal types over additional
//! dependencies. Later writes to the same name overwrite in place, which is
//! what makes inheritance-chain field redefinition behave correctly.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedValue {
    pub raw_value: Value,
    pub derived_value: Option<Value>,
    pub unit: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
}

/// The seven CCSDS primary-header fields, always the first 48 bits of a
/// packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub version: u8,
    pub packet_type: u8,
    pub sec_hdr_flag: bool,
    pub apid: u16,
    pub seq_flags: u8,
    pub seq_count: u16,
    pub packet_data_length: u16,
}

impl PrimaryHeader {
    /// `PKT_LEN + 7`, per CCSDS: the total size of the packet in bytes.
    pub fn total_size_bytes(&self) -> usize {
        self.packet_data_length as usize + 7
    }
}

#[derive(Debug, Clone, Default)]
struct OrderedValues {
    order: Vec<String>,
    index: HashMap<String, usize>,
    values: Vec<ParsedValue>,
}

impl OrderedValues {
    fn insert(&mut self, name: &str, value: ParsedValue) {
        if let Some(&i) = self.index.get(name) {
            self.values[i] = value;
        } else {
            self.index.insert(name.to_string(), self.values.len());
            self.order.push(name.to_string());
            self.values.push(value);
        }
    }

    fn get(&self, name: &str) -> Option<&ParsedValue> {
        self.index.get(name).map(|&i| &self.values[i])
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &ParsedValue)> {
        self.order.iter().map(move |name| (name.as_str(), self.get(name).unwrap()))
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub raw: Bytes,
    pub header: Option<PrimaryHeader>,
    values: OrderedValues,
}

impl Packet {
    pub fn empty(raw: Bytes) -> Packet {
        Packet {
            raw,
            header: None,
            values: OrderedValues::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParsedValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.get(name).is_some()
    }

    /// Insertion order equals decode order; a second insert under the same
    /// name overwrites in place without moving its position.
    pub fn insert(&mut self, name: &str, value: ParsedValue) {
        self.values.insert(name, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParsedValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.len() == 0
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.header {
            Some(h) => write!(f, "[APID {:>4}, seq {:>5}] ", h.apid, h.seq_count)?,
            None => write!(f, "[no header] ")?,
        }
        let mut first = true;
        for (name, v) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match &v.derived_value {
                Some(d) => write!(f, "{name}={d}")?,
                None => write!(f, "{name}={}", v.raw_value)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_insert_overwrites_without_moving_position() {
        let mut p = Packet::empty(Bytes::new());
        p.insert(
            "A",
            ParsedValue {
                raw_value: Value::UInt(1),
                derived_value: None,
                unit: None,
                short_description: None,
                long_description: None,
            },
        );
        p.insert(
            "B",
            ParsedValue {
                raw_value: Value::UInt(2),
                derived_value: None,
                unit: None,
                short_description: None,
                long_description: None,
            },
        );
        p.insert(
            "A",
            ParsedValue {
                raw_value: Value::UInt(99),
                derived_value: None,
                unit: None,
                short_description: None,
                long_description: None,
            },
        );
        let names: Vec<&str> = p.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(p.get("A").unwrap().raw_value, Value::UInt(99));
    }
}
