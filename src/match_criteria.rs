//! Boolean expressions over already-parsed parameter values: comparisons,
//! two-sided conditions, AND/OR trees, and discrete lookups.
//!
//! Semantics are pinned to `comparisons.py` in the original implementation:
//! resolution order for an operand (packet value, else candidate, else
//! error), required-value coercion to the resolved operand's runtime type,
//! and strict declaration-order evaluation of AND/OR trees with no
//! short-circuit surprises beyond the obvious ones.

use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::value::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    pub fn parse(s: &str) -> Result<Operator> {
        match s {
            "==" | "eq" => Ok(Operator::Eq),
            "!=" | "neq" => Ok(Operator::Ne),
            "<" | "lt" | "&lt;" => Ok(Operator::Lt),
            ">" | "gt" | "&gt;" => Ok(Operator::Gt),
            "<=" | "leq" | "&lt;=" => Ok(Operator::Le),
            ">=" | "geq" | "&gt;=" => Ok(Operator::Ge),
            other => Err(Error::Validation(format!("unrecognized operator {other:?}"))),
        }
    }

    fn holds(self, ord: Ordering, eq: bool) -> bool {
        match self {
            Operator::Eq => eq,
            Operator::Ne => !eq,
            Operator::Lt => ord == Ordering::Less,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Le => ord != Ordering::Greater,
            Operator::Ge => ord != Ordering::Less,
        }
    }

    fn apply(self, lhs: &Value, rhs: &Value) -> Result<bool> {
        let eq = lhs == rhs;
        if matches!(self, Operator::Eq | Operator::Ne) {
            return Ok(self.holds(Ordering::Equal, eq));
        }
        let ord = lhs.partial_compare(rhs)?;
        Ok(self.holds(ord, eq))
    }
}

/// Resolve a referenced parameter's value: the packet's calibrated value if
/// `use_calibrated`, else its raw value; falling back to `candidate` (the
/// value currently under consideration, e.g. inside a context calibrator)
/// when the parameter is absent from the packet.
fn resolve_operand(
    packet: &Packet,
    name: &str,
    use_calibrated: bool,
    candidate: Option<&Value>,
) -> Result<Value> {
    if let Some(entry) = packet.get(name) {
        if use_calibrated {
            entry
                .derived_value
                .clone()
                .ok_or_else(|| {
                    Error::Comparison(format!(
                        "comparison against {name} requested the calibrated value but it has none"
                    ))
                })
        } else {
            Ok(entry.raw_value.clone())
        }
    } else if let Some(c) = candidate {
        if use_calibrated {
            tracing::warn!(
                parameter = name,
                "comparison requested useCalibratedValue against a self-referencing \
                 candidate value; this is nonsensical, using the raw candidate instead"
            );
        }
        Ok(c.clone())
    } else {
        Err(Error::Comparison(format!(
            "referenced parameter {name} is not yet present in the packet and no candidate \
             value was supplied"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub referenced_parameter: String,
    pub operator: Operator,
    pub required_value: String,
    pub use_calibrated_value: bool,
}

impl Comparison {
    pub fn evaluate(&self, packet: &Packet, candidate: Option<&Value>) -> Result<bool> {
        let operand = resolve_operand(
            packet,
            &self.referenced_parameter,
            self.use_calibrated_value,
            candidate,
        )?;
        let required = operand.coerce_like(&self.required_value)?;
        self.operator.apply(&operand, &required)
    }
}

#[derive(Debug, Clone)]
pub enum ConditionRhs {
    Param { name: String, use_calibrated: bool },
    Literal(String),
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub left_param: String,
    pub left_use_calibrated: bool,
    pub operator: Operator,
    pub rhs: ConditionRhs,
}

impl Condition {
    pub fn evaluate(&self, packet: &Packet) -> Result<bool> {
        let left = resolve_packet_value(packet, &self.left_param, self.left_use_calibrated)?;
        let right = match &self.rhs {
            ConditionRhs::Param { name, use_calibrated } => {
                resolve_packet_value(packet, name, *use_calibrated)?
            }
            ConditionRhs::Literal(lit) => left.coerce_like(lit)?,
        };
        self.operator.apply(&left, &right)
    }
}

fn resolve_packet_value(packet: &Packet, name: &str, use_calibrated: bool) -> Result<Value> {
    let entry = packet.get(name).ok_or_else(|| {
        Error::Comparison(format!(
            "condition references {name} but it has not been parsed yet"
        ))
    })?;
    if use_calibrated {
        entry.derived_value.clone().ok_or_else(|| {
            Error::Comparison(format!(
                "condition requested the calibrated value of {name} but it has none"
            ))
        })
    } else {
        Ok(entry.raw_value.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Anded {
    pub conditions: Vec<Condition>,
    pub ors: Vec<Ored>,
}

#[derive(Debug, Clone)]
pub struct Ored {
    pub conditions: Vec<Condition>,
    pub ands: Vec<Anded>,
}

#[derive(Debug, Clone)]
pub enum BooleanExpression {
    Condition(Condition),
    Anded(Anded),
    Ored(Ored),
}

impl BooleanExpression {
    pub fn evaluate(&self, packet: &Packet) -> Result<bool> {
        match self {
            BooleanExpression::Condition(c) => c.evaluate(packet),
            BooleanExpression::Anded(a) => eval_and(a, packet),
            BooleanExpression::Ored(o) => eval_or(o, packet),
        }
    }
}

fn eval_and(anded: &Anded, packet: &Packet) -> Result<bool> {
    for c in &anded.conditions {
        if !c.evaluate(packet)? {
            return Ok(false);
        }
    }
    for o in &anded.ors {
        if !eval_or(o, packet)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_or(ored: &Ored, packet: &Packet) -> Result<bool> {
    for c in &ored.conditions {
        if c.evaluate(packet)? {
            return Ok(true);
        }
    }
    for a in &ored.ands {
        if eval_and(a, packet)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// The three kinds of match criteria named in the spec's data model, unified
/// for use as restriction criteria and context-calibrator gates.
#[derive(Debug, Clone)]
pub enum MatchCriteria {
    Comparison(Comparison),
    Condition(Condition),
    BooleanExpression(BooleanExpression),
}

impl MatchCriteria {
    pub fn evaluate(&self, packet: &Packet, candidate: Option<&Value>) -> Result<bool> {
        match self {
            MatchCriteria::Comparison(c) => c.evaluate(packet, candidate),
            MatchCriteria::Condition(c) => c.evaluate(packet),
            MatchCriteria::BooleanExpression(b) => b.evaluate(packet),
        }
    }

    /// All criteria in a list must hold; an empty list vacuously holds.
    pub fn all_hold(criteria: &[MatchCriteria], packet: &Packet, candidate: Option<&Value>) -> Result<bool> {
        for c in criteria {
            if !c.evaluate(packet, candidate)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// `{match_criteria, lookup_value}`: evaluated against a partially-filled
/// packet to resolve a dynamic string/binary length or an enumeration-style
/// lookup. Returns the lookup value only if every criterion holds.
#[derive(Debug, Clone)]
pub struct DiscreteLookup {
    pub match_criteria: Vec<Comparison>,
    pub lookup_value: f64,
}

impl DiscreteLookup {
    pub fn evaluate(&self, packet: &Packet, candidate: Option<&Value>) -> Result<Option<f64>> {
        for c in &self.match_criteria {
            if !c.evaluate(packet, candidate)? {
                return Ok(None);
            }
        }
        Ok(Some(self.lookup_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ParsedValue;

    fn packet_with(name: &str, raw: Value, derived: Option<Value>) -> Packet {
        let mut p = Packet::empty(bytes::Bytes::new());
        p.insert(
            name,
            ParsedValue {
                raw_value: raw,
                derived_value: derived,
                unit: None,
                short_description: None,
                long_description: None,
            },
        );
        p
    }

    #[test]
    fn comparison_uses_calibrated_by_default() {
        let packet = packet_with("APID", Value::UInt(34), Some(Value::UInt(34)));
        let cmp = Comparison {
            referenced_parameter: "APID".into(),
            operator: Operator::Eq,
            required_value: "34".into(),
            use_calibrated_value: true,
        };
        assert!(cmp.evaluate(&packet, None).unwrap());
    }

    #[test]
    fn comparison_falls_back_to_candidate_when_absent() {
        let packet = Packet::empty(bytes::Bytes::new());
        let cmp = Comparison {
            referenced_parameter: "X".into(),
            operator: Operator::Ge,
            required_value: "10".into(),
            use_calibrated_value: false,
        };
        assert!(cmp.evaluate(&packet, Some(&Value::UInt(12))).unwrap());
        assert!(!cmp.evaluate(&packet, Some(&Value::UInt(2))).unwrap());
    }

    #[test]
    fn boolean_expression_and_or_short_circuit_result() {
        let packet = packet_with("A", Value::UInt(1), Some(Value::UInt(1)));
        let cond_true = Condition {
            left_param: "A".into(),
            left_use_calibrated: true,
            operator: Operator::Eq,
            rhs: ConditionRhs::Literal("1".into()),
        };
        let cond_false = Condition {
            left_param: "A".into(),
            left_use_calibrated: true,
            operator: Operator::Eq,
            rhs: ConditionRhs::Literal("2".into()),
        };
        let expr = BooleanExpression::Anded(Anded {
            conditions: vec![cond_true.clone()],
            ors: vec![Ored {
                conditions: vec![cond_false],
                ands: vec![],
            }],
        });
        // true AND (false OR nothing) == false
        assert!(!expr.evaluate(&packet).unwrap());
    }
}
