//! Definition loading and serialization.
//!
//! `DefinitionSource` is the pluggable seam; `XtceXml` is the one shipped
//! implementation, a compact subset of the XTCE XML dialect covering every
//! construct named in the object model (§3) and nothing else — it is not a
//! validating XTCE-schema reader, and round-trips through `roxmltree` for
//! parsing and hand-written string assembly for serialization, the same
//! split pcarp draws between a parsing crate and its own block formatting.

use std::collections::HashMap;
use std::io::{Read, Write};

use roxmltree::{Document, Node};

use crate::calibrator::{Calibrator, ContextCalibrator, SplineOrder, SplinePoint};
use crate::container::{ContainerEntry, SequenceContainer};
use crate::data_encoding::{
    BinaryDataEncoding, ByteOrder, DataEncoding, FloatDataEncoding, FloatFamily,
    IntegerDataEncoding, IntegerEncoding, LinearAdjust, Size, StringCharEncoding,
    StringDataEncoding,
};
use crate::definition::PacketDefinition;
use crate::error::{Error, Result};
use crate::match_criteria::{Anded, BooleanExpression, Comparison, Condition, ConditionRhs, DiscreteLookup, MatchCriteria, Operator, Ored};
use crate::parameter::Parameter;
use crate::parameter_type::{ParameterType, TimeEpoch};

/// Loads and serializes a [`PacketDefinition`] to some concrete on-disk
/// format. Distinct from the bit-level decoder: a `DefinitionSource`
/// produces the definition a decode walk is driven by, not a decoded packet.
pub trait DefinitionSource {
    fn load(&self, reader: &mut dyn Read) -> Result<PacketDefinition>;
    fn write(&self, def: &PacketDefinition, writer: &mut dyn Write) -> Result<()>;
}

/// The compact XTCE XML subset this crate round-trips. Element and
/// attribute names track real XTCE vocabulary (`ANDedConditions`,
/// `ORedConditions`, `RestrictionCriteria`, ...) where XTCE already has a
/// name for the concept, and invent plain ones elsewhere.
pub struct XtceXml;

impl DefinitionSource for XtceXml {
    fn load(&self, reader: &mut dyn Read) -> Result<PacketDefinition> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let doc = Document::parse(&text)
            .map_err(|e| Error::Validation(format!("malformed XTCE XML: {e}")))?;
        let root = doc.root_element();
        if root.tag_name().name() != "PacketDefinition" {
            return Err(Error::Validation(
                "expected root element <PacketDefinition>".to_string(),
            ));
        }
        let root_container_name = attr(root, "rootContainer")?.to_string();
        let mut def = PacketDefinition::new(root_container_name);

        if let Some(pt_set) = child(root, "ParameterTypeSet") {
            for node in elements(pt_set, "ParameterType") {
                let (name, pt) = parse_parameter_type(node)?;
                def.parameter_types.insert(name, pt);
            }
        }
        if let Some(p_set) = child(root, "ParameterSet") {
            for node in elements(p_set, "Parameter") {
                let param = parse_parameter(node)?;
                def.parameters.insert(param.name.clone(), param);
            }
        }
        if let Some(c_set) = child(root, "ContainerSet") {
            for node in elements(c_set, "SequenceContainer") {
                let container = parse_container(node)?;
                def.note_container_declared(&container.name);
                def.containers.insert(container.name.clone(), container);
            }
        }

        def.finalize()?;
        Ok(def)
    }

    fn write(&self, def: &PacketDefinition, writer: &mut dyn Write) -> Result<()> {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!(
            "<PacketDefinition rootContainer=\"{}\">\n",
            esc(&def.root_container_name)
        ));

        // Sorted by name so serialization is byte-for-byte deterministic
        // regardless of the backing HashMaps' (randomized) iteration order —
        // required for the definition round-trip to reproduce its own bytes.
        out.push_str("  <ParameterTypeSet>\n");
        let mut parameter_types: Vec<(&String, &ParameterType)> = def.parameter_types.iter().collect();
        parameter_types.sort_by_key(|(name, _)| name.as_str());
        for (name, pt) in parameter_types {
            write_parameter_type(&mut out, name, pt);
        }
        out.push_str("  </ParameterTypeSet>\n");

        out.push_str("  <ParameterSet>\n");
        let mut parameters: Vec<&Parameter> = def.parameters.values().collect();
        parameters.sort_by_key(|p| p.name.as_str());
        for param in parameters {
            write_parameter(&mut out, param);
        }
        out.push_str("  </ParameterSet>\n");

        out.push_str("  <ContainerSet>\n");
        let mut containers: Vec<&SequenceContainer> = def.containers.values().collect();
        containers.sort_by_key(|c| c.name.as_str());
        for container in containers {
            write_container(&mut out, container);
        }
        out.push_str("  </ContainerSet>\n");

        out.push_str("</PacketDefinition>\n");
        writer.write_all(out.as_bytes())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// roxmltree helpers
// ---------------------------------------------------------------------

fn attr<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<&'input str> {
    node.attribute(name).ok_or_else(|| {
        Error::Validation(format!(
            "<{}> missing required attribute {name}",
            node.tag_name().name()
        ))
    })
}

fn attr_opt<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<&'input str> {
    node.attribute(name)
}

fn child<'a, 'b>(node: Node<'a, 'b>, tag: &str) -> Option<Node<'a, 'b>> {
    node.children().find(|c| c.is_element() && c.tag_name().name() == tag)
}

fn elements<'a, 'b>(node: Node<'a, 'b>, tag: &'b str) -> impl Iterator<Item = Node<'a, 'b>> {
    node.children().filter(move |c| c.is_element() && c.tag_name().name() == tag)
}

fn parse_usize(node: Node<'_, '_>, name: &str) -> Result<usize> {
    attr(node, name)?
        .parse::<usize>()
        .map_err(|_| Error::Validation(format!("{name} must be an integer")))
}

fn parse_bool(node: Node<'_, '_>, name: &str, default: bool) -> Result<bool> {
    match attr_opt(node, name) {
        None => Ok(default),
        Some(s) => match s {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(Error::Validation(format!("{name}: expected true/false, got {other}"))),
        },
    }
}

fn esc(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn hex_decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(Error::Validation("hex pattern must have even length".to_string()));
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = hex_digit(chunk[0])?;
        let lo = hex_digit(chunk[1])?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Result<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(Error::Validation("invalid hex digit in termination pattern".to_string())),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

// ---------------------------------------------------------------------
// Operator <-> string
// ---------------------------------------------------------------------

fn operator_to_str(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "==",
        Operator::Ne => "!=",
        Operator::Lt => "<",
        Operator::Gt => ">",
        Operator::Le => "<=",
        Operator::Ge => ">=",
    }
}

// ---------------------------------------------------------------------
// Match criteria
// ---------------------------------------------------------------------

fn parse_comparison(node: Node<'_, '_>) -> Result<Comparison> {
    Ok(Comparison {
        referenced_parameter: attr(node, "parameter")?.to_string(),
        operator: Operator::parse(attr(node, "operator")?)?,
        required_value: attr(node, "value")?.to_string(),
        use_calibrated_value: parse_bool(node, "calibrated", true)?,
    })
}

fn write_comparison(out: &mut String, indent: &str, c: &Comparison) {
    out.push_str(&format!(
        "{indent}<Comparison parameter=\"{}\" operator=\"{}\" value=\"{}\" calibrated=\"{}\"/>\n",
        esc(&c.referenced_parameter),
        operator_to_str(c.operator),
        esc(&c.required_value),
        c.use_calibrated_value
    ));
}

fn parse_condition(node: Node<'_, '_>) -> Result<Condition> {
    let rhs = match attr_opt(node, "rightParameter") {
        Some(name) => ConditionRhs::Param {
            name: name.to_string(),
            use_calibrated: parse_bool(node, "rightCalibrated", true)?,
        },
        None => ConditionRhs::Literal(attr(node, "rightValue")?.to_string()),
    };
    Ok(Condition {
        left_param: attr(node, "leftParameter")?.to_string(),
        left_use_calibrated: parse_bool(node, "leftCalibrated", true)?,
        operator: Operator::parse(attr(node, "operator")?)?,
        rhs,
    })
}

fn write_condition(out: &mut String, indent: &str, c: &Condition) {
    let rhs_attrs = match &c.rhs {
        ConditionRhs::Param { name, use_calibrated } => {
            format!("rightParameter=\"{}\" rightCalibrated=\"{}\"", esc(name), use_calibrated)
        }
        ConditionRhs::Literal(v) => format!("rightValue=\"{}\"", esc(v)),
    };
    out.push_str(&format!(
        "{indent}<Condition leftParameter=\"{}\" leftCalibrated=\"{}\" operator=\"{}\" {rhs_attrs}/>\n",
        esc(&c.left_param),
        c.left_use_calibrated,
        operator_to_str(c.operator),
    ));
}

fn parse_boolean_children(node: Node<'_, '_>) -> Result<(Vec<Condition>, Vec<Anded>, Vec<Ored>)> {
    let mut conditions = Vec::new();
    let mut ands = Vec::new();
    let mut ors = Vec::new();
    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "Condition" => conditions.push(parse_condition(child)?),
            "ANDedConditions" => ands.push(parse_anded(child)?),
            "ORedConditions" => ors.push(parse_ored(child)?),
            other => {
                return Err(Error::Validation(format!(
                    "unexpected element <{other}> inside boolean expression"
                )))
            }
        }
    }
    Ok((conditions, ands, ors))
}

fn parse_anded(node: Node<'_, '_>) -> Result<Anded> {
    let (conditions, _ands, ors) = parse_boolean_children(node)?;
    Ok(Anded { conditions, ors })
}

fn parse_ored(node: Node<'_, '_>) -> Result<Ored> {
    let (conditions, ands, _ors) = parse_boolean_children(node)?;
    Ok(Ored { conditions, ands })
}

fn write_anded(out: &mut String, indent: &str, a: &Anded) {
    out.push_str(&format!("{indent}<ANDedConditions>\n"));
    let inner = format!("{indent}  ");
    for c in &a.conditions {
        write_condition(out, &inner, c);
    }
    for o in &a.ors {
        write_ored(out, &inner, o);
    }
    out.push_str(&format!("{indent}</ANDedConditions>\n"));
}

fn write_ored(out: &mut String, indent: &str, o: &Ored) {
    out.push_str(&format!("{indent}<ORedConditions>\n"));
    let inner = format!("{indent}  ");
    for c in &o.conditions {
        write_condition(out, &inner, c);
    }
    for a in &o.ands {
        write_anded(out, &inner, a);
    }
    out.push_str(&format!("{indent}</ORedConditions>\n"));
}

/// Parses one `MatchCriteria` list: each top-level child of `node` (however
/// it's named by the caller) becomes one entry.
fn parse_match_criteria_list(node: Node<'_, '_>) -> Result<Vec<MatchCriteria>> {
    let mut out = Vec::new();
    for child in node.children().filter(|c| c.is_element()) {
        let mc = match child.tag_name().name() {
            "Comparison" => MatchCriteria::Comparison(parse_comparison(child)?),
            "Condition" => MatchCriteria::Condition(parse_condition(child)?),
            "ANDedConditions" => {
                MatchCriteria::BooleanExpression(BooleanExpression::Anded(parse_anded(child)?))
            }
            "ORedConditions" => {
                MatchCriteria::BooleanExpression(BooleanExpression::Ored(parse_ored(child)?))
            }
            other => {
                return Err(Error::Validation(format!(
                    "unexpected element <{other}> inside match criteria list"
                )))
            }
        };
        out.push(mc);
    }
    Ok(out)
}

fn write_match_criteria_list(out: &mut String, indent: &str, list: &[MatchCriteria]) {
    for mc in list {
        match mc {
            MatchCriteria::Comparison(c) => write_comparison(out, indent, c),
            MatchCriteria::Condition(c) => write_condition(out, indent, c),
            MatchCriteria::BooleanExpression(BooleanExpression::Condition(c)) => {
                write_condition(out, indent, c)
            }
            MatchCriteria::BooleanExpression(BooleanExpression::Anded(a)) => {
                write_anded(out, indent, a)
            }
            MatchCriteria::BooleanExpression(BooleanExpression::Ored(o)) => {
                write_ored(out, indent, o)
            }
        }
    }
}

fn parse_discrete_lookup(node: Node<'_, '_>) -> Result<Vec<DiscreteLookup>> {
    let mut out = Vec::new();
    for lookup in elements(node, "Lookup") {
        let lookup_value = attr(lookup, "value")?
            .parse::<f64>()
            .map_err(|_| Error::Validation("Lookup value must be numeric".to_string()))?;
        let mut match_criteria = Vec::new();
        for cmp in elements(lookup, "Comparison") {
            match_criteria.push(parse_comparison(cmp)?);
        }
        out.push(DiscreteLookup { match_criteria, lookup_value });
    }
    Ok(out)
}

fn write_discrete_lookup(out: &mut String, indent: &str, lookups: &[DiscreteLookup]) {
    out.push_str(&format!("{indent}<DiscreteLookup>\n"));
    let inner = format!("{indent}  ");
    for l in lookups {
        out.push_str(&format!("{inner}<Lookup value=\"{}\">\n", l.lookup_value));
        for c in &l.match_criteria {
            write_comparison(out, &format!("{inner}  "), c);
        }
        out.push_str(&format!("{inner}</Lookup>\n"));
    }
    out.push_str(&format!("{indent}</DiscreteLookup>\n"));
}

// ---------------------------------------------------------------------
// Calibrators
// ---------------------------------------------------------------------

fn parse_calibrator(node: Node<'_, '_>) -> Result<Calibrator> {
    match node.tag_name().name() {
        "Polynomial" => {
            let mut terms = Vec::new();
            for term in elements(node, "Term") {
                let coefficient = attr(term, "coefficient")?
                    .parse::<f64>()
                    .map_err(|_| Error::Validation("Term coefficient must be numeric".to_string()))?;
                let exponent = attr(term, "exponent")?
                    .parse::<i32>()
                    .map_err(|_| Error::Validation("Term exponent must be an integer".to_string()))?;
                terms.push((coefficient, exponent));
            }
            Ok(Calibrator::polynomial(terms))
        }
        "Spline" => {
            // "second"/"third" are recognized XTCE order names but map to an
            // order > 1, which this calibrator doesn't implement — distinct
            // from a genuinely unrecognized order string.
            let order = match attr(node, "order")? {
                "zero" => SplineOrder::Zero,
                "first" => SplineOrder::First,
                "second" | "third" => {
                    return Err(Error::NotImplemented(
                        "spline calibrator orders above first are not supported".to_string(),
                    ))
                }
                other => {
                    return Err(Error::Validation(format!("unknown spline order {other}")))
                }
            };
            let extrapolate = parse_bool(node, "extrapolate", false)?;
            let mut points = Vec::new();
            for point in elements(node, "Point") {
                let raw = attr(point, "raw")?
                    .parse::<f64>()
                    .map_err(|_| Error::Validation("Point raw must be numeric".to_string()))?;
                let calibrated = attr(point, "calibrated")?
                    .parse::<f64>()
                    .map_err(|_| Error::Validation("Point calibrated must be numeric".to_string()))?;
                points.push(SplinePoint { raw, calibrated });
            }
            Ok(Calibrator::spline(points, order, extrapolate))
        }
        other => Err(Error::Validation(format!("unknown calibrator kind <{other}>"))),
    }
}

fn write_calibrator(out: &mut String, indent: &str, cal: &Calibrator) {
    match cal {
        Calibrator::Polynomial { terms } => {
            out.push_str(&format!("{indent}<Polynomial>\n"));
            for (coefficient, exponent) in terms {
                out.push_str(&format!(
                    "{indent}  <Term coefficient=\"{coefficient}\" exponent=\"{exponent}\"/>\n"
                ));
            }
            out.push_str(&format!("{indent}</Polynomial>\n"));
        }
        Calibrator::Spline { points, order, extrapolate } => {
            let order_str = match order {
                SplineOrder::Zero => "zero",
                SplineOrder::First => "first",
            };
            out.push_str(&format!(
                "{indent}<Spline order=\"{order_str}\" extrapolate=\"{extrapolate}\">\n"
            ));
            for p in points {
                out.push_str(&format!(
                    "{indent}  <Point raw=\"{}\" calibrated=\"{}\"/>\n",
                    p.raw, p.calibrated
                ));
            }
            out.push_str(&format!("{indent}</Spline>\n"));
        }
    }
}

fn parse_default_calibrator(node: Node<'_, '_>) -> Result<Option<Calibrator>> {
    match child(node, "DefaultCalibrator") {
        None => Ok(None),
        Some(wrapper) => {
            let inner = wrapper
                .children()
                .find(|c| c.is_element())
                .ok_or_else(|| Error::Validation("empty <DefaultCalibrator>".to_string()))?;
            Ok(Some(parse_calibrator(inner)?))
        }
    }
}

fn parse_context_calibrators(node: Node<'_, '_>) -> Result<Vec<ContextCalibrator>> {
    let mut out = Vec::new();
    for cc in elements(node, "ContextCalibrator") {
        let criteria_node = child(cc, "MatchCriteria")
            .ok_or_else(|| Error::Validation("<ContextCalibrator> missing <MatchCriteria>".to_string()))?;
        let match_criteria = parse_match_criteria_list(criteria_node)?;
        let calibrator_wrapper = child(cc, "Calibrator")
            .ok_or_else(|| Error::Validation("<ContextCalibrator> missing <Calibrator>".to_string()))?;
        let inner = calibrator_wrapper
            .children()
            .find(|c| c.is_element())
            .ok_or_else(|| Error::Validation("empty <Calibrator>".to_string()))?;
        let calibrator = parse_calibrator(inner)?;
        out.push(ContextCalibrator { match_criteria, calibrator });
    }
    Ok(out)
}

fn write_calibrators(out: &mut String, indent: &str, default: &Option<Calibrator>, context: &[ContextCalibrator]) {
    if let Some(cal) = default {
        out.push_str(&format!("{indent}<DefaultCalibrator>\n"));
        write_calibrator(out, &format!("{indent}  "), cal);
        out.push_str(&format!("{indent}</DefaultCalibrator>\n"));
    }
    for cc in context {
        out.push_str(&format!("{indent}<ContextCalibrator>\n"));
        let inner = format!("{indent}  ");
        out.push_str(&format!("{inner}<MatchCriteria>\n"));
        write_match_criteria_list(out, &format!("{inner}  "), &cc.match_criteria);
        out.push_str(&format!("{inner}</MatchCriteria>\n"));
        out.push_str(&format!("{inner}<Calibrator>\n"));
        write_calibrator(out, &format!("{inner}  "), &cc.calibrator);
        out.push_str(&format!("{inner}</Calibrator>\n"));
        out.push_str(&format!("{indent}</ContextCalibrator>\n"));
    }
}

// ---------------------------------------------------------------------
// Size
// ---------------------------------------------------------------------

fn parse_size(node: Node<'_, '_>) -> Result<Size> {
    let size_node = child(node, "Size")
        .ok_or_else(|| Error::Validation("encoding missing <Size>".to_string()))?;
    let inner = size_node
        .children()
        .find(|c| c.is_element())
        .ok_or_else(|| Error::Validation("empty <Size>".to_string()))?;
    match inner.tag_name().name() {
        "Fixed" => Ok(Size::Fixed(parse_usize(inner, "bits")?)),
        "LeadingSize" => Ok(Size::LeadingSize(parse_usize(inner, "bits")?)),
        "DynamicRef" => {
            let linear_adjust = match (attr_opt(inner, "slope"), attr_opt(inner, "intercept")) {
                (None, None) => None,
                _ => Some(LinearAdjust {
                    slope: attr_opt(inner, "slope").unwrap_or("1").parse::<i64>().map_err(|_| {
                        Error::Validation("DynamicRef slope must be an integer".to_string())
                    })?,
                    intercept: attr_opt(inner, "intercept").unwrap_or("0").parse::<i64>().map_err(
                        |_| Error::Validation("DynamicRef intercept must be an integer".to_string()),
                    )?,
                }),
            };
            Ok(Size::DynamicRef {
                parameter_name: attr(inner, "parameter")?.to_string(),
                use_calibrated: parse_bool(inner, "calibrated", true)?,
                linear_adjust,
            })
        }
        "Terminated" => Ok(Size::Terminated(hex_decode(attr(inner, "pattern")?)?)),
        "DiscreteLookup" => Ok(Size::DiscreteLookup(parse_discrete_lookup(inner)?)),
        other => Err(Error::Validation(format!("unknown size kind <{other}>"))),
    }
}

fn write_size(out: &mut String, indent: &str, size: &Size) {
    out.push_str(&format!("{indent}<Size>\n"));
    let inner = format!("{indent}  ");
    match size {
        Size::Fixed(bits) => out.push_str(&format!("{inner}<Fixed bits=\"{bits}\"/>\n")),
        Size::LeadingSize(bits) => out.push_str(&format!("{inner}<LeadingSize bits=\"{bits}\"/>\n")),
        Size::DynamicRef { parameter_name, use_calibrated, linear_adjust } => {
            let adjust = match linear_adjust {
                Some(a) => format!(" slope=\"{}\" intercept=\"{}\"", a.slope, a.intercept),
                None => String::new(),
            };
            out.push_str(&format!(
                "{inner}<DynamicRef parameter=\"{}\" calibrated=\"{use_calibrated}\"{adjust}/>\n",
                esc(parameter_name)
            ));
        }
        Size::Terminated(pattern) => {
            out.push_str(&format!("{inner}<Terminated pattern=\"{}\"/>\n", hex_encode(pattern)))
        }
        Size::DiscreteLookup(lookups) => write_discrete_lookup(out, &inner, lookups),
    }
    out.push_str(&format!("{indent}</Size>\n"));
}

// ---------------------------------------------------------------------
// Data encodings
// ---------------------------------------------------------------------

fn parse_byte_order(node: Node<'_, '_>) -> Result<ByteOrder> {
    match attr_opt(node, "byteOrder").unwrap_or("big") {
        "big" => Ok(ByteOrder::BigEndian),
        "little" => Ok(ByteOrder::LittleEndian),
        other => Err(Error::Validation(format!("unknown byteOrder {other}"))),
    }
}

fn parse_data_encoding(node: Node<'_, '_>) -> Result<DataEncoding> {
    let encoding_node =
        child(node, "Encoding").ok_or_else(|| Error::Validation("parameter type missing <Encoding>".to_string()))?;
    match attr(encoding_node, "kind")? {
        "Integer" => {
            let encoding = match attr_opt(encoding_node, "encoding").unwrap_or("unsigned") {
                "unsigned" => IntegerEncoding::Unsigned,
                "twosComplement" => IntegerEncoding::TwosComplement,
                // Unofficial but widely-used alias for twosComplement.
                "signed" => IntegerEncoding::TwosComplement,
                "signMagnitude" => IntegerEncoding::SignMagnitude,
                other => return Err(Error::Validation(format!("unknown integer encoding {other}"))),
            };
            Ok(DataEncoding::Integer(IntegerDataEncoding {
                size_in_bits: parse_usize(encoding_node, "sizeInBits")?,
                byte_order: parse_byte_order(encoding_node)?,
                encoding,
                default_calibrator: parse_default_calibrator(encoding_node)?,
                context_calibrators: parse_context_calibrators(encoding_node)?,
            }))
        }
        "Float" => {
            let family = match attr_opt(encoding_node, "family").unwrap_or("IEEE754") {
                "IEEE754" => FloatFamily::Ieee754,
                "MIL1750A" => FloatFamily::Mil1750A,
                other => return Err(Error::Validation(format!("unknown float family {other}"))),
            };
            Ok(DataEncoding::Float(FloatDataEncoding {
                size_in_bits: parse_usize(encoding_node, "sizeInBits")?,
                byte_order: parse_byte_order(encoding_node)?,
                family,
                default_calibrator: parse_default_calibrator(encoding_node)?,
                context_calibrators: parse_context_calibrators(encoding_node)?,
            }))
        }
        "String" => {
            let char_encoding = match attr_opt(encoding_node, "charEncoding").unwrap_or("UTF-8") {
                "US-ASCII" => StringCharEncoding::UsAscii,
                "ISO-8859-1" => StringCharEncoding::Iso8859_1,
                "Windows-1252" => StringCharEncoding::Windows1252,
                "UTF-8" => StringCharEncoding::Utf8,
                "UTF-16BE" => StringCharEncoding::Utf16Be,
                "UTF-16LE" => StringCharEncoding::Utf16Le,
                "UTF-32BE" => StringCharEncoding::Utf32Be,
                "UTF-32LE" => StringCharEncoding::Utf32Le,
                other => return Err(Error::Validation(format!("unknown char encoding {other}"))),
            };
            let size = parse_size(encoding_node)?;
            let enc = StringDataEncoding { char_encoding, size };
            enc.validate()?;
            Ok(DataEncoding::String(enc))
        }
        "Binary" => {
            let word_size_bits = match attr_opt(encoding_node, "wordSizeBits") {
                None => None,
                Some(s) => Some(
                    s.parse::<usize>()
                        .map_err(|_| Error::Validation("wordSizeBits must be an integer".to_string()))?,
                ),
            };
            Ok(DataEncoding::Binary(BinaryDataEncoding {
                size: parse_size(encoding_node)?,
                word_size_bits,
            }))
        }
        other => Err(Error::Validation(format!("unknown encoding kind {other}"))),
    }
}

fn write_data_encoding(out: &mut String, indent: &str, enc: &DataEncoding) {
    match enc {
        DataEncoding::Integer(i) => {
            let byte_order = match i.byte_order {
                ByteOrder::BigEndian => "big",
                ByteOrder::LittleEndian => "little",
            };
            let encoding = match i.encoding {
                IntegerEncoding::Unsigned => "unsigned",
                IntegerEncoding::TwosComplement => "twosComplement",
                IntegerEncoding::SignMagnitude => "signMagnitude",
            };
            out.push_str(&format!(
                "{indent}<Encoding kind=\"Integer\" sizeInBits=\"{}\" byteOrder=\"{byte_order}\" encoding=\"{encoding}\">\n",
                i.size_in_bits
            ));
            write_calibrators(out, &format!("{indent}  "), &i.default_calibrator, &i.context_calibrators);
            out.push_str(&format!("{indent}</Encoding>\n"));
        }
        DataEncoding::Float(fl) => {
            let byte_order = match fl.byte_order {
                ByteOrder::BigEndian => "big",
                ByteOrder::LittleEndian => "little",
            };
            let family = match fl.family {
                FloatFamily::Ieee754 => "IEEE754",
                FloatFamily::Mil1750A => "MIL1750A",
            };
            out.push_str(&format!(
                "{indent}<Encoding kind=\"Float\" sizeInBits=\"{}\" byteOrder=\"{byte_order}\" family=\"{family}\">\n",
                fl.size_in_bits
            ));
            write_calibrators(out, &format!("{indent}  "), &fl.default_calibrator, &fl.context_calibrators);
            out.push_str(&format!("{indent}</Encoding>\n"));
        }
        DataEncoding::String(s) => {
            let char_encoding = match s.char_encoding {
                StringCharEncoding::UsAscii => "US-ASCII",
                StringCharEncoding::Iso8859_1 => "ISO-8859-1",
                StringCharEncoding::Windows1252 => "Windows-1252",
                StringCharEncoding::Utf8 => "UTF-8",
                StringCharEncoding::Utf16Be => "UTF-16BE",
                StringCharEncoding::Utf16Le => "UTF-16LE",
                StringCharEncoding::Utf32Be => "UTF-32BE",
                StringCharEncoding::Utf32Le => "UTF-32LE",
            };
            out.push_str(&format!("{indent}<Encoding kind=\"String\" charEncoding=\"{char_encoding}\">\n"));
            write_size(out, &format!("{indent}  "), &s.size);
            out.push_str(&format!("{indent}</Encoding>\n"));
        }
        DataEncoding::Binary(b) => {
            let word_size = match b.word_size_bits {
                Some(w) => format!(" wordSizeBits=\"{w}\""),
                None => String::new(),
            };
            out.push_str(&format!("{indent}<Encoding kind=\"Binary\"{word_size}>\n"));
            write_size(out, &format!("{indent}  "), &b.size);
            out.push_str(&format!("{indent}</Encoding>\n"));
        }
    }
}

// ---------------------------------------------------------------------
// Parameter types
// ---------------------------------------------------------------------

fn parse_epoch(node: Node<'_, '_>) -> Result<TimeEpoch> {
    let epoch_node =
        child(node, "Epoch").ok_or_else(|| Error::Validation("time parameter type missing <Epoch>".to_string()))?;
    Ok(TimeEpoch {
        epoch: attr(epoch_node, "value")?.to_string(),
        offset_from: attr_opt(epoch_node, "offsetFrom").map(str::to_string),
    })
}

fn write_epoch(out: &mut String, indent: &str, epoch: &TimeEpoch) {
    let offset = match &epoch.offset_from {
        Some(o) => format!(" offsetFrom=\"{}\"", esc(o)),
        None => String::new(),
    };
    out.push_str(&format!("{indent}<Epoch value=\"{}\"{offset}/>\n", esc(&epoch.epoch)));
}

fn parse_parameter_type(node: Node<'_, '_>) -> Result<(String, ParameterType)> {
    let name = attr(node, "name")?.to_string();
    let unit = attr_opt(node, "unit").map(str::to_string);
    let encoding = parse_data_encoding(node)?;
    let pt = match attr(node, "kind")? {
        "Integer" => ParameterType::Integer { encoding, unit },
        "Float" => ParameterType::Float { encoding, unit },
        "String" => ParameterType::String { encoding, unit },
        "Binary" => ParameterType::Binary { encoding, unit },
        "Boolean" => ParameterType::Boolean { encoding, unit },
        "Enumerated" => {
            let enum_node = child(node, "Enumeration")
                .ok_or_else(|| Error::Validation("Enumerated parameter type missing <Enumeration>".to_string()))?;
            let mut enumeration = HashMap::new();
            for entry in elements(enum_node, "Entry") {
                let value = attr(entry, "value")?
                    .parse::<i64>()
                    .map_err(|_| Error::Validation("Entry value must be an integer".to_string()))?;
                enumeration.insert(value, attr(entry, "label")?.to_string());
            }
            ParameterType::Enumerated { encoding, enumeration, unit }
        }
        "AbsoluteTime" => ParameterType::AbsoluteTime { encoding, unit, epoch: parse_epoch(node)? },
        "RelativeTime" => ParameterType::RelativeTime { encoding, unit, epoch: parse_epoch(node)? },
        other => return Err(Error::Validation(format!("unknown parameter type kind {other}"))),
    };
    Ok((name, pt))
}

fn write_parameter_type(out: &mut String, name: &str, pt: &ParameterType) {
    let (kind, unit, encoding) = match pt {
        ParameterType::Integer { encoding, unit } => ("Integer", unit, encoding),
        ParameterType::Float { encoding, unit } => ("Float", unit, encoding),
        ParameterType::String { encoding, unit } => ("String", unit, encoding),
        ParameterType::Binary { encoding, unit } => ("Binary", unit, encoding),
        ParameterType::Boolean { encoding, unit } => ("Boolean", unit, encoding),
        ParameterType::Enumerated { encoding, unit, .. } => ("Enumerated", unit, encoding),
        ParameterType::AbsoluteTime { encoding, unit, .. } => ("AbsoluteTime", unit, encoding),
        ParameterType::RelativeTime { encoding, unit, .. } => ("RelativeTime", unit, encoding),
    };
    let unit_attr = match unit {
        Some(u) => format!(" unit=\"{}\"", esc(u)),
        None => String::new(),
    };
    out.push_str(&format!("    <ParameterType name=\"{}\" kind=\"{kind}\"{unit_attr}>\n", esc(name)));
    write_data_encoding(out, "      ", encoding);
    match pt {
        ParameterType::Enumerated { enumeration, .. } => {
            out.push_str("      <Enumeration>\n");
            let mut entries: Vec<(&i64, &String)> = enumeration.iter().collect();
            entries.sort_by_key(|(v, _)| **v);
            for (value, label) in entries {
                out.push_str(&format!("        <Entry value=\"{value}\" label=\"{}\"/>\n", esc(label)));
            }
            out.push_str("      </Enumeration>\n");
        }
        ParameterType::AbsoluteTime { epoch, .. } | ParameterType::RelativeTime { epoch, .. } => {
            write_epoch(out, "      ", epoch);
        }
        _ => {}
    }
    out.push_str("    </ParameterType>\n");
}

// ---------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------

fn parse_parameter(node: Node<'_, '_>) -> Result<Parameter> {
    Ok(Parameter {
        name: attr(node, "name")?.to_string(),
        parameter_type_ref: attr(node, "type")?.to_string(),
        short_description: attr_opt(node, "shortDescription").map(str::to_string),
        long_description: attr_opt(node, "longDescription").map(str::to_string),
    })
}

fn write_parameter(out: &mut String, param: &Parameter) {
    let short = match &param.short_description {
        Some(s) => format!(" shortDescription=\"{}\"", esc(s)),
        None => String::new(),
    };
    let long = match &param.long_description {
        Some(s) => format!(" longDescription=\"{}\"", esc(s)),
        None => String::new(),
    };
    out.push_str(&format!(
        "    <Parameter name=\"{}\" type=\"{}\"{short}{long}/>\n",
        esc(&param.name),
        esc(&param.parameter_type_ref)
    ));
}

// ---------------------------------------------------------------------
// Sequence containers
// ---------------------------------------------------------------------

fn parse_container(node: Node<'_, '_>) -> Result<SequenceContainer> {
    let name = attr(node, "name")?.to_string();
    let base_container = attr_opt(node, "baseContainer").map(str::to_string);
    let abstract_ = parse_bool(node, "abstract", false)?;

    let mut entries = Vec::new();
    if let Some(entry_list) = child(node, "EntryList") {
        for entry in entry_list.children().filter(|c| c.is_element()) {
            match entry.tag_name().name() {
                "ParameterRefEntry" => {
                    entries.push(ContainerEntry::Parameter(attr(entry, "parameter")?.to_string()))
                }
                "ContainerRefEntry" => {
                    entries.push(ContainerEntry::Container(attr(entry, "container")?.to_string()))
                }
                other => {
                    return Err(Error::Validation(format!("unexpected entry element <{other}>")))
                }
            }
        }
    }

    let restriction_criteria = match child(node, "RestrictionCriteria") {
        Some(rc) => parse_match_criteria_list(rc)?,
        None => Vec::new(),
    };

    Ok(SequenceContainer {
        name,
        entries,
        base_container,
        restriction_criteria,
        abstract_,
        inheritors: Vec::new(),
    })
}

fn write_container(out: &mut String, c: &SequenceContainer) {
    let base = match &c.base_container {
        Some(b) => format!(" baseContainer=\"{}\"", esc(b)),
        None => String::new(),
    };
    out.push_str(&format!(
        "    <SequenceContainer name=\"{}\"{base} abstract=\"{}\">\n",
        esc(&c.name),
        c.abstract_
    ));
    out.push_str("      <EntryList>\n");
    for entry in &c.entries {
        match entry {
            ContainerEntry::Parameter(p) => {
                out.push_str(&format!("        <ParameterRefEntry parameter=\"{}\"/>\n", esc(p)))
            }
            ContainerEntry::Container(ch) => {
                out.push_str(&format!("        <ContainerRefEntry container=\"{}\"/>\n", esc(ch)))
            }
        }
    }
    out.push_str("      </EntryList>\n");
    if !c.restriction_criteria.is_empty() {
        out.push_str("      <RestrictionCriteria>\n");
        write_match_criteria_list(out, "        ", &c.restriction_criteria);
        out.push_str("      </RestrictionCriteria>\n");
    }
    out.push_str("    </SequenceContainer>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{with_ccsds_primary_header, PacketDefinitionBuilder};

    #[test]
    fn round_trips_a_header_only_definition() {
        let mut builder = PacketDefinitionBuilder::new("root");
        with_ccsds_primary_header(&mut builder);
        builder.container(
            "root",
            vec![
                ContainerEntry::Parameter("VERSION".into()),
                ContainerEntry::Parameter("TYPE".into()),
                ContainerEntry::Parameter("SEC_HDR_FLG".into()),
                ContainerEntry::Parameter("PKT_APID".into()),
                ContainerEntry::Parameter("SEQ_FLGS".into()),
                ContainerEntry::Parameter("PKT_SEQ_CNT".into()),
                ContainerEntry::Parameter("PKT_LEN".into()),
            ],
            None,
            vec![],
            false,
        );
        let def = builder.build().unwrap();

        let mut buf = Vec::new();
        XtceXml.write(&def, &mut buf).unwrap();

        let reloaded = XtceXml.load(&mut &buf[..]).unwrap();
        assert_eq!(reloaded.root_container_name, "root");
        assert_eq!(reloaded.parameters.len(), def.parameters.len());
        assert_eq!(
            reloaded.containers["root"].entries.len(),
            def.containers["root"].entries.len()
        );
    }

    #[test]
    fn round_trips_enumeration_and_spline_calibrator() {
        use crate::data_encoding::{ByteOrder, IntegerDataEncoding, IntegerEncoding};

        let mut builder = PacketDefinitionBuilder::new("root");
        builder.parameter_type(
            "Mode_Type",
            ParameterType::Enumerated {
                encoding: DataEncoding::Integer(IntegerDataEncoding {
                    size_in_bits: 8,
                    byte_order: ByteOrder::BigEndian,
                    encoding: IntegerEncoding::Unsigned,
                    default_calibrator: Some(Calibrator::spline(
                        vec![SplinePoint { raw: 0.0, calibrated: 0.0 }, SplinePoint { raw: 10.0, calibrated: 100.0 }],
                        SplineOrder::First,
                        false,
                    )),
                    context_calibrators: vec![],
                }),
                enumeration: HashMap::from([(0, "OFF".to_string()), (1, "ON".to_string())]),
                unit: None,
            },
        );
        builder.parameter("MODE", "Mode_Type");
        builder.container("root", vec![ContainerEntry::Parameter("MODE".into())], None, vec![], false);
        let def = builder.build().unwrap();

        let mut buf = Vec::new();
        XtceXml.write(&def, &mut buf).unwrap();
        let reloaded = XtceXml.load(&mut &buf[..]).unwrap();

        match &reloaded.parameter_types["Mode_Type"] {
            ParameterType::Enumerated { enumeration, encoding, .. } => {
                assert_eq!(enumeration.get(&1).unwrap(), "ON");
                match encoding {
                    DataEncoding::Integer(i) => assert!(i.default_calibrator.is_some()),
                    _ => panic!("expected integer encoding"),
                }
            }
            other => panic!("expected enumerated parameter type, got {other:?}"),
        }
    }

    #[test]
    fn signed_is_accepted_as_a_twos_complement_alias() {
        let xml = r#"<IntegerParameterType name="X">
            <Encoding kind="Integer" sizeInBits="8" encoding="signed"/>
        </IntegerParameterType>"#;
        let doc = Document::parse(xml).unwrap();
        let encoding = parse_data_encoding(doc.root_element()).unwrap();
        match encoding {
            DataEncoding::Integer(i) => assert_eq!(i.encoding, IntegerEncoding::TwosComplement),
            other => panic!("expected integer encoding, got {other:?}"),
        }
    }

    #[test]
    fn spline_orders_above_first_are_not_implemented() {
        for order in ["second", "third"] {
            let xml = format!(r#"<Spline order="{order}"><Point raw="0" calibrated="0"/><Point raw="1" calibrated="1"/></Spline>"#);
            let doc = Document::parse(&xml).unwrap();
            assert!(matches!(
                parse_calibrator(doc.root_element()),
                Err(Error::NotImplemented(_))
            ));
        }

        let xml = r#"<Spline order="fourth"><Point raw="0" calibrated="0"/></Spline>"#;
        let doc = Document::parse(xml).unwrap();
        assert!(matches!(parse_calibrator(doc.root_element()), Err(Error::Validation(_))));
    }
}
