//! The root object: catalogs of named parameter types, parameters, and
//! containers, plus a designated root container.
//!
//! Definitions are built once (by a loader or the builder API in
//! [`crate::builders`]) and immutable from then on. [`PacketDefinition::finalize`]
//! re-derives every container's inheritor list from its peers'
//! `base_container` references and validates every cross-reference named in
//! the data model, so a definition that survives `finalize` is guaranteed
//! decodable without further existence checks.

use std::collections::{HashMap, HashSet};

use crate::container::{ContainerEntry, ContainerLookup, SequenceContainer};
use crate::error::{Error, Result};
use crate::parameter::Parameter;
use crate::parameter_type::ParameterType;

#[derive(Debug, Clone, Default)]
pub struct PacketDefinition {
    pub parameter_types: HashMap<String, ParameterType>,
    pub parameters: HashMap<String, Parameter>,
    pub containers: HashMap<String, SequenceContainer>,
    pub root_container_name: String,
    /// Names in the order their containers were declared. `HashMap`
    /// iteration order doesn't reflect insertion order, and the "first in
    /// declaration order wins" inheritor-dispatch rule needs the real one —
    /// see `finalize`. Callers that insert into `containers` directly
    /// (rather than through a loader or [`crate::builders`]) should append
    /// here too via `note_container_declared`; any name missing from this
    /// list still gets an inheritor slot in `finalize`, just not a
    /// guaranteed-stable position relative to its siblings.
    pub container_order: Vec<String>,
}

impl PacketDefinition {
    pub fn new(root_container_name: impl Into<String>) -> PacketDefinition {
        PacketDefinition {
            parameter_types: HashMap::new(),
            parameters: HashMap::new(),
            containers: HashMap::new(),
            root_container_name: root_container_name.into(),
            container_order: Vec::new(),
        }
    }

    /// Records `name` as the next-declared container, if it isn't already
    /// tracked. Idempotent so re-declaring (overwriting) a container keeps
    /// its original position.
    pub fn note_container_declared(&mut self, name: &str) {
        if !self.container_order.iter().any(|n| n == name) {
            self.container_order.push(name.to_string());
        }
    }

    /// Recomputes every container's inheritor list and validates the
    /// reference graph. Must be called before the definition is used to
    /// decode anything; the packet generator calls it if it hasn't been
    /// called already.
    pub fn finalize(&mut self) -> Result<()> {
        for (name, param) in &self.parameters {
            if !self.parameter_types.contains_key(&param.parameter_type_ref) {
                return Err(Error::Validation(format!(
                    "parameter {name} references unknown parameter type {}",
                    param.parameter_type_ref
                )));
            }
        }

        for (name, pt) in &self.parameter_types {
            pt.validate(name)?;
        }

        for (name, container) in &self.containers {
            for entry in &container.entries {
                match entry {
                    ContainerEntry::Parameter(p) => {
                        if !self.parameters.contains_key(p) {
                            return Err(Error::Validation(format!(
                                "container {name} references unknown parameter {p}"
                            )));
                        }
                    }
                    ContainerEntry::Container(c) => {
                        if !self.containers.contains_key(c) {
                            return Err(Error::Validation(format!(
                                "container {name} references unknown nested container {c}"
                            )));
                        }
                    }
                }
            }
            if let Some(base) = &container.base_container {
                if !self.containers.contains_key(base) {
                    return Err(Error::Validation(format!(
                        "container {name} references unknown base container {base}"
                    )));
                }
            }
        }

        if !self.containers.contains_key(&self.root_container_name) {
            return Err(Error::Validation(format!(
                "root container {} does not exist",
                self.root_container_name
            )));
        }

        self.assert_acyclic()?;

        let mut inheritors: HashMap<String, Vec<String>> =
            self.containers.keys().map(|k| (k.clone(), Vec::new())).collect();
        // Declaration order within a base's inheritor list follows
        // `container_order`, not `HashMap`'s (unspecified) iteration order —
        // this is what makes "first in declaration order wins" among
        // simultaneously-matching inheritors reproducible. Any container
        // absent from `container_order` (inserted straight into the map
        // without going through a loader or the builder) is appended after,
        // in arbitrary order.
        let mut ordered_names: Vec<&String> = self.container_order.iter().collect();
        for name in self.containers.keys() {
            if !self.container_order.iter().any(|n| n == name) {
                ordered_names.push(name);
            }
        }
        for name in ordered_names {
            if let Some(base) = &self.containers[name].base_container {
                inheritors.get_mut(base).unwrap().push(name.clone());
            }
        }
        for (name, list) in inheritors {
            self.containers.get_mut(&name).unwrap().inheritors = list;
        }

        Ok(())
    }

    fn assert_acyclic(&self) -> Result<()> {
        for start in self.containers.keys() {
            let mut seen = HashSet::new();
            let mut cur = start.clone();
            loop {
                if !seen.insert(cur.clone()) {
                    return Err(Error::Validation(format!(
                        "cycle detected in base-container chain starting at {start}"
                    )));
                }
                match &self.containers[&cur].base_container {
                    Some(next) => cur = next.clone(),
                    None => break,
                }
            }
        }
        Ok(())
    }
}

impl ContainerLookup for PacketDefinition {
    fn container(&self, name: &str) -> Option<&SequenceContainer> {
        self.containers.get(name)
    }

    fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    fn parameter_type(&self, name: &str) -> Option<&ParameterType> {
        self.parameter_types.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerEntry;
    use crate::data_encoding::{ByteOrder, DataEncoding, IntegerDataEncoding, IntegerEncoding};

    fn uint_param(name: &str) -> Parameter {
        Parameter {
            name: name.to_string(),
            parameter_type_ref: "uint8".to_string(),
            short_description: None,
            long_description: None,
        }
    }

    fn uint8_type() -> ParameterType {
        ParameterType::Integer {
            encoding: DataEncoding::Integer(IntegerDataEncoding {
                size_in_bits: 8,
                byte_order: ByteOrder::BigEndian,
                encoding: IntegerEncoding::Unsigned,
                default_calibrator: None,
                context_calibrators: vec![],
            }),
            unit: None,
        }
    }

    #[test]
    fn finalize_recomputes_inheritors_and_rejects_dangling_refs() {
        let mut def = PacketDefinition::new("root");
        def.parameter_types.insert("uint8".to_string(), uint8_type());
        def.parameters.insert("A".to_string(), uint_param("A"));
        def.containers.insert(
            "root".to_string(),
            SequenceContainer {
                name: "root".to_string(),
                entries: vec![ContainerEntry::Parameter("A".to_string())],
                base_container: None,
                restriction_criteria: vec![],
                abstract_: true,
                inheritors: vec![],
            },
        );
        def.containers.insert(
            "child".to_string(),
            SequenceContainer {
                name: "child".to_string(),
                entries: vec![],
                base_container: Some("root".to_string()),
                restriction_criteria: vec![],
                abstract_: false,
                inheritors: vec![],
            },
        );
        def.finalize().unwrap();
        assert_eq!(def.containers["root"].inheritors, vec!["child".to_string()]);
    }

    #[test]
    fn finalize_rejects_cycles() {
        let mut def = PacketDefinition::new("a");
        def.containers.insert(
            "a".to_string(),
            SequenceContainer {
                name: "a".to_string(),
                entries: vec![],
                base_container: Some("b".to_string()),
                restriction_criteria: vec![],
                abstract_: false,
                inheritors: vec![],
            },
        );
        def.containers.insert(
            "b".to_string(),
            SequenceContainer {
                name: "b".to_string(),
                entries: vec![],
                base_container: Some("a".to_string()),
                restriction_criteria: vec![],
                abstract_: false,
                inheritors: vec![],
            },
        );
        assert!(def.finalize().is_err());
    }
}
