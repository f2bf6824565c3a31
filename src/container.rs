//! Sequence containers: an ordered entry list, optional base-container
//! inheritance, and the restriction-criteria state machine that dispatches
//! a partially-decoded packet to the right continuation.
//!
//! A container's inheritor set is the transitive reverse of its declared
//! `base_container`; `PacketDefinition::finalize` recomputes it from
//! scratch rather than trusting it to have been maintained incrementally,
//! since the definition loader builds containers independently of each
//! other.

use crate::bitcursor::BitCursor;
use crate::error::{Error, Result};
use crate::match_criteria::MatchCriteria;
use crate::packet::Packet;
use crate::parameter_type::ParameterType;

#[derive(Debug, Clone)]
pub enum ContainerEntry {
    Parameter(String),
    Container(String),
}

#[derive(Debug, Clone)]
pub struct SequenceContainer {
    pub name: String,
    pub entries: Vec<ContainerEntry>,
    pub base_container: Option<String>,
    pub restriction_criteria: Vec<MatchCriteria>,
    pub abstract_: bool,
    /// Recomputed at definition finalization; declaration order matters for
    /// inheritor dispatch.
    pub inheritors: Vec<String>,
}

/// Walks one container's entries, then dispatches to the first inheritor
/// (in declaration order) whose restriction criteria all hold. Recurses for
/// nested containers and inheritor continuations. `lookup` resolves a name
/// to a parameter or container definition.
pub fn parse_container(
    container_name: &str,
    lookup: &dyn ContainerLookup,
    cursor: &mut BitCursor,
    packet: &mut Packet,
) -> Result<()> {
    let container = lookup.container(container_name).ok_or_else(|| {
        Error::Validation(format!("container {container_name} not found in definition"))
    })?;

    for entry in &container.entries {
        match entry {
            ContainerEntry::Parameter(name) => {
                let param = lookup.parameter(name).ok_or_else(|| {
                    Error::Validation(format!("parameter {name} not found in definition"))
                })?;
                let param_type = lookup.parameter_type(&param.parameter_type_ref).ok_or_else(|| {
                    Error::Validation(format!(
                        "parameter {name} references unknown parameter type {}",
                        param.parameter_type_ref
                    ))
                })?;
                param.parse_into(param_type, cursor, packet)?;
            }
            ContainerEntry::Container(name) => {
                parse_container(name, lookup, cursor, packet)?;
            }
        }
    }

    for inheritor_name in &container.inheritors {
        let inheritor = lookup.container(inheritor_name).ok_or_else(|| {
            Error::Validation(format!("inheritor container {inheritor_name} not found in definition"))
        })?;
        if MatchCriteria::all_hold(&inheritor.restriction_criteria, packet, None)? {
            return parse_container(inheritor_name, lookup, cursor, packet);
        }
    }

    if container.abstract_ {
        return Err(Error::Coverage {
            container: container_name.to_string(),
        });
    }
    Ok(())
}

/// Resolves container and parameter names during a decode walk, without
/// tying `parse_container` to the concrete `PacketDefinition` type.
pub trait ContainerLookup {
    fn container(&self, name: &str) -> Option<&SequenceContainer>;
    fn parameter(&self, name: &str) -> Option<&crate::parameter::Parameter>;
    fn parameter_type(&self, name: &str) -> Option<&ParameterType>;
}
