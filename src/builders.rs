//! Python-like in-memory construction of a [`PacketDefinition`], without
//! going through an XML document.
//!
//! Modeled on pdb-sdk's `PdbBuilder`/`DbiBuilder` family: a builder struct
//! with chainable `&mut self -> &mut Self` setters, owning the pieces it
//! accumulates, and a final consuming `build()` that commits everything
//! (here, `PacketDefinition::finalize`) rather than validating incrementally
//! on every call.

use crate::container::{ContainerEntry, SequenceContainer};
use crate::definition::PacketDefinition;
use crate::error::Result;
use crate::match_criteria::MatchCriteria;
use crate::parameter::Parameter;
use crate::parameter_type::ParameterType;

#[derive(Debug, Default)]
pub struct PacketDefinitionBuilder {
    def: PacketDefinition,
}

impl PacketDefinitionBuilder {
    pub fn new(root_container_name: impl Into<String>) -> PacketDefinitionBuilder {
        PacketDefinitionBuilder {
            def: PacketDefinition::new(root_container_name),
        }
    }

    pub fn parameter_type(
        &mut self,
        name: impl Into<String>,
        parameter_type: ParameterType,
    ) -> &mut Self {
        self.def.parameter_types.insert(name.into(), parameter_type);
        self
    }

    pub fn parameter(&mut self, name: impl Into<String>, parameter_type_ref: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.def.parameters.insert(
            name.clone(),
            Parameter {
                name,
                parameter_type_ref: parameter_type_ref.into(),
                short_description: None,
                long_description: None,
            },
        );
        self
    }

    pub fn parameter_with_descriptions(
        &mut self,
        name: impl Into<String>,
        parameter_type_ref: impl Into<String>,
        short_description: Option<String>,
        long_description: Option<String>,
    ) -> &mut Self {
        let name = name.into();
        self.def.parameters.insert(
            name.clone(),
            Parameter {
                name,
                parameter_type_ref: parameter_type_ref.into(),
                short_description,
                long_description,
            },
        );
        self
    }

    pub fn container(
        &mut self,
        name: impl Into<String>,
        entries: Vec<ContainerEntry>,
        base_container: Option<String>,
        restriction_criteria: Vec<MatchCriteria>,
        abstract_: bool,
    ) -> &mut Self {
        let name = name.into();
        self.def.note_container_declared(&name);
        self.def.containers.insert(
            name.clone(),
            SequenceContainer {
                name,
                entries,
                base_container,
                restriction_criteria,
                abstract_,
                inheritors: Vec::new(),
            },
        );
        self
    }

    /// Consumes the builder, recomputes inheritor lists, and validates
    /// every cross-reference in the accumulated object model.
    pub fn build(mut self) -> Result<PacketDefinition> {
        self.def.finalize()?;
        Ok(self.def)
    }
}

/// Appends the seven CCSDS primary-header fields as unsigned integer
/// parameters/types to `builder`, for callers that build a definition from
/// a flat field list and don't want to spell out the header by hand. Names
/// match `spec.md`'s external-interface table.
pub fn with_ccsds_primary_header(builder: &mut PacketDefinitionBuilder) -> &mut PacketDefinitionBuilder {
    use crate::data_encoding::{ByteOrder, DataEncoding, IntegerDataEncoding, IntegerEncoding};

    let header_fields: [(&str, usize); 7] = [
        ("VERSION", 3),
        ("TYPE", 1),
        ("SEC_HDR_FLG", 1),
        ("PKT_APID", 11),
        ("SEQ_FLGS", 2),
        ("PKT_SEQ_CNT", 14),
        ("PKT_LEN", 16),
    ];
    for (name, bits) in header_fields {
        let type_name = format!("{name}_Type");
        builder.parameter_type(
            type_name.clone(),
            ParameterType::Integer {
                encoding: DataEncoding::Integer(IntegerDataEncoding {
                    size_in_bits: bits,
                    byte_order: ByteOrder::BigEndian,
                    encoding: IntegerEncoding::Unsigned,
                    default_calibrator: None,
                    context_calibrators: vec![],
                }),
                unit: None,
            },
        );
        builder.parameter(name, type_name);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only_definition_builds_and_finalizes() {
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
        assert_eq!(def.parameters.len(), 7);
        assert_eq!(def.containers["root"].entries.len(), 7);
    }
}
