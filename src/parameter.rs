//! A named field: a parameter type plus optional descriptions.

use crate::bitcursor::BitCursor;
use crate::error::Result;
use crate::packet::{ParsedValue, Packet};
use crate::parameter_type::ParameterType;

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    /// Name reference into the owning definition's `parameter_types`
    /// catalog, resolved by the caller during a decode walk.
    pub parameter_type_ref: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
}

impl Parameter {
    /// Decode this parameter's value from the cursor and insert it into the
    /// packet under its own name. `parameter_type` is the type this
    /// parameter's `parameter_type_ref` resolves to.
    pub fn parse_into(
        &self,
        parameter_type: &ParameterType,
        cursor: &mut BitCursor,
        packet: &mut Packet,
    ) -> Result<()> {
        let (raw_value, derived_value) = parameter_type.parse_value(cursor, packet)?;
        packet.insert(
            &self.name,
            ParsedValue {
                raw_value,
                derived_value,
                unit: parameter_type.unit().map(str::to_string),
                short_description: self.short_description.clone(),
                long_description: self.long_description.clone(),
            },
        );
        Ok(())
    }
}
