//! Field path steps.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::descriptor::FieldDescriptor;
use crate::unknown::WireType;

/// One step of a field path: either a declared field or an unknown field
/// identified by number and wire type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldPathStep {
    Field(FieldDescriptor),
    Unknown { number: u32, wire_type: WireType },
}

impl FieldPathStep {
    pub fn field(field: &FieldDescriptor) -> Self {
        Self::Field(field.clone())
    }

    pub fn unknown(number: u32, wire_type: WireType) -> Self {
        Self::Unknown { number, wire_type }
    }

    /// The field number, declared or not.
    pub fn number(&self) -> u32 {
        match self {
            Self::Field(f) => f.number(),
            Self::Unknown { number, .. } => *number,
        }
    }

    pub fn as_field(&self) -> Option<&FieldDescriptor> {
        match self {
            Self::Field(f) => Some(f),
            Self::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }
}

impl From<FieldDescriptor> for FieldPathStep {
    fn from(field: FieldDescriptor) -> Self {
        Self::Field(field)
    }
}

impl fmt::Display for FieldPathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => f.write_str(field.name()),
            Self::Unknown { number, wire_type } => write!(f, "{number}[{wire_type}]"),
        }
    }
}

impl Serialize for FieldPathStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorPool, FieldSpec, MessageSpec, ScalarType};

    #[test]
    fn display_names() {
        let pool = DescriptorPool::builder()
            .message(MessageSpec::new("t.M").field(FieldSpec::scalar(4, "id", ScalarType::Int64)))
            .build()
            .unwrap();
        let field = pool.get_message("t.M").unwrap().field_by_number(4).unwrap();
        assert_eq!(FieldPathStep::field(&field).to_string(), "id");
        assert_eq!(
            FieldPathStep::unknown(9, WireType::Fixed64).to_string(),
            "9[fixed64]"
        );
        assert_eq!(FieldPathStep::field(&field).number(), 4);
    }

    #[test]
    fn unknown_steps_distinguish_wire_types() {
        let a = FieldPathStep::unknown(1, WireType::Varint);
        let b = FieldPathStep::unknown(1, WireType::Group);
        assert_ne!(a, b);
        assert!(a.is_unknown());
        assert!(a.as_field().is_none());
    }
}
