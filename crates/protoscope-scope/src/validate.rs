//! Scope validation against a root message type.
//!
//! A scope must be validated for the type it is applied to before any
//! comparison starts, so misconfigurations surface as errors rather than as
//! scopes that silently select nothing.

use protoscope_types::MessageDescriptor;

use crate::error::{ScopeError, ScopeLogicResult};
use crate::logic::{ScopeLogic, ScopeNode};

impl ScopeLogic {
    /// Check every leaf of this scope against `root`.
    pub fn validate(&self, root: &MessageDescriptor) -> ScopeLogicResult<()> {
        match self.node() {
            ScopeNode::All | ScopeNode::None => Ok(()),
            ScopeNode::BySelector(selector) => match selector.source() {
                Some(source) if source != root => Err(ScopeError::SelectorTypeMismatch {
                    selector: source.full_name().to_string(),
                    message: root.full_name().to_string(),
                }),
                _ => Ok(()),
            },
            ScopeNode::ByFieldNumbers { numbers, .. } => {
                for &number in numbers {
                    if root.field_by_number(number).is_none() {
                        return Err(ScopeError::UnknownFieldNumber {
                            message: root.full_name().to_string(),
                            number,
                        });
                    }
                }
                Ok(())
            }
            ScopeNode::ByFieldDescriptors { fields, .. } => {
                for field in fields {
                    let owner = field.containing_type();
                    if owner.pool() != root.pool() {
                        return Err(ScopeError::ForeignField {
                            message: root.full_name().to_string(),
                            field: field.full_name().to_string(),
                        });
                    }
                    if !root.reaches(owner) {
                        return Err(ScopeError::UnreachableField {
                            message: root.full_name().to_string(),
                            field: field.full_name().to_string(),
                        });
                    }
                }
                Ok(())
            }
            ScopeNode::Intersect(a, b) | ScopeNode::Union(a, b) => {
                a.validate(root)?;
                b.validate(root)
            }
            ScopeNode::Negate(inner) => inner.validate(root),
        }
    }
}
