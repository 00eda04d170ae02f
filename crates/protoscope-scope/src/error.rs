//! Error types for the scope crate.

/// Invalid scope configurations, reported before any comparison starts.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// A field-number scope names a number the root type does not declare.
    #[error("message type {message} has no field with number {number}")]
    UnknownFieldNumber { message: String, number: u32 },

    /// A field-descriptor scope names a field from another schema.
    #[error("field {field} is not part of the schema of {message}")]
    ForeignField { message: String, field: String },

    /// A field-descriptor scope names a field that can never occur below the root.
    #[error("field {field} cannot occur inside {message}")]
    UnreachableField { message: String, field: String },

    /// A set-fields scope was built from a message of another type.
    #[error("field selector was built from {selector} but is applied to {message}")]
    SelectorTypeMismatch { selector: String, message: String },

    /// Reference messages passed together must share one type.
    #[error("reference messages have different types: {first} and {other}")]
    MixedReferenceTypes { first: String, other: String },

    /// A set-fields scope needs at least one reference message.
    #[error("no reference messages given")]
    NoReferenceMessages,
}

/// Convenience alias for scope configuration results.
pub type ScopeLogicResult<T> = Result<T, ScopeError>;
