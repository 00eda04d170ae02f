use thiserror::Error;

/// Errors produced while building schemas or populating messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("duplicate message type: {0}")]
    DuplicateMessage(String),

    #[error("message type not found: {0}")]
    UnknownMessage(String),

    #[error("duplicate field number {number} in {message}")]
    DuplicateFieldNumber { message: String, number: u32 },

    #[error("duplicate field name '{name}' in {message}")]
    DuplicateFieldName { message: String, name: String },

    #[error("invalid field number {number} in {message}")]
    InvalidFieldNumber { message: String, number: u32 },

    #[error("field {field} references unresolved type {type_name}")]
    UnresolvedType { field: String, type_name: String },

    #[error("map field {field} has an invalid key type: {key}")]
    InvalidMapKey { field: String, key: String },

    #[error("message {message} has no field '{field}'")]
    UnknownField { message: String, field: String },

    #[error("field {field} does not belong to message {message}")]
    ForeignField { message: String, field: String },

    #[error("type mismatch for {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

/// Convenience alias for type-layer results.
pub type TypeResult<T> = Result<T, TypeError>;
