//! Error types for the diff crate.

use protoscope_scope::ScopeError;

/// Errors that can occur while configuring or running a comparison.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A compared message is not of the engine's root type.
    #[error("schema mismatch: {side} message is {actual}, expected {expected}")]
    SchemaMismatch {
        side: &'static str,
        expected: String,
        actual: String,
    },

    /// The comparison scope does not fit the root type.
    #[error("invalid scope: {0}")]
    InvalidScope(#[from] ScopeError),

    /// One of the policy scopes does not fit the root type.
    #[error("invalid {policy} scope: {source}")]
    InvalidPolicy {
        policy: &'static str,
        #[source]
        source: ScopeError,
    },

    /// A tolerance is negative or not finite.
    #[error("invalid {policy}: {value}")]
    InvalidTolerance { policy: &'static str, value: f64 },

    /// Options could not be parsed from TOML.
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DiffError {
    pub(crate) fn mismatch(
        side: &'static str,
        expected: &protoscope_types::MessageDescriptor,
        actual: &protoscope_types::MessageDescriptor,
    ) -> Self {
        Self::SchemaMismatch {
            side,
            expected: expected.full_name().to_string(),
            actual: actual.full_name().to_string(),
        }
    }
}

/// Convenience alias for engine operations.
pub type EngineResult<T> = Result<T, DiffError>;
