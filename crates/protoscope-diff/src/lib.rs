//! Structural message diff for protoscope.
//!
//! Compares two messages of one type field by field under a
//! [`ScopeLogic`](protoscope_scope::ScopeLogic) and a [`DiffPolicy`],
//! producing a [`DiffResult`] tree of verdicts.
//!
//! # Key Types
//!
//! - [`DiffEngine`] -- Validated comparison setup for one root type
//! - [`DiffPolicy`] / [`ToleranceMap`] -- Scoped comparison policies
//! - [`DiffOptions`] -- Flat options loadable from TOML or JSON
//! - [`DiffResult`] / [`Verdict`] -- The diff report
//!
//! # Example
//!
//! ```rust
//! use protoscope_diff::{diff, DiffOptions, Verdict};
//! use protoscope_scope::ScopeLogic;
//! use protoscope_types::{DescriptorPool, DynamicMessage, FieldSpec, MessageSpec, ScalarType};
//!
//! let pool = DescriptorPool::builder()
//!     .message(
//!         MessageSpec::new("demo.Point")
//!             .field(FieldSpec::scalar(1, "x", ScalarType::Double))
//!             .field(FieldSpec::scalar(2, "label", ScalarType::String)),
//!     )
//!     .build()
//!     .unwrap();
//! let point = pool.get_message("demo.Point").unwrap();
//!
//! let actual = DynamicMessage::new(point.clone()).with_field("x", 1.004).unwrap();
//! let expected = DynamicMessage::new(point).with_field("x", 1.0).unwrap();
//!
//! let options = DiffOptions { double_tolerance: Some(0.01), ..Default::default() };
//! let result = diff(&actual, &expected, &ScopeLogic::all(), &options.to_policy()).unwrap();
//! assert!(result.is_matched());
//! assert_eq!(result.field(1).unwrap().verdict, Verdict::Matched);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod result;

pub use config::{DiffOptions, DiffPolicy, ToleranceMap};
pub use engine::{diff, DiffEngine};
pub use error::{DiffError, EngineResult};
pub use result::{
    DiffResult, FieldDiff, PairResult, RepeatedFieldDiff, SingularFieldDiff, UnknownFieldDiff,
    UnknownFieldSetDiff, UnknownValueDiff, Verdict,
};
