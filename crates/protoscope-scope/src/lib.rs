//! Field-scope algebra for protoscope.
//!
//! Decides, for every field path of a comparison, whether the path is in
//! scope, and whether that decision holds for the path's entire subtree.
//!
//! # Key Types
//!
//! - [`FieldSelector`] -- Paths explicitly set on reference messages
//! - [`ScopeResult`] -- Included/excluded × recursive/nonrecursive
//! - [`ScopeLogic`] / [`ScopeNode`] -- Immutable scope expressions and their combinators
//! - [`ScopeCache`] -- Per-comparison memo of scope decisions
//!
//! # Example
//!
//! ```rust
//! use protoscope_scope::{ScopeLogic, ScopeResult};
//! use protoscope_types::{DescriptorPool, FieldPathStep, FieldSpec, MessageSpec, ScalarType};
//!
//! let pool = DescriptorPool::builder()
//!     .message(
//!         MessageSpec::new("demo.Node")
//!             .field(FieldSpec::scalar(1, "value", ScalarType::Int32))
//!             .field(FieldSpec::message(2, "next", "demo.Node")),
//!     )
//!     .build()
//!     .unwrap();
//! let node = pool.get_message("demo.Node").unwrap();
//! let next = FieldPathStep::field(&node.field_by_number(2).unwrap());
//!
//! let scope = ScopeLogic::all().ignoring_fields([2]);
//! scope.validate(&node).unwrap();
//! assert_eq!(scope.policy_for(&node, &next), ScopeResult::ExcludedRecursive);
//! ```

pub mod cache;
pub mod error;
pub mod logic;
pub mod result;
pub mod selector;
mod validate;

pub use cache::ScopeCache;
pub use error::{ScopeError, ScopeLogicResult};
pub use logic::{ScopeLogic, ScopeNode};
pub use result::ScopeResult;
pub use selector::FieldSelector;
