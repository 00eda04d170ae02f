//! Schema reflection layer for protoscope.
//!
//! This crate provides the message model the scope algebra and the diff
//! engine operate on. Every other protoscope crate depends on
//! `protoscope-types`.
//!
//! # Key Types
//!
//! - [`DescriptorPool`] -- Resolved set of message types, built with [`DescriptorPoolBuilder`]
//! - [`MessageDescriptor`] / [`FieldDescriptor`] -- Cheap handles into a pool
//! - [`DynamicMessage`] -- Type-checked message value with an unknown-field side channel
//! - [`Value`] / [`MapKey`] -- Field values and the hashable map-key subset
//! - [`UnknownFieldSet`] / [`WireType`] -- Undeclared wire data
//! - [`FieldPathStep`] -- A declared field or an unknown (number, wire type) pair

pub mod descriptor;
pub mod error;
pub mod message;
pub mod path;
pub mod unknown;
pub mod value;

pub use descriptor::{
    Cardinality, DescriptorPool, DescriptorPoolBuilder, FieldDescriptor, FieldKind, FieldSpec,
    KindSpec, MessageDescriptor, MessageSpec, Presence, ScalarType, MAX_FIELD_NUMBER,
};
pub use error::{TypeError, TypeResult};
pub use message::DynamicMessage;
pub use path::FieldPathStep;
pub use unknown::{UnknownField, UnknownFieldSet, UnknownValue, WireType};
pub use value::{MapKey, Value};
