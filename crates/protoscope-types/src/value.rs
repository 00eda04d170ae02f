//! Field values and map keys.

use std::fmt;

use serde::Serialize;

use crate::descriptor::{FieldKind, ScalarType};
use crate::message::DynamicMessage;

/// A single field value.
///
/// Repeated fields hold a [`Value::List`]. Map fields hold a list of entry
/// messages, exactly as they appear on the wire; see
/// [`DynamicMessage::insert_map_entry`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    EnumNumber(i32),
    Message(DynamicMessage),
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::I32(_) => "int32",
            Self::I64(_) => "int64",
            Self::U32(_) => "uint32",
            Self::U64(_) => "uint64",
            Self::F32(_) => "float",
            Self::F64(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::EnumNumber(_) => "enum",
            Self::Message(_) => "message",
            Self::List(_) => "list",
        }
    }

    /// Whether this (non-list) value can be stored in a field of `kind`.
    pub fn is_valid_for(&self, kind: &FieldKind) -> bool {
        match (kind, self) {
            (FieldKind::Scalar(s), v) => v.is_valid_for_scalar(*s),
            (FieldKind::Enum, Self::EnumNumber(_)) => true,
            (FieldKind::Message(m) | FieldKind::Group(m), Self::Message(msg)) => {
                msg.descriptor() == m
            }
            _ => false,
        }
    }

    fn is_valid_for_scalar(&self, ty: ScalarType) -> bool {
        matches!(
            (ty, self),
            (ScalarType::Double, Self::F64(_))
                | (ScalarType::Float, Self::F32(_))
                | (ScalarType::Int32, Self::I32(_))
                | (ScalarType::Int64, Self::I64(_))
                | (ScalarType::Uint32, Self::U32(_))
                | (ScalarType::Uint64, Self::U64(_))
                | (ScalarType::Bool, Self::Bool(_))
                | (ScalarType::String, Self::String(_))
                | (ScalarType::Bytes, Self::Bytes(_))
        )
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert a key-compatible value into a [`MapKey`].
    pub fn to_map_key(&self) -> Option<MapKey> {
        match self {
            Self::Bool(v) => Some(MapKey::Bool(*v)),
            Self::I32(v) => Some(MapKey::I32(*v)),
            Self::I64(v) => Some(MapKey::I64(*v)),
            Self::U32(v) => Some(MapKey::U32(*v)),
            Self::U64(v) => Some(MapKey::U64(*v)),
            Self::String(v) => Some(MapKey::String(v.clone())),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DynamicMessage> for Value {
    fn from(v: DynamicMessage) -> Self {
        Self::Message(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// The hashable subset of values usable as map keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum MapKey {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    String(String),
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::Bool(v) => Self::Bool(v),
            MapKey::I32(v) => Self::I32(v),
            MapKey::I64(v) => Self::I64(v),
            MapKey::U32(v) => Self::U32(v),
            MapKey::U64(v) => Self::U64(v),
            MapKey::String(v) => Self::String(v),
        }
    }
}

impl From<&str> for MapKey {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<i32> for MapKey {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}
