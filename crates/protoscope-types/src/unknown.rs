//! Unknown fields: data present on the wire but not declared in the schema.
//!
//! Payloads are kept per field number and per wire type, in arrival order.
//! Group payloads are nested [`UnknownFieldSet`]s.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire-level encoding tag of an unknown payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireType {
    Varint,
    Fixed32,
    Fixed64,
    LengthDelimited,
    Group,
}

impl WireType {
    /// Every wire type, in comparison order.
    pub const ALL: [WireType; 5] = [
        WireType::Varint,
        WireType::Fixed32,
        WireType::Fixed64,
        WireType::LengthDelimited,
        WireType::Group,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Varint => "varint",
            Self::Fixed32 => "fixed32",
            Self::Fixed64 => "fixed64",
            Self::LengthDelimited => "length_delimited",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All payloads recorded for one unknown field number.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UnknownField {
    pub varint: Vec<u64>,
    pub fixed32: Vec<u32>,
    pub fixed64: Vec<u64>,
    pub length_delimited: Vec<Vec<u8>>,
    pub group: Vec<UnknownFieldSet>,
}

impl UnknownField {
    /// Payloads of a single wire type, borrowed.
    pub fn values(&self, wire_type: WireType) -> Vec<UnknownValue<'_>> {
        match wire_type {
            WireType::Varint => self.varint.iter().map(|v| UnknownValue::Varint(*v)).collect(),
            WireType::Fixed32 => self.fixed32.iter().map(|v| UnknownValue::Fixed32(*v)).collect(),
            WireType::Fixed64 => self.fixed64.iter().map(|v| UnknownValue::Fixed64(*v)).collect(),
            WireType::LengthDelimited => self
                .length_delimited
                .iter()
                .map(|v| UnknownValue::LengthDelimited(v))
                .collect(),
            WireType::Group => self.group.iter().map(UnknownValue::Group).collect(),
        }
    }

    /// Number of payloads of a single wire type.
    pub fn count(&self, wire_type: WireType) -> usize {
        match wire_type {
            WireType::Varint => self.varint.len(),
            WireType::Fixed32 => self.fixed32.len(),
            WireType::Fixed64 => self.fixed64.len(),
            WireType::LengthDelimited => self.length_delimited.len(),
            WireType::Group => self.group.len(),
        }
    }

    /// Wire types that carry at least one payload.
    pub fn wire_types(&self) -> impl Iterator<Item = WireType> + '_ {
        WireType::ALL.into_iter().filter(|w| self.count(*w) > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.wire_types().next().is_none()
    }
}

/// A single borrowed unknown payload.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownValue<'a> {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
    Group(&'a UnknownFieldSet),
}

impl UnknownValue<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::Fixed32(_) => WireType::Fixed32,
            Self::Fixed64(_) => WireType::Fixed64,
            Self::LengthDelimited(_) => WireType::LengthDelimited,
            Self::Group(_) => WireType::Group,
        }
    }
}

/// Unknown fields of a message, keyed by field number.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UnknownFieldSet {
    fields: BTreeMap<u32, UnknownField>,
}

impl UnknownFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(UnknownField::is_empty)
    }

    /// Number of distinct field numbers.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, number: u32) -> Option<&UnknownField> {
        self.fields.get(&number)
    }

    /// Field numbers in ascending order with their payloads.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &UnknownField)> {
        self.fields.iter().map(|(n, f)| (*n, f))
    }

    pub fn add_varint(&mut self, number: u32, value: u64) -> &mut Self {
        self.entry(number).varint.push(value);
        self
    }

    pub fn add_fixed32(&mut self, number: u32, value: u32) -> &mut Self {
        self.entry(number).fixed32.push(value);
        self
    }

    pub fn add_fixed64(&mut self, number: u32, value: u64) -> &mut Self {
        self.entry(number).fixed64.push(value);
        self
    }

    pub fn add_length_delimited(&mut self, number: u32, value: impl Into<Vec<u8>>) -> &mut Self {
        self.entry(number).length_delimited.push(value.into());
        self
    }

    pub fn add_group(&mut self, number: u32, group: UnknownFieldSet) -> &mut Self {
        self.entry(number).group.push(group);
        self
    }

    fn entry(&mut self, number: u32) -> &mut UnknownField {
        self.fields.entry(number).or_default()
    }
}
