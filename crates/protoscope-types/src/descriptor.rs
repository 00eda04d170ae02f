//! Schema descriptors.
//!
//! A [`DescriptorPool`] owns every message type of a schema. Message and
//! field descriptors are cheap handles (pool + index), so self-referential
//! schemas such as `Node { next: Node }` need no reference cycles and two
//! descriptors are equal only when they come from the same pool.
//!
//! Pools are assembled with [`DescriptorPoolBuilder`]:
//!
//! ```rust
//! use protoscope_types::{DescriptorPool, FieldSpec, MessageSpec, ScalarType};
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
//! assert_eq!(node.field_by_name("next").unwrap().number(), 2);
//! ```

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::message::DynamicMessage;
use crate::value::Value;

/// Largest field number a schema may declare.
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

// ---------------------------------------------------------------------------
// Field kinds
// ---------------------------------------------------------------------------

/// Scalar value types a field may hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    /// Schema-level name of the type.
    pub fn name(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }

    /// The zero value of this type.
    pub fn default_value(self) -> Value {
        match self {
            Self::Double => Value::F64(0.0),
            Self::Float => Value::F32(0.0),
            Self::Int32 => Value::I32(0),
            Self::Int64 => Value::I64(0),
            Self::Uint32 => Value::U32(0),
            Self::Uint64 => Value::U64(0),
            Self::Bool => Value::Bool(false),
            Self::String => Value::String(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
        }
    }

    /// Floating point types cannot be map keys, and neither can bytes.
    pub fn is_valid_map_key(self) -> bool {
        !matches!(self, Self::Double | Self::Float | Self::Bytes)
    }
}

/// How many values a field carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Singular,
    Repeated,
    /// A repeated field of synthetic key/value entry messages.
    Map,
}

/// Whether a singular field tracks presence separately from its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Setting the field, even to its default, marks it present.
    Explicit,
    /// The field is present only while it holds a non-default value.
    Implicit,
}

/// The resolved value kind of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarType),
    Enum,
    Message(MessageDescriptor),
    Group(MessageDescriptor),
}

impl FieldKind {
    /// The message type for message and group fields.
    pub fn message_type(&self) -> Option<&MessageDescriptor> {
        match self {
            Self::Message(m) | Self::Group(m) => Some(m),
            Self::Scalar(_) | Self::Enum => None,
        }
    }

    /// Human-readable kind name used in error messages.
    pub fn name(&self) -> String {
        match self {
            Self::Scalar(s) => s.name().to_string(),
            Self::Enum => "enum".to_string(),
            Self::Message(m) => m.full_name().to_string(),
            Self::Group(m) => format!("group {}", m.full_name()),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder specs
// ---------------------------------------------------------------------------

/// Unresolved field kind, naming message types by their full name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KindSpec {
    Scalar(ScalarType),
    Enum,
    Message(String),
    Group(String),
}

/// Declaration of a single field, consumed by [`DescriptorPoolBuilder`].
#[derive(Clone, Debug)]
pub struct FieldSpec {
    number: u32,
    name: String,
    cardinality: Cardinality,
    kind: KindSpec,
    presence: Presence,
    map_key: Option<ScalarType>,
}

impl FieldSpec {
    fn new(number: u32, name: impl Into<String>, kind: KindSpec) -> Self {
        Self {
            number,
            name: name.into(),
            cardinality: Cardinality::Singular,
            kind,
            presence: Presence::Explicit,
            map_key: None,
        }
    }

    /// A singular scalar field with explicit presence.
    pub fn scalar(number: u32, name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(number, name, KindSpec::Scalar(ty))
    }

    /// A singular enum field (values are carried as raw numbers).
    pub fn enumeration(number: u32, name: impl Into<String>) -> Self {
        Self::new(number, name, KindSpec::Enum)
    }

    /// A singular submessage field.
    pub fn message(number: u32, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(number, name, KindSpec::Message(type_name.into()))
    }

    /// A singular group field.
    pub fn group(number: u32, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(number, name, KindSpec::Group(type_name.into()))
    }

    /// A map field. The builder synthesizes the `<Name>Entry` message type
    /// with the key at field 1 and the value at field 2.
    pub fn map(number: u32, name: impl Into<String>, key: ScalarType, value: KindSpec) -> Self {
        Self {
            cardinality: Cardinality::Map,
            map_key: Some(key),
            ..Self::new(number, name, value)
        }
    }

    /// Mark the field repeated. Has no effect on map fields.
    pub fn repeated(mut self) -> Self {
        if self.cardinality == Cardinality::Singular {
            self.cardinality = Cardinality::Repeated;
        }
        self
    }

    /// Drop explicit presence tracking (proto3-style scalars).
    pub fn implicit_presence(mut self) -> Self {
        self.presence = Presence::Implicit;
        self
    }
}

/// Declaration of a message type.
#[derive(Clone, Debug)]
pub struct MessageSpec {
    full_name: String,
    fields: Vec<FieldSpec>,
}

impl MessageSpec {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }
}

/// Collects message declarations and resolves them into a [`DescriptorPool`].
#[derive(Clone, Debug, Default)]
pub struct DescriptorPoolBuilder {
    messages: Vec<MessageSpec>,
}

impl DescriptorPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message type declaration.
    pub fn message(mut self, spec: MessageSpec) -> Self {
        self.messages.push(spec);
        self
    }

    /// Resolve type references and validate every declaration.
    pub fn build(self) -> TypeResult<DescriptorPool> {
        let mut specs = Vec::with_capacity(self.messages.len());
        for mut spec in self.messages {
            let mut entries = Vec::new();
            for field in &mut spec.fields {
                if let Some(key) = field.map_key {
                    let entry = map_entry_spec(&spec.full_name, field, key)?;
                    field.kind = KindSpec::Message(entry.full_name.clone());
                    entries.push((entry, true));
                }
            }
            specs.push((spec, false));
            specs.extend(entries);
        }

        let mut by_name = HashMap::with_capacity(specs.len());
        for (index, (spec, _)) in specs.iter().enumerate() {
            if by_name.insert(spec.full_name.clone(), index).is_some() {
                return Err(TypeError::DuplicateMessage(spec.full_name.clone()));
            }
        }

        let mut messages = Vec::with_capacity(specs.len());
        for (spec, is_map_entry) in specs {
            messages.push(resolve_message(spec, is_map_entry, &by_name)?);
        }

        Ok(DescriptorPool {
            inner: Arc::new(PoolInner { messages, by_name }),
        })
    }
}

fn map_entry_spec(parent: &str, field: &FieldSpec, key: ScalarType) -> TypeResult<MessageSpec> {
    let field_name = format!("{parent}.{}", field.name);
    if !key.is_valid_map_key() {
        return Err(TypeError::InvalidMapKey {
            field: field_name,
            key: key.name().to_string(),
        });
    }
    if matches!(field.kind, KindSpec::Group(_)) {
        return Err(TypeError::TypeMismatch {
            field: field_name,
            expected: "scalar, enum or message map value".into(),
            actual: "group".into(),
        });
    }
    let mut value = FieldSpec::new(2, "value", field.kind.clone());
    if matches!(value.kind, KindSpec::Scalar(_) | KindSpec::Enum) {
        value = value.implicit_presence();
    }
    Ok(MessageSpec::new(format!("{parent}.{}Entry", camel_case(&field.name)))
        .field(FieldSpec::scalar(1, "key", key).implicit_presence())
        .field(value))
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn resolve_message(
    spec: MessageSpec,
    is_map_entry: bool,
    by_name: &HashMap<String, usize>,
) -> TypeResult<MessageData> {
    let mut fields = spec.fields;
    fields.sort_by_key(|f| f.number);

    let mut by_number = HashMap::with_capacity(fields.len());
    let mut field_names = HashMap::with_capacity(fields.len());
    let mut resolved = Vec::with_capacity(fields.len());

    for (index, field) in fields.into_iter().enumerate() {
        if field.number == 0 || field.number > MAX_FIELD_NUMBER {
            return Err(TypeError::InvalidFieldNumber {
                message: spec.full_name,
                number: field.number,
            });
        }
        if by_number.insert(field.number, index).is_some() {
            return Err(TypeError::DuplicateFieldNumber {
                message: spec.full_name,
                number: field.number,
            });
        }
        if field_names.insert(field.name.clone(), index).is_some() {
            return Err(TypeError::DuplicateFieldName {
                message: spec.full_name,
                name: field.name,
            });
        }

        let full_name = format!("{}.{}", spec.full_name, field.name);
        let lookup = |type_name: &String| {
            by_name
                .get(type_name)
                .copied()
                .ok_or_else(|| TypeError::UnresolvedType {
                    field: full_name.clone(),
                    type_name: type_name.clone(),
                })
        };
        let kind = match &field.kind {
            KindSpec::Scalar(s) => KindData::Scalar(*s),
            KindSpec::Enum => KindData::Enum,
            KindSpec::Message(name) => KindData::Message(lookup(name)?),
            KindSpec::Group(name) => KindData::Group(lookup(name)?),
        };
        let presence = match (&kind, field.cardinality) {
            (_, Cardinality::Repeated | Cardinality::Map) => Presence::Implicit,
            (KindData::Message(_) | KindData::Group(_), _) => Presence::Explicit,
            _ => field.presence,
        };

        resolved.push(FieldData {
            number: field.number,
            name: field.name,
            full_name,
            cardinality: field.cardinality,
            kind,
            presence,
        });
    }

    Ok(MessageData {
        full_name: spec.full_name,
        fields: resolved,
        by_number,
        by_name: field_names,
        is_map_entry,
    })
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PoolInner {
    messages: Vec<MessageData>,
    by_name: HashMap<String, usize>,
}

#[derive(Debug)]
struct MessageData {
    full_name: String,
    fields: Vec<FieldData>,
    by_number: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
    is_map_entry: bool,
}

#[derive(Debug)]
struct FieldData {
    number: u32,
    name: String,
    full_name: String,
    cardinality: Cardinality,
    kind: KindData,
    presence: Presence,
}

#[derive(Clone, Copy, Debug)]
enum KindData {
    Scalar(ScalarType),
    Enum,
    Message(usize),
    Group(usize),
}

/// An immutable, shareable set of resolved message types.
#[derive(Clone)]
pub struct DescriptorPool {
    inner: Arc<PoolInner>,
}

impl DescriptorPool {
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::new()
    }

    /// Look up a message type by full name.
    pub fn get_message(&self, full_name: &str) -> Option<MessageDescriptor> {
        self.inner
            .by_name
            .get(full_name)
            .map(|&index| MessageDescriptor {
                pool: self.clone(),
                index,
            })
    }

    /// Like [`Self::get_message`] but reports a missing type as an error.
    pub fn message(&self, full_name: &str) -> TypeResult<MessageDescriptor> {
        self.get_message(full_name)
            .ok_or_else(|| TypeError::UnknownMessage(full_name.to_string()))
    }

    /// Every message type, including synthesized map entries.
    pub fn messages(&self) -> impl Iterator<Item = MessageDescriptor> + '_ {
        (0..self.inner.messages.len()).map(|index| MessageDescriptor {
            pool: self.clone(),
            index,
        })
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl PartialEq for DescriptorPool {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DescriptorPool {}

impl fmt::Debug for DescriptorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorPool")
            .field("messages", &self.inner.messages.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MessageDescriptor
// ---------------------------------------------------------------------------

/// Handle to a message type inside a [`DescriptorPool`].
#[derive(Clone)]
pub struct MessageDescriptor {
    pool: DescriptorPool,
    index: usize,
}

impl MessageDescriptor {
    fn data(&self) -> &MessageData {
        &self.pool.inner.messages[self.index]
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Fully qualified type name, e.g. `demo.Node`.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Last segment of the full name.
    pub fn name(&self) -> &str {
        let full = self.full_name();
        full.rsplit('.').next().unwrap_or(full)
    }

    /// Declared fields in field-number order.
    pub fn fields(&self) -> impl ExactSizeIterator<Item = FieldDescriptor> + '_ {
        (0..self.data().fields.len()).map(|index| FieldDescriptor {
            message: self.clone(),
            index,
        })
    }

    pub fn field_by_number(&self, number: u32) -> Option<FieldDescriptor> {
        self.data()
            .by_number
            .get(&number)
            .map(|&index| FieldDescriptor {
                message: self.clone(),
                index,
            })
    }

    pub fn field_by_name(&self, name: &str) -> Option<FieldDescriptor> {
        self.data().by_name.get(name).map(|&index| FieldDescriptor {
            message: self.clone(),
            index,
        })
    }

    /// Whether this is a synthesized map entry type.
    pub fn is_map_entry(&self) -> bool {
        self.data().is_map_entry
    }

    /// Returns `true` if `other` is this type or can be nested (at any
    /// depth) inside a message of this type.
    pub fn reaches(&self, other: &MessageDescriptor) -> bool {
        if self.pool != other.pool {
            return false;
        }
        let messages = &self.pool.inner.messages;
        let mut seen = HashSet::from([self.index]);
        let mut queue = VecDeque::from([self.index]);
        while let Some(index) = queue.pop_front() {
            if index == other.index {
                return true;
            }
            for field in &messages[index].fields {
                if let KindData::Message(child) | KindData::Group(child) = field.kind {
                    if seen.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }
        false
    }

    fn sort_key(&self) -> (usize, usize) {
        (self.pool.id(), self.index)
    }
}

impl PartialEq for MessageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.pool == other.pool
    }
}

impl Eq for MessageDescriptor {}

impl Hash for MessageDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl PartialOrd for MessageDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MessageDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageDescriptor({})", self.full_name())
    }
}

impl fmt::Display for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

// ---------------------------------------------------------------------------
// FieldDescriptor
// ---------------------------------------------------------------------------

/// Handle to a declared field of a message type.
#[derive(Clone)]
pub struct FieldDescriptor {
    message: MessageDescriptor,
    index: usize,
}

impl FieldDescriptor {
    fn data(&self) -> &FieldData {
        &self.message.data().fields[self.index]
    }

    pub fn number(&self) -> u32 {
        self.data().number
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    /// `<containing type>.<field name>`.
    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// The message type declaring this field.
    pub fn containing_type(&self) -> &MessageDescriptor {
        &self.message
    }

    pub fn cardinality(&self) -> Cardinality {
        self.data().cardinality
    }

    /// Repeated and map fields are both repeated on the wire.
    pub fn is_repeated(&self) -> bool {
        self.cardinality() != Cardinality::Singular
    }

    pub fn is_map(&self) -> bool {
        self.cardinality() == Cardinality::Map
    }

    pub fn presence(&self) -> Presence {
        self.data().presence
    }

    /// Singular fields that remember being set even at their default.
    pub fn has_presence(&self) -> bool {
        self.cardinality() == Cardinality::Singular && self.presence() == Presence::Explicit
    }

    pub fn kind(&self) -> FieldKind {
        let pool = &self.message.pool;
        match self.data().kind {
            KindData::Scalar(s) => FieldKind::Scalar(s),
            KindData::Enum => FieldKind::Enum,
            KindData::Message(index) => FieldKind::Message(MessageDescriptor {
                pool: pool.clone(),
                index,
            }),
            KindData::Group(index) => FieldKind::Group(MessageDescriptor {
                pool: pool.clone(),
                index,
            }),
        }
    }

    /// The scalar type, for scalar fields.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self.data().kind {
            KindData::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The message type for message and group fields (the entry type for maps).
    pub fn message_type(&self) -> Option<MessageDescriptor> {
        match self.kind() {
            FieldKind::Message(m) | FieldKind::Group(m) => Some(m),
            FieldKind::Scalar(_) | FieldKind::Enum => None,
        }
    }

    /// Field 1 of the entry type, for map fields.
    pub fn map_key_field(&self) -> Option<FieldDescriptor> {
        self.map_entry_field(1)
    }

    /// Field 2 of the entry type, for map fields.
    pub fn map_value_field(&self) -> Option<FieldDescriptor> {
        self.map_entry_field(2)
    }

    fn map_entry_field(&self, number: u32) -> Option<FieldDescriptor> {
        if !self.is_map() {
            return None;
        }
        self.message_type()?.field_by_number(number)
    }

    /// The value this field reads as when absent. Repeated and map fields
    /// default to an empty list.
    pub fn default_value(&self) -> Value {
        if self.is_repeated() {
            return Value::List(Vec::new());
        }
        match self.kind() {
            FieldKind::Scalar(s) => s.default_value(),
            FieldKind::Enum => Value::EnumNumber(0),
            FieldKind::Message(m) | FieldKind::Group(m) => Value::Message(DynamicMessage::new(m)),
        }
    }

    fn sort_key(&self) -> (usize, usize, usize) {
        let (pool, message) = self.message.sort_key();
        (pool, message, self.index)
    }
}

impl PartialEq for FieldDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.message == other.message
    }
}

impl Eq for FieldDescriptor {}

impl Hash for FieldDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl PartialOrd for FieldDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldDescriptor({} = {})", self.full_name(), self.number())
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}
