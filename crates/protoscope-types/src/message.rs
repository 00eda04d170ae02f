//! Dynamic, schema-described messages.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::descriptor::{FieldDescriptor, FieldKind, MessageDescriptor};
use crate::error::{TypeError, TypeResult};
use crate::unknown::UnknownFieldSet;
use crate::value::{MapKey, Value};

/// A message value whose layout is described by a [`MessageDescriptor`].
///
/// Only present fields are stored. A field is present when it holds a
/// non-empty list, or a singular value that is either non-default or
/// declared with explicit presence. Values are type-checked on every write.
#[derive(Clone)]
pub struct DynamicMessage {
    descriptor: MessageDescriptor,
    fields: BTreeMap<u32, Value>,
    unknown_fields: UnknownFieldSet,
}

impl DynamicMessage {
    /// An empty (default) instance of `descriptor`.
    pub fn new(descriptor: MessageDescriptor) -> Self {
        Self {
            descriptor,
            fields: BTreeMap::new(),
            unknown_fields: UnknownFieldSet::new(),
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    /// Returns `true` if no declared or unknown field is present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unknown_fields.is_empty()
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn has_field(&self, field: &FieldDescriptor) -> bool {
        field.containing_type() == &self.descriptor && self.fields.contains_key(&field.number())
    }

    /// The stored value, or `None` when the field is absent.
    pub fn get_field(&self, field: &FieldDescriptor) -> Option<&Value> {
        if field.containing_type() != &self.descriptor {
            return None;
        }
        self.fields.get(&field.number())
    }

    /// The stored value, falling back to the schema default.
    pub fn get_field_or_default(&self, field: &FieldDescriptor) -> Cow<'_, Value> {
        match self.get_field(field) {
            Some(v) => Cow::Borrowed(v),
            None => Cow::Owned(field.default_value()),
        }
    }

    pub fn get_field_by_name(&self, name: &str) -> Option<&Value> {
        let field = self.descriptor.field_by_name(name)?;
        self.fields.get(&field.number())
    }

    /// Present declared fields in field-number order.
    pub fn present_fields(&self) -> impl Iterator<Item = (FieldDescriptor, &Value)> + '_ {
        self.fields.iter().filter_map(move |(number, value)| {
            self.descriptor
                .field_by_number(*number)
                .map(|field| (field, value))
        })
    }

    pub fn unknown_fields(&self) -> &UnknownFieldSet {
        &self.unknown_fields
    }

    pub fn unknown_fields_mut(&mut self) -> &mut UnknownFieldSet {
        &mut self.unknown_fields
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Store `value` in `field`, replacing any previous value.
    pub fn set_field(&mut self, field: &FieldDescriptor, value: Value) -> TypeResult<()> {
        if field.containing_type() != &self.descriptor {
            return Err(TypeError::ForeignField {
                message: self.descriptor.full_name().to_string(),
                field: field.full_name().to_string(),
            });
        }
        check_value(field, &value)?;

        let absent = match &value {
            Value::List(items) => items.is_empty(),
            v => !field.has_presence() && *v == field.default_value(),
        };
        if absent {
            self.fields.remove(&field.number());
        } else {
            self.fields.insert(field.number(), value);
        }
        Ok(())
    }

    pub fn set_field_by_name(&mut self, name: &str, value: impl Into<Value>) -> TypeResult<()> {
        let field = self.field_named(name)?;
        self.set_field(&field, value.into())
    }

    pub fn set_field_by_number(&mut self, number: u32, value: impl Into<Value>) -> TypeResult<()> {
        let field = self
            .descriptor
            .field_by_number(number)
            .ok_or_else(|| TypeError::UnknownField {
                message: self.descriptor.full_name().to_string(),
                field: number.to_string(),
            })?;
        self.set_field(&field, value.into())
    }

    /// Builder-style [`Self::set_field_by_name`].
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> TypeResult<Self> {
        self.set_field_by_name(name, value)?;
        Ok(self)
    }

    /// Append one element to a repeated (non-map) field.
    pub fn push_repeated(&mut self, name: &str, value: impl Into<Value>) -> TypeResult<()> {
        let field = self.field_named(name)?;
        let value = value.into();
        if !field.is_repeated() || field.is_map() || !value.is_valid_for(&field.kind()) {
            return Err(mismatch(&field, &value));
        }
        match self.fields.entry(field.number()).or_insert_with(|| Value::List(Vec::new())) {
            Value::List(items) => items.push(value),
            other => return Err(mismatch(&field, other)),
        }
        Ok(())
    }

    /// Append a key/value entry to a map field, in wire order.
    ///
    /// Duplicate keys are kept; readers take the last entry for a key.
    pub fn insert_map_entry(
        &mut self,
        name: &str,
        key: impl Into<MapKey>,
        value: impl Into<Value>,
    ) -> TypeResult<()> {
        let field = self.field_named(name)?;
        let (Some(entry_type), Some(key_field), Some(value_field)) = (
            field.message_type(),
            field.map_key_field(),
            field.map_value_field(),
        ) else {
            return Err(TypeError::TypeMismatch {
                field: field.full_name().to_string(),
                expected: "map field".into(),
                actual: field.kind().name(),
            });
        };
        let mut entry = DynamicMessage::new(entry_type);
        entry.set_field(&key_field, Value::from(key.into()))?;
        entry.set_field(&value_field, value.into())?;
        match self.fields.entry(field.number()).or_insert_with(|| Value::List(Vec::new())) {
            Value::List(items) => items.push(Value::Message(entry)),
            other => return Err(mismatch(&field, other)),
        }
        Ok(())
    }

    pub fn clear_field(&mut self, field: &FieldDescriptor) {
        if field.containing_type() == &self.descriptor {
            self.fields.remove(&field.number());
        }
    }

    fn field_named(&self, name: &str) -> TypeResult<FieldDescriptor> {
        self.descriptor
            .field_by_name(name)
            .ok_or_else(|| TypeError::UnknownField {
                message: self.descriptor.full_name().to_string(),
                field: name.to_string(),
            })
    }
}

fn mismatch(field: &FieldDescriptor, value: &Value) -> TypeError {
    let expected = if field.is_repeated() {
        format!("list of {}", field.kind().name())
    } else {
        field.kind().name()
    };
    TypeError::TypeMismatch {
        field: field.full_name().to_string(),
        expected,
        actual: value.kind_name().to_string(),
    }
}

fn check_value(field: &FieldDescriptor, value: &Value) -> TypeResult<()> {
    let kind: FieldKind = field.kind();
    let valid = match (field.is_repeated(), value) {
        (true, Value::List(items)) => items.iter().all(|item| item.is_valid_for(&kind)),
        (true, _) | (false, Value::List(_)) => false,
        (false, v) => v.is_valid_for(&kind),
    };
    if valid {
        Ok(())
    } else {
        Err(mismatch(field, value))
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
            && self.fields == other.fields
            && self.unknown_fields == other.unknown_fields
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.descriptor.full_name());
        for (field, value) in self.present_fields() {
            s.field(field.name(), value);
        }
        if !self.unknown_fields.is_empty() {
            s.field("<unknown>", &self.unknown_fields);
        }
        s.finish()
    }
}

impl Serialize for DynamicMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let unknown = !self.unknown_fields.is_empty();
        let mut map = serializer.serialize_map(Some(self.fields.len() + usize::from(unknown)))?;
        for (field, value) in self.present_fields() {
            map.serialize_entry(field.name(), value)?;
        }
        if unknown {
            map.serialize_entry("@unknown", &self.unknown_fields)?;
        }
        map.end()
    }
}
