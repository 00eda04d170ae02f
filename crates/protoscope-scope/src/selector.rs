//! Field selectors: the set of field paths set on reference messages.
//!
//! A [`FieldSelector`] is a tree keyed by [`FieldPathStep`]. A key is present
//! iff the reference message had that path set. For submessages, repeated
//! submessages, map entries and unknown groups the child tree is the
//! recursive merge of every element's own tree, so a path set in any
//! element counts.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use protoscope_types::{
    DynamicMessage, FieldDescriptor, FieldPathStep, MessageDescriptor, UnknownFieldSet, Value,
    WireType,
};

use crate::error::{ScopeError, ScopeLogicResult};

/// Immutable tree of field paths that were explicitly set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSelector {
    children: Arc<HashMap<FieldPathStep, FieldSelector>>,
    /// Type of the reference message; only recorded on root selectors.
    source: Option<MessageDescriptor>,
}

impl FieldSelector {
    /// The selector with no paths.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collect every path set on `message`, including unknown fields.
    pub fn from_message(message: &DynamicMessage) -> Self {
        let mut selector = Self::collect(message);
        selector.source = Some(message.descriptor().clone());
        selector
    }

    /// Merge the selectors of several reference messages of one type.
    pub fn from_messages<'a>(
        messages: impl IntoIterator<Item = &'a DynamicMessage>,
    ) -> ScopeLogicResult<Self> {
        let mut iter = messages.into_iter();
        let first = iter.next().ok_or(ScopeError::NoReferenceMessages)?;
        let mut selector = Self::collect(first);
        for message in iter {
            if message.descriptor() != first.descriptor() {
                return Err(ScopeError::MixedReferenceTypes {
                    first: first.descriptor().full_name().to_string(),
                    other: message.descriptor().full_name().to_string(),
                });
            }
            selector.merge(Self::collect(message));
        }
        selector.source = Some(first.descriptor().clone());
        Ok(selector)
    }

    fn collect(message: &DynamicMessage) -> Self {
        let mut children = HashMap::new();
        for (field, value) in message.present_fields() {
            let mut child = Self::empty();
            match value {
                Value::Message(m) => child.merge(Self::collect(m)),
                Value::List(items) => {
                    for item in items {
                        if let Value::Message(m) = item {
                            child.merge(Self::collect(m));
                        }
                    }
                }
                _ => {}
            }
            if field.is_map() {
                // An entry always holds its key and value, stored or not.
                child.merge(Self::entry_steps(&field));
            }
            children.insert(FieldPathStep::Field(field), child);
        }

        let mut selector = Self {
            children: Arc::new(children),
            source: None,
        };
        selector.merge(Self::collect_unknown(message.unknown_fields()));
        selector
    }

    /// Key and value steps of a map field's entry type.
    fn entry_steps(field: &FieldDescriptor) -> Self {
        let mut children = HashMap::new();
        for entry_field in [field.map_key_field(), field.map_value_field()]
            .into_iter()
            .flatten()
        {
            children.insert(FieldPathStep::Field(entry_field), Self::empty());
        }
        Self {
            children: Arc::new(children),
            source: None,
        }
    }

    fn collect_unknown(set: &UnknownFieldSet) -> Self {
        let mut children = HashMap::new();
        for (number, field) in set.iter() {
            for wire_type in field.wire_types() {
                let mut child = Self::empty();
                if wire_type == WireType::Group {
                    for group in &field.group {
                        child.merge(Self::collect_unknown(group));
                    }
                }
                children.insert(FieldPathStep::unknown(number, wire_type), child);
            }
        }
        Self {
            children: Arc::new(children),
            source: None,
        }
    }

    /// Union of keys; colliding keys merge their subtrees recursively.
    fn merge(&mut self, other: FieldSelector) {
        if other.children.is_empty() {
            return;
        }
        if self.children.is_empty() {
            self.children = other.children;
            return;
        }
        let theirs = Arc::try_unwrap(other.children).unwrap_or_else(|shared| (*shared).clone());
        let ours = Arc::make_mut(&mut self.children);
        for (step, subtree) in theirs {
            match ours.entry(step) {
                Entry::Occupied(mut slot) => slot.get_mut().merge(subtree),
                Entry::Vacant(slot) => {
                    slot.insert(subtree);
                }
            }
        }
    }

    /// Type of the reference message(s), for root selectors.
    pub fn source(&self) -> Option<&MessageDescriptor> {
        self.source.as_ref()
    }

    pub fn has_child(&self, step: &FieldPathStep) -> bool {
        self.children.contains_key(step)
    }

    /// The subtree under `step`, or the empty selector.
    pub fn child(&self, step: &FieldPathStep) -> FieldSelector {
        self.children.get(step).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn steps(&self) -> impl Iterator<Item = &FieldPathStep> {
        self.children.keys()
    }

    /// Walk `path` from the root; every step must exist. When `terminal` is
    /// given, the node reached must also have it as a child.
    pub fn matches(&self, path: &[FieldPathStep], terminal: Option<&FieldPathStep>) -> bool {
        let mut node = self;
        for step in path {
            match node.children.get(step) {
                Some(child) => node = child,
                None => return false,
            }
        }
        terminal.map_or(true, |step| node.has_child(step))
    }
}
