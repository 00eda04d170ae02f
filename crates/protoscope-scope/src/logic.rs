//! Composable field-scope logic.
//!
//! A [`ScopeLogic`] is an immutable, shareable expression over field paths.
//! Leaves select fields (everything, nothing, fields set on a reference
//! message, fields by number, fields by descriptor); compound nodes
//! intersect, unite, or negate other scopes.
//!
//! Querying a scope for one [`FieldPathStep`] yields a [`ScopeResult`], and
//! [`ScopeLogic::sub_scope`] yields the scope to apply to that field's
//! children. Recursive results collapse the sub-scope to the constant
//! [`ScopeLogic::all`] / [`ScopeLogic::none`], which is what keeps deep and
//! cyclic schemas cheap.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use protoscope_types::{DynamicMessage, FieldDescriptor, FieldPathStep, MessageDescriptor};

use crate::cache::ScopeCache;
use crate::error::ScopeLogicResult;
use crate::result::ScopeResult;
use crate::selector::FieldSelector;

static ALL: LazyLock<ScopeLogic> = LazyLock::new(|| ScopeLogic::from_node(ScopeNode::All));
static NONE: LazyLock<ScopeLogic> = LazyLock::new(|| ScopeLogic::from_node(ScopeNode::None));

/// The closed set of scope expressions.
#[derive(Debug)]
pub enum ScopeNode {
    /// Every field, recursively.
    All,
    /// No field, recursively.
    None,
    /// Fields set on the reference message(s) the selector was built from.
    BySelector(FieldSelector),
    /// Fields of the root type with one of these numbers.
    ByFieldNumbers {
        numbers: BTreeSet<u32>,
        recursive: bool,
    },
    /// These exact fields, at any depth.
    ByFieldDescriptors {
        fields: BTreeSet<FieldDescriptor>,
        recursive: bool,
    },
    Intersect(ScopeLogic, ScopeLogic),
    Union(ScopeLogic, ScopeLogic),
    Negate(ScopeLogic),
}

/// Shared handle to an immutable [`ScopeNode`].
#[derive(Clone)]
pub struct ScopeLogic {
    node: Arc<ScopeNode>,
}

impl ScopeLogic {
    pub(crate) fn from_node(node: ScopeNode) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    pub fn node(&self) -> &ScopeNode {
        &self.node
    }

    /// Node identity, stable while any handle to the node is alive.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.node) as usize
    }

    /// Returns `true` if both handles point at the same node.
    pub fn ptr_eq(&self, other: &ScopeLogic) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    // ---------------------------------------------------------------
    // Leaves
    // ---------------------------------------------------------------

    pub fn all() -> Self {
        ALL.clone()
    }

    pub fn none() -> Self {
        NONE.clone()
    }

    pub fn is_all(&self) -> bool {
        matches!(*self.node, ScopeNode::All)
    }

    pub fn is_none(&self) -> bool {
        matches!(*self.node, ScopeNode::None)
    }

    /// Scope over the paths recorded in `selector`.
    pub fn from_selector(selector: FieldSelector) -> Self {
        Self::from_node(ScopeNode::BySelector(selector))
    }

    /// Scope over the fields set on `message`.
    pub fn from_set_fields(message: &DynamicMessage) -> Self {
        Self::from_selector(FieldSelector::from_message(message))
    }

    /// Scope over the fields set on any of `messages`, which must share a type.
    pub fn from_set_fields_of<'a>(
        messages: impl IntoIterator<Item = &'a DynamicMessage>,
    ) -> ScopeLogicResult<Self> {
        FieldSelector::from_messages(messages).map(Self::from_selector)
    }

    /// Fields of the root type with the given numbers. With `recursive`,
    /// a match also covers the field's whole subtree.
    pub fn field_numbers(numbers: impl IntoIterator<Item = u32>, recursive: bool) -> Self {
        Self::from_node(ScopeNode::ByFieldNumbers {
            numbers: numbers.into_iter().collect(),
            recursive,
        })
    }

    /// The given fields wherever they occur.
    pub fn field_descriptors(
        fields: impl IntoIterator<Item = FieldDescriptor>,
        recursive: bool,
    ) -> Self {
        Self::from_node(ScopeNode::ByFieldDescriptors {
            fields: fields.into_iter().collect(),
            recursive,
        })
    }

    // ---------------------------------------------------------------
    // Combinators
    // ---------------------------------------------------------------

    pub fn intersect(&self, other: &ScopeLogic) -> Self {
        if self.is_all() || other.is_none() {
            return other.clone();
        }
        if other.is_all() || self.is_none() {
            return self.clone();
        }
        Self::from_node(ScopeNode::Intersect(self.clone(), other.clone()))
    }

    pub fn union(&self, other: &ScopeLogic) -> Self {
        if self.is_none() || other.is_all() {
            return other.clone();
        }
        if other.is_none() || self.is_all() {
            return self.clone();
        }
        Self::from_node(ScopeNode::Union(self.clone(), other.clone()))
    }

    pub fn negate(&self) -> Self {
        match &*self.node {
            ScopeNode::All => Self::none(),
            ScopeNode::None => Self::all(),
            ScopeNode::Negate(inner) => inner.clone(),
            _ => Self::from_node(ScopeNode::Negate(self.clone())),
        }
    }

    /// Right fold of [`Self::intersect`]; the empty intersection is `all`.
    pub fn intersect_all(scopes: impl IntoIterator<Item = ScopeLogic>) -> Self {
        let scopes: Vec<_> = scopes.into_iter().collect();
        scopes
            .into_iter()
            .rev()
            .reduce(|acc, scope| scope.intersect(&acc))
            .unwrap_or_else(Self::all)
    }

    /// Right fold of [`Self::union`]; the empty union is `none`.
    pub fn union_all(scopes: impl IntoIterator<Item = ScopeLogic>) -> Self {
        let scopes: Vec<_> = scopes.into_iter().collect();
        scopes
            .into_iter()
            .rev()
            .reduce(|acc, scope| scope.union(&acc))
            .unwrap_or_else(Self::none)
    }

    /// This scope minus the given top-level field numbers and their subtrees.
    pub fn ignoring_fields(&self, numbers: impl IntoIterator<Item = u32>) -> Self {
        self.intersect(&Self::field_numbers(numbers, true).negate())
    }

    /// This scope minus the given fields (at any depth) and their subtrees.
    pub fn ignoring_field_descriptors(
        &self,
        fields: impl IntoIterator<Item = FieldDescriptor>,
    ) -> Self {
        self.intersect(&Self::field_descriptors(fields, true).negate())
    }

    /// This scope plus the given top-level field numbers and their subtrees.
    pub fn allowing_fields(&self, numbers: impl IntoIterator<Item = u32>) -> Self {
        self.union(&Self::field_numbers(numbers, true))
    }

    /// This scope plus the given fields (at any depth) and their subtrees.
    pub fn allowing_field_descriptors(
        &self,
        fields: impl IntoIterator<Item = FieldDescriptor>,
    ) -> Self {
        self.union(&Self::field_descriptors(fields, true))
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Decide `step` for a comparison rooted at `root`.
    ///
    /// Uses a throwaway cache; the diff engine threads one [`ScopeCache`]
    /// through a whole comparison instead.
    pub fn policy_for(&self, root: &MessageDescriptor, step: &FieldPathStep) -> ScopeResult {
        ScopeCache::new(root.clone()).policy_for(self, step)
    }

    /// The scope to apply to the children of `step`.
    pub fn sub_scope(&self, root: &MessageDescriptor, step: &FieldPathStep) -> ScopeLogic {
        ScopeCache::new(root.clone()).sub_scope(self, step)
    }

    pub fn contains(&self, root: &MessageDescriptor, step: &FieldPathStep) -> bool {
        self.policy_for(root, step).included()
    }
}

impl Default for ScopeLogic {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for ScopeLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ScopeLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = |recursive: bool| if recursive { "*" } else { "" };
        match &*self.node {
            ScopeNode::All => f.write_str("all"),
            ScopeNode::None => f.write_str("none"),
            ScopeNode::BySelector(selector) => match selector.source() {
                Some(source) => write!(f, "set_fields({source}; {})", selector.len()),
                None => write!(f, "set_fields({})", selector.len()),
            },
            ScopeNode::ByFieldNumbers { numbers, recursive } => {
                write!(f, "numbers{numbers:?}{}", marker(*recursive))
            }
            ScopeNode::ByFieldDescriptors { fields, recursive } => {
                let names: Vec<&str> = fields.iter().map(|d| d.full_name()).collect();
                write!(f, "fields{names:?}{}", marker(*recursive))
            }
            ScopeNode::Intersect(a, b) => write!(f, "({a} & {b})"),
            ScopeNode::Union(a, b) => write!(f, "({a} | {b})"),
            ScopeNode::Negate(a) => write!(f, "!{a}"),
        }
    }
}
