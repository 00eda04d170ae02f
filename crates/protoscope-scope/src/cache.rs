//! Per-comparison memo of scope decisions.
//!
//! Scope nodes are immutable, so a decision for (node, step) never changes
//! while the node is alive. A [`ScopeCache`] records decisions and
//! sub-scopes for one comparison and is dropped with it. Each entry holds a
//! handle to its node, so a node address cannot be recycled for a different
//! node while the cache exists.
//!
//! Caches are deliberately not shared: every top-level comparison allocates
//! its own.

use std::collections::HashMap;

use protoscope_types::{FieldPathStep, MessageDescriptor};

use crate::logic::{ScopeLogic, ScopeNode};
use crate::result::ScopeResult;

struct CacheEntry {
    _node: ScopeLogic,
    policy: ScopeResult,
    sub_scope: Option<ScopeLogic>,
}

/// Memo of scope decisions for comparisons rooted at one message type.
pub struct ScopeCache {
    root: MessageDescriptor,
    entries: HashMap<(usize, FieldPathStep), CacheEntry>,
    hits: u64,
}

impl ScopeCache {
    pub fn new(root: MessageDescriptor) -> Self {
        Self {
            root,
            entries: HashMap::new(),
            hits: 0,
        }
    }

    /// The root type every query is evaluated against.
    pub fn root(&self) -> &MessageDescriptor {
        &self.root
    }

    /// Number of memoized (node, step) pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of queries answered from the memo.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Decide `step` under `logic`.
    pub fn policy_for(&mut self, logic: &ScopeLogic, step: &FieldPathStep) -> ScopeResult {
        let key = (logic.id(), step.clone());
        if let Some(entry) = self.entries.get(&key) {
            self.hits += 1;
            return entry.policy;
        }

        let policy = match logic.node() {
            ScopeNode::All => ScopeResult::IncludedRecursive,
            ScopeNode::None => ScopeResult::ExcludedRecursive,
            ScopeNode::BySelector(selector) => {
                if selector.has_child(step) {
                    ScopeResult::IncludedNonrecursive
                } else {
                    ScopeResult::ExcludedRecursive
                }
            }
            ScopeNode::ByFieldNumbers { numbers, recursive } => match step {
                FieldPathStep::Unknown { .. } => ScopeResult::ExcludedRecursive,
                FieldPathStep::Field(field) => {
                    if field.containing_type() == &self.root && numbers.contains(&field.number()) {
                        ScopeResult::of(true, *recursive)
                    } else {
                        // A descendant may still match, and the schema may be
                        // cyclic, so a miss is never recursive.
                        ScopeResult::ExcludedNonrecursive
                    }
                }
            },
            ScopeNode::ByFieldDescriptors { fields, recursive } => match step {
                FieldPathStep::Unknown { .. } => ScopeResult::ExcludedRecursive,
                FieldPathStep::Field(field) => {
                    if fields.contains(field) {
                        ScopeResult::of(true, *recursive)
                    } else {
                        ScopeResult::ExcludedNonrecursive
                    }
                }
            },
            ScopeNode::Intersect(a, b) => {
                let left = self.policy_for(a, step);
                let right = self.policy_for(b, step);
                left.intersect(right)
            }
            ScopeNode::Union(a, b) => {
                let left = self.policy_for(a, step);
                let right = self.policy_for(b, step);
                left.union(right)
            }
            ScopeNode::Negate(inner) => self.policy_for(inner, step).negate(),
        };

        self.entries.insert(
            key,
            CacheEntry {
                _node: logic.clone(),
                policy,
                sub_scope: None,
            },
        );
        policy
    }

    /// The scope for the children of `step` under `logic`.
    ///
    /// Recursive decisions return the constant `all`/`none` scope without
    /// visiting compound children. A compound whose children are unchanged
    /// is returned as is, so a cyclic chain keeps hitting the same entries.
    pub fn sub_scope(&mut self, logic: &ScopeLogic, step: &FieldPathStep) -> ScopeLogic {
        let policy = self.policy_for(logic, step);
        if policy.recursive() {
            return if policy.included() {
                ScopeLogic::all()
            } else {
                ScopeLogic::none()
            };
        }

        let key = (logic.id(), step.clone());
        if let Some(sub) = self.entries.get(&key).and_then(|e| e.sub_scope.clone()) {
            self.hits += 1;
            return sub;
        }

        let sub = match logic.node() {
            ScopeNode::All | ScopeNode::None => logic.clone(),
            ScopeNode::BySelector(selector) => {
                let child = selector.child(step);
                if child.is_empty() {
                    ScopeLogic::none()
                } else {
                    ScopeLogic::from_selector(child)
                }
            }
            ScopeNode::ByFieldNumbers { .. } | ScopeNode::ByFieldDescriptors { .. } => {
                logic.clone()
            }
            ScopeNode::Intersect(a, b) => {
                let left = self.sub_scope(a, step);
                let right = self.sub_scope(b, step);
                if left.ptr_eq(a) && right.ptr_eq(b) {
                    logic.clone()
                } else {
                    left.intersect(&right)
                }
            }
            ScopeNode::Union(a, b) => {
                let left = self.sub_scope(a, step);
                let right = self.sub_scope(b, step);
                if left.ptr_eq(a) && right.ptr_eq(b) {
                    logic.clone()
                } else {
                    left.union(&right)
                }
            }
            ScopeNode::Negate(inner) => {
                let sub = self.sub_scope(inner, step);
                if sub.ptr_eq(inner) {
                    logic.clone()
                } else {
                    sub.negate()
                }
            }
        };

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.sub_scope = Some(sub.clone());
        }
        sub
    }
}
