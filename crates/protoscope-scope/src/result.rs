//! The four-valued outcome of a scope query.

use serde::Serialize;

/// Whether a field is in scope, and whether that decision is known to hold
/// for the field's entire subtree.
///
/// Recursive results let the engine prune: an `ExcludedRecursive` field is
/// never visited, and an `IncludedRecursive` field's children are compared
/// without further scope queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeResult {
    IncludedRecursive,
    IncludedNonrecursive,
    ExcludedRecursive,
    ExcludedNonrecursive,
}

impl ScopeResult {
    pub const fn of(included: bool, recursive: bool) -> Self {
        match (included, recursive) {
            (true, true) => Self::IncludedRecursive,
            (true, false) => Self::IncludedNonrecursive,
            (false, true) => Self::ExcludedRecursive,
            (false, false) => Self::ExcludedNonrecursive,
        }
    }

    pub const fn included(self) -> bool {
        matches!(self, Self::IncludedRecursive | Self::IncludedNonrecursive)
    }

    pub const fn recursive(self) -> bool {
        matches!(self, Self::IncludedRecursive | Self::ExcludedRecursive)
    }

    /// Included iff both are. A recursive exclusion on either side decides
    /// the whole subtree; an inclusion is recursive only if both are.
    pub const fn intersect(self, other: Self) -> Self {
        match (self.included(), other.included()) {
            (true, true) => Self::of(true, self.recursive() && other.recursive()),
            (false, false) => Self::of(false, self.recursive() || other.recursive()),
            (false, true) => Self::of(false, self.recursive()),
            (true, false) => Self::of(false, other.recursive()),
        }
    }

    /// Dual of [`Self::intersect`].
    pub const fn union(self, other: Self) -> Self {
        match (self.included(), other.included()) {
            (false, false) => Self::of(false, self.recursive() && other.recursive()),
            (true, true) => Self::of(true, self.recursive() || other.recursive()),
            (true, false) => Self::of(true, self.recursive()),
            (false, true) => Self::of(true, other.recursive()),
        }
    }

    pub const fn negate(self) -> Self {
        Self::of(!self.included(), self.recursive())
    }
}
