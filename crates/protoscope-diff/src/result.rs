//! The diff report tree.
//!
//! A [`DiffResult`] mirrors the compared message: one entry per visited
//! field, nested results for submessages and an [`UnknownFieldSetDiff`] for
//! unknown fields. Values are borrowed from the compared messages; schema
//! defaults substituted during the comparison are owned.

use std::borrow::Cow;
use std::fmt;

use protoscope_types::{FieldDescriptor, MapKey, MessageDescriptor, UnknownValue, Value, WireType};
use serde::{Serialize, Serializer};

use crate::error::EngineResult;

/// Outcome of one comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Matched,
    /// Present only in actual.
    Added,
    /// Present only in expected.
    Removed,
    Modified,
    /// Matched an element that appeared earlier than its expected position.
    MovedOutOfOrder,
    Ignored,
}

impl Verdict {
    /// `Matched` or `Ignored`.
    pub fn is_matched(self) -> bool {
        matches!(self, Self::Matched | Self::Ignored)
    }

    pub fn is_ignored(self) -> bool {
        self == Self::Ignored
    }

    /// Fold verdicts of children into one: all ignored, all matched, or
    /// modified.
    pub(crate) fn aggregate(verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        let mut all_ignored = true;
        let mut all_matched = true;
        for verdict in verdicts {
            all_ignored &= verdict.is_ignored();
            all_matched &= verdict.is_matched();
        }
        if all_ignored {
            Self::Ignored
        } else if all_matched {
            Self::Matched
        } else {
            Self::Modified
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Matched => "matched",
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::MovedOutOfOrder => "moved out of order",
            Self::Ignored => "ignored",
        };
        f.write_str(s)
    }
}

fn display<S: Serializer, T: fmt::Display>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

// ---------------------------------------------------------------------------
// Message level
// ---------------------------------------------------------------------------

/// Diff of two messages of one type.
#[derive(Clone, Debug, Serialize)]
pub struct DiffResult<'a> {
    #[serde(serialize_with = "display")]
    message_type: MessageDescriptor,
    fields: Vec<FieldDiff<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unknown: Option<UnknownFieldSetDiff<'a>>,
}

impl<'a> DiffResult<'a> {
    pub(crate) fn new(
        message_type: MessageDescriptor,
        fields: Vec<FieldDiff<'a>>,
        unknown: Option<UnknownFieldSetDiff<'a>>,
    ) -> Self {
        Self {
            message_type,
            fields,
            unknown,
        }
    }

    pub fn message_type(&self) -> &MessageDescriptor {
        &self.message_type
    }

    /// Every visited field, in field-number order.
    pub fn fields(&self) -> &[FieldDiff<'a>] {
        &self.fields
    }

    /// The singular field with `number`, if it was visited.
    pub fn field(&self, number: u32) -> Option<&SingularFieldDiff<'a>> {
        self.singular_fields().find(|f| f.field.number() == number)
    }

    /// The repeated or map field with `number`, if it was visited.
    pub fn repeated_field(&self, number: u32) -> Option<&RepeatedFieldDiff<'a>> {
        self.repeated_fields().find(|f| f.field.number() == number)
    }

    pub fn singular_fields(&self) -> impl Iterator<Item = &SingularFieldDiff<'a>> {
        self.fields.iter().filter_map(|f| match f {
            FieldDiff::Singular(s) => Some(s),
            FieldDiff::Repeated(_) => None,
        })
    }

    pub fn repeated_fields(&self) -> impl Iterator<Item = &RepeatedFieldDiff<'a>> {
        self.fields.iter().filter_map(|f| match f {
            FieldDiff::Repeated(r) => Some(r),
            FieldDiff::Singular(_) => None,
        })
    }

    /// Unknown-field comparison; `None` when unknown fields were skipped.
    pub fn unknown_fields(&self) -> Option<&UnknownFieldSetDiff<'a>> {
        self.unknown.as_ref()
    }

    /// Every entry matched or was ignored.
    pub fn is_matched(&self) -> bool {
        self.fields.iter().all(|f| f.verdict().is_matched())
            && self.unknown.as_ref().map_or(true, UnknownFieldSetDiff::is_matched)
    }

    /// Every entry was ignored. Vacuously true for an empty result.
    pub fn is_ignored(&self) -> bool {
        self.fields.iter().all(|f| f.verdict().is_ignored())
            && self.unknown.as_ref().map_or(true, UnknownFieldSetDiff::is_ignored)
    }

    /// Some entry, at any depth, was ignored.
    pub fn is_any_ignored(&self) -> bool {
        self.fields.iter().any(FieldDiff::is_any_ignored)
            || self.unknown.as_ref().is_some_and(UnknownFieldSetDiff::is_any_ignored)
    }

    /// Number of entries carrying `verdict`, at any depth.
    pub fn count(&self, verdict: Verdict) -> usize {
        self.fields.iter().map(|f| f.count(verdict)).sum::<usize>()
            + self.unknown.as_ref().map_or(0, |u| u.count(verdict))
    }

    pub fn to_json(&self) -> EngineResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// One declared field of a message.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldDiff<'a> {
    Singular(SingularFieldDiff<'a>),
    Repeated(RepeatedFieldDiff<'a>),
}

impl<'a> FieldDiff<'a> {
    pub fn field(&self) -> &FieldDescriptor {
        match self {
            Self::Singular(s) => &s.field,
            Self::Repeated(r) => &r.field,
        }
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Singular(s) => s.verdict,
            Self::Repeated(r) => r.verdict,
        }
    }

    fn is_any_ignored(&self) -> bool {
        match self {
            Self::Singular(s) => s.is_any_ignored(),
            Self::Repeated(r) => r.is_any_ignored(),
        }
    }

    fn count(&self, verdict: Verdict) -> usize {
        match self {
            Self::Singular(s) => s.count(verdict),
            Self::Repeated(r) => r.count(verdict),
        }
    }
}

// ---------------------------------------------------------------------------
// Field level
// ---------------------------------------------------------------------------

/// A singular field: scalar, enum or submessage.
#[derive(Clone, Debug, Serialize)]
pub struct SingularFieldDiff<'a> {
    #[serde(serialize_with = "display")]
    pub field: FieldDescriptor,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Cow<'a, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Cow<'a, Value>>,
    /// Nested diff for submessages that were compared field by field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Box<DiffResult<'a>>>,
}

impl SingularFieldDiff<'_> {
    fn is_any_ignored(&self) -> bool {
        self.verdict.is_ignored() || self.breakdown.as_ref().is_some_and(|b| b.is_any_ignored())
    }

    fn count(&self, verdict: Verdict) -> usize {
        usize::from(self.verdict == verdict)
            + self.breakdown.as_ref().map_or(0, |b| b.count(verdict))
    }
}

/// A repeated or map field.
#[derive(Clone, Debug, Serialize)]
pub struct RepeatedFieldDiff<'a> {
    #[serde(serialize_with = "display")]
    pub field: FieldDescriptor,
    pub verdict: Verdict,
    /// Raw elements; map entries for map fields.
    pub actual: &'a [Value],
    pub expected: &'a [Value],
    /// Element pairings. Empty when the whole field was ignored.
    pub pairs: Vec<PairResult<'a>>,
}

impl<'a> RepeatedFieldDiff<'a> {
    /// The pair for map key `key`.
    pub fn pair_for_key(&self, key: &MapKey) -> Option<&PairResult<'a>> {
        self.pairs.iter().find(|p| p.map_key.as_ref() == Some(key))
    }

    fn is_any_ignored(&self) -> bool {
        self.verdict.is_ignored() || self.pairs.iter().any(PairResult::is_any_ignored)
    }

    fn count(&self, verdict: Verdict) -> usize {
        usize::from(self.verdict == verdict)
            + self.pairs.iter().map(|p| p.count(verdict)).sum::<usize>()
    }
}

/// One element pairing of a repeated field, or one key of a map.
#[derive(Clone, Debug, Serialize)]
pub struct PairResult<'a> {
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_key: Option<MapKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Cow<'a, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Cow<'a, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Box<DiffResult<'a>>>,
}

impl PairResult<'_> {
    fn is_any_ignored(&self) -> bool {
        self.verdict.is_ignored() || self.breakdown.as_ref().is_some_and(|b| b.is_any_ignored())
    }

    fn count(&self, verdict: Verdict) -> usize {
        usize::from(self.verdict == verdict)
            + self.breakdown.as_ref().map_or(0, |b| b.count(verdict))
    }
}

// ---------------------------------------------------------------------------
// Unknown fields
// ---------------------------------------------------------------------------

/// Diff of two unknown-field sets.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UnknownFieldSetDiff<'a> {
    pub fields: Vec<UnknownFieldDiff<'a>>,
}

impl<'a> UnknownFieldSetDiff<'a> {
    pub fn is_matched(&self) -> bool {
        self.fields.iter().all(|f| f.verdict.is_matched())
    }

    pub fn is_ignored(&self) -> bool {
        self.fields.iter().all(|f| f.verdict.is_ignored())
    }

    pub fn is_any_ignored(&self) -> bool {
        self.fields.iter().any(|f| {
            f.verdict.is_ignored()
                || f.values.iter().any(|v| {
                    v.verdict.is_ignored()
                        || v.breakdown.as_ref().is_some_and(|b| b.is_any_ignored())
                })
        })
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.fields
            .iter()
            .map(|f| {
                usize::from(f.verdict == verdict)
                    + f.values
                        .iter()
                        .map(|v| {
                            usize::from(v.verdict == verdict)
                                + v.breakdown.as_ref().map_or(0, |b| b.count(verdict))
                        })
                        .sum::<usize>()
            })
            .sum()
    }

    /// The entry for (`number`, `wire_type`), if it was visited.
    pub fn get(&self, number: u32, wire_type: WireType) -> Option<&UnknownFieldDiff<'a>> {
        self.fields
            .iter()
            .find(|f| f.number == number && f.wire_type == wire_type)
    }
}

/// Payloads of one unknown field number under one wire type.
#[derive(Clone, Debug, Serialize)]
pub struct UnknownFieldDiff<'a> {
    pub number: u32,
    pub wire_type: WireType,
    pub verdict: Verdict,
    /// Payloads paired by index. Empty when the entry was ignored outright.
    pub values: Vec<UnknownValueDiff<'a>>,
}

/// One payload position of an unknown field.
#[derive(Clone, Debug, Serialize)]
pub struct UnknownValueDiff<'a> {
    pub index: usize,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<UnknownValue<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<UnknownValue<'a>>,
    /// Nested diff for group payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Box<UnknownFieldSetDiff<'a>>>,
}
