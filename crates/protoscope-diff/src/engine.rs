//! The structural diff engine.
//!
//! A [`DiffEngine`] is built once per root type, scope and policy. Building
//! validates the scope and every policy scope against the root type; each
//! [`DiffEngine::diff`] call then walks both messages together, querying the
//! scope per field through a [`ScopeCache`] that lives for that call only.
//!
//! # Repeated fields
//!
//! - By index (default): elements are paired by position; the shorter list
//!   is padded with absent values.
//! - Ignoring order: each actual element, in order, is paired with the first
//!   remaining expected element it fully matches.
//! - Subsequence (extra elements ignored, order kept, expected non-empty):
//!   expected elements are found in actual in order; an element found only
//!   among skipped actual elements is `MovedOutOfOrder`.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, VecDeque};

use protoscope_scope::{ScopeCache, ScopeLogic, ScopeResult};
use protoscope_types::{
    DynamicMessage, FieldDescriptor, FieldPathStep, MapKey, MessageDescriptor, UnknownFieldSet,
    UnknownValue, Value, WireType,
};
use tracing::{debug, trace};

use crate::config::{DiffPolicy, ToleranceMap};
use crate::error::{DiffError, EngineResult};
use crate::result::{
    DiffResult, FieldDiff, PairResult, RepeatedFieldDiff, SingularFieldDiff, UnknownFieldDiff,
    UnknownFieldSetDiff, UnknownValueDiff, Verdict,
};

/// Compare two messages with a one-off engine.
///
/// Both messages must share one type; `scope` and `policy` are validated
/// against it before any comparison work.
pub fn diff<'a>(
    actual: &'a DynamicMessage,
    expected: &'a DynamicMessage,
    scope: &ScopeLogic,
    policy: &DiffPolicy,
) -> EngineResult<DiffResult<'a>> {
    if actual.descriptor() != expected.descriptor() {
        return Err(DiffError::mismatch(
            "expected",
            actual.descriptor(),
            expected.descriptor(),
        ));
    }
    DiffEngine::new(actual.descriptor().clone(), scope.clone(), policy.clone())?
        .diff(actual, expected)
}

/// A validated comparison setup for one root message type.
#[derive(Clone, Debug)]
pub struct DiffEngine {
    root: MessageDescriptor,
    scope: ScopeLogic,
    policy: DiffPolicy,
}

impl DiffEngine {
    /// Validate `scope` and `policy` against `root`.
    pub fn new(root: MessageDescriptor, scope: ScopeLogic, policy: DiffPolicy) -> EngineResult<Self> {
        scope.validate(&root)?;
        policy.validate(&root)?;
        debug!(
            message = %root,
            scope = %scope,
            expected_fields_only = policy.compare_expected_fields_only,
            "diff engine ready"
        );
        Ok(Self {
            root,
            scope,
            policy,
        })
    }

    pub fn root(&self) -> &MessageDescriptor {
        &self.root
    }

    pub fn scope(&self) -> &ScopeLogic {
        &self.scope
    }

    pub fn policy(&self) -> &DiffPolicy {
        &self.policy
    }

    /// Compare `actual` against `expected`.
    pub fn diff<'a>(
        &self,
        actual: &'a DynamicMessage,
        expected: &'a DynamicMessage,
    ) -> EngineResult<DiffResult<'a>> {
        for (side, message) in [("actual", actual), ("expected", expected)] {
            if message.descriptor() != &self.root {
                return Err(DiffError::mismatch(side, &self.root, message.descriptor()));
            }
        }

        let scope = if self.policy.compare_expected_fields_only {
            self.scope.intersect(&ScopeLogic::from_set_fields(expected))
        } else {
            self.scope.clone()
        };
        let scopes = Scopes {
            scope,
            absence: self.policy.ignore_field_absence.clone(),
            order: self.policy.ignore_repeated_field_order.clone(),
            extra: self.policy.ignore_extra_repeated_field_elements.clone(),
            doubles: self.policy.double_tolerance.clone(),
            floats: self.policy.float_tolerance.clone(),
        };

        let mut walk = Walk {
            cache: ScopeCache::new(self.root.clone()),
        };
        let result = walk.message(Some(actual), Some(expected), &self.root, &scopes);

        debug!(
            message = %self.root,
            matched = result.is_matched(),
            modified = result.count(Verdict::Modified),
            added = result.count(Verdict::Added),
            removed = result.count(Verdict::Removed),
            moved = result.count(Verdict::MovedOutOfOrder),
            ignored = result.count(Verdict::Ignored),
            cache_entries = walk.cache.len(),
            cache_hits = walk.cache.hits(),
            "diff complete"
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Scopes in effect at one message level
// ---------------------------------------------------------------------------

struct Scopes {
    scope: ScopeLogic,
    absence: ScopeLogic,
    order: ScopeLogic,
    extra: ScopeLogic,
    doubles: ToleranceMap<f64>,
    floats: ToleranceMap<f32>,
}

impl Scopes {
    fn descend(&self, cache: &mut ScopeCache, step: &FieldPathStep) -> Self {
        Self {
            scope: cache.sub_scope(&self.scope, step),
            absence: cache.sub_scope(&self.absence, step),
            order: cache.sub_scope(&self.order, step),
            extra: cache.sub_scope(&self.extra, step),
            doubles: self.doubles.descend(cache, step),
            floats: self.floats.descend(cache, step),
        }
    }

    fn flags(&self, cache: &mut ScopeCache, step: &FieldPathStep) -> Flags {
        Flags {
            policy: cache.policy_for(&self.scope, step),
            ignore_absence: cache.policy_for(&self.absence, step).included(),
            ignore_order: cache.policy_for(&self.order, step).included(),
            ignore_extra: cache.policy_for(&self.extra, step).included(),
            double_tolerance: self.doubles.lookup(cache, step),
            float_tolerance: self.floats.lookup(cache, step),
        }
    }
}

/// Policy decisions for one field.
struct Flags {
    policy: ScopeResult,
    ignore_absence: bool,
    ignore_order: bool,
    ignore_extra: bool,
    double_tolerance: Option<f64>,
    float_tolerance: Option<f32>,
}

impl Flags {
    fn scalars_equal(&self, actual: &Value, expected: &Value) -> bool {
        match (actual, expected) {
            (Value::F64(a), Value::F64(e)) => match self.double_tolerance {
                Some(tolerance) => a.is_finite() && e.is_finite() && (a - e).abs() <= tolerance,
                None => a == e,
            },
            (Value::F32(a), Value::F32(e)) => match self.float_tolerance {
                Some(tolerance) => a.is_finite() && e.is_finite() && (a - e).abs() <= tolerance,
                None => a == e,
            },
            _ => actual == expected,
        }
    }
}

struct Outcome<'a> {
    verdict: Verdict,
    breakdown: Option<Box<DiffResult<'a>>>,
}

impl Outcome<'_> {
    fn leaf(verdict: Verdict) -> Self {
        Self {
            verdict,
            breakdown: None,
        }
    }
}

/// Present message for a value; owned values are substituted defaults, which
/// compare as the empty default instance.
fn message_side<'a>(value: &Cow<'a, Value>) -> Option<&'a DynamicMessage> {
    match *value {
        Cow::Borrowed(v) => v.as_message(),
        Cow::Owned(_) => None,
    }
}

fn list_of<'a>(message: Option<&'a DynamicMessage>, field: &FieldDescriptor) -> &'a [Value] {
    message
        .and_then(|m| m.get_field(field))
        .and_then(Value::as_list)
        .unwrap_or(&[])
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

/// State of one `diff` call.
struct Walk {
    cache: ScopeCache,
}

impl Walk {
    /// Compare two messages of `descriptor`. `None` stands for the default
    /// instance.
    fn message<'a>(
        &mut self,
        actual: Option<&'a DynamicMessage>,
        expected: Option<&'a DynamicMessage>,
        descriptor: &MessageDescriptor,
        scopes: &Scopes,
    ) -> DiffResult<'a> {
        let mut present = BTreeSet::new();
        for message in [actual, expected].into_iter().flatten() {
            present.extend(message.present_fields().map(|(field, _)| field));
        }

        let mut fields = Vec::with_capacity(present.len());
        for field in present {
            if let Some(diff) = self.field(actual, expected, field, scopes) {
                fields.push(diff);
            }
        }

        let unknown = if scopes.absence.is_all() {
            None
        } else {
            Some(self.unknown_set(
                actual.map(DynamicMessage::unknown_fields),
                expected.map(DynamicMessage::unknown_fields),
                scopes,
            ))
        };

        DiffResult::new(descriptor.clone(), fields, unknown)
    }

    fn field<'a>(
        &mut self,
        actual: Option<&'a DynamicMessage>,
        expected: Option<&'a DynamicMessage>,
        field: FieldDescriptor,
        scopes: &Scopes,
    ) -> Option<FieldDiff<'a>> {
        let step = FieldPathStep::field(&field);
        let flags = scopes.flags(&mut self.cache, &step);

        if flags.policy == ScopeResult::ExcludedRecursive {
            trace!(field = %field, "excluded subtree skipped");
            return Some(ignored_field(actual, expected, field));
        }

        if field.is_map() {
            let sub = scopes.descend(&mut self.cache, &step);
            self.map(actual, expected, field, &flags, &sub)
                .map(FieldDiff::Repeated)
        } else if field.is_repeated() {
            let descended;
            let sub = if field.message_type().is_some() {
                descended = scopes.descend(&mut self.cache, &step);
                &descended
            } else {
                scopes
            };
            self.repeated(actual, expected, field, &flags, sub)
                .map(FieldDiff::Repeated)
        } else {
            let descended;
            let sub = if field.message_type().is_some() {
                descended = scopes.descend(&mut self.cache, &step);
                &descended
            } else {
                scopes
            };
            Some(FieldDiff::Singular(
                self.singular(actual, expected, field, &flags, sub),
            ))
        }
    }

    // -----------------------------------------------------------------------
    // Singular fields and element values
    // -----------------------------------------------------------------------

    fn singular<'a>(
        &mut self,
        actual: Option<&'a DynamicMessage>,
        expected: Option<&'a DynamicMessage>,
        field: FieldDescriptor,
        flags: &Flags,
        sub: &Scopes,
    ) -> SingularFieldDiff<'a> {
        let lookup = |message: Option<&'a DynamicMessage>| {
            let value = message.and_then(|m| m.get_field(&field)).map(Cow::Borrowed);
            if flags.ignore_absence {
                value.or_else(|| Some(Cow::Owned(field.default_value())))
            } else {
                value
            }
        };
        let actual = lookup(actual);
        let expected = lookup(expected);

        let outcome = self.values(&field, actual.as_ref(), expected.as_ref(), flags, sub);
        SingularFieldDiff {
            field,
            verdict: outcome.verdict,
            actual,
            expected,
            breakdown: outcome.breakdown,
        }
    }

    /// Compare one value position of `field`. Message values recurse with
    /// `sub`; an excluded position whose subtree is entirely ignored
    /// collapses to `Ignored`.
    fn values<'a>(
        &mut self,
        field: &FieldDescriptor,
        actual: Option<&Cow<'a, Value>>,
        expected: Option<&Cow<'a, Value>>,
        flags: &Flags,
        sub: &Scopes,
    ) -> Outcome<'a> {
        let included = flags.policy.included();
        let one_sided = match (actual, expected) {
            (Some(_), None) => Some(Verdict::Added),
            (None, Some(_)) => Some(Verdict::Removed),
            _ => None,
        };

        let Some(message_type) = field.message_type() else {
            return match (actual, expected) {
                _ if !included => Outcome::leaf(Verdict::Ignored),
                (Some(a), Some(e)) if flags.scalars_equal(a, e) => Outcome::leaf(Verdict::Matched),
                (Some(_), Some(_)) => Outcome::leaf(Verdict::Modified),
                _ => Outcome::leaf(one_sided.unwrap_or(Verdict::Matched)),
            };
        };

        if let Some(verdict) = one_sided {
            if included {
                return Outcome::leaf(verdict);
            }
        }

        let result = self.message(
            actual.and_then(message_side),
            expected.and_then(message_side),
            &message_type,
            sub,
        );
        if !included && result.is_ignored() {
            return Outcome::leaf(Verdict::Ignored);
        }
        let verdict = match one_sided {
            Some(verdict) => verdict,
            None if result.is_matched() => Verdict::Matched,
            None => Verdict::Modified,
        };
        Outcome {
            verdict,
            breakdown: Some(Box::new(result)),
        }
    }

    fn elements<'a>(
        &mut self,
        field: &FieldDescriptor,
        actual: Option<&'a Value>,
        expected: Option<&'a Value>,
        flags: &Flags,
        sub: &Scopes,
    ) -> (Outcome<'a>, Option<Cow<'a, Value>>, Option<Cow<'a, Value>>) {
        let actual = actual.map(Cow::Borrowed);
        let expected = expected.map(Cow::Borrowed);
        let outcome = self.values(field, actual.as_ref(), expected.as_ref(), flags, sub);
        (outcome, actual, expected)
    }

    // -----------------------------------------------------------------------
    // Repeated fields
    // -----------------------------------------------------------------------

    fn repeated<'a>(
        &mut self,
        actual: Option<&'a DynamicMessage>,
        expected: Option<&'a DynamicMessage>,
        field: FieldDescriptor,
        flags: &Flags,
        sub: &Scopes,
    ) -> Option<RepeatedFieldDiff<'a>> {
        let actual = list_of(actual, &field);
        let expected = list_of(expected, &field);
        if actual.is_empty() && expected.is_empty() {
            return None;
        }

        let pairs = if flags.ignore_order {
            self.ignoring_order(&field, actual, expected, flags, sub)
        } else if flags.ignore_extra && !expected.is_empty() {
            self.subsequence(&field, actual, expected, flags, sub)
        } else {
            self.by_index(&field, actual, expected, flags, sub)
        };

        Some(RepeatedFieldDiff {
            verdict: Verdict::aggregate(pairs.iter().map(|p| p.verdict)),
            field,
            actual,
            expected,
            pairs,
        })
    }

    fn pair<'a>(
        &mut self,
        field: &FieldDescriptor,
        indices: (Option<usize>, Option<usize>),
        values: (Option<&'a Value>, Option<&'a Value>),
        flags: &Flags,
        sub: &Scopes,
    ) -> PairResult<'a> {
        let (outcome, actual, expected) = self.elements(field, values.0, values.1, flags, sub);
        PairResult {
            verdict: outcome.verdict,
            actual_index: indices.0,
            expected_index: indices.1,
            map_key: None,
            actual,
            expected,
            breakdown: outcome.breakdown,
        }
    }

    fn by_index<'a>(
        &mut self,
        field: &FieldDescriptor,
        actual: &'a [Value],
        expected: &'a [Value],
        flags: &Flags,
        sub: &Scopes,
    ) -> Vec<PairResult<'a>> {
        let len = actual.len().max(expected.len());
        (0..len)
            .map(|i| {
                let a = actual.get(i);
                let e = expected.get(i);
                let indices = (a.map(|_| i), e.map(|_| i));
                self.pair(field, indices, (a, e), flags, sub)
            })
            .collect()
    }

    /// Greedy matching: the first remaining expected element that fully
    /// matches wins. Not a maximum matching.
    fn ignoring_order<'a>(
        &mut self,
        field: &FieldDescriptor,
        actual: &'a [Value],
        expected: &'a [Value],
        flags: &Flags,
        sub: &Scopes,
    ) -> Vec<PairResult<'a>> {
        let mut pairs = Vec::new();
        let mut remaining: Vec<usize> = (0..expected.len()).collect();
        let mut unmatched = Vec::new();

        for (ai, a) in actual.iter().enumerate() {
            let mut hit = None;
            for (pos, &ei) in remaining.iter().enumerate() {
                let pair = self.pair(field, (Some(ai), Some(ei)), (Some(a), Some(&expected[ei])), flags, sub);
                if pair.verdict.is_matched() {
                    hit = Some((pos, pair));
                    break;
                }
            }
            match hit {
                Some((pos, pair)) => {
                    remaining.remove(pos);
                    pairs.push(pair);
                }
                None => unmatched.push(ai),
            }
        }

        for ei in remaining {
            pairs.push(self.pair(field, (None, Some(ei)), (None, Some(&expected[ei])), flags, sub));
        }
        let extra_ignored = flags.ignore_extra && !expected.is_empty();
        for ai in unmatched {
            pairs.push(self.extra(field, ai, &actual[ai], extra_ignored, flags, sub));
        }
        pairs
    }

    /// Find `expected` as a subsequence of `actual`.
    fn subsequence<'a>(
        &mut self,
        field: &FieldDescriptor,
        actual: &'a [Value],
        expected: &'a [Value],
        flags: &Flags,
        sub: &Scopes,
    ) -> Vec<PairResult<'a>> {
        let mut pairs = Vec::new();
        let mut in_order: VecDeque<usize> = (0..actual.len()).collect();
        let mut out_of_order: Vec<usize> = Vec::new();

        for (ei, e) in expected.iter().enumerate() {
            let mut found = None;
            for (pos, &ai) in in_order.iter().enumerate() {
                let pair = self.pair(field, (Some(ai), Some(ei)), (Some(&actual[ai]), Some(e)), flags, sub);
                if pair.verdict.is_matched() {
                    found = Some((pos, pair));
                    break;
                }
            }
            if let Some((pos, pair)) = found {
                out_of_order.extend(in_order.drain(..pos));
                in_order.pop_front();
                pairs.push(pair);
                continue;
            }

            let mut moved = None;
            for (pos, &ai) in out_of_order.iter().enumerate() {
                let pair = self.pair(field, (Some(ai), Some(ei)), (Some(&actual[ai]), Some(e)), flags, sub);
                if pair.verdict.is_matched() {
                    moved = Some((pos, pair));
                    break;
                }
            }
            match moved {
                Some((pos, mut pair)) => {
                    out_of_order.remove(pos);
                    pair.verdict = Verdict::MovedOutOfOrder;
                    pairs.push(pair);
                }
                None => pairs.push(self.pair(field, (None, Some(ei)), (None, Some(e)), flags, sub)),
            }
        }

        let mut leftover: Vec<usize> = out_of_order.into_iter().chain(in_order).collect();
        leftover.sort_unstable();
        for ai in leftover {
            pairs.push(self.extra(field, ai, &actual[ai], true, flags, sub));
        }
        pairs
    }

    /// An actual-only element: `Ignored` when extras are tolerated,
    /// otherwise compared as added.
    fn extra<'a>(
        &mut self,
        field: &FieldDescriptor,
        index: usize,
        value: &'a Value,
        ignored: bool,
        flags: &Flags,
        sub: &Scopes,
    ) -> PairResult<'a> {
        if ignored {
            return PairResult {
                verdict: Verdict::Ignored,
                actual_index: Some(index),
                expected_index: None,
                map_key: None,
                actual: Some(Cow::Borrowed(value)),
                expected: None,
                breakdown: None,
            };
        }
        self.pair(field, (Some(index), None), (Some(value), None), flags, sub)
    }

    // -----------------------------------------------------------------------
    // Map fields
    // -----------------------------------------------------------------------

    fn map<'a>(
        &mut self,
        actual: Option<&'a DynamicMessage>,
        expected: Option<&'a DynamicMessage>,
        field: FieldDescriptor,
        flags: &Flags,
        sub: &Scopes,
    ) -> Option<RepeatedFieldDiff<'a>> {
        let actual_entries = list_of(actual, &field);
        let expected_entries = list_of(expected, &field);
        if actual_entries.is_empty() && expected_entries.is_empty() {
            return None;
        }
        let (Some(key_field), Some(value_field)) = (field.map_key_field(), field.map_value_field())
        else {
            return None;
        };

        let value_step = FieldPathStep::field(&value_field);
        let value_flags = sub.flags(&mut self.cache, &value_step);
        if value_flags.policy == ScopeResult::ExcludedRecursive {
            trace!(field = %field, "map values excluded, map ignored");
            return Some(RepeatedFieldDiff {
                field,
                verdict: Verdict::Ignored,
                actual: actual_entries,
                expected: expected_entries,
                pairs: Vec::new(),
            });
        }
        let descended;
        let value_sub = if value_field.message_type().is_some() {
            descended = sub.descend(&mut self.cache, &value_step);
            &descended
        } else {
            sub
        };

        let actual_map = FlatMap::new(actual_entries, &key_field, &value_field);
        let expected_map = FlatMap::new(expected_entries, &key_field, &value_field);
        let extra_ignored = flags.ignore_extra && !expected_map.is_empty();

        let keys = actual_map
            .order
            .iter()
            .chain(expected_map.order.iter().filter(|k| !actual_map.contains(k)));

        let mut pairs = Vec::with_capacity(actual_map.order.len());
        for key in keys {
            let a = actual_map.get(key);
            let e = expected_map.get(key);
            let substitute = |side: Option<(usize, Option<&'a Value>)>| {
                side.map(|(_, value)| match value {
                    Some(v) => Cow::Borrowed(v),
                    None => Cow::Owned(value_field.default_value()),
                })
            };
            let actual_value = substitute(a);
            let expected_value = substitute(e);

            let outcome = if e.is_none() && extra_ignored {
                Outcome::leaf(Verdict::Ignored)
            } else {
                self.values(
                    &value_field,
                    actual_value.as_ref(),
                    expected_value.as_ref(),
                    &value_flags,
                    value_sub,
                )
            };
            pairs.push(PairResult {
                verdict: outcome.verdict,
                actual_index: a.map(|(i, _)| i),
                expected_index: e.map(|(i, _)| i),
                map_key: Some(key.clone()),
                actual: actual_value,
                expected: expected_value,
                breakdown: outcome.breakdown,
            });
        }

        Some(RepeatedFieldDiff {
            verdict: Verdict::aggregate(pairs.iter().map(|p| p.verdict)),
            field,
            actual: actual_entries,
            expected: expected_entries,
            pairs,
        })
    }

    // -----------------------------------------------------------------------
    // Unknown fields
    // -----------------------------------------------------------------------

    fn unknown_set<'a>(
        &mut self,
        actual: Option<&'a UnknownFieldSet>,
        expected: Option<&'a UnknownFieldSet>,
        scopes: &Scopes,
    ) -> UnknownFieldSetDiff<'a> {
        let mut numbers = BTreeSet::new();
        for set in [actual, expected].into_iter().flatten() {
            numbers.extend(set.iter().map(|(number, _)| number));
        }

        let mut fields = Vec::new();
        for number in numbers {
            let actual_field = actual.and_then(|s| s.get(number));
            let expected_field = expected.and_then(|s| s.get(number));
            for wire_type in WireType::ALL {
                let a = actual_field.map(|f| f.values(wire_type)).unwrap_or_default();
                let e = expected_field.map(|f| f.values(wire_type)).unwrap_or_default();
                if a.is_empty() && e.is_empty() {
                    continue;
                }

                let step = FieldPathStep::unknown(number, wire_type);
                let policy = self.cache.policy_for(&scopes.scope, &step);
                if policy == ScopeResult::ExcludedRecursive {
                    trace!(number, wire_type = %wire_type, "excluded unknown field skipped");
                    fields.push(UnknownFieldDiff {
                        number,
                        wire_type,
                        verdict: Verdict::Ignored,
                        values: Vec::new(),
                    });
                    continue;
                }
                let included = policy.included();
                let sub = if wire_type == WireType::Group {
                    Some(scopes.descend(&mut self.cache, &step))
                } else {
                    None
                };

                let mut values = Vec::with_capacity(a.len().max(e.len()));
                for index in 0..a.len().max(e.len()) {
                    let (av, ev) = (a.get(index).copied(), e.get(index).copied());
                    let mut breakdown = None;
                    let verdict = match (av, ev, &sub) {
                        (Some(x), Some(y), Some(sub)) => {
                            let groups = (group_of(x), group_of(y));
                            let nested = self.unknown_set(groups.0, groups.1, sub);
                            let verdict = if !included && nested.is_ignored() {
                                Verdict::Ignored
                            } else if nested.is_matched() {
                                Verdict::Matched
                            } else {
                                Verdict::Modified
                            };
                            breakdown = Some(Box::new(nested));
                            verdict
                        }
                        _ if !included => Verdict::Ignored,
                        (Some(x), Some(y), None) if x == y => Verdict::Matched,
                        (Some(_), Some(_), None) => Verdict::Modified,
                        (Some(_), None, _) => Verdict::Added,
                        (None, _, _) => Verdict::Removed,
                    };
                    values.push(UnknownValueDiff {
                        index,
                        verdict,
                        actual: av,
                        expected: ev,
                        breakdown,
                    });
                }

                fields.push(UnknownFieldDiff {
                    number,
                    wire_type,
                    verdict: Verdict::aggregate(values.iter().map(|v| v.verdict)),
                    values,
                });
            }
        }
        UnknownFieldSetDiff { fields }
    }
}

fn group_of(value: UnknownValue<'_>) -> Option<&UnknownFieldSet> {
    match value {
        UnknownValue::Group(set) => Some(set),
        _ => None,
    }
}

/// An `Ignored` entry for a field pruned by the scope.
fn ignored_field<'a>(
    actual: Option<&'a DynamicMessage>,
    expected: Option<&'a DynamicMessage>,
    field: FieldDescriptor,
) -> FieldDiff<'a> {
    if field.is_repeated() {
        FieldDiff::Repeated(RepeatedFieldDiff {
            actual: list_of(actual, &field),
            expected: list_of(expected, &field),
            field,
            verdict: Verdict::Ignored,
            pairs: Vec::new(),
        })
    } else {
        let value = |m: Option<&'a DynamicMessage>| m.and_then(|m| m.get_field(&field)).map(Cow::Borrowed);
        FieldDiff::Singular(SingularFieldDiff {
            actual: value(actual),
            expected: value(expected),
            field,
            verdict: Verdict::Ignored,
            breakdown: None,
        })
    }
}

/// Map entries flattened by key; the last entry for a key wins, first
/// appearance fixes the key's position.
struct FlatMap<'a> {
    order: Vec<MapKey>,
    entries: HashMap<MapKey, (usize, Option<&'a Value>)>,
}

impl<'a> FlatMap<'a> {
    fn new(entries: &'a [Value], key_field: &FieldDescriptor, value_field: &FieldDescriptor) -> Self {
        let mut map = Self {
            order: Vec::new(),
            entries: HashMap::with_capacity(entries.len()),
        };
        for (index, entry) in entries.iter().enumerate() {
            let Some(entry) = entry.as_message() else {
                continue;
            };
            let Some(key) = entry.get_field_or_default(key_field).to_map_key() else {
                continue;
            };
            let value = entry.get_field(value_field);
            if map.entries.insert(key.clone(), (index, value)).is_none() {
                map.order.push(key);
            }
        }
        map
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn contains(&self, key: &MapKey) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &MapKey) -> Option<(usize, Option<&'a Value>)> {
        self.entries.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protoscope_scope::ScopeError;
    use protoscope_types::{DescriptorPool, FieldSpec, KindSpec, MessageSpec, ScalarType};

    fn pool() -> DescriptorPool {
        DescriptorPool::builder()
            .message(
                MessageSpec::new("t.Order")
                    .field(FieldSpec::scalar(1, "id", ScalarType::Int64))
                    .field(FieldSpec::scalar(2, "price", ScalarType::Double))
                    .field(FieldSpec::message(5, "items", "t.Item").repeated())
                    .field(FieldSpec::map(6, "attrs", ScalarType::String, KindSpec::Scalar(ScalarType::Int32)))
                    .field(FieldSpec::message(9, "child", "t.Item"))
                    .field(FieldSpec::scalar(10, "codes", ScalarType::Int32).repeated()),
            )
            .message(
                MessageSpec::new("t.Item")
                    .field(FieldSpec::scalar(1, "sku", ScalarType::String))
                    .field(FieldSpec::scalar(2, "qty", ScalarType::Int32)),
            )
            .build()
            .unwrap()
    }

    fn order(pool: &DescriptorPool) -> DynamicMessage {
        DynamicMessage::new(pool.get_message("t.Order").unwrap())
    }

    fn item(pool: &DescriptorPool, sku: &str, qty: i32) -> DynamicMessage {
        DynamicMessage::new(pool.get_message("t.Item").unwrap())
            .with_field("sku", sku)
            .unwrap()
            .with_field("qty", qty)
            .unwrap()
    }

    fn exact(actual: &DynamicMessage, expected: &DynamicMessage) -> bool {
        diff(actual, expected, &ScopeLogic::all(), &DiffPolicy::exact())
            .unwrap()
            .is_matched()
    }

    #[test]
    fn identical_messages_match() {
        let pool = pool();
        let mut m = order(&pool).with_field("id", 7i64).unwrap();
        m.push_repeated("items", item(&pool, "a", 1)).unwrap();
        m.insert_map_entry("attrs", "color", 3).unwrap();
        m.unknown_fields_mut().add_varint(100, 5);
        assert!(exact(&m, &m.clone()));
    }

    #[test]
    fn scalar_change_is_modified() {
        let pool = pool();
        let a = order(&pool).with_field("id", 1i64).unwrap();
        let e = order(&pool).with_field("id", 2i64).unwrap();
        let result = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
        assert!(!result.is_matched());
        let id = result.field(1).unwrap();
        assert_eq!(id.verdict, Verdict::Modified);
        assert_eq!(id.actual.as_deref(), Some(&Value::I64(1)));
        assert_eq!(id.expected.as_deref(), Some(&Value::I64(2)));
    }

    #[test]
    fn one_sided_fields_are_added_or_removed() {
        let pool = pool();
        let a = order(&pool).with_field("id", 1i64).unwrap();
        let e = order(&pool).with_field("price", 2.5).unwrap();
        let result = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
        assert_eq!(result.field(1).unwrap().verdict, Verdict::Added);
        assert_eq!(result.field(2).unwrap().verdict, Verdict::Removed);
        assert_eq!(result.count(Verdict::Added), 1);
    }

    #[test]
    fn ignoring_absence_substitutes_defaults() {
        let pool = pool();
        let a = order(&pool).with_field("id", 0i64).unwrap();
        let e = order(&pool);
        assert!(!exact(&a, &e));

        let policy = DiffPolicy::exact().ignoring_field_absence(ScopeLogic::all());
        let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
        assert!(result.is_matched());
        let id = result.field(1).unwrap();
        assert!(matches!(id.expected, Some(Cow::Owned(Value::I64(0)))));
        assert!(result.unknown_fields().is_none());
    }

    #[test]
    fn excluded_message_with_nothing_in_scope_collapses() {
        let pool = pool();
        let qty = pool.get_message("t.Item").unwrap().field_by_name("qty").unwrap();
        let scope = ScopeLogic::none().allowing_field_descriptors([qty]);

        let a = order(&pool).with_field("child", item(&pool, "a", 1)).unwrap();
        let e = order(&pool).with_field("child", item(&pool, "b", 1)).unwrap();
        let result = diff(&a, &e, &scope, &DiffPolicy::exact()).unwrap();
        assert!(result.is_matched());
        let child = result.field(9).unwrap();
        assert_eq!(child.verdict, Verdict::Matched);
        let breakdown = child.breakdown.as_ref().unwrap();
        assert_eq!(breakdown.field(1).unwrap().verdict, Verdict::Ignored);

        let sku_only = |sku: &str| {
            let child = DynamicMessage::new(pool.get_message("t.Item").unwrap())
                .with_field("sku", sku)
                .unwrap();
            order(&pool).with_field("child", child).unwrap()
        };
        let (a, e) = (sku_only("a"), sku_only("b"));
        let result = diff(&a, &e, &scope, &DiffPolicy::exact()).unwrap();
        let child = result.field(9).unwrap();
        assert_eq!(child.verdict, Verdict::Ignored);
        assert!(child.breakdown.is_none());

        let a = order(&pool).with_field("child", item(&pool, "a", 1)).unwrap();
        let e = order(&pool).with_field("child", item(&pool, "a", 2)).unwrap();
        let result = diff(&a, &e, &scope, &DiffPolicy::exact()).unwrap();
        assert_eq!(result.field(9).unwrap().verdict, Verdict::Modified);
    }

    #[test]
    fn recursive_exclusion_prunes() {
        let pool = pool();
        let a = order(&pool).with_field("child", item(&pool, "a", 1)).unwrap();
        let e = order(&pool).with_field("child", item(&pool, "b", 2)).unwrap();
        let scope = ScopeLogic::all().ignoring_fields([9]);
        let result = diff(&a, &e, &scope, &DiffPolicy::exact()).unwrap();
        let child = result.field(9).unwrap();
        assert_eq!(child.verdict, Verdict::Ignored);
        assert!(child.breakdown.is_none());
        assert!(result.is_matched());
        assert!(result.is_any_ignored());
        assert!(!result.is_ignored());
    }

    #[test]
    fn expected_fields_only() {
        let pool = pool();
        let a = order(&pool)
            .with_field("id", 1i64)
            .unwrap()
            .with_field("price", 9.0)
            .unwrap();
        let e = order(&pool).with_field("id", 1i64).unwrap();
        let policy = DiffPolicy::exact().comparing_expected_fields_only();
        let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
        assert!(result.is_matched());
        assert_eq!(result.field(2).unwrap().verdict, Verdict::Ignored);

        let mut a = order(&pool);
        a.push_repeated("items", item(&pool, "x", 5)).unwrap();
        let mut e = order(&pool);
        e.push_repeated(
            "items",
            DynamicMessage::new(pool.get_message("t.Item").unwrap())
                .with_field("sku", "x")
                .unwrap(),
        )
        .unwrap();
        assert!(diff(&a, &e, &ScopeLogic::all(), &policy).unwrap().is_matched());
    }

    #[test]
    fn expected_fields_only_compares_default_map_values() {
        let pool = pool();
        let mut a = order(&pool);
        a.insert_map_entry("attrs", "z", 5).unwrap();
        let mut e = order(&pool);
        e.insert_map_entry("attrs", "z", 0).unwrap();

        let policy = DiffPolicy::exact().comparing_expected_fields_only();
        let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
        assert!(!result.is_matched());
        let attrs = result.repeated_field(6).unwrap();
        assert_eq!(attrs.verdict, Verdict::Modified);
        let z = attrs.pair_for_key(&MapKey::from("z")).unwrap();
        assert_eq!(z.verdict, Verdict::Modified);
        assert!(matches!(z.expected, Some(Cow::Owned(Value::I32(0)))));
    }

    #[test]
    fn by_index_pads_shorter_list() {
        let pool = pool();
        let mut a = order(&pool);
        a.push_repeated("items", item(&pool, "a", 1)).unwrap();
        a.push_repeated("items", item(&pool, "b", 1)).unwrap();
        let mut e = order(&pool);
        e.push_repeated("items", item(&pool, "a", 1)).unwrap();

        let result = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
        let items = result.repeated_field(5).unwrap();
        assert_eq!(items.verdict, Verdict::Modified);
        assert_eq!(items.pairs.len(), 2);
        assert_eq!(items.pairs[0].verdict, Verdict::Matched);
        assert_eq!(items.pairs[1].verdict, Verdict::Added);
        assert_eq!(items.pairs[1].actual_index, Some(1));
        assert_eq!(items.pairs[1].expected_index, None);
    }

    #[test]
    fn scalar_lists_query_the_scope_like_scalars() {
        let pool = pool();
        let root = pool.get_message("t.Order").unwrap();
        let scopes = Scopes {
            scope: ScopeLogic::all().ignoring_fields([1]),
            absence: ScopeLogic::none(),
            order: ScopeLogic::none(),
            extra: ScopeLogic::none(),
            doubles: ToleranceMap::default(),
            floats: ToleranceMap::default(),
        };
        let hits = |message: &DynamicMessage| {
            let mut walk = Walk {
                cache: ScopeCache::new(root.clone()),
            };
            assert!(walk.message(Some(message), Some(message), &root, &scopes).is_matched());
            walk.cache.hits()
        };

        let mut codes = order(&pool);
        codes.push_repeated("codes", 4).unwrap();
        let price = order(&pool).with_field("price", 4.0).unwrap();
        assert_eq!(hits(&codes), hits(&price));
    }

    #[test]
    fn maps_compare_by_key() {
        let pool = pool();
        let mut a = order(&pool);
        a.insert_map_entry("attrs", "x", 1).unwrap();
        a.insert_map_entry("attrs", "y", 2).unwrap();
        let mut e = order(&pool);
        e.insert_map_entry("attrs", "y", 3).unwrap();
        e.insert_map_entry("attrs", "z", 0).unwrap();

        let result = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
        let attrs = result.repeated_field(6).unwrap();
        let verdict = |k: &str| attrs.pair_for_key(&MapKey::from(k)).unwrap().verdict;
        assert_eq!(verdict("x"), Verdict::Added);
        assert_eq!(verdict("y"), Verdict::Modified);
        assert_eq!(verdict("z"), Verdict::Removed);
        let z = attrs.pair_for_key(&MapKey::from("z")).unwrap();
        assert!(matches!(z.expected, Some(Cow::Owned(Value::I32(0)))));
    }

    #[test]
    fn duplicate_map_keys_keep_last_entry() {
        let pool = pool();
        let mut a = order(&pool);
        a.insert_map_entry("attrs", "x", 1).unwrap();
        a.insert_map_entry("attrs", "x", 2).unwrap();
        let mut e = order(&pool);
        e.insert_map_entry("attrs", "x", 2).unwrap();
        let result = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
        assert!(result.is_matched());
        let pair = &result.repeated_field(6).unwrap().pairs[0];
        assert_eq!(pair.actual_index, Some(1));
    }

    #[test]
    fn extra_map_keys_ignored_when_expected_non_empty() {
        let pool = pool();
        let mut a = order(&pool);
        a.insert_map_entry("attrs", "x", 1).unwrap();
        a.insert_map_entry("attrs", "y", 2).unwrap();
        let mut e = order(&pool);
        e.insert_map_entry("attrs", "x", 1).unwrap();

        let policy = DiffPolicy::exact().ignoring_extra_repeated_field_elements(ScopeLogic::all());
        let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
        assert!(result.is_matched());
        let attrs = result.repeated_field(6).unwrap();
        assert_eq!(
            attrs.pair_for_key(&MapKey::from("y")).unwrap().verdict,
            Verdict::Ignored
        );

        // An empty expected map still reports additions.
        let b = order(&pool);
        let result = diff(&a, &b, &ScopeLogic::all(), &policy).unwrap();
        assert!(!result.is_matched());
    }

    #[test]
    fn map_with_excluded_values_is_ignored() {
        let pool = pool();
        let attrs = pool.get_message("t.Order").unwrap().field_by_name("attrs").unwrap();
        let value = attrs.map_value_field().unwrap();
        let scope = ScopeLogic::all().ignoring_field_descriptors([value]);

        let mut a = order(&pool);
        a.insert_map_entry("attrs", "x", 1).unwrap();
        let mut e = order(&pool);
        e.insert_map_entry("attrs", "x", 2).unwrap();
        let result = diff(&a, &e, &scope, &DiffPolicy::exact()).unwrap();
        let attrs = result.repeated_field(6).unwrap();
        assert_eq!(attrs.verdict, Verdict::Ignored);
        assert!(attrs.pairs.is_empty());
        assert!(result.is_matched());
    }

    #[test]
    fn unknown_fields_by_number_and_wire_type() {
        let pool = pool();
        let mut a = order(&pool);
        a.unknown_fields_mut().add_varint(100, 1).add_fixed32(101, 7);
        let mut e = order(&pool);
        e.unknown_fields_mut().add_varint(100, 2).add_fixed32(101, 7);

        let result = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
        let unknown = result.unknown_fields().unwrap();
        assert_eq!(unknown.get(100, WireType::Varint).unwrap().verdict, Verdict::Modified);
        assert_eq!(unknown.get(101, WireType::Fixed32).unwrap().verdict, Verdict::Matched);
        assert!(unknown.get(100, WireType::Fixed64).is_none());
        assert!(!result.is_matched());
    }

    #[test]
    fn unknown_groups_recurse() {
        let pool = pool();
        let group = |v: u64| {
            let mut set = UnknownFieldSet::new();
            set.add_varint(1, v);
            set
        };
        let mut a = order(&pool);
        a.unknown_fields_mut().add_group(200, group(1));
        let mut e = order(&pool);
        e.unknown_fields_mut().add_group(200, group(2));

        let result = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
        let entry = result.unknown_fields().unwrap().get(200, WireType::Group).unwrap();
        assert_eq!(entry.verdict, Verdict::Modified);
        let nested = entry.values[0].breakdown.as_ref().unwrap();
        assert_eq!(nested.get(1, WireType::Varint).unwrap().verdict, Verdict::Modified);
    }

    #[test]
    fn unknown_fields_excluded_by_number_scopes() {
        let pool = pool();
        let mut a = order(&pool);
        a.unknown_fields_mut().add_varint(100, 1);
        let e = order(&pool);
        let scope = ScopeLogic::field_numbers([1], true);
        let result = diff(&a, &e, &scope, &DiffPolicy::exact()).unwrap();
        let entry = result.unknown_fields().unwrap().get(100, WireType::Varint).unwrap();
        assert_eq!(entry.verdict, Verdict::Ignored);
    }

    #[test]
    fn schema_mismatch_is_fatal() {
        let pool = pool();
        let a = order(&pool);
        let e = item(&pool, "a", 1);
        assert!(matches!(
            diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()),
            Err(DiffError::SchemaMismatch { .. })
        ));

        let engine = DiffEngine::new(a.descriptor().clone(), ScopeLogic::all(), DiffPolicy::exact()).unwrap();
        match engine.diff(&e, &a) {
            Err(DiffError::SchemaMismatch { side, expected, actual }) => {
                assert_eq!(side, "actual");
                assert_eq!(expected, "t.Order");
                assert_eq!(actual, "t.Item");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_scope_is_rejected_before_diffing() {
        let pool = pool();
        let root = pool.get_message("t.Order").unwrap();
        let err = DiffEngine::new(root, ScopeLogic::all().ignoring_fields([99]), DiffPolicy::exact())
            .unwrap_err();
        assert!(matches!(
            err,
            DiffError::InvalidScope(ScopeError::UnknownFieldNumber { number: 99, .. })
        ));
    }

    #[test]
    fn engine_is_reusable() {
        let pool = pool();
        let engine = DiffEngine::new(
            pool.get_message("t.Order").unwrap(),
            ScopeLogic::all().ignoring_fields([2]),
            DiffPolicy::exact(),
        )
        .unwrap();
        let a = order(&pool).with_field("price", 1.0).unwrap();
        let b = order(&pool).with_field("price", 2.0).unwrap();
        let c = order(&pool).with_field("id", 3i64).unwrap();
        assert!(engine.diff(&a, &b).unwrap().is_matched());
        assert!(!engine.diff(&a, &c).unwrap().is_matched());
    }

    #[test]
    fn result_serializes_for_inspection() {
        let pool = pool();
        let a = order(&pool).with_field("id", 1i64).unwrap();
        let e = order(&pool).with_field("id", 2i64).unwrap();
        let json = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact())
            .unwrap()
            .to_json()
            .unwrap();
        assert_eq!(json["message_type"], "t.Order");
        assert_eq!(json["fields"][0]["kind"], "singular");
        assert_eq!(json["fields"][0]["verdict"], "modified");
        assert_eq!(json["fields"][0]["field"], "t.Order.id");
    }
}
