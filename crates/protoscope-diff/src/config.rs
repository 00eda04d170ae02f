//! Comparison policies.
//!
//! [`DiffPolicy`] is what the engine consumes: every flag is a
//! [`ScopeLogic`], so a behaviour such as "ignore repeated field order" can
//! be switched on for the whole message (`ScopeLogic::all()`), for nothing
//! (`ScopeLogic::none()`), or for a chosen set of fields. [`DiffOptions`] is
//! the flat, serializable form loaded from TOML or JSON and converted into a
//! policy.

use protoscope_scope::{ScopeCache, ScopeLogic};
use protoscope_types::{FieldPathStep, MessageDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::{DiffError, EngineResult};

// ---------------------------------------------------------------------------
// ToleranceMap
// ---------------------------------------------------------------------------

/// Ordered numeric tolerance rules. The last rule whose scope includes a
/// field decides that field's tolerance.
#[derive(Clone, Debug)]
pub struct ToleranceMap<T> {
    rules: Vec<(ScopeLogic, T)>,
}

impl<T> Default for ToleranceMap<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T: Copy + Into<f64>> ToleranceMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single rule covering every field.
    pub fn global(tolerance: T) -> Self {
        Self::new().with_rule(ScopeLogic::all(), tolerance)
    }

    /// Append a rule; it takes precedence over earlier ones.
    pub fn with_rule(mut self, scope: ScopeLogic, tolerance: T) -> Self {
        self.push(scope, tolerance);
        self
    }

    pub fn push(&mut self, scope: ScopeLogic, tolerance: T) {
        self.rules.push((scope, tolerance));
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[(ScopeLogic, T)] {
        &self.rules
    }

    fn validate(&self, root: &MessageDescriptor, policy: &'static str) -> EngineResult<()> {
        for (scope, tolerance) in &self.rules {
            scope
                .validate(root)
                .map_err(|source| DiffError::InvalidPolicy { policy, source })?;
            let value: f64 = (*tolerance).into();
            if !value.is_finite() || value < 0.0 {
                return Err(DiffError::InvalidTolerance { policy, value });
            }
        }
        Ok(())
    }

    /// Tolerance for `step`, if any rule includes it.
    pub(crate) fn lookup(&self, cache: &mut ScopeCache, step: &FieldPathStep) -> Option<T> {
        self.rules
            .iter()
            .rev()
            .find(|(scope, _)| cache.policy_for(scope, step).included())
            .map(|(_, tolerance)| *tolerance)
    }

    /// Rules for the children of `step`. Rules that can no longer match are
    /// dropped.
    pub(crate) fn descend(&self, cache: &mut ScopeCache, step: &FieldPathStep) -> Self {
        if self.rules.is_empty() {
            return Self::new();
        }
        let rules = self
            .rules
            .iter()
            .map(|(scope, tolerance)| (cache.sub_scope(scope, step), *tolerance))
            .filter(|(scope, _)| !scope.is_none())
            .collect();
        Self { rules }
    }
}

// ---------------------------------------------------------------------------
// DiffPolicy
// ---------------------------------------------------------------------------

/// Scoped comparison policy.
#[derive(Clone, Debug)]
pub struct DiffPolicy {
    /// Fields whose absence on one side compares equal to the default value.
    /// When this is `all`, unknown fields are not compared at all.
    pub ignore_field_absence: ScopeLogic,
    /// Repeated fields compared as multisets.
    pub ignore_repeated_field_order: ScopeLogic,
    /// Repeated and map fields where actual may hold extra elements.
    pub ignore_extra_repeated_field_elements: ScopeLogic,
    /// Restrict the scope to the fields set on the expected message.
    pub compare_expected_fields_only: bool,
    pub double_tolerance: ToleranceMap<f64>,
    pub float_tolerance: ToleranceMap<f32>,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self::exact()
    }
}

impl DiffPolicy {
    /// Exact comparison: every policy off.
    pub fn exact() -> Self {
        Self {
            ignore_field_absence: ScopeLogic::none(),
            ignore_repeated_field_order: ScopeLogic::none(),
            ignore_extra_repeated_field_elements: ScopeLogic::none(),
            compare_expected_fields_only: false,
            double_tolerance: ToleranceMap::new(),
            float_tolerance: ToleranceMap::new(),
        }
    }

    /// Ignore absence for the fields in `scope`, in addition to any already
    /// covered.
    pub fn ignoring_field_absence(mut self, scope: ScopeLogic) -> Self {
        self.ignore_field_absence = self.ignore_field_absence.union(&scope);
        self
    }

    pub fn ignoring_repeated_field_order(mut self, scope: ScopeLogic) -> Self {
        self.ignore_repeated_field_order = self.ignore_repeated_field_order.union(&scope);
        self
    }

    pub fn ignoring_extra_repeated_field_elements(mut self, scope: ScopeLogic) -> Self {
        self.ignore_extra_repeated_field_elements =
            self.ignore_extra_repeated_field_elements.union(&scope);
        self
    }

    pub fn comparing_expected_fields_only(mut self) -> Self {
        self.compare_expected_fields_only = true;
        self
    }

    pub fn with_double_tolerance(mut self, scope: ScopeLogic, tolerance: f64) -> Self {
        self.double_tolerance.push(scope, tolerance);
        self
    }

    pub fn with_float_tolerance(mut self, scope: ScopeLogic, tolerance: f32) -> Self {
        self.float_tolerance.push(scope, tolerance);
        self
    }

    /// Validate every policy scope and tolerance against `root`.
    pub fn validate(&self, root: &MessageDescriptor) -> EngineResult<()> {
        let scopes = [
            ("ignore_field_absence", &self.ignore_field_absence),
            ("ignore_repeated_field_order", &self.ignore_repeated_field_order),
            (
                "ignore_extra_repeated_field_elements",
                &self.ignore_extra_repeated_field_elements,
            ),
        ];
        for (policy, scope) in scopes {
            scope
                .validate(root)
                .map_err(|source| DiffError::InvalidPolicy { policy, source })?;
        }
        self.double_tolerance.validate(root, "double_tolerance")?;
        self.float_tolerance.validate(root, "float_tolerance")
    }
}

// ---------------------------------------------------------------------------
// DiffOptions
// ---------------------------------------------------------------------------

/// Flat, whole-message comparison options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    pub ignore_field_absence: bool,
    pub ignore_repeated_field_order: bool,
    pub ignore_extra_repeated_field_elements: bool,
    pub compare_expected_fields_only: bool,
    pub double_tolerance: Option<f64>,
    pub float_tolerance: Option<f32>,
}

impl DiffOptions {
    /// Every relaxation on: absence, order and extra elements are ignored.
    pub fn lenient() -> Self {
        Self {
            ignore_field_absence: true,
            ignore_repeated_field_order: true,
            ignore_extra_repeated_field_elements: true,
            ..Default::default()
        }
    }

    /// Compare only what the expected message sets, ignoring extra elements.
    pub fn partial() -> Self {
        Self {
            compare_expected_fields_only: true,
            ignore_extra_repeated_field_elements: true,
            ..Default::default()
        }
    }

    pub fn from_toml_str(input: &str) -> EngineResult<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_json_str(input: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_policy(&self) -> DiffPolicy {
        let flag = |on: bool| {
            if on {
                ScopeLogic::all()
            } else {
                ScopeLogic::none()
            }
        };
        DiffPolicy {
            ignore_field_absence: flag(self.ignore_field_absence),
            ignore_repeated_field_order: flag(self.ignore_repeated_field_order),
            ignore_extra_repeated_field_elements: flag(self.ignore_extra_repeated_field_elements),
            compare_expected_fields_only: self.compare_expected_fields_only,
            double_tolerance: self
                .double_tolerance
                .map(ToleranceMap::global)
                .unwrap_or_default(),
            float_tolerance: self
                .float_tolerance
                .map(ToleranceMap::global)
                .unwrap_or_default(),
        }
    }
}

impl From<&DiffOptions> for DiffPolicy {
    fn from(options: &DiffOptions) -> Self {
        options.to_policy()
    }
}

impl From<DiffOptions> for DiffPolicy {
    fn from(options: DiffOptions) -> Self {
        options.to_policy()
    }
}
