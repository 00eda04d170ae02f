//! End-to-end comparison scenarios: tolerances, repeated-field strategies,
//! maps and deep recursive schemas.

use protoscope_diff::{diff, DiffEngine, DiffOptions, DiffPolicy, Verdict};
use protoscope_scope::ScopeLogic;
use protoscope_types::{
    DescriptorPool, DynamicMessage, FieldSpec, KindSpec, MapKey, MessageDescriptor, MessageSpec,
    ScalarType,
};

fn pool() -> DescriptorPool {
    DescriptorPool::builder()
        .message(
            MessageSpec::new("t.Reading")
                .field(FieldSpec::scalar(1, "value", ScalarType::Double))
                .field(FieldSpec::scalar(2, "ratio", ScalarType::Float))
                .field(FieldSpec::scalar(3, "offset", ScalarType::Double))
                .field(FieldSpec::scalar(4, "codes", ScalarType::Int32).repeated())
                .field(FieldSpec::scalar(5, "tags", ScalarType::String).repeated())
                .field(FieldSpec::map(
                    6,
                    "labels",
                    ScalarType::String,
                    KindSpec::Scalar(ScalarType::String),
                )),
        )
        .message(
            MessageSpec::new("t.Node")
                .field(FieldSpec::scalar(1, "value", ScalarType::Int32))
                .field(FieldSpec::message(2, "next", "t.Node")),
        )
        .build()
        .unwrap()
}

fn reading(pool: &DescriptorPool) -> DynamicMessage {
    DynamicMessage::new(pool.get_message("t.Reading").unwrap())
}

fn with_value(pool: &DescriptorPool, value: f64) -> DynamicMessage {
    reading(pool).with_field("value", value).unwrap()
}

fn with_list<T: Into<protoscope_types::Value> + Clone>(
    pool: &DescriptorPool,
    name: &str,
    items: &[T],
) -> DynamicMessage {
    let mut m = reading(pool);
    for item in items {
        m.push_repeated(name, item.clone()).unwrap();
    }
    m
}

fn with_labels(pool: &DescriptorPool, entries: &[(&str, &str)]) -> DynamicMessage {
    let mut m = reading(pool);
    for (k, v) in entries {
        m.insert_map_entry("labels", *k, *v).unwrap();
    }
    m
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A `t.Node` chain of `depth` links, with `value` set on every link.
fn chain(node: &MessageDescriptor, depth: usize, value: i32) -> DynamicMessage {
    let mut current = DynamicMessage::new(node.clone()).with_field("value", value).unwrap();
    for _ in 1..depth {
        current = DynamicMessage::new(node.clone())
            .with_field("value", value)
            .unwrap()
            .with_field("next", current)
            .unwrap();
    }
    current
}

// ---------------------------------------------------------------------------
// Tolerances
// ---------------------------------------------------------------------------

#[test]
fn double_tolerance_accepts_close_values() {
    let pool = pool();
    let policy = DiffPolicy::exact().with_double_tolerance(ScopeLogic::all(), 0.01);
    let scope = ScopeLogic::all();

    let check = |a: f64, e: f64| {
        diff(&with_value(&pool, a), &with_value(&pool, e), &scope, &policy)
            .unwrap()
            .is_matched()
    };
    assert!(check(1.00, 1.005));
    assert!(!check(1.00, 1.02));
    assert!(!check(f64::NAN, f64::NAN));
    assert!(!check(f64::INFINITY, f64::INFINITY));
}

#[test]
fn exact_comparison_treats_nan_as_unequal() {
    let pool = pool();
    let nan = with_value(&pool, f64::NAN);
    let result = diff(&nan, &nan, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
    assert_eq!(result.field(1).unwrap().verdict, Verdict::Modified);
}

#[test]
fn tolerance_applies_only_inside_its_scope() {
    let pool = pool();
    let value = pool.get_message("t.Reading").unwrap().field_by_name("value").unwrap();
    let policy = DiffPolicy::exact().with_double_tolerance(
        ScopeLogic::none().allowing_field_descriptors([value]),
        0.5,
    );

    let a = with_value(&pool, 1.0).with_field("offset", 1.0).unwrap();
    let e = with_value(&pool, 1.2).with_field("offset", 1.2).unwrap();
    let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
    assert_eq!(result.field(1).unwrap().verdict, Verdict::Matched);
    assert_eq!(result.field(3).unwrap().verdict, Verdict::Modified);
}

#[test]
fn float_tolerance_is_separate_from_double() {
    let pool = pool();
    let a = reading(&pool).with_field("ratio", 0.5f32).unwrap();
    let e = reading(&pool).with_field("ratio", 0.52f32).unwrap();

    let doubles_only = DiffPolicy::exact().with_double_tolerance(ScopeLogic::all(), 0.1);
    assert!(!diff(&a, &e, &ScopeLogic::all(), &doubles_only).unwrap().is_matched());

    let floats = DiffPolicy::exact().with_float_tolerance(ScopeLogic::all(), 0.1);
    assert!(diff(&a, &e, &ScopeLogic::all(), &floats).unwrap().is_matched());
}

// ---------------------------------------------------------------------------
// Repeated fields
// ---------------------------------------------------------------------------

#[test]
fn order_can_be_ignored() {
    let pool = pool();
    let a = with_list(&pool, "codes", &[1, 2, 3]);
    let e = with_list(&pool, "codes", &[3, 2, 1]);

    let exact = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
    let codes = exact.repeated_field(4).unwrap();
    assert_eq!(codes.verdict, Verdict::Modified);
    let verdicts: Vec<_> = codes.pairs.iter().map(|p| p.verdict).collect();
    assert_eq!(
        verdicts,
        [Verdict::Modified, Verdict::Matched, Verdict::Modified]
    );

    let policy = DiffPolicy::exact().ignoring_repeated_field_order(ScopeLogic::all());
    let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
    assert!(result.is_matched());
    let codes = result.repeated_field(4).unwrap();
    assert_eq!(codes.pairs[0].actual_index, Some(0));
    assert_eq!(codes.pairs[0].expected_index, Some(2));
}

#[test]
fn unordered_leftovers_are_reported() {
    let pool = pool();
    let a = with_list(&pool, "codes", &[1, 4]);
    let e = with_list(&pool, "codes", &[1, 5]);
    let policy = DiffPolicy::exact().ignoring_repeated_field_order(ScopeLogic::all());
    let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
    let codes = result.repeated_field(4).unwrap();
    assert!(!result.is_matched());
    assert_eq!(codes.pairs.len(), 3);
    assert_eq!(result.count(Verdict::Removed), 1);
    assert_eq!(result.count(Verdict::Added), 1);
}

#[test]
fn extra_elements_form_a_subsequence() {
    let pool = pool();
    let policy = DiffPolicy::exact().ignoring_extra_repeated_field_elements(ScopeLogic::all());
    let a = with_list(&pool, "tags", &["a", "b", "c", "d"]);

    let e = with_list(&pool, "tags", &["a", "c"]);
    let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
    assert!(result.is_matched());
    let tags = result.repeated_field(5).unwrap();
    let ignored: Vec<_> = tags
        .pairs
        .iter()
        .filter(|p| p.verdict == Verdict::Ignored)
        .filter_map(|p| p.actual_index)
        .collect();
    assert_eq!(ignored, [1, 3]);

    let e = with_list(&pool, "tags", &["c", "a"]);
    let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
    assert!(!result.is_matched());
    let tags = result.repeated_field(5).unwrap();
    let moved = tags
        .pairs
        .iter()
        .find(|p| p.verdict == Verdict::MovedOutOfOrder)
        .unwrap();
    assert_eq!(moved.actual_index, Some(0));
    assert_eq!(moved.expected_index, Some(1));
}

#[test]
fn unordered_extras_are_ignored() {
    let pool = pool();
    let policy = DiffPolicy::exact()
        .ignoring_repeated_field_order(ScopeLogic::all())
        .ignoring_extra_repeated_field_elements(ScopeLogic::all());
    let a = with_list(&pool, "codes", &[1, 2, 9]);
    let e = with_list(&pool, "codes", &[2, 1]);

    let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
    assert!(result.is_matched());
    let codes = result.repeated_field(4).unwrap();
    assert_eq!(codes.verdict, Verdict::Matched);
    let extra = codes
        .pairs
        .iter()
        .find(|p| p.actual_index == Some(2))
        .unwrap();
    assert_eq!(extra.verdict, Verdict::Ignored);
    assert_eq!(extra.expected_index, None);
    assert_eq!(result.count(Verdict::Added), 0);
}

#[test]
fn subsequence_reports_missing_expected_elements() {
    let pool = pool();
    let policy = DiffPolicy::exact().ignoring_extra_repeated_field_elements(ScopeLogic::all());
    let a = with_list(&pool, "tags", &["a", "b"]);
    let e = with_list(&pool, "tags", &["c"]);

    let result = diff(&a, &e, &ScopeLogic::all(), &policy).unwrap();
    assert!(!result.is_matched());
    let tags = result.repeated_field(5).unwrap();
    assert_eq!(tags.pairs.len(), 3);

    let removed = &tags.pairs[0];
    assert_eq!(removed.verdict, Verdict::Removed);
    assert_eq!(removed.expected_index, Some(0));
    assert_eq!(removed.actual_index, None);

    let ignored: Vec<_> = tags.pairs[1..]
        .iter()
        .map(|p| (p.verdict, p.actual_index))
        .collect();
    assert_eq!(
        ignored,
        [(Verdict::Ignored, Some(0)), (Verdict::Ignored, Some(1))]
    );
}

#[test]
fn empty_expected_list_still_reports_extras() {
    let pool = pool();
    let policy = DiffPolicy::exact().ignoring_extra_repeated_field_elements(ScopeLogic::all());
    let a = with_list(&pool, "tags", &["a"]);
    let b = reading(&pool);
    let result = diff(&a, &b, &ScopeLogic::all(), &policy).unwrap();
    assert_eq!(result.repeated_field(5).unwrap().verdict, Verdict::Modified);
}

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

#[test]
fn map_entry_order_is_irrelevant() {
    let pool = pool();
    let a = with_labels(&pool, &[("x", "1"), ("y", "2")]);
    let e = with_labels(&pool, &[("y", "2"), ("x", "1")]);
    assert!(diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact())
        .unwrap()
        .is_matched());
}

#[test]
fn map_keys_added_removed_or_ignored() {
    let pool = pool();
    let a = with_labels(&pool, &[("x", "1"), ("extra", "2")]);
    let e = with_labels(&pool, &[("x", "1"), ("gone", "3")]);

    let result = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
    let labels = result.repeated_field(6).unwrap();
    assert_eq!(labels.pair_for_key(&MapKey::from("x")).unwrap().verdict, Verdict::Matched);
    assert_eq!(labels.pair_for_key(&MapKey::from("extra")).unwrap().verdict, Verdict::Added);
    assert_eq!(labels.pair_for_key(&MapKey::from("gone")).unwrap().verdict, Verdict::Removed);

    let lenient = DiffPolicy::exact().ignoring_extra_repeated_field_elements(ScopeLogic::all());
    let result = diff(&a, &e, &ScopeLogic::all(), &lenient).unwrap();
    let labels = result.repeated_field(6).unwrap();
    assert_eq!(labels.pair_for_key(&MapKey::from("extra")).unwrap().verdict, Verdict::Ignored);
    assert_eq!(labels.pair_for_key(&MapKey::from("gone")).unwrap().verdict, Verdict::Removed);
    assert!(!result.is_matched());
}

// ---------------------------------------------------------------------------
// Recursive schemas
// ---------------------------------------------------------------------------

#[test]
fn deep_chain_with_ignored_leaf_values() {
    init_tracing();
    let pool = pool();
    let node = pool.get_message("t.Node").unwrap();
    let a = chain(&node, 64, 1);
    let e = chain(&node, 64, 2);

    assert!(!diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact())
        .unwrap()
        .is_matched());

    let engine = DiffEngine::new(node, ScopeLogic::all().ignoring_fields([1]), DiffPolicy::exact())
        .unwrap();
    let result = engine.diff(&a, &e).unwrap();
    assert!(result.is_matched());
    assert_eq!(result.field(1).unwrap().verdict, Verdict::Ignored);

    // Every link has the root type, so field 1 is excluded at each level.
    let mut depth = 0;
    let mut level = &result;
    while let Some(next) = level.field(2).and_then(|f| f.breakdown.as_deref()) {
        level = next;
        depth += 1;
    }
    assert_eq!(depth, 63);
}

#[test]
fn deep_chain_differences_below_the_root() {
    let pool = pool();
    let node = pool.get_message("t.Node").unwrap();
    let a = chain(&node, 64, 1);
    let e = chain(&node, 64, 1);
    let result = diff(&a, &e, &ScopeLogic::all(), &DiffPolicy::exact()).unwrap();
    assert!(result.is_matched());

    let pruned = ScopeLogic::all().ignoring_fields([2]);
    let other = chain(&node, 10, 1);
    let result = diff(&a, &other, &pruned, &DiffPolicy::exact()).unwrap();
    assert!(result.is_matched());
    let next = result.field(2).unwrap();
    assert_eq!(next.verdict, Verdict::Ignored);
    assert!(next.breakdown.is_none());
}

// ---------------------------------------------------------------------------
// Options from configuration text
// ---------------------------------------------------------------------------

#[test]
fn options_drive_the_engine() {
    init_tracing();
    let pool = pool();
    let options = DiffOptions::from_toml_str(
        r#"
        ignore_repeated_field_order = true
        double_tolerance = 0.1
        "#,
    )
    .unwrap();
    let engine = DiffEngine::new(
        pool.get_message("t.Reading").unwrap(),
        ScopeLogic::all(),
        options.to_policy(),
    )
    .unwrap();

    let a = with_list(&pool, "codes", &[1, 2]).with_field("value", 1.0).unwrap();
    let e = with_list(&pool, "codes", &[2, 1]).with_field("value", 1.05).unwrap();
    assert!(engine.diff(&a, &e).unwrap().is_matched());
}
