//! Property-based checks for normalization and field scoring.

use invoice_compare_lib::compare::compare_fields;
use invoice_compare_lib::normalize::{normalize, values_match, Strictness};
use invoice_compare_lib::{ExtractionProfile, ProfileKind};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn strictness() -> impl Strategy<Value = Strictness> {
    prop_oneof![Just(Strictness::Basic), Just(Strictness::Strict)]
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "\\PC{0,12}".prop_map(Value::String),
        "[A-Za-zΑΒΕΗΚΜΝΟΡΤΧ0-9 -]{0,8}".prop_map(Value::String),
    ]
}

fn tree() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop::collection::btree_map("[a-c]", inner, 0..4)
            .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()))
    })
}

#[test]
fn proptest_normalize_is_idempotent() {
    proptest!(|(text in "\\PC{0,40}", s in strictness())| {
        let once = normalize(&text, s);
        prop_assert_eq!(normalize(&once, s), once);
    });
}

#[test]
fn proptest_values_match_is_symmetric() {
    proptest!(|(a in leaf(), b in leaf(), s in strictness())| {
        prop_assert_eq!(values_match(&a, &b, s), values_match(&b, &a, s));
    });
}

#[test]
fn proptest_values_match_is_reflexive_for_non_null() {
    proptest!(|(a in tree(), s in strictness())| {
        prop_assert!(values_match(&a, &a, s));
    });
}

#[test]
fn proptest_field_counts_add_up() {
    let profile = ExtractionProfile::builtin(ProfileKind::Transporter).with_exclusions(["b.a"]);
    proptest!(|(truth in tree(), candidate in tree())| {
        if let Value::Object(truth) = truth {
            let c = compare_fields(&truth, &candidate, &profile);
            prop_assert_eq!(
                c.matching_fields + c.missing_fields.len() + c.differing_fields.len(),
                c.total_fields
            );
            let excluded = |f: &str| f == "b.a" || f.starts_with("b.a.");
            prop_assert!(!c.missing_fields.iter().any(|f| excluded(f)));
            prop_assert!(!c.differing_fields.iter().any(|d| excluded(&d.field)));
        }
    });
}
