//! Unit tests for parameter firewall evaluation.

use rstest::{fixture, rstest};

use super::*;

fn params(pairs: &[(&str, Value)]) -> Value {
    pairs
        .iter()
        .map(|(key, value)| (*key, value.clone()))
        .collect()
}

#[fixture]
fn count_rule() -> FirewallRule {
    FirewallRule::new("n").required().with_kind(ValueKind::Int)
}

#[rstest]
#[case::string(Value::from("text"))]
#[case::list(Value::List(vec![Value::Int(1)]))]
#[case::null(Value::Null)]
fn non_map_params_fail_before_rules(count_rule: FirewallRule, #[case] mut input: Value) {
    let error = evaluate(&mut input, &[count_rule]).expect_err("should fail");
    assert_eq!(error.error_code(), Some(ErrorCode::InvalidParams));
    assert_eq!(error.message(), EXPECTED_OBJECT);
    assert!(error.data().is_none());
}

#[rstest]
fn missing_required_parameter_is_named(count_rule: FirewallRule) {
    let mut input = Value::map();
    let error = evaluate(&mut input, &[count_rule]).expect_err("should fail");
    assert_eq!(error.message(), PARAMETER_REQUIRED);
    assert_eq!(error.data(), Some("n"));
}

#[test]
fn missing_optional_parameter_is_skipped() {
    let mut input = Value::map();
    let rules = [FirewallRule::new("n").with_kind(ValueKind::Int)];
    evaluate(&mut input, &rules).expect("optional rule passes");
    assert_eq!(input, Value::map());
}

#[rstest]
fn wrong_kind_is_coerced_in_place(count_rule: FirewallRule) {
    let mut input = params(&[("n", Value::from("42"))]);
    evaluate(&mut input, &[count_rule]).expect("coerces");
    assert_eq!(input.get("n"), Some(&Value::Int(42)));
}

#[rstest]
fn second_pass_changes_nothing(count_rule: FirewallRule) {
    let rules = [
        count_rule,
        FirewallRule::new("flag").with_kind(ValueKind::Bool),
        FirewallRule::new("tags").with_kind(ValueKind::List),
    ];
    let mut input = params(&[
        ("n", Value::Double(7.9)),
        ("flag", Value::from("yes")),
        ("tags", Value::from("solo")),
    ]);
    evaluate(&mut input, &rules).expect("first pass");
    let coerced = input.clone();
    evaluate(&mut input, &rules).expect("second pass");
    assert_eq!(input, coerced);
}

#[test]
fn pattern_mismatch_names_parameter() {
    let rule = FirewallRule::new("msg")
        .with_kind(ValueKind::String)
        .with_pattern("^[a-z]+$")
        .expect("valid pattern");
    let mut input = params(&[("msg", Value::from("Hello!"))]);
    let error = evaluate(&mut input, &[rule]).expect_err("should fail");
    assert_eq!(error.message(), INVALID_VALUE);
    assert_eq!(error.data(), Some("msg"));
}

#[test]
fn pattern_matches_rendered_value() {
    let rule = FirewallRule::new("port")
        .with_kind(ValueKind::Int)
        .with_pattern("^[0-9]{2,5}$")
        .expect("valid pattern");
    let mut input = params(&[("port", Value::from(" 8080 "))]);
    evaluate(&mut input, &[rule]).expect("passes");
    assert_eq!(input.get("port"), Some(&Value::Int(8080)));
}

#[test]
fn unsupported_target_kind_is_internal() {
    let rule = FirewallRule::new("x").with_kind(ValueKind::Error);
    let mut input = params(&[("x", Value::Int(1))]);
    let error = evaluate(&mut input, &[rule]).expect_err("should fail");
    assert_eq!(error.error_code(), Some(ErrorCode::InternalError));
}

#[test]
fn first_failure_stops_evaluation() {
    let rules = [
        FirewallRule::new("a").required(),
        FirewallRule::new("b").with_kind(ValueKind::Int),
    ];
    let mut input = params(&[("b", Value::from("5"))]);
    let error = evaluate(&mut input, &rules).expect_err("should fail");
    assert_eq!(error.data(), Some("a"));
    assert_eq!(input.get("b"), Some(&Value::from("5")), "later rule not applied");
}

#[test]
fn empty_rule_list_accepts_anything() {
    let mut input = Value::from("scalar");
    evaluate(&mut input, &[]).expect("no rules");
}

#[test]
fn parses_rules_from_fragment() {
    let rule: Value = [
        ("name", Value::from("msg")),
        ("required", Value::Bool(true)),
        ("type", Value::from("string")),
        ("regex", Value::from("^h")),
    ]
    .into_iter()
    .collect();
    let fragment = Map::from([(String::from(FIREWALL_KEY), Value::List(vec![rule]))]);

    let rules = FirewallRule::from_fragment(&fragment).expect("parse");
    let [parsed] = rules.as_slice() else {
        panic!("expected one rule, got {rules:?}");
    };
    assert_eq!(parsed.name(), "msg");
    assert!(parsed.is_required());
    assert_eq!(parsed.kind(), Some(ValueKind::String));
}

#[rstest]
#[case::not_table(Value::from("msg"))]
#[case::no_name([("required", Value::Bool(true))].into_iter().collect())]
#[case::bad_kind([("name", Value::from("x")), ("type", Value::from("tuple"))].into_iter().collect())]
#[case::bad_regex([("name", Value::from("x")), ("regex", Value::from("("))].into_iter().collect())]
fn rejects_malformed_rules(#[case] rule: Value) {
    assert!(FirewallRule::from_value(&rule).is_err());
}

#[test]
fn fragment_without_rules_is_empty() {
    let rules = FirewallRule::from_fragment(&Map::new()).expect("parse");
    assert!(rules.is_empty());
}
