//! Property-based tests using proptest
//!
//! These tests check resource ID parsing, automation variable encoding and
//! location normalisation against randomized inputs.

use azrm::resource::id::{DevTestPolicyId, FirewallRuleId, ResourceId};
use azrm::resource::validate::{normalize_location, suppress_location_diff};
use azrm::services::automation::{encode_value, format_datetime, parse_value, VariableKind, VariableValue};
use chrono::DateTime;
use proptest::prelude::*;
use serde_json::json;

/// A single ID path segment value
fn arb_segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9._()-]{0,30}"
}

fn arb_subscription() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
}

proptest! {
    /// Building an ID and parsing it back yields the same parts
    #[test]
    fn firewall_rule_id_round_trips(
        sub in arb_subscription(),
        rg in arb_segment(),
        server in arb_segment(),
        name in arb_segment(),
    ) {
        let id = FirewallRuleId::new(&sub, &rg, &server, &name);
        let parsed = FirewallRuleId::parse(&id.id()).unwrap();
        prop_assert_eq!(parsed, id);
    }

    #[test]
    fn nested_id_round_trips(
        sub in arb_subscription(),
        rg in arb_segment(),
        lab in arb_segment(),
        set in arb_segment(),
        name in arb_segment(),
    ) {
        let id = DevTestPolicyId::new(&sub, &rg, &lab, &set, &name);
        let text = id.id();
        prop_assert_eq!(DevTestPolicyId::parse(&text).unwrap(), id);

        let generic = ResourceId::parse(&text).unwrap();
        prop_assert_eq!(generic.to_string(), text);
    }

    /// An ID of one type never parses as another
    #[test]
    fn id_with_extra_segment_is_rejected(
        sub in arb_subscription(),
        rg in arb_segment(),
        server in arb_segment(),
        name in arb_segment(),
    ) {
        let text = format!("{}/databases/db1", FirewallRuleId::new(&sub, &rg, &server, &name).id());
        prop_assert!(FirewallRuleId::parse(&text).is_err());
    }

    /// Odd segment counts are never accepted
    #[test]
    fn dangling_key_is_rejected(sub in arb_subscription(), key in "[a-z]{1,10}") {
        let text = format!("/subscriptions/{}/{}", sub, key);
        prop_assert!(ResourceId::parse(&text).is_err());
    }

    #[test]
    fn int_variable_round_trips(i in any::<i32>()) {
        let stored = encode_value(VariableKind::Int, Some(&json!(i))).unwrap().unwrap();
        prop_assert_eq!(
            parse_value(VariableKind::Int, Some(&stored)).unwrap(),
            VariableValue::Int(i)
        );
    }

    /// Every string survives quoting, including ones that look like other kinds
    #[test]
    fn string_variable_round_trips(s in "\\PC{1,40}") {
        let stored = encode_value(VariableKind::String, Some(&json!(s))).unwrap().unwrap();
        prop_assert_eq!(
            parse_value(VariableKind::String, Some(&stored)).unwrap(),
            VariableValue::String(s)
        );
    }

    #[test]
    fn datetime_variable_round_trips(millis in 0i64..253_402_300_799_999) {
        let t = DateTime::from_timestamp_millis(millis).unwrap();
        let configured = format_datetime(&t);
        let stored = encode_value(VariableKind::DateTime, Some(&json!(configured))).unwrap().unwrap();

        let value = parse_value(VariableKind::DateTime, Some(&stored)).unwrap();
        prop_assert_eq!(&value, &VariableValue::DateTime(t));
        prop_assert_eq!(value.to_state(), Some(json!(configured)));
    }

    /// A value of one kind is never accepted as an int
    #[test]
    fn string_is_not_an_int(i in any::<i32>()) {
        let stored = encode_value(VariableKind::String, Some(&json!(i.to_string()))).unwrap().unwrap();
        prop_assert!(parse_value(VariableKind::Int, Some(&stored)).is_err());
    }

    #[test]
    fn normalize_location_is_idempotent(loc in "[A-Za-z ]{0,30}") {
        let once = normalize_location(&loc);
        prop_assert_eq!(normalize_location(&once), once.clone());
        prop_assert!(!once.contains(' '));
        prop_assert!(suppress_location_diff("location", &loc, &once));
    }
}
