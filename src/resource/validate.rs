//! Field validators
//!
//! Each constructor returns a [`ValidateFn`] that reports problems for the
//! value found at a key. Non-string values for string validators are left
//! to the schema's kind check.

use super::id::ResourceId;
use super::schema::ValidateFn;
use regex::Regex;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

fn string_check<F>(check: F) -> ValidateFn
where
    F: Fn(&str, &str) -> Vec<String> + Send + Sync + 'static,
{
    Arc::new(move |value: &Value, key: &str| match value.as_str() {
        Some(s) => check(s, key),
        None => Vec::new(),
    })
}

/// Build a validator from a name pattern and a human description
fn matches(pattern: &'static str, description: &'static str) -> ValidateFn {
    let re = Regex::new(pattern);
    string_check(move |s, key| match &re {
        Ok(re) if re.is_match(s) => Vec::new(),
        Ok(_) => vec![format!("{}: {} (got {:?})", key, description, s)],
        Err(e) => vec![format!("{}: invalid validation pattern: {}", key, e)],
    })
}

pub fn no_empty_strings() -> ValidateFn {
    string_check(|s, key| {
        if s.trim().is_empty() {
            vec![format!("{}: must not be empty", key)]
        } else {
            Vec::new()
        }
    })
}

pub fn string_in_slice(allowed: &'static [&'static str], ignore_case: bool) -> ValidateFn {
    string_check(move |s, key| {
        let found = allowed.iter().any(|a| {
            if ignore_case {
                a.eq_ignore_ascii_case(s)
            } else {
                *a == s
            }
        });
        if found {
            Vec::new()
        } else {
            vec![format!("{}: expected one of [{}], got {:?}", key, allowed.join(", "), s)]
        }
    })
}

pub fn string_len_between(min: usize, max: usize) -> ValidateFn {
    string_check(move |s, key| {
        let len = s.chars().count();
        if len < min || len > max {
            vec![format!(
                "{}: expected length between {} and {}, got {}",
                key, min, max, len
            )]
        } else {
            Vec::new()
        }
    })
}

pub fn int_between(min: i64, max: i64) -> ValidateFn {
    Arc::new(move |value: &Value, key: &str| match value.as_i64() {
        Some(v) if v < min || v > max => {
            vec![format!("{}: expected between {} and {}, got {}", key, min, max, v)]
        }
        _ => Vec::new(),
    })
}

pub fn int_at_least(min: i64) -> ValidateFn {
    Arc::new(move |value: &Value, key: &str| match value.as_i64() {
        Some(v) if v < min => vec![format!("{}: expected at least {}, got {}", key, min, v)],
        _ => Vec::new(),
    })
}

pub fn ip_address() -> ValidateFn {
    string_check(|s, key| match s.parse::<IpAddr>() {
        Ok(_) => Vec::new(),
        Err(_) => vec![format!("{}: expected a valid IP address, got {:?}", key, s)],
    })
}

pub fn ipv4_address() -> ValidateFn {
    string_check(|s, key| match s.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => Vec::new(),
        _ => vec![format!("{}: expected a valid IPv4 address, got {:?}", key, s)],
    })
}

pub fn rfc3339_time() -> ValidateFn {
    string_check(|s, key| match chrono::DateTime::parse_from_rfc3339(s) {
        Ok(_) => Vec::new(),
        Err(e) => vec![format!("{}: expected an RFC 3339 timestamp, got {:?}: {}", key, s, e)],
    })
}

/// Any well-formed ARM resource ID
pub fn resource_id() -> ValidateFn {
    string_check(|s, key| match ResourceId::parse(s) {
        Ok(_) => Vec::new(),
        Err(e) => vec![format!("{}: {}", key, e)],
    })
}

/// An ID accepted by a typed ID parser
pub fn typed_id<T: 'static, E: std::fmt::Display + 'static>(parse: fn(&str) -> Result<T, E>) -> ValidateFn {
    string_check(move |s, key| match parse(s) {
        Ok(_) => Vec::new(),
        Err(e) => vec![format!("{}: {}", key, e)],
    })
}

/// JSON text
pub fn json_string() -> ValidateFn {
    string_check(|s, key| match serde_json::from_str::<Value>(s) {
        Ok(_) => Vec::new(),
        Err(e) => vec![format!("{}: expected valid JSON: {}", key, e)],
    })
}

pub fn resource_group_name() -> ValidateFn {
    string_check(|s, key| {
        let mut problems = Vec::new();
        if s.is_empty() || s.len() > 90 {
            problems.push(format!("{}: may not be empty or exceed 90 characters", key));
        }
        if s.ends_with('.') {
            problems.push(format!("{}: may not end with a period", key));
        }
        let allowed = s
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '(' | ')'));
        if !allowed {
            problems.push(format!(
                "{}: may only contain alphanumeric characters, dash, underscores, parentheses and periods",
                key
            ));
        }
        problems
    })
}

pub fn iothub_name() -> ValidateFn {
    matches(
        r"^[0-9a-zA-Z-]{1,50}$",
        "may only contain alphanumeric characters and dashes, up to 50 characters",
    )
}

pub fn iothub_endpoint_name() -> ValidateFn {
    let reserved = ["events", "operationsMonitoringEvents", "fileNotifications", "$default"];
    let pattern = matches(
        r"^[-_.a-zA-Z0-9]{1,64}$",
        "may only contain alphanumeric characters, periods, underscores and dashes, up to 64 characters",
    );
    Arc::new(move |value: &Value, key: &str| {
        let mut problems = pattern(value, key);
        if let Some(s) = value.as_str() {
            if reserved.iter().any(|r| r.eq_ignore_ascii_case(s)) {
                problems.push(format!("{}: the reserved endpoint name {:?} cannot be used", key, s));
            }
        }
        problems
    })
}

pub fn sql_server_name() -> ValidateFn {
    matches(
        r"^[0-9a-z]([-0-9a-z]{0,61}[0-9a-z])?$",
        "may only contain lowercase letters, digits and dashes, must not start or end with a dash, up to 63 characters",
    )
}

pub fn sql_failover_group_name() -> ValidateFn {
    matches(
        r"^[0-9a-z]([-0-9a-z]{0,61}[0-9a-z])?$",
        "may only contain lowercase letters, digits and dashes, must not start or end with a dash, up to 63 characters",
    )
}

pub fn container_registry_name() -> ValidateFn {
    matches(r"^[a-zA-Z0-9]{5,50}$", "must be 5 to 50 alphanumeric characters")
}

pub fn container_registry_token_name() -> ValidateFn {
    matches(
        r"^[a-zA-Z0-9-]{5,50}$",
        "must be 5 to 50 alphanumeric characters or dashes",
    )
}

pub fn data_factory_name() -> ValidateFn {
    matches(
        r"^[A-Za-z0-9]+(?:-[A-Za-z0-9]+)*$",
        "may only contain alphanumerics and non-consecutive dashes, starting and ending with an alphanumeric",
    )
}

pub fn data_factory_item_name() -> ValidateFn {
    let pattern = matches(
        r"^[A-Za-z0-9_][^<>*#.%&:\\+?/]*$",
        "must start with a letter, number or underscore and may not contain <>*#.%&:\\+?/",
    );
    Arc::new(move |value: &Value, key: &str| {
        let mut problems = pattern(value, key);
        if let Some(s) = value.as_str() {
            if s.len() > 260 {
                problems.push(format!("{}: may not exceed 260 characters", key));
            }
        }
        problems
    })
}

pub fn automation_account_name() -> ValidateFn {
    matches(
        r"^[0-9a-zA-Z][-0-9a-zA-Z]{4,48}[0-9a-zA-Z]$",
        "must be 6 to 50 alphanumerics or dashes, starting and ending with an alphanumeric",
    )
}

pub fn dev_test_lab_name() -> ValidateFn {
    matches(
        r"^[A-Za-z0-9_-]+$",
        "may only contain alphanumeric characters, underscores and dashes",
    )
}

pub fn storage_sync_name() -> ValidateFn {
    matches(
        r"^[0-9a-zA-Z_. -]*[0-9a-zA-Z_-]$",
        "may only contain alphanumerics, spaces, periods, underscores and dashes, and must not end with a period or space",
    )
}

pub fn dashboard_name() -> ValidateFn {
    matches(
        r"^[-a-zA-Z0-9]{1,160}$",
        "may only contain alphanumeric characters and dashes, up to 160 characters",
    )
}

pub fn key_vault_nested_item_name() -> ValidateFn {
    matches(
        r"^[0-9a-zA-Z-]+$",
        "may only contain alphanumeric characters and dashes",
    )
}

pub fn express_route_gateway_name() -> ValidateFn {
    matches(
        r"^[a-zA-Z0-9][a-zA-Z0-9._-]{0,78}[a-zA-Z0-9_]$|^[a-zA-Z0-9]$",
        "must be 1 to 80 characters of alphanumerics, periods, underscores or dashes, starting with an alphanumeric and ending with an alphanumeric or underscore",
    )
}

/// Lowercase with spaces removed, the form ARM returns locations in
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

/// Location comparison ignoring case and spaces
pub fn suppress_location_diff(_key: &str, old: &str, new: &str) -> bool {
    normalize_location(old) == normalize_location(new)
}

pub fn suppress_case_diff(_key: &str, old: &str, new: &str) -> bool {
    old.eq_ignore_ascii_case(new)
}

/// State function normalising a location value
pub fn location_state(value: &Value) -> Value {
    match value.as_str() {
        Some(s) => Value::String(normalize_location(s)),
        None => value.clone(),
    }
}

/// Canonical JSON text: parse and re-serialise with sorted keys
pub fn normalize_json(json: &str) -> String {
    if json.is_empty() {
        return String::new();
    }
    match serde_json::from_str::<Value>(json) {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| json.to_string()),
        Err(_) => json.to_string(),
    }
}

/// State function for JSON text fields
pub fn json_state(value: &Value) -> Value {
    match value.as_str() {
        Some(s) => Value::String(normalize_json(s)),
        None => value.clone(),
    }
}

static UUID_RE: OnceLock<Option<Regex>> = OnceLock::new();

pub fn uuid() -> ValidateFn {
    string_check(|s, key| {
        let re = UUID_RE.get_or_init(|| {
            Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").ok()
        });
        match re {
            Some(re) if re.is_match(s) => Vec::new(),
            _ => vec![format!("{}: expected a UUID, got {:?}", key, s)],
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn problems(v: &ValidateFn, value: Value) -> Vec<String> {
        v(&value, "field")
    }

    #[test]
    fn test_int_between() {
        let v = int_between(1, 10);
        assert!(problems(&v, json!(1)).is_empty());
        assert!(problems(&v, json!(10)).is_empty());
        assert_eq!(
            problems(&v, json!(11)),
            vec!["field: expected between 1 and 10, got 11".to_string()]
        );
    }

    #[test]
    fn test_string_in_slice() {
        let v = string_in_slice(&["Enabled", "Disabled"], false);
        assert!(problems(&v, json!("Enabled")).is_empty());
        assert_eq!(problems(&v, json!("enabled")).len(), 1);
        let ci = string_in_slice(&["Enabled", "Disabled"], true);
        assert!(problems(&ci, json!("enabled")).is_empty());
    }

    #[test]
    fn test_ip_address() {
        let v = ip_address();
        assert!(problems(&v, json!("10.0.17.62")).is_empty());
        assert!(problems(&v, json!("::1")).is_empty());
        assert_eq!(problems(&v, json!("10.0.17")).len(), 1);
        assert_eq!(problems(&ipv4_address(), json!("::1")).len(), 1);
    }

    #[test]
    fn test_resource_group_name() {
        let v = resource_group_name();
        assert!(problems(&v, json!("my-rg_(1).x")).is_empty());
        assert_eq!(problems(&v, json!("ends.")).len(), 1);
        assert_eq!(problems(&v, json!("a".repeat(91))).len(), 1);
        assert_eq!(problems(&v, json!("bad/char")).len(), 1);
    }

    #[test]
    fn test_iothub_endpoint_name_rejects_reserved() {
        let v = iothub_endpoint_name();
        assert!(problems(&v, json!("my_queue-1")).is_empty());
        assert_eq!(problems(&v, json!("events")).len(), 1);
        assert_eq!(problems(&v, json!("$Default")).len(), 2);
    }

    #[test]
    fn test_sql_server_name() {
        let v = sql_server_name();
        assert!(problems(&v, json!("my-server-01")).is_empty());
        assert_eq!(problems(&v, json!("-bad")).len(), 1);
        assert_eq!(problems(&v, json!("Upper")).len(), 1);
    }

    #[test]
    fn test_data_factory_item_name() {
        let v = data_factory_item_name();
        assert!(problems(&v, json!("dataset_1 copy")).is_empty());
        assert_eq!(problems(&v, json!("bad.name")).len(), 1);
    }

    #[test]
    fn test_express_route_gateway_name() {
        let v = express_route_gateway_name();
        assert!(problems(&v, json!("a")).is_empty());
        assert!(problems(&v, json!("gw.prod_")).is_empty());
        assert_eq!(problems(&v, json!("gw.")).len(), 1);
    }

    #[test]
    fn test_non_strings_are_left_to_kind_check() {
        assert!(problems(&ip_address(), json!(5)).is_empty());
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("West Europe"), "westeurope");
        assert!(suppress_location_diff("location", "westeurope", "West Europe"));
    }

    #[test]
    fn test_normalize_json_orders_keys() {
        assert_eq!(normalize_json(r#"{ "b": 1, "a": [ 1, 2 ] }"#), r#"{"a":[1,2],"b":1}"#);
        assert_eq!(normalize_json("not json"), "not json");
        assert_eq!(normalize_json(""), "");
    }

    #[test]
    fn test_uuid() {
        assert!(problems(&uuid(), json!("00000000-0000-0000-0000-000000000000")).is_empty());
        assert_eq!(problems(&uuid(), json!("nope")).len(), 1);
    }

    #[test]
    fn test_typed_id_validator() {
        let v = typed_id(super::super::id::VaultId::parse);
        assert!(problems(
            &v,
            json!("/subscriptions/s/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/kv")
        )
        .is_empty());
        assert_eq!(problems(&v, json!("/subscriptions/s")).len(), 1);
    }
}
