//! Resource tags

use super::data::ResourceData;
use super::schema::{Field, ValidateFn};
use serde_json::{Map, Value};
use std::sync::Arc;

const MAX_TAGS: usize = 50;
const MAX_KEY_LEN: usize = 512;
const MAX_VALUE_LEN: usize = 256;

/// Optional, user-settable tags
pub fn schema() -> Field {
    Field::map().optional().validate(validate())
}

/// Tags on a data source: filled in from the remote object
pub fn schema_computed() -> Field {
    Field::map().computed()
}

/// Tags with ARM's count and length limits
pub fn validate() -> ValidateFn {
    Arc::new(|value: &Value, key: &str| {
        let Some(tags) = value.as_object() else {
            return Vec::new();
        };

        let mut problems = Vec::new();
        if tags.len() > MAX_TAGS {
            problems.push(format!("{}: a maximum of {} tags can be applied", key, MAX_TAGS));
        }
        for (k, v) in tags {
            if k.len() > MAX_KEY_LEN {
                problems.push(format!(
                    "{}: the maximum length for a tag key is {} characters: {:?}",
                    key, MAX_KEY_LEN, k
                ));
            }
            if v.as_str().map(str::len).unwrap_or_default() > MAX_VALUE_LEN {
                problems.push(format!(
                    "{}: the maximum length for a tag value is {} characters: {:?}",
                    key, MAX_VALUE_LEN, k
                ));
            }
        }
        problems
    })
}

/// Tags from configuration, as the JSON object ARM expects
pub fn expand(d: &ResourceData) -> Value {
    let tags: Map<String, Value> = d
        .get_string_map("tags")
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    Value::Object(tags)
}

/// Tags from an ARM response; non-string values are dropped
pub fn flatten(tags: Option<&Value>) -> Value {
    let tags: Map<String, Value> = tags
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), Value::String(s.to_string()))))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_and_flatten() {
        let d = ResourceData::new(
            json!({"tags": {"env": "prod", "team": "data"}})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let expanded = expand(&d);
        assert_eq!(expanded, json!({"env": "prod", "team": "data"}));
        assert_eq!(flatten(Some(&expanded)), expanded);
    }

    #[test]
    fn test_flatten_missing_tags_is_empty() {
        assert_eq!(flatten(None), json!({}));
        assert_eq!(flatten(Some(&json!({"n": 1, "s": "x"}))), json!({"s": "x"}));
    }

    #[test]
    fn test_limits() {
        let too_many: Map<String, Value> = (0..51)
            .map(|i| (format!("k{}", i), json!("v")))
            .collect();
        assert_eq!(validate()(&Value::Object(too_many), "tags").len(), 1);

        let long_value = json!({"k": "x".repeat(257)});
        assert_eq!(validate()(&long_value, "tags").len(), 1);
    }
}
