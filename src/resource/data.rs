//! Resource data
//!
//! Flat field map a handler reads its configuration from and writes remote
//! state back into.

use super::schema::values_equal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Persisted state of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Working copy of a resource's fields during one operation
#[derive(Debug, Clone, Default)]
pub struct ResourceData {
    id: String,
    values: Map<String, Value>,
    prior: Option<Map<String, Value>>,
    new_resource: bool,
}

impl ResourceData {
    /// Data for a resource that is about to be created
    pub fn new(config: Map<String, Value>) -> Self {
        Self {
            id: String::new(),
            values: config,
            prior: None,
            new_resource: true,
        }
    }

    /// Data for an existing resource
    pub fn from_state(id: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            values: attributes,
            prior: None,
            new_resource: false,
        }
    }

    /// Record the prior state used for change detection
    pub fn with_prior(mut self, prior: Map<String, Value>) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set the ID; an empty ID marks the resource as gone
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn is_new_resource(&self) -> bool {
        self.new_resource
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or_default()
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or_default()
    }

    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First element of a single-item block list
    pub fn get_block(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get_list(key).first().and_then(Value::as_object)
    }

    /// String map (tags and the like)
    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.get(key)
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A string that is set and non-empty
    pub fn get_ok_str(&self, key: &str) -> Option<&str> {
        Some(self.get_str(key)).filter(|s| !s.is_empty())
    }

    /// An integer that is set and non-zero
    pub fn get_ok_int(&self, key: &str) -> Option<i64> {
        Some(self.get_int(key)).filter(|v| *v != 0)
    }

    /// A list that is set and non-empty
    pub fn get_ok_list(&self, key: &str) -> Option<&[Value]> {
        Some(self.get_list(key)).filter(|l| !l.is_empty())
    }

    /// Set a field; `None`-like values are stored as null
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Whether a field differs from the prior state
    pub fn has_change(&self, key: &str) -> bool {
        let current = self.values.get(key).unwrap_or(&Value::Null);
        match &self.prior {
            Some(prior) => !values_equal(prior.get(key).unwrap_or(&Value::Null), current),
            None => self.new_resource && !current.is_null(),
        }
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Final state of the resource
    pub fn into_state(self) -> ResourceState {
        let mut attributes = self.values;
        if self.id.is_empty() {
            attributes.remove("id");
        } else {
            attributes.insert("id".to_string(), Value::String(self.id.clone()));
        }
        ResourceState {
            id: self.id,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(v: Value) -> ResourceData {
        ResourceData::new(v.as_object().cloned().unwrap())
    }

    #[test]
    fn test_getters_default_to_zero_values() {
        let d = data(json!({"name": "x", "nothing": null}));
        assert_eq!(d.get_str("name"), "x");
        assert_eq!(d.get_str("missing"), "");
        assert_eq!(d.get_str("nothing"), "");
        assert!(!d.get_bool("missing"));
        assert_eq!(d.get_int("missing"), 0);
        assert!(d.get_list("missing").is_empty());
        assert!(d.get_string_map("missing").is_empty());
    }

    #[test]
    fn test_get_ok_skips_zero_values() {
        let d = data(json!({"empty": "", "zero": 0, "list": [], "set": "v", "n": 3}));
        assert_eq!(d.get_ok_str("empty"), None);
        assert_eq!(d.get_ok_int("zero"), None);
        assert!(d.get_ok_list("list").is_none());
        assert_eq!(d.get_ok_str("set"), Some("v"));
        assert_eq!(d.get_ok_int("n"), Some(3));
    }

    #[test]
    fn test_has_change_against_prior() {
        let prior = json!({"a": "1", "b": "2"}).as_object().cloned().unwrap();
        let d = ResourceData::from_state("id", json!({"a": "1", "b": "3"}).as_object().cloned().unwrap())
            .with_prior(prior);
        assert!(!d.has_change("a"));
        assert!(d.has_change("b"));
        assert!(!d.has_change("c"));
    }

    #[test]
    fn test_new_resource_sees_every_set_field_as_changed() {
        let d = data(json!({"a": "1"}));
        assert!(d.is_new_resource());
        assert!(d.has_change("a"));
        assert!(!d.has_change("b"));
    }

    #[test]
    fn test_into_state_records_id() {
        let mut d = data(json!({"name": "x"}));
        d.set_id("/subscriptions/s/resourceGroups/rg");
        d.set("location", "westeurope");
        let state = d.into_state();
        assert_eq!(state.id, "/subscriptions/s/resourceGroups/rg");
        assert_eq!(state.attributes["id"], json!(state.id));
        assert_eq!(state.attributes["location"], json!("westeurope"));
    }

    #[test]
    fn test_cleared_id_is_not_recorded() {
        let mut d = ResourceData::from_state("gone", Map::new());
        d.set_id("");
        let state = d.into_state();
        assert!(state.id.is_empty());
        assert!(!state.attributes.contains_key("id"));
    }

    #[test]
    fn test_cleared_id_drops_stored_id_attribute() {
        let attrs = json!({"id": "/subscriptions/x/resourceGroups/rg", "name": "a"});
        let mut d = ResourceData::from_state(
            "/subscriptions/x/resourceGroups/rg",
            attrs.as_object().cloned().unwrap(),
        );
        d.set_id("");
        let state = d.into_state();
        assert!(state.id.is_empty());
        assert!(!state.attributes.contains_key("id"));
        assert_eq!(state.attributes.get("name"), Some(&json!("a")));
    }
}
