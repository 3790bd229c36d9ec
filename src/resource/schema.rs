//! Field schemas
//!
//! Each handler declares the shape of its flat configuration: which fields
//! exist, their kinds, which are required, computed or immutable, and how
//! they are validated and compared.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Validator: returns one message per problem found in the value at `key`
pub type ValidateFn = Arc<dyn Fn(&Value, &str) -> Vec<String> + Send + Sync>;

/// Returns true when the old and new values should be considered equal
pub type DiffSuppressFn = fn(key: &str, old: &str, new: &str) -> bool;

/// Normalises a configured value before it is stored or compared
pub type StateFn = fn(&Value) -> Value;

/// Kind of value a field holds
#[derive(Clone, Serialize)]
#[serde(tag = "type", content = "elem", rename_all = "lowercase")]
pub enum Kind {
    String,
    Bool,
    Int,
    List(Box<Kind>),
    Set(Box<Kind>),
    /// String-to-string map
    Map,
    /// List of nested objects
    Block(Schema),
}

impl Kind {
    fn describe(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::List(_) => "list",
            Kind::Set(_) => "set",
            Kind::Map => "map",
            Kind::Block(_) => "list of blocks",
        }
    }
}

/// A single field declaration
#[derive(Clone, Serialize)]
pub struct Field {
    #[serde(flatten)]
    pub kind: Kind,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub computed: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub force_new: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(skip)]
    pub validate: Option<ValidateFn>,
    #[serde(skip)]
    pub diff_suppress: Option<DiffSuppressFn>,
    #[serde(skip)]
    pub state_func: Option<StateFn>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Field {
    fn of(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            max_items: None,
            min_items: None,
            validate: None,
            diff_suppress: None,
            state_func: None,
        }
    }

    pub fn string() -> Self {
        Self::of(Kind::String)
    }

    pub fn bool() -> Self {
        Self::of(Kind::Bool)
    }

    pub fn int() -> Self {
        Self::of(Kind::Int)
    }

    pub fn list(elem: Kind) -> Self {
        Self::of(Kind::List(Box::new(elem)))
    }

    pub fn set(elem: Kind) -> Self {
        Self::of(Kind::Set(Box::new(elem)))
    }

    pub fn map() -> Self {
        Self::of(Kind::Map)
    }

    pub fn block(schema: Schema) -> Self {
        Self::of(Kind::Block(schema))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn validate(mut self, f: ValidateFn) -> Self {
        self.validate = Some(f);
        self
    }

    pub fn diff_suppress(mut self, f: DiffSuppressFn) -> Self {
        self.diff_suppress = Some(f);
        self
    }

    pub fn state_func(mut self, f: StateFn) -> Self {
        self.state_func = Some(f);
        self
    }

    /// Only the server sets this field
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.required && !self.optional
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind.describe())
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("force_new", &self.force_new)
            .finish()
    }
}

/// Ordered collection of fields
#[derive(Clone, Default, Serialize)]
pub struct Schema {
    #[serde(flatten)]
    fields: ordered::Fields,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style)
    pub fn field(mut self, name: &str, field: Field) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    /// Merge another schema's fields in
    pub fn extend(mut self, other: Schema) -> Self {
        for (name, field) in other.fields.0 {
            self.fields.insert(name, field);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.0.is_empty()
    }

    /// Check a configuration against the schema, reporting every problem
    pub fn validate(&self, config: &Map<String, Value>) -> Vec<String> {
        let mut problems = Vec::new();
        self.validate_at("", config, &mut problems);
        problems
    }

    fn validate_at(&self, prefix: &str, config: &Map<String, Value>, problems: &mut Vec<String>) {
        for key in config.keys() {
            if self.get(key).is_none() {
                problems.push(format!("{}{}: unsupported argument", prefix, key));
            }
        }

        for (name, field) in self.iter() {
            let path = format!("{}{}", prefix, name);
            let value = config.get(name).filter(|v| !v.is_null());

            let Some(value) = value else {
                if field.required {
                    problems.push(format!("{}: required field is not set", path));
                }
                continue;
            };

            if field.is_computed_only() {
                problems.push(format!("{}: computed field cannot be set", path));
                continue;
            }

            if !check_kind(&field.kind, value, &path, problems) {
                continue;
            }

            if let Some(items) = value.as_array() {
                if let Some(max) = field.max_items {
                    if items.len() > max {
                        problems.push(format!(
                            "{}: expected at most {} item(s), got {}",
                            path,
                            max,
                            items.len()
                        ));
                    }
                }
                if let Some(min) = field.min_items {
                    if items.len() < min {
                        problems.push(format!(
                            "{}: expected at least {} item(s), got {}",
                            path,
                            min,
                            items.len()
                        ));
                    }
                }
            }

            if let Some(validate) = &field.validate {
                problems.extend(validate(value, &path));
            }

            if let Kind::Block(inner) = &field.kind {
                if let Some(items) = value.as_array() {
                    for (i, item) in items.iter().enumerate() {
                        if let Some(obj) = item.as_object() {
                            inner.validate_at(&format!("{}.{}.", path, i), obj, problems);
                        }
                    }
                }
            }
        }
    }

    /// Fill in defaults for unset fields, recursing into blocks
    pub fn apply_defaults(&self, config: &mut Map<String, Value>) {
        for (name, field) in self.iter() {
            let unset = config.get(name).map(Value::is_null).unwrap_or(true);
            if unset {
                if let Some(default) = &field.default {
                    config.insert(name.to_string(), default.clone());
                }
                continue;
            }

            if let Some(state_func) = field.state_func {
                if let Some(value) = config.get_mut(name) {
                    *value = state_func(value);
                }
            }

            if let Kind::Block(inner) = &field.kind {
                if let Some(Value::Array(items)) = config.get_mut(name) {
                    for item in items.iter_mut() {
                        if let Some(obj) = item.as_object_mut() {
                            inner.apply_defaults(obj);
                        }
                    }
                }
            }
        }
    }

    /// Immutable fields whose configured value differs from the prior state
    pub fn changed_force_new_fields(
        &self,
        prior: &Map<String, Value>,
        config: &Map<String, Value>,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        for (name, field) in self.iter() {
            if !field.force_new {
                continue;
            }

            let new = config.get(name).cloned().unwrap_or(Value::Null);
            if new.is_null() && field.computed {
                continue;
            }
            let new = match field.state_func {
                Some(f) if !new.is_null() => f(&new),
                _ => new,
            };
            let old = prior.get(name).cloned().unwrap_or(Value::Null);

            if values_equal(&old, &new) {
                continue;
            }
            if let (Some(suppress), Some(o), Some(n)) = (field.diff_suppress, old.as_str(), new.as_str()) {
                if suppress(name, o, n) {
                    continue;
                }
            }
            changed.push(name.to_string());
        }
        changed
    }
}

/// Compare two values treating an absent value as equal to its zero value
pub fn values_equal(a: &Value, b: &Value) -> bool {
    fn is_zero(v: &Value) -> bool {
        match v {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Bool(b) => !b,
            Value::Number(n) => n.as_f64() == Some(0.0),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
        }
    }

    if a.is_null() || b.is_null() {
        return is_zero(a) && is_zero(b);
    }
    a == b
}

fn check_kind(kind: &Kind, value: &Value, path: &str, problems: &mut Vec<String>) -> bool {
    let ok = match kind {
        Kind::String => value.is_string(),
        Kind::Bool => value.is_boolean(),
        Kind::Int => value.is_i64() || value.is_u64(),
        Kind::Map => value
            .as_object()
            .map(|o| o.values().all(|v| v.is_string()))
            .unwrap_or(false),
        Kind::Block(_) => value
            .as_array()
            .map(|a| a.iter().all(Value::is_object))
            .unwrap_or(false),
        Kind::List(elem) | Kind::Set(elem) => match value.as_array() {
            Some(items) => {
                let mut all_ok = true;
                for (i, item) in items.iter().enumerate() {
                    all_ok &= check_kind(elem, item, &format!("{}.{}", path, i), problems);
                }
                // Element problems are already reported
                return all_ok;
            }
            None => false,
        },
    };

    if !ok {
        problems.push(format!("{}: expected {}", path, kind.describe()));
    }
    ok
}

/// Insertion-ordered field list
mod ordered {
    use super::Field;
    use serde::ser::{Serialize, SerializeMap, Serializer};

    #[derive(Clone, Default)]
    pub struct Fields(pub Vec<(String, Field)>);

    impl Fields {
        pub fn insert(&mut self, name: String, field: Field) {
            if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == name) {
                slot.1 = field;
            } else {
                self.0.push((name, field));
            }
        }

        pub fn get(&self, name: &str) -> Option<&Field> {
            self.0.iter().find(|(k, _)| k == name).map(|(_, f)| f)
        }
    }

    impl Serialize for Fields {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(self.0.len()))?;
            for (name, field) in &self.0 {
                map.serialize_entry(name, field)?;
            }
            map.end()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .field("name", Field::string().required().force_new())
            .field("enabled", Field::bool().optional().default(true))
            .field("id_out", Field::string().computed())
            .field(
                "rule",
                Field::block(
                    Schema::new()
                        .field("policy", Field::string().required())
                        .field("minutes", Field::int().optional()),
                )
                .optional()
                .max_items(1),
            )
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let problems = schema().validate(&obj(json!({
            "enabled": "yes",
            "id_out": "x",
            "bogus": 1,
            "rule": [{"minutes": 5}, {"policy": "Manual"}]
        })));

        assert!(problems.contains(&"bogus: unsupported argument".to_string()));
        assert!(problems.contains(&"name: required field is not set".to_string()));
        assert!(problems.contains(&"enabled: expected bool".to_string()));
        assert!(problems.contains(&"id_out: computed field cannot be set".to_string()));
        assert!(problems.contains(&"rule: expected at most 1 item(s), got 2".to_string()));
        assert!(problems.contains(&"rule.0.policy: required field is not set".to_string()));
    }

    #[test]
    fn test_valid_config_has_no_problems() {
        let problems = schema().validate(&obj(json!({
            "name": "a",
            "rule": [{"policy": "Automatic", "minutes": 60}]
        })));
        assert!(problems.is_empty(), "{problems:?}");
    }

    #[test]
    fn test_apply_defaults() {
        let mut config = obj(json!({"name": "a"}));
        schema().apply_defaults(&mut config);
        assert_eq!(config["enabled"], json!(true));

        let mut explicit = obj(json!({"name": "a", "enabled": false}));
        schema().apply_defaults(&mut explicit);
        assert_eq!(explicit["enabled"], json!(false));
    }

    #[test]
    fn test_changed_force_new_fields() {
        let prior = obj(json!({"name": "a", "enabled": true}));
        let same = obj(json!({"name": "a", "enabled": false}));
        assert!(schema().changed_force_new_fields(&prior, &same).is_empty());

        let renamed = obj(json!({"name": "b"}));
        assert_eq!(
            schema().changed_force_new_fields(&prior, &renamed),
            vec!["name".to_string()]
        );
    }

    #[test]
    fn test_force_new_respects_diff_suppress() {
        fn ignore_case(_: &str, old: &str, new: &str) -> bool {
            old.eq_ignore_ascii_case(new)
        }
        let schema = Schema::new().field(
            "location",
            Field::string().required().force_new().diff_suppress(ignore_case),
        );
        let prior = obj(json!({"location": "westeurope"}));
        let config = obj(json!({"location": "WestEurope"}));
        assert!(schema.changed_force_new_fields(&prior, &config).is_empty());
    }

    #[test]
    fn test_values_equal_treats_missing_as_zero() {
        assert!(values_equal(&Value::Null, &json!("")));
        assert!(values_equal(&json!([]), &Value::Null));
        assert!(!values_equal(&json!("a"), &Value::Null));
    }

    #[test]
    fn test_schema_serializes_in_declaration_order() {
        let rendered = serde_json::to_string(&schema()).unwrap();
        let name = rendered.find("\"name\"").unwrap();
        let rule = rendered.find("\"rule\"").unwrap();
        assert!(name < rule);
    }
}
