//! Automation account variables
//!
//! Five resource types share one handler, parameterised by [`VariableKind`].
//! The service stores every value as text; the kind decides how that text
//! is written and how it must look when read back.

use super::{
    delete_ignoring_not_found, require_absent, resource_group_name,
    resource_group_name_for_data_source, str_at,
};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result, ResultExt};
use crate::resource::id::AutomationVariableId;
use crate::resource::{validate, DataSourceHandler, Field, ResourceData, ResourceHandler, Schema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;

const AUTOMATION_API_VERSION: &str = "2015-10-31";

const DATE_PREFIX: &str = r#""\/Date("#;
const DATE_SUFFIX: &str = r#")\/""#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Bool,
    DateTime,
    Int,
    Null,
    String,
}

impl VariableKind {
    pub const ALL: [VariableKind; 5] = [
        VariableKind::Bool,
        VariableKind::DateTime,
        VariableKind::Int,
        VariableKind::Null,
        VariableKind::String,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            VariableKind::Bool => "azurerm_automation_variable_bool",
            VariableKind::DateTime => "azurerm_automation_variable_datetime",
            VariableKind::Int => "azurerm_automation_variable_int",
            VariableKind::Null => "azurerm_automation_variable_null",
            VariableKind::String => "azurerm_automation_variable_string",
        }
    }

    fn label(self) -> &'static str {
        match self {
            VariableKind::Bool => "Bool",
            VariableKind::DateTime => "DateTime",
            VariableKind::Int => "Int",
            VariableKind::Null => "Null",
            VariableKind::String => "String",
        }
    }

    /// Schema of `value` on a resource; null variables have none
    fn value_field(self) -> Option<Field> {
        match self {
            VariableKind::Bool => Some(Field::bool().optional()),
            VariableKind::DateTime => {
                Some(Field::string().optional().validate(validate::rfc3339_time()))
            }
            VariableKind::Int => Some(
                Field::int()
                    .optional()
                    .validate(validate::int_between(i32::MIN as i64, i32::MAX as i64)),
            ),
            VariableKind::String => {
                Some(Field::string().optional().validate(validate::no_empty_strings()))
            }
            VariableKind::Null => None,
        }
    }

    fn computed_value_field(self) -> Option<Field> {
        match self {
            VariableKind::Bool => Some(Field::bool().computed()),
            VariableKind::Int => Some(Field::int().computed()),
            VariableKind::DateTime | VariableKind::String => Some(Field::string().computed()),
            VariableKind::Null => None,
        }
    }
}

/// A variable value decoded from its stored text
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Null,
    Bool(bool),
    DateTime(DateTime<Utc>),
    Int(i32),
    String(String),
}

impl VariableValue {
    pub fn kind(&self) -> VariableKind {
        match self {
            VariableValue::Null => VariableKind::Null,
            VariableValue::Bool(_) => VariableKind::Bool,
            VariableValue::DateTime(_) => VariableKind::DateTime,
            VariableValue::Int(_) => VariableKind::Int,
            VariableValue::String(_) => VariableKind::String,
        }
    }

    /// The value as it appears in state; `None` for null variables
    pub fn to_state(&self) -> Option<Value> {
        match self {
            VariableValue::Null => None,
            VariableValue::Bool(b) => Some(json!(b)),
            VariableValue::DateTime(t) => Some(json!(format_datetime(t))),
            VariableValue::Int(i) => Some(json!(i)),
            VariableValue::String(s) => Some(json!(s)),
        }
    }
}

/// `2006-01-02T15:04:05.123Z`, with trailing zeros of the milliseconds trimmed
pub fn format_datetime(t: &DateTime<Utc>) -> String {
    let base = t.format("%Y-%m-%dT%H:%M:%S");
    let millis = t.timestamp_subsec_millis();
    if millis == 0 {
        return format!("{}Z", base);
    }
    let fraction = format!("{:03}", millis);
    format!("{}.{}Z", base, fraction.trim_end_matches('0'))
}

/// Milliseconds from `"\/Date(<millis>)\/"`; the whole input must match
/// Tick text of a `"\/Date(...)\/"` literal
fn date_ticks(input: &str) -> Option<&str> {
    let ticks = input.strip_prefix(DATE_PREFIX)?.strip_suffix(DATE_SUFFIX)?;
    let digits = ticks.strip_prefix('-').unwrap_or(ticks);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(ticks)
}

fn parse_bool(input: &str) -> Option<bool> {
    match input {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Work out which kind of value some stored text holds
fn classify(input: &str) -> Option<VariableValue> {
    // A date literal out of range is unknown, not a string
    if let Some(ticks) = date_ticks(input) {
        return ticks
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .map(VariableValue::DateTime);
    }
    if input.starts_with('"') {
        if let Ok(s) = serde_json::from_str::<String>(input) {
            return Some(VariableValue::String(s));
        }
    }
    if let Ok(i) = input.parse::<i32>() {
        return Some(VariableValue::Int(i));
    }
    parse_bool(input).map(VariableValue::Bool)
}

/// Decode stored text, failing unless it holds a value of `expected` kind
pub fn parse_value(expected: VariableKind, input: Option<&str>) -> Result<VariableValue> {
    let Some(input) = input else {
        if expected != VariableKind::Null {
            return Err(ProviderError::UnexpectedResponse(format!(
                "Expected value \"nil\" to be {:?}, actual type is {:?}",
                expected.type_name(),
                VariableKind::Null.type_name()
            )));
        }
        return Ok(VariableValue::Null);
    };

    let value = classify(input);
    let actual = value.as_ref().map(|v| v.kind().type_name()).unwrap_or("Unknown");
    match value {
        Some(value) if value.kind() == expected => Ok(value),
        _ => Err(ProviderError::UnexpectedResponse(format!(
            "Expected value {:?} to be {:?}, actual type is {:?}",
            input,
            expected.type_name(),
            actual
        ))),
    }
}

/// Stored text for a configured value; `None` for null variables
pub fn encode_value(kind: VariableKind, value: Option<&Value>) -> Result<Option<String>> {
    let encoded = match kind {
        VariableKind::Null => return Ok(None),
        VariableKind::Bool => value.and_then(Value::as_bool).unwrap_or_default().to_string(),
        VariableKind::Int => value.and_then(Value::as_i64).unwrap_or_default().to_string(),
        VariableKind::String => {
            let s = value.and_then(Value::as_str).unwrap_or_default();
            serde_json::to_string(s)?
        }
        VariableKind::DateTime => {
            let raw = value.and_then(Value::as_str).unwrap_or_default();
            let t = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                ProviderError::Validation(vec![format!("value: invalid time format {:?}: {}", raw, e)])
            })?;
            format!("{}{}{}", DATE_PREFIX, t.timestamp_millis(), DATE_SUFFIX)
        }
    };
    Ok(Some(encoded))
}

/// Fill description, encryption and (for unencrypted variables) the value
fn flatten_variable(kind: VariableKind, resp: &Value, d: &mut ResourceData) -> Result<()> {
    let Some(properties) = resp.get("properties") else {
        return Ok(());
    };
    d.set("description", str_at(properties, "/description"));
    let encrypted = properties
        .get("isEncrypted")
        .and_then(Value::as_bool)
        .unwrap_or_default();
    d.set("encrypted", encrypted);

    if !encrypted {
        let stored = properties.get("value").and_then(Value::as_str);
        if let Some(value) = parse_value(kind, stored)?.to_state() {
            d.set("value", value);
        }
    }
    Ok(())
}

fn describe(kind: VariableKind, id: &AutomationVariableId) -> String {
    format!(
        "Automation {} Variable {:?} (Automation Account Name {:?} / Resource Group {:?})",
        kind.label(),
        id.name,
        id.account_name,
        id.resource_group
    )
}

/// Resource handlers for every variable kind
pub fn resources() -> Vec<Arc<dyn ResourceHandler>> {
    VariableKind::ALL
        .into_iter()
        .map(|kind| Arc::new(Variable::new(kind)) as Arc<dyn ResourceHandler>)
        .collect()
}

/// Data source handlers; a null variable has nothing to look up
pub fn data_sources() -> Vec<Arc<dyn DataSourceHandler>> {
    VariableKind::ALL
        .into_iter()
        .filter(|kind| *kind != VariableKind::Null)
        .map(|kind| Arc::new(VariableDataSource::new(kind)) as Arc<dyn DataSourceHandler>)
        .collect()
}

// =============================================================================
// Resource
// =============================================================================

pub struct Variable {
    kind: VariableKind,
}

impl Variable {
    pub fn new(kind: VariableKind) -> Self {
        Self { kind }
    }

    async fn create_update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = AutomationVariableId::new(
            &client.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("automation_account_name"),
            d.get_str("name"),
        );
        let url = client.resource_url(&id.id(), AUTOMATION_API_VERSION);
        let description = describe(self.kind, &id);

        if d.is_new_resource() {
            require_absent(client, &url, self.type_name(), &description).await?;
        }

        let mut properties = Map::new();
        properties.insert("description".to_string(), json!(d.get_str("description")));
        properties.insert("isEncrypted".to_string(), json!(d.get_bool("encrypted")));
        if let Some(value) = encode_value(self.kind, d.get("value"))? {
            properties.insert("value".to_string(), json!(value));
        }
        let body = json!({
            "name": id.name,
            "properties": properties,
        });

        client
            .put(&url, &body)
            .await
            .context_with(|| format!("creating {}", description))?;

        let resp = client
            .get(&url)
            .await
            .context_with(|| format!("retrieving {}", description))?;
        let resource_id = str_at(&resp, "/id");
        if resource_id.is_empty() {
            return Err(ProviderError::UnexpectedResponse(format!(
                "cannot read {} ID",
                description
            )));
        }
        d.set_id(resource_id);

        self.read(client, d).await
    }
}

#[async_trait]
impl ResourceHandler for Variable {
    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn schema(&self) -> Schema {
        let schema = Schema::new()
            .field("resource_group_name", resource_group_name())
            .field(
                "name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::no_empty_strings()),
            )
            .field(
                "automation_account_name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::automation_account_name()),
            )
            .field("description", Field::string().optional())
            .field("encrypted", Field::bool().optional().default(false));

        match self.kind.value_field() {
            Some(value) => schema.field("value", value),
            None => schema,
        }
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        AutomationVariableId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = AutomationVariableId::parse(d.id())?;
        let url = client.resource_url(&id.id(), AUTOMATION_API_VERSION);
        let description = describe(self.kind, &id);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                tracing::info!("{} does not exist - removing from state", description);
                d.set_id("");
                return Ok(());
            }
            Err(e) => return Err(e.context(format!("reading {}", description))),
        };

        d.set("name", str_at(&resp, "/name"));
        d.set("resource_group_name", id.resource_group.as_str());
        d.set("automation_account_name", id.account_name.as_str());
        flatten_variable(self.kind, &resp, d)
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = AutomationVariableId::parse(d.id())?;
        let url = client.resource_url(&id.id(), AUTOMATION_API_VERSION);
        delete_ignoring_not_found(client, &url, false)
            .await
            .context_with(|| format!("deleting {}", describe(self.kind, &id)))
    }
}

// =============================================================================
// Data source
// =============================================================================

pub struct VariableDataSource {
    kind: VariableKind,
}

impl VariableDataSource {
    pub fn new(kind: VariableKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl DataSourceHandler for VariableDataSource {
    fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    fn schema(&self) -> Schema {
        let schema = Schema::new()
            .field("resource_group_name", resource_group_name_for_data_source())
            .field(
                "name",
                Field::string().required().validate(validate::no_empty_strings()),
            )
            .field(
                "automation_account_name",
                Field::string()
                    .required()
                    .validate(validate::automation_account_name()),
            )
            .field("description", Field::string().computed())
            .field("encrypted", Field::bool().computed());

        match self.kind.computed_value_field() {
            Some(value) => schema.field("value", value),
            None => schema,
        }
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = AutomationVariableId::new(
            &client.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("automation_account_name"),
            d.get_str("name"),
        );
        let url = client.resource_url(&id.id(), AUTOMATION_API_VERSION);
        let description = describe(self.kind, &id);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                return Err(ProviderError::NotFound(description));
            }
            Err(e) => return Err(e.context(format!("reading {}", description))),
        };

        d.set_id(str_at(&resp, "/id"));
        d.set("name", str_at(&resp, "/name"));
        flatten_variable(self.kind, &resp, d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_datetime_encoding() {
        let encoded = encode_value(VariableKind::DateTime, Some(&json!("2019-04-20T08:40:04.02Z")))
            .unwrap()
            .unwrap();
        assert_eq!(encoded, r#""\/Date(1555749604020)\/""#);

        let decoded = parse_value(VariableKind::DateTime, Some(&encoded)).unwrap();
        assert_eq!(decoded.to_state(), Some(json!("2019-04-20T08:40:04.02Z")));
    }

    #[test]
    fn test_datetime_without_fraction() {
        let t = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_datetime(&t), "2020-01-02T03:04:05Z");
    }

    #[test]
    fn test_negative_ticks() {
        let decoded = parse_value(VariableKind::DateTime, Some(r#""\/Date(-1000)\/""#)).unwrap();
        assert_eq!(decoded.to_state(), Some(json!("1969-12-31T23:59:59Z")));
    }

    #[test]
    fn test_string_is_json_quoted() {
        let encoded = encode_value(VariableKind::String, Some(&json!("say \"hi\"")))
            .unwrap()
            .unwrap();
        assert_eq!(encoded, r#""say \"hi\"""#);
        assert_eq!(
            parse_value(VariableKind::String, Some(&encoded)).unwrap(),
            VariableValue::String("say \"hi\"".to_string())
        );
    }

    #[test]
    fn test_int_and_bool() {
        assert_eq!(
            encode_value(VariableKind::Int, Some(&json!(-42))).unwrap(),
            Some("-42".to_string())
        );
        assert_eq!(
            parse_value(VariableKind::Int, Some("-42")).unwrap(),
            VariableValue::Int(-42)
        );
        assert_eq!(
            parse_value(VariableKind::Bool, Some("True")).unwrap(),
            VariableValue::Bool(true)
        );
        assert_eq!(
            encode_value(VariableKind::Bool, Some(&json!(false))).unwrap(),
            Some("false".to_string())
        );
    }

    #[test]
    fn test_digit_one_classifies_as_int() {
        let err = parse_value(VariableKind::Bool, Some("1")).unwrap_err();
        assert!(err.to_string().contains("azurerm_automation_variable_int"));
    }

    #[test]
    fn test_mismatch_names_both_kinds() {
        let err = parse_value(VariableKind::Int, Some(r#""text""#)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("azurerm_automation_variable_int"));
        assert!(msg.contains("azurerm_automation_variable_string"));

        let err = parse_value(VariableKind::String, Some("not a value")).unwrap_err();
        assert!(err.to_string().contains("Unknown"));
    }

    #[test]
    fn test_out_of_range_date_is_unknown() {
        let input = r#""\/Date(99999999999999999999)\/""#;
        let err = parse_value(VariableKind::String, Some(input)).unwrap_err();
        assert!(err.to_string().contains("Unknown"), "{err}");
        assert!(parse_value(VariableKind::DateTime, Some(input)).is_err());
    }

    #[test]
    fn test_null_kind() {
        assert_eq!(encode_value(VariableKind::Null, Some(&json!("x"))).unwrap(), None);
        assert_eq!(parse_value(VariableKind::Null, None).unwrap(), VariableValue::Null);
        assert!(parse_value(VariableKind::String, None).is_err());
        assert!(parse_value(VariableKind::Null, Some("5")).is_err());
    }

    #[test]
    fn test_invalid_datetime_is_rejected() {
        assert!(encode_value(VariableKind::DateTime, Some(&json!("yesterday"))).is_err());
    }

    #[test]
    fn test_encrypted_value_is_not_read() {
        let resp = json!({
            "properties": {"description": "d", "isEncrypted": true, "value": "garbage"}
        });
        let mut d = ResourceData::from_state("id", Map::new());
        flatten_variable(VariableKind::Int, &resp, &mut d).unwrap();
        assert!(d.get_bool("encrypted"));
        assert!(d.get("value").is_none());
    }

    #[test]
    fn test_handler_sets() {
        assert_eq!(resources().len(), 5);
        let names: Vec<_> = data_sources().iter().map(|h| h.type_name()).collect();
        assert_eq!(names.len(), 4);
        assert!(!names.contains(&"azurerm_automation_variable_null"));
    }

    #[test]
    fn test_null_schema_has_no_value() {
        assert!(Variable::new(VariableKind::Null).schema().get("value").is_none());
        assert!(Variable::new(VariableKind::Int).schema().get("value").is_some());
    }
}
