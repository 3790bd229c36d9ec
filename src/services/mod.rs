//! Resource and data source handlers, one module per Azure service

use crate::azure::ArmClient;
use crate::error::{ProviderError, Result, ResultExt};
use crate::resource::handler::{DataSourceHandler, ResourceHandler};
use crate::resource::schema::Field;
use crate::resource::validate;
use serde_json::Value;
use std::sync::Arc;

pub mod automation;
pub mod containers;
pub mod datafactory;
pub mod devtestlabs;
pub mod iothub;
pub mod keyvault;
pub mod monitor;
pub mod network;
pub mod portal;
pub mod sql;
pub mod storage;
pub mod subscription;

/// Every resource handler
pub fn resources() -> Vec<Arc<dyn ResourceHandler>> {
    let mut out: Vec<Arc<dyn ResourceHandler>> = vec![
        Arc::new(iothub::EndpointServiceBusQueue),
        Arc::new(sql::FirewallRule),
        Arc::new(sql::FailoverGroup),
        Arc::new(datafactory::DatasetAzureBlob),
        Arc::new(network::InterfaceSecurityGroupAssociation),
        Arc::new(network::ExpressRouteGateway),
        Arc::new(devtestlabs::Policy),
        Arc::new(storage::StorageSync),
        Arc::new(portal::Dashboard),
    ];
    out.extend(automation::resources());
    out
}

/// Every data source handler
pub fn data_sources() -> Vec<Arc<dyn DataSourceHandler>> {
    let mut out: Vec<Arc<dyn DataSourceHandler>> = vec![
        Arc::new(containers::RegistryTokenDataSource),
        Arc::new(monitor::ActionGroupDataSource),
        Arc::new(subscription::SubscriptionDataSource),
        Arc::new(keyvault::CertificateDataSource),
    ];
    out.extend(automation::data_sources());
    out
}

// =============================================================================
// Shared schema fields
// =============================================================================

pub(crate) fn resource_group_name() -> Field {
    Field::string()
        .required()
        .force_new()
        .validate(validate::resource_group_name())
}

/// Resource group a data source looks in
pub(crate) fn resource_group_name_for_data_source() -> Field {
    Field::string()
        .required()
        .validate(validate::resource_group_name())
}

pub(crate) fn location() -> Field {
    Field::string()
        .required()
        .force_new()
        .state_func(validate::location_state)
        .diff_suppress(validate::suppress_location_diff)
}

pub(crate) fn location_computed() -> Field {
    Field::string().computed()
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Fail with "already exists" if a GET on `url` finds an object
pub(crate) async fn require_absent(
    client: &ArmClient,
    url: &str,
    resource_type: &str,
    description: &str,
) -> Result<()> {
    let existing = client
        .get_optional(url)
        .await
        .context_with(|| format!("checking for presence of existing {}", description))?;

    if let Some(existing) = existing {
        let id = str_at(&existing, "/id");
        if !id.is_empty() {
            return Err(ProviderError::already_exists(resource_type, id));
        }
    }
    Ok(())
}

/// String at a JSON pointer, empty when absent
pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Clone of the value at a JSON pointer, null when absent
pub(crate) fn value_at(value: &Value, pointer: &str) -> Value {
    value.pointer(pointer).cloned().unwrap_or(Value::Null)
}

/// Location as ARM normalises it
pub(crate) fn flatten_location(value: &Value) -> Value {
    match value.get("location").and_then(Value::as_str) {
        Some(location) => Value::String(validate::normalize_location(location)),
        None => Value::Null,
    }
}

/// Delete that treats a missing object as already gone
pub(crate) async fn delete_ignoring_not_found(
    client: &ArmClient,
    url: &str,
    wait: bool,
) -> Result<()> {
    let result = if wait {
        client.delete_and_wait(url).await
    } else {
        client.delete(url).await.map(|_| ())
    };
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_str_at() {
        let v = json!({"properties": {"name": "x", "n": 1}});
        assert_eq!(str_at(&v, "/properties/name"), "x");
        assert_eq!(str_at(&v, "/properties/n"), "");
        assert_eq!(str_at(&v, "/missing"), "");
    }

    #[test]
    fn test_flatten_location() {
        assert_eq!(flatten_location(&json!({"location": "West Europe"})), json!("westeurope"));
        assert_eq!(flatten_location(&json!({})), Value::Null);
    }

    #[test]
    fn test_handlers_are_unique() {
        let resources = resources();
        let mut names: Vec<_> = resources.iter().map(|h| h.type_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), resources.len());
    }
}
