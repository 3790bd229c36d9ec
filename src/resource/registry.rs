//! Handler Registry
//!
//! Maps type names to their handlers and provides lookup functions for the
//! rest of the application.

use super::handler::{DataSourceHandler, ResourceHandler};
use crate::services;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Every registered handler, keyed by type name
pub struct Registry {
    pub resources: BTreeMap<&'static str, Arc<dyn ResourceHandler>>,
    pub data_sources: BTreeMap<&'static str, Arc<dyn DataSourceHandler>>,
}

/// Global registry
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the handler registry (built on first access)
pub fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut registry = Registry {
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
        };

        for handler in services::resources() {
            registry.resources.insert(handler.type_name(), handler);
        }
        for handler in services::data_sources() {
            registry.data_sources.insert(handler.type_name(), handler);
        }

        registry
    })
}

/// Get a resource handler by type name
pub fn get_resource(type_name: &str) -> Option<Arc<dyn ResourceHandler>> {
    get_registry().resources.get(type_name).cloned()
}

/// Get a data source handler by type name
pub fn get_data_source(type_name: &str) -> Option<Arc<dyn DataSourceHandler>> {
    get_registry().data_sources.get(type_name).cloned()
}

/// All resource type names, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    get_registry().resources.keys().copied().collect()
}

/// All data source type names, sorted
pub fn get_all_data_source_keys() -> Vec<&'static str> {
    get_registry().data_sources.keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(!registry.resources.is_empty(), "Registry should have resources");
        assert!(
            !registry.data_sources.is_empty(),
            "Registry should have data sources"
        );
    }

    #[test]
    fn test_every_resource_type_is_registered() {
        let keys = get_all_resource_keys();
        for expected in [
            "azurerm_iothub_endpoint_servicebus_queue",
            "azurerm_sql_firewall_rule",
            "azurerm_sql_failover_group",
            "azurerm_data_factory_dataset_azure_blob",
            "azurerm_automation_variable_bool",
            "azurerm_automation_variable_datetime",
            "azurerm_automation_variable_int",
            "azurerm_automation_variable_null",
            "azurerm_automation_variable_string",
            "azurerm_network_interface_security_group_association",
            "azurerm_express_route_gateway",
            "azurerm_dev_test_policy",
            "azurerm_storage_sync",
            "azurerm_dashboard",
        ] {
            assert!(keys.contains(&expected), "missing resource {expected}");
        }
        assert_eq!(keys.len(), 14);
    }

    #[test]
    fn test_every_data_source_is_registered() {
        let keys = get_all_data_source_keys();
        for expected in [
            "azurerm_container_registry_token",
            "azurerm_monitor_action_group",
            "azurerm_subscription",
            "azurerm_key_vault_certificate",
            "azurerm_automation_variable_bool",
            "azurerm_automation_variable_datetime",
            "azurerm_automation_variable_int",
            "azurerm_automation_variable_string",
        ] {
            assert!(keys.contains(&expected), "missing data source {expected}");
        }
        assert!(get_data_source("azurerm_automation_variable_null").is_none());
    }

    #[test]
    fn test_every_schema_declares_its_fields() {
        for handler in get_registry().resources.values() {
            assert!(!handler.schema().is_empty(), "{} has no fields", handler.type_name());
        }
        for handler in get_registry().data_sources.values() {
            assert!(!handler.schema().is_empty(), "{} has no fields", handler.type_name());
        }
    }
}
