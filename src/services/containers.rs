//! Container registry tokens

use super::{resource_group_name_for_data_source, str_at};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result};
use crate::resource::{validate, DataSourceHandler, Field, ResourceData, Schema};
use async_trait::async_trait;
use serde_json::Value;

const CONTAINER_REGISTRY_API_VERSION: &str = "2020-11-01-preview";

pub struct RegistryTokenDataSource;

/// Tokens are enabled unless explicitly disabled
pub fn token_enabled(token: &Value) -> bool {
    !str_at(token, "/properties/status").eq_ignore_ascii_case("disabled")
}

#[async_trait]
impl DataSourceHandler for RegistryTokenDataSource {
    fn type_name(&self) -> &'static str {
        "azurerm_container_registry_token"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                "name",
                Field::string()
                    .required()
                    .validate(validate::container_registry_token_name()),
            )
            .field(
                "container_registry_name",
                Field::string()
                    .required()
                    .validate(validate::container_registry_name()),
            )
            .field("resource_group_name", resource_group_name_for_data_source())
            .field("scope_map_id", Field::string().computed())
            .field("enabled", Field::bool().computed())
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let resource_group = d.get_str("resource_group_name").to_string();
        let registry_name = d.get_str("container_registry_name").to_string();
        let name = d.get_str("name").to_string();

        let path = client.provider_path(
            &resource_group,
            "Microsoft.ContainerRegistry",
            &["registries", registry_name.as_str(), "tokens", name.as_str()],
        );
        let url = client.resource_url(&path, CONTAINER_REGISTRY_API_VERSION);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                return Err(ProviderError::NotFound(format!(
                    "Container Registry token {:?} was not found in Resource Group {:?}",
                    name, resource_group
                )))
            }
            Err(e) => {
                return Err(e.context(format!(
                    "making Read request on token {:?} (Azure Container Registry {:?}, Resource Group {:?})",
                    name, registry_name, resource_group
                )))
            }
        };

        let id = str_at(&resp, "/id");
        if id.is_empty() {
            return Err(ProviderError::UnexpectedResponse(format!(
                "retrieving Container Registry Token {:?} (Azure Container Registry {:?}, Resource Group {:?}): `id` was nil",
                name, registry_name, resource_group
            )));
        }

        d.set_id(id);
        d.set("name", str_at(&resp, "/name"));
        d.set("scope_map_id", str_at(&resp, "/properties/scopeMapId"));
        d.set("enabled", token_enabled(&resp));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_status() {
        assert!(token_enabled(&json!({"properties": {"status": "enabled"}})));
        assert!(!token_enabled(&json!({"properties": {"status": "disabled"}})));
        assert!(token_enabled(&json!({"properties": {}})));
    }

    #[test]
    fn test_registry_name_is_validated() {
        let problems = RegistryTokenDataSource.schema().validate(
            json!({
                "name": "token1",
                "container_registry_name": "bad-name",
                "resource_group_name": "rg"
            })
            .as_object()
            .unwrap(),
        );
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("container_registry_name"));
    }
}
