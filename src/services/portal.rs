//! Shared portal dashboards

use super::{
    delete_ignoring_not_found, flatten_location, location, require_absent, resource_group_name,
};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result, ResultExt};
use crate::resource::id::DashboardId;
use crate::resource::{tags, validate, Field, ResourceData, ResourceHandler, Schema};
use async_trait::async_trait;
use serde_json::{json, Value};

const PORTAL_API_VERSION: &str = "2019-01-01-preview";

pub struct Dashboard;

/// Parse `dashboard_properties`; unset means an empty dashboard
pub fn expand_dashboard_properties(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|e| {
        ProviderError::Validation(vec![format!("dashboard_properties: error parsing JSON: {}", e)])
    })
}

/// Canonical text of the returned properties
pub fn flatten_dashboard_properties(properties: Option<&Value>) -> Result<String> {
    let properties = properties.cloned().unwrap_or_else(|| json!({}));
    Ok(serde_json::to_string(&properties)?)
}

impl Dashboard {
    async fn create_update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = DashboardId::new(
            &client.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("name"),
        );
        let url = client.resource_url(&id.id(), PORTAL_API_VERSION);
        let description = format!(
            "Dashboard {:?} (Resource Group {:?})",
            id.name, id.resource_group
        );

        if d.is_new_resource() {
            require_absent(client, &url, self.type_name(), &description).await?;
        }

        let body = json!({
            "location": validate::normalize_location(d.get_str("location")),
            "tags": tags::expand(d),
            "properties": expand_dashboard_properties(d.get_str("dashboard_properties"))?,
        });

        client
            .put(&url, &body)
            .await
            .context_with(|| format!("creating/updating {}", description))?;

        // The ID is known up front; no need to read it back
        d.set_id(id.id());
        self.read(client, d).await
    }
}

#[async_trait]
impl ResourceHandler for Dashboard {
    fn type_name(&self) -> &'static str {
        "azurerm_dashboard"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                "name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::dashboard_name()),
            )
            .field("resource_group_name", resource_group_name())
            .field("location", location())
            .field("tags", tags::schema())
            .field(
                "dashboard_properties",
                Field::string()
                    .optional()
                    .computed()
                    .validate(validate::json_string())
                    .state_func(validate::json_state),
            )
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        DashboardId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = DashboardId::parse(d.id())?;
        let url = client.resource_url(&id.id(), PORTAL_API_VERSION);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    "Dashboard {:?} was not found in Resource Group {:?} - removing from state",
                    id.name,
                    id.resource_group
                );
                d.set_id("");
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!(
                    "retrieving Dashboard {:?} (Resource Group {:?})",
                    id.name, id.resource_group
                )))
            }
        };

        d.set("name", id.name.as_str());
        d.set("resource_group_name", id.resource_group.as_str());
        let location = flatten_location(&resp);
        if !location.is_null() {
            d.set("location", location);
        }
        d.set(
            "dashboard_properties",
            flatten_dashboard_properties(resp.get("properties"))?,
        );
        d.set("tags", tags::flatten(resp.get("tags")));
        Ok(())
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = DashboardId::parse(d.id())?;
        let url = client.resource_url(&id.id(), PORTAL_API_VERSION);
        delete_ignoring_not_found(client, &url, false)
            .await
            .context_with(|| {
                format!(
                    "deleting Dashboard {:?} (Resource Group {:?})",
                    id.name, id.resource_group
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_round_trip_is_normalised() {
        let raw = r#"{ "metadata": {"model": {}}, "lenses": {"0": {"order": 0, "parts": {}}} }"#;
        let expanded = expand_dashboard_properties(raw).unwrap();
        let flattened = flatten_dashboard_properties(Some(&expanded)).unwrap();
        assert_eq!(flattened, validate::normalize_json(raw));
    }

    #[test]
    fn test_unset_properties_are_empty() {
        assert_eq!(expand_dashboard_properties("").unwrap(), json!({}));
        assert_eq!(flatten_dashboard_properties(None).unwrap(), "{}");
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(expand_dashboard_properties("{not json").is_err());
        let problems = Dashboard.schema().validate(
            json!({
                "name": "dash",
                "resource_group_name": "rg",
                "location": "westeurope",
                "dashboard_properties": "{not json"
            })
            .as_object()
            .unwrap(),
        );
        assert_eq!(problems.len(), 1);
    }
}
