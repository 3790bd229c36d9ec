//! Storage Sync services

use super::{
    delete_ignoring_not_found, flatten_location, location, require_absent, resource_group_name,
    str_at,
};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result, ResultExt};
use crate::resource::id::StorageSyncServiceId;
use crate::resource::{tags, validate, Field, ResourceData, ResourceHandler, Schema};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const STORAGE_SYNC_API_VERSION: &str = "2020-03-01";

const ALLOW_ALL_TRAFFIC: &str = "AllowAllTraffic";
const INCOMING_TRAFFIC_POLICIES: &[&str] = &[ALLOW_ALL_TRAFFIC, "AllowVirtualNetworksOnly"];

pub struct StorageSync;

fn describe(id: &StorageSyncServiceId) -> String {
    format!(
        "Storage Sync (Storage Sync Name {:?} / Resource Group {:?})",
        id.name, id.resource_group
    )
}

/// PATCH body carrying only what changed since the prior state
pub fn expand_update(d: &ResourceData) -> Value {
    let mut update = Map::new();
    if d.has_change("tags") {
        update.insert("tags".to_string(), tags::expand(d));
    }
    if d.has_change("incoming_traffic_policy") {
        update.insert(
            "properties".to_string(),
            json!({ "incomingTrafficPolicy": d.get_str("incoming_traffic_policy") }),
        );
    }
    Value::Object(update)
}

#[async_trait]
impl ResourceHandler for StorageSync {
    fn type_name(&self) -> &'static str {
        "azurerm_storage_sync"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                "name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::storage_sync_name()),
            )
            .field("resource_group_name", resource_group_name())
            .field("location", location())
            .field(
                "incoming_traffic_policy",
                Field::string()
                    .optional()
                    .default(ALLOW_ALL_TRAFFIC)
                    .validate(validate::string_in_slice(INCOMING_TRAFFIC_POLICIES, false)),
            )
            .field("tags", tags::schema())
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        StorageSyncServiceId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = StorageSyncServiceId::new(
            &client.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("name"),
        );
        let url = client.resource_url(&id.id(), STORAGE_SYNC_API_VERSION);
        let description = describe(&id);

        require_absent(client, &url, self.type_name(), &description).await?;

        let body = json!({
            "location": validate::normalize_location(d.get_str("location")),
            "properties": {
                "incomingTrafficPolicy": d.get_str("incoming_traffic_policy"),
            },
            "tags": tags::expand(d),
        });
        client
            .put_and_wait(&url, &body)
            .await
            .context_with(|| format!("creating {}", description))?;

        let resp = client
            .get(&url)
            .await
            .context_with(|| format!("retrieving {}", description))?;
        let resource_id = str_at(&resp, "/id");
        if resource_id.is_empty() {
            return Err(ProviderError::UnexpectedResponse(format!(
                "{} ID is empty",
                description
            )));
        }
        d.set_id(resource_id);

        self.read(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = StorageSyncServiceId::parse(d.id())?;
        let url = client.resource_url(&id.id(), STORAGE_SYNC_API_VERSION);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                tracing::info!("Storage Sync {:?} does not exist - removing from state", d.id());
                d.set_id("");
                return Ok(());
            }
            Err(e) => return Err(e.context(format!("reading {}", describe(&id)))),
        };

        d.set("name", str_at(&resp, "/name"));
        d.set("resource_group_name", id.resource_group.as_str());
        d.set("location", flatten_location(&resp));
        if resp.get("properties").is_some() {
            d.set(
                "incoming_traffic_policy",
                str_at(&resp, "/properties/incomingTrafficPolicy"),
            );
        }
        d.set("tags", tags::flatten(resp.get("tags")));
        Ok(())
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = StorageSyncServiceId::parse(d.id())?;
        let url = client.resource_url(&id.id(), STORAGE_SYNC_API_VERSION);

        client
            .patch_and_wait(&url, &expand_update(d))
            .await
            .context_with(|| format!("updating {}", describe(&id)))?;

        self.read(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = StorageSyncServiceId::parse(d.id())?;
        let url = client.resource_url(&id.id(), STORAGE_SYNC_API_VERSION);
        delete_ignoring_not_found(client, &url, true)
            .await
            .context_with(|| format!("deleting {}", describe(&id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(policy: &str, env: &str) -> Map<String, Value> {
        json!({
            "name": "sync",
            "resource_group_name": "rg",
            "location": "westeurope",
            "incoming_traffic_policy": policy,
            "tags": {"env": env}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_update_sends_only_changes() {
        let d = ResourceData::from_state("id", state("AllowVirtualNetworksOnly", "dev"))
            .with_prior(state("AllowAllTraffic", "dev"));
        assert_eq!(
            expand_update(&d),
            json!({"properties": {"incomingTrafficPolicy": "AllowVirtualNetworksOnly"}})
        );

        let d = ResourceData::from_state("id", state("AllowAllTraffic", "prod"))
            .with_prior(state("AllowAllTraffic", "dev"));
        assert_eq!(expand_update(&d), json!({"tags": {"env": "prod"}}));
    }

    #[test]
    fn test_default_traffic_policy() {
        let mut config = state("AllowAllTraffic", "dev");
        config.remove("incoming_traffic_policy");
        StorageSync.schema().apply_defaults(&mut config);
        assert_eq!(config["incoming_traffic_policy"], json!(ALLOW_ALL_TRAFFIC));
    }

    #[test]
    fn test_import_requires_storage_sync_id() {
        assert!(StorageSync
            .validate_import_id("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.StorageSync/storageSyncServices/sync")
            .is_ok());
        assert!(StorageSync
            .validate_import_id("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acct")
            .is_err());
    }
}
