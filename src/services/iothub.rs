//! IoT Hub routing endpoints
//!
//! Endpoints are not ARM resources of their own: they live in the hub's
//! `properties.routing.endpoints` lists, so every change rewrites the whole
//! hub under the hub's lock.

use super::{resource_group_name, str_at};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result, ResultExt};
use crate::resource::id::ResourceId;
use crate::resource::{validate, Field, ResourceData, ResourceHandler, Schema};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

const IOTHUB_API_VERSION: &str = "2020-03-01";

/// Lock kind shared by everything that rewrites an IoT Hub
pub const IOTHUB_RESOURCE_NAME: &str = "azurerm_iothub";

pub struct EndpointServiceBusQueue;

fn hub_url(client: &ArmClient, resource_group: &str, hub_name: &str) -> String {
    let path = client.provider_path(resource_group, "Microsoft.Devices", &["IotHubs", hub_name]);
    client.resource_url(&path, IOTHUB_API_VERSION)
}

/// Parts of an endpoint ID: `{hubId}/Endpoints/{name}`
struct EndpointId {
    resource_group: String,
    hub_name: String,
    name: String,
}

impl EndpointId {
    fn parse(input: &str) -> Result<Self> {
        let id = ResourceId::parse(input)?;
        if id.resource_group.is_empty() {
            return Err(ProviderError::invalid_id(input, "ID was missing the `resourceGroups` element"));
        }
        Ok(Self {
            resource_group: id.resource_group.clone(),
            hub_name: id.pop("IotHubs")?,
            name: id.pop("Endpoints")?,
        })
    }
}

/// The hub's Service Bus queue endpoint list, created if absent
fn service_bus_queues(hub: &mut Value) -> Option<&mut Vec<Value>> {
    let mut node = hub;
    for key in ["properties", "routing", "endpoints"] {
        let child = node
            .as_object_mut()?
            .entry(key)
            .or_insert_with(|| json!({}));
        if child.is_null() {
            *child = json!({});
        }
        node = child;
    }

    let queues = node
        .as_object_mut()?
        .entry("serviceBusQueues")
        .or_insert_with(|| json!([]));
    if queues.is_null() {
        *queues = json!([]);
    }
    queues.as_array_mut()
}

fn same_name(endpoint: &Value, name: &str) -> bool {
    endpoint
        .get("name")
        .and_then(Value::as_str)
        .map(|n| n.eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

/// Insert or replace `endpoint` in the hub's queue list
///
/// A new endpoint must not already exist; an existing one must be found.
pub fn upsert_endpoint(
    hub: &mut Value,
    endpoint: Value,
    is_new: bool,
    resource_id: &str,
) -> Result<()> {
    let name = str_at(&endpoint, "/name").to_string();
    let queues = service_bus_queues(hub).ok_or_else(|| {
        ProviderError::UnexpectedResponse("IoT Hub routing properties are not objects".to_string())
    })?;

    let mut updated = Vec::with_capacity(queues.len() + 1);
    let mut found = false;
    for existing in queues.drain(..) {
        if existing.get("name").and_then(Value::as_str).is_none() {
            continue;
        }
        if same_name(&existing, &name) {
            if is_new {
                return Err(ProviderError::already_exists(
                    "azurerm_iothub_endpoint_servicebus_queue",
                    resource_id,
                ));
            }
            updated.push(endpoint.clone());
            found = true;
        } else {
            updated.push(existing);
        }
    }

    if is_new {
        updated.push(endpoint);
    } else if !found {
        return Err(ProviderError::NotFound(format!(
            "ServiceBus Queue Endpoint {:?} is not defined on the IoT Hub",
            name
        )));
    }

    *queues = updated;
    Ok(())
}

/// Drop the named endpoint; returns false if there was nothing to remove
pub fn remove_endpoint(hub: &mut Value, name: &str) -> bool {
    let Some(queues) = hub
        .pointer_mut("/properties/routing/endpoints/serviceBusQueues")
        .and_then(Value::as_array_mut)
    else {
        return false;
    };
    let before = queues.len();
    queues.retain(|e| e.get("name").and_then(Value::as_str).is_some() && !same_name(e, name));
    queues.len() != before
}

/// Find the named endpoint in a hub
pub fn find_endpoint<'a>(hub: &'a Value, name: &str) -> Option<&'a Value> {
    hub.pointer("/properties/routing/endpoints/serviceBusQueues")
        .and_then(Value::as_array)?
        .iter()
        .find(|e| same_name(e, name))
}

/// ARM masks the key and adds the AMQP port when it echoes a connection string back
pub fn suppress_connection_string_diff(_key: &str, old: &str, new: &str) -> bool {
    static SHARED_ACCESS_KEY: OnceLock<Option<Regex>> = OnceLock::new();
    static SB_PROTOCOL: OnceLock<Option<Regex>> = OnceLock::new();

    let (Some(key_re), Some(sb_re)) = (
        SHARED_ACCESS_KEY
            .get_or_init(|| Regex::new("SharedAccessKey=[^;]+").ok())
            .as_ref(),
        SB_PROTOCOL
            .get_or_init(|| Regex::new("sb://([^:]+)(:5671)?/;").ok())
            .as_ref(),
    ) else {
        return false;
    };

    let masked = sb_re.replace_all(new, "sb://${1}:5671/;");
    let masked = key_re.replace_all(&masked, "SharedAccessKey=****");
    masked == old
}

/// Keep the configured secret when the masked echo matches it
fn flatten_connection_string(configured: &str, remote: &str) -> String {
    if !configured.is_empty()
        && suppress_connection_string_diff("connection_string", remote, configured)
    {
        configured.to_string()
    } else {
        remote.to_string()
    }
}

impl EndpointServiceBusQueue {
    async fn create_update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let hub_name = d.get_str("iothub_name").to_string();
        let resource_group = d.get_str("resource_group_name").to_string();
        let endpoint_name = d.get_str("name").to_string();
        let url = hub_url(client, &resource_group, &hub_name);

        let _lock = client.locks.lock(&hub_name, IOTHUB_RESOURCE_NAME).await;

        let mut hub = match client.get(&url).await {
            Ok(hub) => hub,
            Err(e) if e.is_not_found() => {
                return Err(ProviderError::NotFound(format!(
                    "IotHub {:?} (Resource Group {:?}) was not found",
                    hub_name, resource_group
                )))
            }
            Err(e) => {
                return Err(e.context(format!(
                    "loading IotHub {:?} (Resource Group {:?})",
                    hub_name, resource_group
                )))
            }
        };

        let resource_id = format!("{}/Endpoints/{}", str_at(&hub, "/id"), endpoint_name);
        let endpoint = json!({
            "connectionString": d.get_str("connection_string"),
            "name": endpoint_name,
            "subscriptionId": client.subscription_id,
            "resourceGroup": resource_group,
        });
        upsert_endpoint(&mut hub, endpoint, d.is_new_resource(), &resource_id).context_with(|| {
            format!(
                "updating endpoints of IotHub {:?} (Resource Group {:?})",
                hub_name, resource_group
            )
        })?;

        client.put_and_wait(&url, &hub).await.context_with(|| {
            format!(
                "creating/updating IotHub {:?} (Resource Group {:?})",
                hub_name, resource_group
            )
        })?;

        d.set_id(resource_id);
        self.read(client, d).await
    }
}

#[async_trait]
impl ResourceHandler for EndpointServiceBusQueue {
    fn type_name(&self) -> &'static str {
        "azurerm_iothub_endpoint_servicebus_queue"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                "name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::iothub_endpoint_name()),
            )
            .field("resource_group_name", resource_group_name())
            .field(
                "iothub_name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::iothub_name()),
            )
            .field(
                "connection_string",
                Field::string()
                    .required()
                    .sensitive()
                    .diff_suppress(suppress_connection_string_diff),
            )
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        EndpointId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = EndpointId::parse(d.id())?;
        let url = hub_url(client, &id.resource_group, &id.hub_name);

        let hub = match client.get(&url).await {
            Ok(hub) => hub,
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    "IotHub {:?} (Resource Group {:?}) was not found - removing endpoint {:?} from state",
                    id.hub_name,
                    id.resource_group,
                    id.name
                );
                d.set_id("");
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!(
                    "loading IotHub {:?} (Resource Group {:?})",
                    id.hub_name, id.resource_group
                )))
            }
        };

        let Some(endpoint) = find_endpoint(&hub, &id.name) else {
            tracing::info!(
                "ServiceBus Queue Endpoint {:?} (IotHub {:?}) was not found - removing from state",
                id.name,
                id.hub_name
            );
            d.set_id("");
            return Ok(());
        };

        d.set("name", id.name.as_str());
        d.set("iothub_name", id.hub_name.as_str());
        d.set("resource_group_name", id.resource_group.as_str());
        let remote = str_at(endpoint, "/connectionString");
        let connection_string =
            flatten_connection_string(d.get_str("connection_string"), remote);
        d.set("connection_string", connection_string);
        Ok(())
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = EndpointId::parse(d.id())?;
        let url = hub_url(client, &id.resource_group, &id.hub_name);

        let _lock = client.locks.lock(&id.hub_name, IOTHUB_RESOURCE_NAME).await;

        let mut hub = match client.get_optional(&url).await {
            Ok(Some(hub)) => hub,
            Ok(None) => return Ok(()),
            Err(e) => {
                return Err(e.context(format!(
                    "loading IotHub {:?} (Resource Group {:?})",
                    id.hub_name, id.resource_group
                )))
            }
        };

        if !remove_endpoint(&mut hub, &id.name) {
            return Ok(());
        }

        client.put_and_wait(&url, &hub).await.context_with(|| {
            format!(
                "updating IotHub {:?} (Resource Group {:?}) with ServiceBus Queue Endpoint {:?}",
                id.hub_name, id.resource_group, id.name
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub_with(endpoints: Value) -> Value {
        json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Devices/IotHubs/hub",
            "properties": {"routing": {"endpoints": {"serviceBusQueues": endpoints}}}
        })
    }

    fn endpoint(name: &str, cs: &str) -> Value {
        json!({"name": name, "connectionString": cs})
    }

    #[test]
    fn test_upsert_new_endpoint_keeps_siblings() {
        let mut hub = hub_with(json!([endpoint("a", "1")]));
        upsert_endpoint(&mut hub, endpoint("b", "2"), true, "/id").unwrap();
        let names: Vec<_> = hub["properties"]["routing"]["endpoints"]["serviceBusQueues"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_upsert_new_endpoint_conflicts_case_insensitively() {
        let mut hub = hub_with(json!([endpoint("Queue", "1")]));
        let err = upsert_endpoint(&mut hub, endpoint("queue", "2"), true, "/id").unwrap_err();
        assert!(matches!(err, ProviderError::AlreadyExists { .. }));
    }

    #[test]
    fn test_upsert_existing_replaces_in_place() {
        let mut hub = hub_with(json!([endpoint("a", "1"), endpoint("b", "2"), endpoint("c", "3")]));
        upsert_endpoint(&mut hub, endpoint("b", "new"), false, "/id").unwrap();
        assert_eq!(find_endpoint(&hub, "b").unwrap()["connectionString"], json!("new"));
        assert_eq!(find_endpoint(&hub, "a").unwrap()["connectionString"], json!("1"));
        assert_eq!(find_endpoint(&hub, "c").unwrap()["connectionString"], json!("3"));
    }

    #[test]
    fn test_update_of_missing_endpoint_fails() {
        let mut hub = hub_with(json!([endpoint("a", "1")]));
        assert!(upsert_endpoint(&mut hub, endpoint("b", "2"), false, "/id")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_upsert_into_hub_without_routing() {
        let mut hub = json!({"id": "/hub", "properties": {}});
        upsert_endpoint(&mut hub, endpoint("a", "1"), true, "/id").unwrap();
        assert!(find_endpoint(&hub, "a").is_some());

        let mut null_list = hub_with(Value::Null);
        upsert_endpoint(&mut null_list, endpoint("a", "1"), true, "/id").unwrap();
        assert!(find_endpoint(&null_list, "a").is_some());
    }

    #[test]
    fn test_remove_endpoint() {
        let mut hub = hub_with(json!([endpoint("a", "1"), endpoint("B", "2")]));
        assert!(remove_endpoint(&mut hub, "b"));
        assert!(find_endpoint(&hub, "b").is_none());
        assert!(find_endpoint(&hub, "a").is_some());
        assert!(!remove_endpoint(&mut hub, "b"));
    }

    #[test]
    fn test_connection_string_suppression() {
        let configured = "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=secret=;EntityPath=q";
        let returned = "Endpoint=sb://ns.servicebus.windows.net:5671/;SharedAccessKeyName=send;SharedAccessKey=****;EntityPath=q";
        assert!(suppress_connection_string_diff("connection_string", returned, configured));

        let other_queue = configured.replace("EntityPath=q", "EntityPath=other");
        assert!(!suppress_connection_string_diff("connection_string", returned, &other_queue));
    }

    #[test]
    fn test_read_keeps_configured_connection_string() {
        let configured = "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=secret=;EntityPath=q";
        let returned = "Endpoint=sb://ns.servicebus.windows.net:5671/;SharedAccessKeyName=send;SharedAccessKey=****;EntityPath=q";
        assert_eq!(flatten_connection_string(configured, returned), configured);
        assert_eq!(flatten_connection_string("", returned), returned);

        let moved = returned.replace("EntityPath=q", "EntityPath=other");
        assert_eq!(flatten_connection_string(configured, &moved), moved);
    }

    #[test]
    fn test_endpoint_id() {
        let id = EndpointId::parse(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Devices/IotHubs/hub/Endpoints/queue",
        )
        .unwrap();
        assert_eq!(id.resource_group, "rg");
        assert_eq!(id.hub_name, "hub");
        assert_eq!(id.name, "queue");
        assert!(EndpointId::parse("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Devices/IotHubs/hub").is_err());
    }
}
