//! Network interface security group associations and ExpressRoute gateways

use super::{
    delete_ignoring_not_found, flatten_location, location, require_absent, resource_group_name,
    str_at,
};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result, ResultExt};
use crate::resource::id::{ExpressRouteGatewayId, NetworkInterfaceId, NetworkSecurityGroupId};
use crate::resource::{tags, validate, Field, ResourceData, ResourceHandler, Schema, Timeouts};
use async_trait::async_trait;
use serde_json::{json, Value};

const NETWORK_API_VERSION: &str = "2020-11-01";

const NETWORK_INTERFACE_RESOURCE_NAME: &str = "azurerm_network_interface";
const NETWORK_SECURITY_GROUP_RESOURCE_NAME: &str = "azurerm_network_security_group";

// =============================================================================
// Network interface <-> security group association
// =============================================================================

pub struct InterfaceSecurityGroupAssociation;

/// `{networkInterfaceId}|{networkSecurityGroupId}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationId {
    pub network_interface: NetworkInterfaceId,
    pub network_security_group: NetworkSecurityGroupId,
}

impl AssociationId {
    pub fn parse(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.split('|').collect();
        let [nic, nsg] = parts.as_slice() else {
            return Err(ProviderError::invalid_id(
                input,
                "expected the format {networkInterfaceId}|{networkSecurityGroupId}",
            ));
        };
        Ok(Self {
            network_interface: NetworkInterfaceId::parse(nic)?,
            network_security_group: NetworkSecurityGroupId::parse(nsg)?,
        })
    }

    pub fn id(&self) -> String {
        format!(
            "{}|{}",
            self.network_interface.id(),
            self.network_security_group.id()
        )
    }
}

/// The interface's `properties`, which must be present
fn interface_properties<'a>(nic: &'a mut Value, id: &NetworkInterfaceId) -> Result<&'a mut serde_json::Map<String, Value>> {
    nic.get_mut("properties")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            ProviderError::UnexpectedResponse(format!(
                "`properties` was nil for Network Interface {:?} (Resource Group {:?})",
                id.name, id.resource_group
            ))
        })
}

fn attached_security_group(properties: &serde_json::Map<String, Value>) -> Option<&str> {
    properties
        .get("networkSecurityGroup")
        .and_then(|nsg| nsg.get("id"))
        .and_then(Value::as_str)
}

#[async_trait]
impl ResourceHandler for InterfaceSecurityGroupAssociation {
    fn type_name(&self) -> &'static str {
        "azurerm_network_interface_security_group_association"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                "network_interface_id",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::resource_id()),
            )
            .field(
                "network_security_group_id",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::resource_id()),
            )
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        AssociationId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        tracing::info!(
            "preparing arguments for Network Interface <-> Network Security Group Association creation"
        );

        let network_interface_id = d.get_str("network_interface_id").to_string();
        let network_security_group_id = d.get_str("network_security_group_id").to_string();
        let nic = NetworkInterfaceId::parse(&network_interface_id)?;
        let nsg = NetworkSecurityGroupId::parse(&network_security_group_id)?;

        // Always NIC first, then NSG
        let _nic_lock = client
            .locks
            .lock(&nic.name, NETWORK_INTERFACE_RESOURCE_NAME)
            .await;
        let _nsg_lock = client
            .locks
            .lock(&nsg.name, NETWORK_SECURITY_GROUP_RESOURCE_NAME)
            .await;

        let url = client.resource_url(&nic.id(), NETWORK_API_VERSION);
        let mut interface = match client.get(&url).await {
            Ok(interface) => interface,
            Err(e) if e.is_not_found() => {
                return Err(ProviderError::NotFound(format!(
                    "Network Interface {:?} (Resource Group {:?})",
                    nic.name, nic.resource_group
                )))
            }
            Err(e) => {
                return Err(e.context(format!(
                    "retrieving Network Interface {:?} (Resource Group {:?})",
                    nic.name, nic.resource_group
                )))
            }
        };

        let resource_id = format!("{}|{}", network_interface_id, network_security_group_id);
        let properties = interface_properties(&mut interface, &nic)?;
        if attached_security_group(properties).is_some() {
            return Err(ProviderError::already_exists(self.type_name(), resource_id));
        }
        properties.insert(
            "networkSecurityGroup".to_string(),
            json!({ "id": network_security_group_id }),
        );

        client
            .put_and_wait(&url, &interface)
            .await
            .context_with(|| {
                format!(
                    "updating Security Group Association for Network Interface {:?} (Resource Group {:?})",
                    nic.name, nic.resource_group
                )
            })?;

        d.set_id(resource_id);
        self.read(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = AssociationId::parse(d.id())?;
        let nic = &id.network_interface;
        let url = client.resource_url(&nic.id(), NETWORK_API_VERSION);

        let mut interface = match client.get(&url).await {
            Ok(interface) => interface,
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    "Network Interface {:?} (Resource Group {:?}) was not found - removing from state",
                    nic.name,
                    nic.resource_group
                );
                d.set_id("");
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!(
                    "retrieving Network Interface {:?} (Resource Group {:?})",
                    nic.name, nic.resource_group
                )))
            }
        };

        let interface_id = str_at(&interface, "/id").to_string();
        let properties = interface_properties(&mut interface, nic)?;
        let Some(nsg_id) = attached_security_group(properties) else {
            tracing::info!(
                "Network Interface {:?} (Resource Group {:?}) doesn't have a Security Group attached - removing from state",
                nic.name,
                nic.resource_group
            );
            d.set_id("");
            return Ok(());
        };

        d.set("network_interface_id", interface_id);
        d.set("network_security_group_id", nsg_id);
        Ok(())
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        // Every field forces a new association
        self.read(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = AssociationId::parse(d.id())?;
        let nic = &id.network_interface;

        let _nic_lock = client
            .locks
            .lock(&nic.name, NETWORK_INTERFACE_RESOURCE_NAME)
            .await;

        let url = client.resource_url(&nic.id(), NETWORK_API_VERSION);
        let mut interface = match client.get(&url).await {
            Ok(interface) => interface,
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    "Network Interface {:?} (Resource Group {:?}) was not found - nothing to detach",
                    nic.name,
                    nic.resource_group
                );
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!(
                    "retrieving Network Interface {:?} (Resource Group {:?})",
                    nic.name, nic.resource_group
                )))
            }
        };

        // An explicit null is what detaches the group; omitting the key keeps it
        let properties = interface_properties(&mut interface, nic)?;
        properties.insert("networkSecurityGroup".to_string(), Value::Null);

        client
            .put_and_wait(&url, &interface)
            .await
            .context_with(|| {
                format!(
                    "updating Network Interface {:?} (Resource Group {:?})",
                    nic.name, nic.resource_group
                )
            })
    }
}

// =============================================================================
// ExpressRoute gateways
// =============================================================================

pub struct ExpressRouteGateway;

impl ExpressRouteGateway {
    async fn create_update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        tracing::info!("preparing arguments for ExpressRoute Gateway creation");

        let id = ExpressRouteGatewayId::new(
            &client.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("name"),
        );
        let url = client.resource_url(&id.id(), NETWORK_API_VERSION);
        let description = format!(
            "ExpressRoute Gateway {:?} (Resource Group {:?})",
            id.name, id.resource_group
        );

        if d.is_new_resource() {
            require_absent(client, &url, self.type_name(), &description).await?;
        }

        let body = json!({
            "location": validate::normalize_location(d.get_str("location")),
            "properties": {
                "autoScaleConfiguration": {
                    "bounds": { "min": d.get_int("scale_units") }
                },
                "virtualHub": { "id": d.get_str("virtual_hub_id") },
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
                "cannot read {} ID",
                description
            )));
        }
        d.set_id(resource_id);

        self.read(client, d).await
    }
}

#[async_trait]
impl ResourceHandler for ExpressRouteGateway {
    fn type_name(&self) -> &'static str {
        "azurerm_express_route_gateway"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                "name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::express_route_gateway_name()),
            )
            .field("location", location())
            .field("resource_group_name", resource_group_name())
            .field(
                "virtual_hub_id",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::resource_id()),
            )
            .field(
                "scale_units",
                Field::int().required().validate(validate::int_between(1, 10)),
            )
            .field("tags", tags::schema())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(90, 5, 90, 90)
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        ExpressRouteGatewayId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = ExpressRouteGatewayId::parse(d.id())?;
        let url = client.resource_url(&id.id(), NETWORK_API_VERSION);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    "ExpressRoute Gateway {:?} does not exist - removing from state",
                    d.id()
                );
                d.set_id("");
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!(
                    "reading ExpressRoute Gateway {:?} (Resource Group {:?})",
                    id.name, id.resource_group
                )))
            }
        };

        d.set("name", str_at(&resp, "/name"));
        d.set("resource_group_name", id.resource_group.as_str());
        let location = flatten_location(&resp);
        if !location.is_null() {
            d.set("location", location);
        }

        if resp.get("properties").is_some() {
            d.set("virtual_hub_id", str_at(&resp, "/properties/virtualHub/id"));
            let scale_units = resp
                .pointer("/properties/autoScaleConfiguration/bounds/min")
                .and_then(Value::as_i64)
                .unwrap_or_default();
            d.set("scale_units", scale_units);
        }

        d.set("tags", tags::flatten(resp.get("tags")));
        Ok(())
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = ExpressRouteGatewayId::parse(d.id())?;
        let url = client.resource_url(&id.id(), NETWORK_API_VERSION);
        delete_ignoring_not_found(client, &url, true)
            .await
            .context_with(|| {
                format!(
                    "deleting ExpressRoute Gateway {:?} (Resource Group {:?})",
                    id.name, id.resource_group
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NIC: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic1";
    const NSG: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkSecurityGroups/nsg1";

    #[test]
    fn test_association_id_round_trip() {
        let input = format!("{}|{}", NIC, NSG);
        let id = AssociationId::parse(&input).unwrap();
        assert_eq!(id.network_interface.name, "nic1");
        assert_eq!(id.network_security_group.name, "nsg1");
        assert_eq!(id.id(), input);
    }

    #[test]
    fn test_association_id_rejects_wrong_shape() {
        assert!(AssociationId::parse(NIC).is_err());
        assert!(AssociationId::parse(&format!("{}|{}|{}", NIC, NSG, NSG)).is_err());
        assert!(AssociationId::parse(&format!("{}|{}", NSG, NIC)).is_err());
    }

    #[test]
    fn test_attached_security_group() {
        let with = json!({"networkSecurityGroup": {"id": NSG}});
        let without = json!({"networkSecurityGroup": null});
        assert_eq!(attached_security_group(with.as_object().unwrap()), Some(NSG));
        assert_eq!(attached_security_group(without.as_object().unwrap()), None);
    }

    #[test]
    fn test_gateway_scale_units_bounds() {
        let schema = ExpressRouteGateway.schema();
        let config = json!({
            "name": "gw",
            "location": "westeurope",
            "resource_group_name": "rg",
            "virtual_hub_id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualHubs/hub",
            "scale_units": 11
        });
        let problems = schema.validate(config.as_object().unwrap());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("scale_units"));
    }

    #[test]
    fn test_gateway_timeouts() {
        let timeouts = ExpressRouteGateway.timeouts();
        assert_eq!(timeouts.create.as_secs(), 90 * 60);
        assert_eq!(timeouts.read.as_secs(), 5 * 60);
    }
}
