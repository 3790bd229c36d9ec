//! SQL Server firewall rules and failover groups

use super::{
    delete_ignoring_not_found, flatten_location, location_computed, require_absent,
    resource_group_name, str_at,
};
use crate::azure::ArmClient;
use crate::error::{Result, ResultExt};
use crate::resource::id::{FailoverGroupId, FirewallRuleId};
use crate::resource::{tags, validate, Field, Kind, ResourceData, ResourceHandler, Schema};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const FIREWALL_RULE_API_VERSION: &str = "2014-04-01";
const FAILOVER_GROUP_API_VERSION: &str = "2015-05-01-preview";

// =============================================================================
// Firewall rules
// =============================================================================

pub struct FirewallRule;

impl FirewallRule {
    async fn create_update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = FirewallRuleId::new(
            &client.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("server_name"),
            d.get_str("name"),
        );
        let url = client.resource_url(&id.id(), FIREWALL_RULE_API_VERSION);
        let description = format!(
            "SQL Firewall Rule {:?} (Resource Group {:?}, Server {:?})",
            id.name, id.resource_group, id.server_name
        );

        if d.is_new_resource() {
            require_absent(client, &url, self.type_name(), &description).await?;
        }

        let body = json!({
            "properties": {
                "startIpAddress": d.get_str("start_ip_address"),
                "endIpAddress": d.get_str("end_ip_address"),
            }
        });
        client
            .put(&url, &body)
            .await
            .context_with(|| format!("creating {}", description))?;

        let resp = client
            .get(&url)
            .await
            .context_with(|| format!("retrieving {}", description))?;
        d.set_id(str_at(&resp, "/id"));

        self.read(client, d).await
    }
}

#[async_trait]
impl ResourceHandler for FirewallRule {
    fn type_name(&self) -> &'static str {
        "azurerm_sql_firewall_rule"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field("name", Field::string().required().force_new())
            .field("resource_group_name", resource_group_name())
            .field(
                "server_name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::sql_server_name()),
            )
            .field(
                "start_ip_address",
                Field::string()
                    .required()
                    .validate(validate::ip_address()),
            )
            .field(
                "end_ip_address",
                Field::string().required().validate(validate::ip_address()),
            )
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        FirewallRuleId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = FirewallRuleId::parse(d.id())?;
        let url = client.resource_url(&id.id(), FIREWALL_RULE_API_VERSION);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    "SQL Firewall Rule {:?} (Server {:?} / Resource Group {:?}) was not found - removing from state",
                    id.name,
                    id.server_name,
                    id.resource_group
                );
                d.set_id("");
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!(
                    "retrieving SQL Firewall Rule {:?} (Server {:?} / Resource Group {:?})",
                    id.name, id.server_name, id.resource_group
                )))
            }
        };

        d.set("name", id.name.as_str());
        d.set("server_name", id.server_name.as_str());
        d.set("resource_group_name", id.resource_group.as_str());
        d.set("start_ip_address", str_at(&resp, "/properties/startIpAddress"));
        d.set("end_ip_address", str_at(&resp, "/properties/endIpAddress"));
        Ok(())
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = FirewallRuleId::parse(d.id())?;
        let url = client.resource_url(&id.id(), FIREWALL_RULE_API_VERSION);
        delete_ignoring_not_found(client, &url, false)
            .await
            .context_with(|| {
                format!(
                    "deleting SQL Firewall Rule {:?} (Server {:?} / Resource Group {:?})",
                    id.name, id.server_name, id.resource_group
                )
            })
    }
}

// =============================================================================
// Failover groups
// =============================================================================

pub struct FailoverGroup;

const READ_WRITE_POLICIES: &[&str] = &["Automatic", "Manual"];
const READ_ONLY_POLICIES: &[&str] = &["Disabled", "Enabled"];

impl FailoverGroup {
    async fn create_update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = FailoverGroupId::new(
            &client.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("server_name"),
            d.get_str("name"),
        );
        let url = client.resource_url(&id.id(), FAILOVER_GROUP_API_VERSION);
        let description = format!(
            "SQL Failover Group {:?} (Resource Group {:?}, Server {:?})",
            id.name, id.resource_group, id.server_name
        );

        if d.is_new_resource() {
            require_absent(client, &url, self.type_name(), &description).await?;
        }

        let body = expand_failover_group(d);
        client
            .put_and_wait(&url, &body)
            .await
            .context_with(|| format!("creating/updating {}", description))?;

        let resp = client
            .get(&url)
            .await
            .context_with(|| format!("retrieving {}", description))?;
        d.set_id(str_at(&resp, "/id"));

        self.read(client, d).await
    }
}

/// Request body for a failover group
pub fn expand_failover_group(d: &ResourceData) -> Value {
    let mut properties = Map::new();
    properties.insert(
        "readWriteEndpoint".to_string(),
        expand_read_write_policy(d.get_block("read_write_endpoint_failover_policy")),
    );
    if let Some(policy) = d.get_block("readonly_endpoint_failover_policy") {
        properties.insert(
            "readOnlyEndpoint".to_string(),
            json!({ "failoverPolicy": policy.get("mode").cloned().unwrap_or(Value::Null) }),
        );
    }

    let partners: Vec<Value> = d
        .get_list("partner_servers")
        .iter()
        .map(|server| json!({ "id": server.get("id").cloned().unwrap_or(Value::Null) }))
        .collect();
    properties.insert("partnerServers".to_string(), Value::Array(partners));

    if let Some(databases) = d.get_ok_list("databases") {
        properties.insert("databases".to_string(), Value::Array(databases.to_vec()));
    }

    json!({
        "properties": properties,
        "tags": tags::expand(d),
    })
}

fn expand_read_write_policy(block: Option<&Map<String, Value>>) -> Value {
    let mode = block
        .and_then(|b| b.get("mode"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let grace = block
        .and_then(|b| b.get("grace_minutes"))
        .and_then(Value::as_i64)
        .unwrap_or_default();

    let mut policy = json!({ "failoverPolicy": mode });
    if mode != "Manual" {
        policy["failoverWithDataLossGracePeriodMinutes"] = json!(grace);
    }
    policy
}

fn flatten_read_write_policy(input: Option<&Value>) -> Value {
    let Some(input) = input.filter(|v| v.is_object()) else {
        return json!([]);
    };
    let mut policy = json!({ "mode": str_at(input, "/failoverPolicy") });
    if let Some(grace) = input
        .get("failoverWithDataLossGracePeriodMinutes")
        .and_then(Value::as_i64)
    {
        policy["grace_minutes"] = json!(grace);
    }
    json!([policy])
}

fn flatten_read_only_policy(input: Option<&Value>) -> Value {
    match input.filter(|v| v.is_object()) {
        Some(input) => json!([{ "mode": str_at(input, "/failoverPolicy") }]),
        None => json!([]),
    }
}

fn flatten_partner_servers(input: Option<&Value>) -> Value {
    let servers = input
        .and_then(Value::as_array)
        .map(|servers| {
            servers
                .iter()
                .map(|server| {
                    let mut info = Map::new();
                    if let Some(id) = server.get("id") {
                        info.insert("id".to_string(), id.clone());
                    }
                    if let Some(location) = server.get("location") {
                        info.insert("location".to_string(), location.clone());
                    }
                    info.insert(
                        "role".to_string(),
                        json!(str_at(server, "/replicationRole")),
                    );
                    Value::Object(info)
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(servers)
}

/// Configuration fields for a failover group response
pub fn flatten_failover_group(resp: &Value, d: &mut ResourceData) {
    d.set("location", flatten_location(resp));

    if let Some(props) = resp.get("properties").filter(|p| p.is_object()) {
        d.set(
            "read_write_endpoint_failover_policy",
            flatten_read_write_policy(props.get("readWriteEndpoint")),
        );
        d.set(
            "readonly_endpoint_failover_policy",
            flatten_read_only_policy(props.get("readOnlyEndpoint")),
        );
        if let Some(databases) = props.get("databases").filter(|v| v.is_array()) {
            d.set("databases", databases.clone());
        }
        d.set("role", str_at(props, "/replicationRole"));
        d.set(
            "partner_servers",
            flatten_partner_servers(props.get("partnerServers")),
        );
    }

    d.set("tags", tags::flatten(resp.get("tags")));
}

#[async_trait]
impl ResourceHandler for FailoverGroup {
    fn type_name(&self) -> &'static str {
        "azurerm_sql_failover_group"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                "name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::sql_failover_group_name()),
            )
            .field("location", location_computed())
            .field("resource_group_name", resource_group_name())
            .field(
                "server_name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::sql_server_name()),
            )
            .field("databases", Field::set(Kind::String).optional())
            .field(
                "partner_servers",
                Field::block(
                    Schema::new()
                        .field(
                            "id",
                            Field::string().required().validate(validate::resource_id()),
                        )
                        .field("location", location_computed())
                        .field("role", Field::string().computed()),
                )
                .required(),
            )
            .field(
                "readonly_endpoint_failover_policy",
                Field::block(Schema::new().field(
                    "mode",
                    Field::string()
                        .required()
                        .validate(validate::string_in_slice(READ_ONLY_POLICIES, false)),
                ))
                .optional()
                .computed()
                .max_items(1),
            )
            .field(
                "read_write_endpoint_failover_policy",
                Field::block(
                    Schema::new()
                        .field(
                            "mode",
                            Field::string()
                                .required()
                                .validate(validate::string_in_slice(READ_WRITE_POLICIES, false)),
                        )
                        .field(
                            "grace_minutes",
                            Field::int().optional().validate(validate::int_at_least(0)),
                        ),
                )
                .required()
                .max_items(1),
            )
            .field("role", Field::string().computed())
            .field("tags", tags::schema())
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        FailoverGroupId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = FailoverGroupId::parse(d.id())?;
        let url = client.resource_url(&id.id(), FAILOVER_GROUP_API_VERSION);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    "SQL Failover Group {:?} (Server {:?} / Resource Group {:?}) was not found - removing from state",
                    id.name,
                    id.server_name,
                    id.resource_group
                );
                d.set_id("");
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!(
                    "retrieving Failover Group {:?} (Server {:?} / Resource Group {:?})",
                    id.name, id.server_name, id.resource_group
                )))
            }
        };

        d.set("name", id.name.as_str());
        d.set("server_name", id.server_name.as_str());
        d.set("resource_group_name", id.resource_group.as_str());
        flatten_failover_group(&resp, d);
        Ok(())
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = FailoverGroupId::parse(d.id())?;
        let url = client.resource_url(&id.id(), FAILOVER_GROUP_API_VERSION);
        delete_ignoring_not_found(client, &url, true)
            .await
            .context_with(|| {
                format!(
                    "deleting SQL Failover Group {:?} (Server {:?} / Resource Group {:?})",
                    id.name, id.server_name, id.resource_group
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(v: Value) -> ResourceData {
        ResourceData::new(v.as_object().cloned().unwrap())
    }

    #[test]
    fn test_failover_group_round_trip() {
        let config = json!({
            "name": "fg",
            "resource_group_name": "rg",
            "server_name": "primary",
            "databases": ["/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/primary/databases/db1"],
            "partner_servers": [{"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/secondary"}],
            "readonly_endpoint_failover_policy": [{"mode": "Enabled"}],
            "read_write_endpoint_failover_policy": [{"mode": "Automatic", "grace_minutes": 60}],
            "tags": {"env": "prod"}
        });
        let d = data(config.clone());
        let body = expand_failover_group(&d);

        let mut out = ResourceData::from_state("id", Map::new());
        flatten_failover_group(&body, &mut out);

        assert_eq!(out.get("databases"), config.get("databases"));
        assert_eq!(
            out.get("read_write_endpoint_failover_policy"),
            config.get("read_write_endpoint_failover_policy")
        );
        assert_eq!(
            out.get("readonly_endpoint_failover_policy"),
            config.get("readonly_endpoint_failover_policy")
        );
        assert_eq!(out.get("tags"), config.get("tags"));
        assert_eq!(
            out.get_list("partner_servers")[0]["id"],
            config["partner_servers"][0]["id"]
        );
    }

    #[test]
    fn test_manual_policy_omits_grace_period() {
        let d = data(json!({
            "read_write_endpoint_failover_policy": [{"mode": "Manual", "grace_minutes": 60}],
            "partner_servers": []
        }));
        let body = expand_failover_group(&d);
        assert_eq!(
            body["properties"]["readWriteEndpoint"],
            json!({"failoverPolicy": "Manual"})
        );
        assert!(body["properties"].get("readOnlyEndpoint").is_none());
        assert!(body["properties"].get("databases").is_none());
    }

    #[test]
    fn test_flatten_partner_role() {
        let servers = flatten_partner_servers(Some(&json!([
            {"id": "/x", "location": "westeurope", "replicationRole": "Secondary"}
        ])));
        assert_eq!(
            servers,
            json!([{"id": "/x", "location": "westeurope", "role": "Secondary"}])
        );
    }

    #[test]
    fn test_firewall_schema_validates_ips() {
        let problems = FirewallRule.schema().validate(
            json!({
                "name": "office",
                "resource_group_name": "rg",
                "server_name": "srv",
                "start_ip_address": "10.0.0.1",
                "end_ip_address": "not-an-ip"
            })
            .as_object()
            .unwrap(),
        );
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("end_ip_address"));
    }
}
