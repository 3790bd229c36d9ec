//! Monitor action groups

use super::{resource_group_name_for_data_source, str_at};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result};
use crate::resource::{validate, DataSourceHandler, Field, ResourceData, Schema};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const MONITOR_API_VERSION: &str = "2019-06-01";

#[derive(Clone, Copy)]
enum Attr {
    Str,
    Bool,
}

/// One receiver list: state field, API list key and its `(field, api key)` attributes
struct Receiver {
    field: &'static str,
    api_key: &'static str,
    attrs: &'static [(&'static str, &'static str, Attr)],
}

const RECEIVERS: &[Receiver] = &[
    Receiver {
        field: "email_receiver",
        api_key: "emailReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("email_address", "emailAddress", Attr::Str),
            ("use_common_alert_schema", "useCommonAlertSchema", Attr::Bool),
        ],
    },
    Receiver {
        field: "itsm_receiver",
        api_key: "itsmReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("workspace_id", "workspaceId", Attr::Str),
            ("connection_id", "connectionId", Attr::Str),
            ("ticket_configuration", "ticketConfiguration", Attr::Str),
            ("region", "region", Attr::Str),
        ],
    },
    Receiver {
        field: "azure_app_push_receiver",
        api_key: "azureAppPushReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("email_address", "emailAddress", Attr::Str),
        ],
    },
    Receiver {
        field: "sms_receiver",
        api_key: "smsReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("country_code", "countryCode", Attr::Str),
            ("phone_number", "phoneNumber", Attr::Str),
        ],
    },
    Receiver {
        field: "webhook_receiver",
        api_key: "webhookReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("service_uri", "serviceUri", Attr::Str),
            ("use_common_alert_schema", "useCommonAlertSchema", Attr::Bool),
        ],
    },
    Receiver {
        field: "automation_runbook_receiver",
        api_key: "automationRunbookReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("automation_account_id", "automationAccountId", Attr::Str),
            ("runbook_name", "runbookName", Attr::Str),
            ("webhook_resource_id", "webhookResourceId", Attr::Str),
            ("is_global_runbook", "isGlobalRunbook", Attr::Bool),
            ("service_uri", "serviceUri", Attr::Str),
            ("use_common_alert_schema", "useCommonAlertSchema", Attr::Bool),
        ],
    },
    Receiver {
        field: "voice_receiver",
        api_key: "voiceReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("country_code", "countryCode", Attr::Str),
            ("phone_number", "phoneNumber", Attr::Str),
        ],
    },
    Receiver {
        field: "logic_app_receiver",
        api_key: "logicAppReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("resource_id", "resourceId", Attr::Str),
            ("callback_url", "callbackUrl", Attr::Str),
            ("use_common_alert_schema", "useCommonAlertSchema", Attr::Bool),
        ],
    },
    Receiver {
        field: "azure_function_receiver",
        api_key: "azureFunctionReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("function_app_resource_id", "functionAppResourceId", Attr::Str),
            ("function_name", "functionName", Attr::Str),
            ("http_trigger_url", "httpTriggerUrl", Attr::Str),
            ("use_common_alert_schema", "useCommonAlertSchema", Attr::Bool),
        ],
    },
    Receiver {
        field: "arm_role_receiver",
        api_key: "armRoleReceivers",
        attrs: &[
            ("name", "name", Attr::Str),
            ("role_id", "roleId", Attr::Str),
            ("use_common_alert_schema", "useCommonAlertSchema", Attr::Bool),
        ],
    },
];

fn attr_field(attr: Attr) -> Field {
    match attr {
        Attr::Str => Field::string().computed(),
        Attr::Bool => Field::bool().computed(),
    }
}

fn receiver_schema(receiver: &Receiver) -> Schema {
    let schema = receiver
        .attrs
        .iter()
        .fold(Schema::new(), |schema, (name, _, attr)| {
            schema.field(name, attr_field(*attr))
        });

    if receiver.api_key == "webhookReceivers" {
        let aad_auth = Schema::new()
            .field("object_id", Field::string().computed())
            .field("identifier_uri", Field::string().computed())
            .field("tenant_id", Field::string().computed());
        return schema.field("aad_auth", Field::block(aad_auth).computed());
    }
    schema
}

/// Webhooks that authenticate with AAD carry the application details
fn flatten_aad_auth(webhook: &Value) -> Value {
    let enabled = webhook
        .get("useAadAuth")
        .and_then(Value::as_bool)
        .unwrap_or_default();
    if !enabled {
        return json!([]);
    }
    json!([{
        "object_id": str_at(webhook, "/objectId"),
        "identifier_uri": str_at(webhook, "/identifierUri"),
        "tenant_id": str_at(webhook, "/tenantId"),
    }])
}

fn flatten_receivers(receiver: &Receiver, group: &Value) -> Value {
    let items = group
        .get(receiver.api_key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let flattened: Vec<Value> = items
        .iter()
        .map(|item| {
            let mut out = Map::new();
            for (field, api_key, attr) in receiver.attrs {
                let value = match attr {
                    Attr::Str => json!(str_at(item, &format!("/{}", api_key))),
                    Attr::Bool => json!(item.get(*api_key).and_then(Value::as_bool).unwrap_or_default()),
                };
                out.insert(field.to_string(), value);
            }
            if receiver.api_key == "webhookReceivers" {
                out.insert("aad_auth".to_string(), flatten_aad_auth(item));
            }
            Value::Object(out)
        })
        .collect();
    Value::Array(flattened)
}

/// Set short name, enabled flag and every receiver list from `properties`
pub fn flatten_action_group(group: &Value, d: &mut ResourceData) {
    d.set("short_name", str_at(group, "/groupShortName"));
    d.set(
        "enabled",
        group.get("enabled").and_then(Value::as_bool).unwrap_or_default(),
    );
    for receiver in RECEIVERS {
        d.set(receiver.field, flatten_receivers(receiver, group));
    }
}

pub struct ActionGroupDataSource;

#[async_trait]
impl DataSourceHandler for ActionGroupDataSource {
    fn type_name(&self) -> &'static str {
        "azurerm_monitor_action_group"
    }

    fn schema(&self) -> Schema {
        let schema = Schema::new()
            .field(
                "name",
                Field::string().required().validate(validate::no_empty_strings()),
            )
            .field("resource_group_name", resource_group_name_for_data_source())
            .field("short_name", Field::string().computed())
            .field("enabled", Field::bool().computed());

        RECEIVERS.iter().fold(schema, |schema, receiver| {
            schema.field(
                receiver.field,
                Field::block(receiver_schema(receiver)).computed(),
            )
        })
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let name = d.get_str("name").to_string();
        let resource_group = d.get_str("resource_group_name").to_string();

        let path = client.provider_path(
            &resource_group,
            "microsoft.insights",
            &["actionGroups", name.as_str()],
        );
        let url = client.resource_url(&path, MONITOR_API_VERSION);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                return Err(ProviderError::NotFound(format!(
                    "Action Group {:?} (Resource Group {:?})",
                    name, resource_group
                )))
            }
            Err(e) => {
                return Err(e.context(format!(
                    "making Read request on Action Group {:?} (Resource Group {:?})",
                    name, resource_group
                )))
            }
        };

        d.set_id(str_at(&resp, "/id"));
        if let Some(group) = resp.get("properties") {
            flatten_action_group(group, d);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Kind;

    #[test]
    fn test_flatten_receivers() {
        let group = json!({
            "groupShortName": "ops",
            "enabled": true,
            "emailReceivers": [
                {"name": "oncall", "emailAddress": "oncall@example.com", "useCommonAlertSchema": true}
            ],
            "webhookReceivers": [
                {"name": "hook", "serviceUri": "https://example.com/hook", "useAadAuth": true,
                 "objectId": "obj", "identifierUri": "api://hook", "tenantId": "tenant"},
                {"name": "plain", "serviceUri": "https://example.com/plain"}
            ]
        });

        let mut d = ResourceData::from_state("id", Map::new());
        flatten_action_group(&group, &mut d);

        assert_eq!(d.get_str("short_name"), "ops");
        assert!(d.get_bool("enabled"));
        assert_eq!(
            d.get_list("email_receiver")[0],
            json!({"name": "oncall", "email_address": "oncall@example.com", "use_common_alert_schema": true})
        );

        let webhooks = d.get_list("webhook_receiver");
        assert_eq!(
            webhooks[0]["aad_auth"],
            json!([{"object_id": "obj", "identifier_uri": "api://hook", "tenant_id": "tenant"}])
        );
        assert_eq!(webhooks[1]["aad_auth"], json!([]));
        assert_eq!(webhooks[1]["use_common_alert_schema"], json!(false));

        assert_eq!(d.get_list("sms_receiver").len(), 0);
    }

    #[test]
    fn test_schema_covers_every_receiver() {
        let schema = ActionGroupDataSource.schema();
        for receiver in RECEIVERS {
            let field = schema.get(receiver.field).unwrap();
            assert!(field.is_computed_only());
        }
        let Some(Kind::Block(webhook)) = schema.get("webhook_receiver").map(|f| &f.kind) else {
            panic!("webhook_receiver should be a block");
        };
        assert!(webhook.get("aad_auth").is_some());
    }
}
