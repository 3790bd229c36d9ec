//! Dev Test Lab policies

use super::{delete_ignoring_not_found, require_absent, str_at};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result, ResultExt};
use crate::resource::id::DevTestPolicyId;
use crate::resource::{tags, validate, Field, ResourceData, ResourceHandler, Schema};
use async_trait::async_trait;
use serde_json::json;

const DEV_TEST_LAB_API_VERSION: &str = "2016-05-15";

/// A policy's name is the fact it evaluates
const FACT_NAMES: &[&str] = &[
    "GalleryImage",
    "LabPremiumVmCount",
    "LabTargetCost",
    "LabVmCount",
    "LabVmSize",
    "UserOwnedLabPremiumVmCount",
    "UserOwnedLabVmCount",
    "UserOwnedLabVmCountInSubnet",
];

const EVALUATOR_TYPES: &[&str] = &["AllowedValuesPolicy", "MaxValuePolicy"];

pub struct Policy;

fn describe(id: &DevTestPolicyId) -> String {
    format!(
        "DevTest Policy {:?} (Policy Set {:?} / Lab {:?} / Resource Group {:?})",
        id.name, id.policy_set_name, id.lab_name, id.resource_group
    )
}

impl Policy {
    async fn create_update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        tracing::info!("preparing arguments for DevTest Policy creation");

        let id = DevTestPolicyId::new(
            &client.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("lab_name"),
            d.get_str("policy_set_name"),
            d.get_str("name"),
        );
        let url = client.resource_url(&id.id(), DEV_TEST_LAB_API_VERSION);
        let description = describe(&id);

        if d.is_new_resource() {
            require_absent(client, &url, self.type_name(), &description).await?;
        }

        let body = json!({
            "tags": tags::expand(d),
            "properties": {
                "factName": id.name,
                "factData": d.get_str("fact_data"),
                "description": d.get_str("description"),
                "evaluatorType": d.get_str("evaluator_type"),
                "threshold": d.get_str("threshold"),
            },
        });

        client
            .put(&url, &body)
            .await
            .context_with(|| format!("creating/updating {}", description))?;

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
impl ResourceHandler for Policy {
    fn type_name(&self) -> &'static str {
        "azurerm_dev_test_policy"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                "name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::string_in_slice(FACT_NAMES, false)),
            )
            .field("policy_set_name", Field::string().required().force_new())
            .field(
                "lab_name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::dev_test_lab_name()),
            )
            // Returned in lower case by the API
            .field(
                "resource_group_name",
                super::resource_group_name().diff_suppress(validate::suppress_case_diff),
            )
            .field(
                "threshold",
                Field::string().required().validate(validate::no_empty_strings()),
            )
            .field(
                "evaluator_type",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::string_in_slice(EVALUATOR_TYPES, false)),
            )
            .field("description", Field::string().optional())
            .field("fact_data", Field::string().optional())
            .field("tags", tags::schema())
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        DevTestPolicyId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = DevTestPolicyId::parse(d.id())?;
        let url = client.resource_url(&id.id(), DEV_TEST_LAB_API_VERSION);

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                tracing::info!("{} was not found - removing from state", describe(&id));
                d.set_id("");
                return Ok(());
            }
            Err(e) => return Err(e.context(format!("making Read request on {}", describe(&id)))),
        };

        d.set("name", str_at(&resp, "/name"));
        d.set("policy_set_name", id.policy_set_name.as_str());
        d.set("lab_name", id.lab_name.as_str());
        d.set("resource_group_name", id.resource_group.as_str());

        if let Some(properties) = resp.get("properties") {
            d.set("description", str_at(properties, "/description"));
            d.set("fact_data", str_at(properties, "/factData"));
            d.set("evaluator_type", str_at(properties, "/evaluatorType"));
            d.set("threshold", str_at(properties, "/threshold"));
        }

        d.set("tags", tags::flatten(resp.get("tags")));
        Ok(())
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = DevTestPolicyId::parse(d.id())?;
        let url = client.resource_url(&id.id(), DEV_TEST_LAB_API_VERSION);

        // Removed out of band: nothing to do
        match client.get_optional(&url).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::info!("{} was not found - assuming removed", describe(&id));
                return Ok(());
            }
            Err(e) => return Err(e.context(format!("retrieving {}", describe(&id)))),
        }

        delete_ignoring_not_found(client, &url, false)
            .await
            .context_with(|| format!("deleting {}", describe(&id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> serde_json::Map<String, serde_json::Value> {
        json!({
            "name": "LabVmCount",
            "policy_set_name": "default",
            "lab_name": "my-lab",
            "resource_group_name": "rg",
            "threshold": "999",
            "evaluator_type": "MaxValuePolicy"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_valid_policy() {
        assert!(Policy.schema().validate(&config()).is_empty());
    }

    #[test]
    fn test_fact_name_is_case_sensitive() {
        let mut config = config();
        config.insert("name".to_string(), json!("labvmcount"));
        let problems = Policy.schema().validate(&config);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("name"));
    }

    #[test]
    fn test_unknown_evaluator() {
        let mut config = config();
        config.insert("evaluator_type".to_string(), json!("MinValuePolicy"));
        assert_eq!(Policy.schema().validate(&config).len(), 1);
    }

    #[test]
    fn test_import_id_shape() {
        let id = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.DevTestLab/labs/my-lab/policysets/default/policies/LabVmCount";
        assert!(Policy.validate_import_id(id).is_ok());
        assert!(Policy
            .validate_import_id("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.DevTestLab/labs/my-lab")
            .is_err());
    }
}
