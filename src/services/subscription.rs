//! Subscription lookup

use super::str_at;
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result};
use crate::resource::{tags, DataSourceHandler, Field, ResourceData, Schema};
use async_trait::async_trait;

const SUBSCRIPTION_API_VERSION: &str = "2020-01-01";

pub struct SubscriptionDataSource;

#[async_trait]
impl DataSourceHandler for SubscriptionDataSource {
    fn type_name(&self) -> &'static str {
        "azurerm_subscription"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field("subscription_id", Field::string().optional().computed())
            .field("tenant_id", Field::string().computed())
            .field("display_name", Field::string().computed())
            .field("state", Field::string().computed())
            .field("location_placement_id", Field::string().computed())
            .field("quota_id", Field::string().computed())
            .field("spending_limit", Field::string().computed())
            .field("tags", tags::schema_computed())
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        // Defaults to the subscription the client is bound to
        let subscription_id = match d.get_ok_str("subscription_id") {
            Some(id) => id.to_string(),
            None => client.subscription_id.clone(),
        };

        let url = client.resource_url(
            &client.subscription_path(&subscription_id),
            SUBSCRIPTION_API_VERSION,
        );
        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                return Err(ProviderError::NotFound(format!(
                    "Subscription {:?}",
                    subscription_id
                )))
            }
            Err(e) => return Err(e.context(format!("reading Subscription {:?}", subscription_id))),
        };

        d.set_id(str_at(&resp, "/id"));
        d.set("subscription_id", str_at(&resp, "/subscriptionId"));
        d.set("display_name", str_at(&resp, "/displayName"));
        d.set("tenant_id", str_at(&resp, "/tenantId"));
        d.set("state", str_at(&resp, "/state"));
        if let Some(policies) = resp.get("subscriptionPolicies") {
            d.set("location_placement_id", str_at(policies, "/locationPlacementId"));
            d.set("quota_id", str_at(policies, "/quotaId"));
            d.set("spending_limit", str_at(policies, "/spendingLimit"));
        }
        d.set("tags", tags::flatten(resp.get("tags")));
        Ok(())
    }
}
