//! ARM Client
//!
//! Main client for interacting with Azure Resource Manager, combining
//! authentication, HTTP, long-running-operation polling and parent locks.
//! Every handler receives a shared `&ArmClient`.

use super::auth::{scope_for, TokenCredential};
use super::http::{ArmHttpClient, ArmResponse};
use super::locks::NamedLocks;
use super::poller;
use crate::config::CloudEnvironment;
use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default interval between long-running-operation polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    credential: Arc<dyn TokenCredential>,
    pub http: ArmHttpClient,
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub environment: CloudEnvironment,
    endpoint: String,
    pub locks: Arc<NamedLocks>,
    pub poll_interval: Duration,
    /// Key Vault data-plane URIs by lower-cased vault resource ID
    vault_uris: Arc<Mutex<HashMap<String, String>>>,
}

impl ArmClient {
    /// Create a new ARM client for the given cloud
    pub fn new(
        credential: Arc<dyn TokenCredential>,
        subscription_id: &str,
        environment: CloudEnvironment,
    ) -> Result<Self> {
        Ok(Self {
            credential,
            http: ArmHttpClient::new()?,
            subscription_id: subscription_id.to_string(),
            tenant_id: None,
            endpoint: environment.resource_manager_endpoint().to_string(),
            environment,
            locks: Arc::new(NamedLocks::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            vault_uris: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Point the client at a different Resource Manager endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get a management-plane access token
    pub async fn get_token(&self) -> Result<String> {
        self.credential
            .token(&scope_for(self.environment.resource_manager_audience()))
            .await
    }

    /// Get a Key Vault data-plane access token
    pub async fn get_vault_token(&self) -> Result<String> {
        self.credential
            .token(&scope_for(self.environment.key_vault_audience()))
            .await
    }

    /// Make a GET request to a Key Vault data-plane URL
    pub async fn get_data_plane(&self, url: &str) -> Result<Value> {
        let token = self.get_vault_token().await?;
        Ok(self.http.get(url, &token).await?.body)
    }

    /// Previously resolved data-plane URI of a vault
    pub fn cached_vault_uri(&self, vault_id: &str) -> Option<String> {
        let cache = self.vault_uris.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(&vault_id.to_lowercase()).cloned()
    }

    pub fn cache_vault_uri(&self, vault_id: &str, uri: &str) {
        let mut cache = self.vault_uris.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(vault_id.to_lowercase(), uri.to_string());
    }

    /// Make a GET request to a management URL
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        Ok(self.http.get(url, &token).await?.body)
    }

    /// GET returning `None` when the object does not exist
    pub async fn get_optional(&self, url: &str) -> Result<Option<Value>> {
        match self.get(url).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// PUT without waiting for any long-running operation
    pub async fn put(&self, url: &str, body: &Value) -> Result<ArmResponse> {
        let token = self.get_token().await?;
        self.http.put(url, &token, body).await
    }

    /// PUT and poll until the operation is terminal
    pub async fn put_and_wait(&self, url: &str, body: &Value) -> Result<()> {
        let response = self.put(url, body).await?;
        poller::wait_for_completion(self, url, response, false).await
    }

    /// PATCH and poll until the operation is terminal
    pub async fn patch_and_wait(&self, url: &str, body: &Value) -> Result<()> {
        let token = self.get_token().await?;
        let response = self.http.patch(url, &token, body).await?;
        poller::wait_for_completion(self, url, response, false).await
    }

    /// DELETE without waiting
    pub async fn delete(&self, url: &str) -> Result<ArmResponse> {
        let token = self.get_token().await?;
        self.http.delete(url, &token).await
    }

    /// DELETE and poll until the operation is terminal
    pub async fn delete_and_wait(&self, url: &str) -> Result<()> {
        let response = self.delete(url).await?;
        poller::wait_for_completion(self, url, response, true).await
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build a management URL for a full resource ID
    pub fn resource_url(&self, resource_id: &str, api_version: &str) -> String {
        format!(
            "{}{}?api-version={}",
            self.endpoint,
            resource_id,
            urlencoding::encode(api_version)
        )
    }

    /// Resource ID of a subscription
    pub fn subscription_path(&self, subscription_id: &str) -> String {
        format!("/subscriptions/{}", encode_segment(subscription_id))
    }

    /// Resource ID of a provider resource nested under a resource group in the
    /// client's subscription: `segments` are alternating type/name pairs
    pub fn provider_path(&self, resource_group: &str, provider: &str, segments: &[&str]) -> String {
        let mut path = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}",
            encode_segment(&self.subscription_id),
            encode_segment(resource_group),
            provider
        );
        for segment in segments {
            path.push('/');
            path.push_str(&encode_segment(segment));
        }
        path
    }
}

/// Percent-encode a single path segment
fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::auth::StaticTokenCredential;

    fn client() -> ArmClient {
        ArmClient::new(
            Arc::new(StaticTokenCredential::new("t")),
            "00000000-0000-0000-0000-000000000000",
            CloudEnvironment::Public,
        )
        .unwrap()
    }

    #[test]
    fn test_provider_path() {
        let c = client();
        assert_eq!(
            c.provider_path("rg1", "Microsoft.Sql", &["servers", "srv", "firewallRules", "fw"]),
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1/providers/Microsoft.Sql/servers/srv/firewallRules/fw"
        );
    }

    #[test]
    fn test_resource_url_appends_api_version() {
        let c = client().with_endpoint("http://localhost:1234/");
        assert_eq!(
            c.resource_url("/subscriptions/abc", "2020-01-01"),
            "http://localhost:1234/subscriptions/abc?api-version=2020-01-01"
        );
    }

    #[test]
    fn test_segments_are_encoded() {
        let c = client();
        let path = c.provider_path("my rg", "Microsoft.Portal", &["dashboards", "a/b"]);
        assert!(path.contains("/resourceGroups/my%20rg/"));
        assert!(path.ends_with("/dashboards/a%2Fb"));
    }
}
