//! Azure Authentication
//!
//! Bearer tokens for the management plane and the Key Vault data plane,
//! either from a pre-issued token or the client-credentials flow.

use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Source of bearer tokens for a given resource scope
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Get an access token for the scope (e.g. `https://management.azure.com/.default`)
    async fn token(&self, scope: &str) -> Result<String>;
}

/// A token issued outside of this process (ARM_ACCESS_TOKEN, tests)
pub struct StaticTokenCredential {
    token: SecretString,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into()),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self, _scope: &str) -> Result<String> {
        Ok(self.token.expose_secret().clone())
    }
}

/// OAuth2 token response from Entra ID
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Service principal credentials with per-scope token caching
pub struct ClientSecretCredential {
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
    http: reqwest::Client,
    token_cache: Arc<RwLock<HashMap<String, CachedToken>>>,
}

impl ClientSecretCredential {
    pub fn new(
        authority: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            authority: authority.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            http: reqwest::Client::new(),
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn acquire(&self, scope: &str) -> Result<CachedToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        );

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret().as_str()),
            ("scope", scope),
        ];

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Auth(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Auth(format!(
                "Token request failed with status {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Auth(format!("Failed to parse token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_BUFFER);
        tracing::debug!(
            "New token cached for {}, expires in ~{} minutes",
            scope,
            lifetime.as_secs() / 60
        );

        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    /// Security: Checks token expiry before returning cached token
    async fn token(&self, scope: &str) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.get(scope) {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token for {} expired, fetching new token", scope);
            }
        }

        let fresh = self.acquire(scope).await?;
        let token = fresh.token.clone();
        self.token_cache
            .write()
            .await
            .insert(scope.to_string(), fresh);

        Ok(token)
    }
}

/// Scope string for a resource audience
pub fn scope_for(audience: &str) -> String {
    format!("{}/.default", audience.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_for_trims_trailing_slash() {
        assert_eq!(
            scope_for("https://management.azure.com/"),
            "https://management.azure.com/.default"
        );
        assert_eq!(
            scope_for("https://vault.azure.net"),
            "https://vault.azure.net/.default"
        );
    }

    #[test]
    fn test_cached_token_expiry() {
        let fresh = CachedToken {
            token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        assert!(fresh.is_valid());

        let stale = CachedToken {
            token: "t".to_string(),
            expires_at: Instant::now() - Duration::from_secs(1),
        };
        assert!(!stale.is_valid());
    }

    #[tokio::test]
    async fn test_static_token_ignores_scope() {
        let credential = StaticTokenCredential::new("abc");
        assert_eq!(credential.token("anything").await.unwrap(), "abc");
    }
}
