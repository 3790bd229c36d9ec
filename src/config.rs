//! Configuration Management
//!
//! Handles persistent configuration storage for azrm and resolves the
//! effective settings from CLI flags, `ARM_*` environment variables and the
//! config file, in that order.

use crate::azure::auth::{ClientSecretCredential, StaticTokenCredential, TokenCredential};
use crate::azure::ArmClient;
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Azure cloud the provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CloudEnvironment {
    #[default]
    Public,
    China,
    UsGovernment,
}

impl CloudEnvironment {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "public" | "azurecloud" => Some(Self::Public),
            "china" | "azurechinacloud" => Some(Self::China),
            "usgovernment" | "azureusgovernmentcloud" => Some(Self::UsGovernment),
            _ => None,
        }
    }

    pub fn resource_manager_endpoint(&self) -> &'static str {
        match self {
            Self::Public => "https://management.azure.com",
            Self::China => "https://management.chinacloudapi.cn",
            Self::UsGovernment => "https://management.usgovcloudapi.net",
        }
    }

    pub fn resource_manager_audience(&self) -> &'static str {
        self.resource_manager_endpoint()
    }

    pub fn key_vault_audience(&self) -> &'static str {
        match self {
            Self::Public => "https://vault.azure.net",
            Self::China => "https://vault.azure.cn",
            Self::UsGovernment => "https://vault.usgovcloudapi.net",
        }
    }

    pub fn authority(&self) -> &'static str {
        match self {
            Self::Public => "https://login.microsoftonline.com",
            Self::China => "https://login.chinacloudapi.cn",
            Self::UsGovernment => "https://login.microsoftonline.us",
        }
    }
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub client_secret: Option<SecretString>,
    #[serde(default)]
    pub environment: CloudEnvironment,
    /// Overrides the cloud's Resource Manager endpoint
    #[serde(default)]
    pub resource_manager_endpoint: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

/// Values given on the command line; they win over everything else
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub poll_interval_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azrm").join("config.json"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Layer `ARM_*` environment variables on top of the file values
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("ARM_SUBSCRIPTION_ID") {
            self.subscription_id = Some(v);
        }
        if let Some(v) = lookup("ARM_TENANT_ID") {
            self.tenant_id = Some(v);
        }
        if let Some(v) = lookup("ARM_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = lookup("ARM_CLIENT_SECRET") {
            self.client_secret = Some(SecretString::new(v));
        }
        if let Some(v) = lookup("ARM_ENVIRONMENT") {
            self.environment = CloudEnvironment::parse(&v)
                .with_context(|| format!("unknown ARM_ENVIRONMENT {:?}", v))?;
        }
        if let Some(v) = lookup("ARM_RESOURCE_MANAGER_ENDPOINT") {
            self.resource_manager_endpoint = Some(v);
        }
        Ok(())
    }

    /// Layer command-line values on top of everything else
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(v) = &overrides.subscription_id {
            self.subscription_id = Some(v.clone());
        }
        if let Some(v) = &overrides.tenant_id {
            self.tenant_id = Some(v.clone());
        }
        if let Some(v) = overrides.poll_interval_secs {
            self.poll_interval_secs = Some(v);
        }
    }

    /// Get effective subscription (must be set somewhere)
    pub fn effective_subscription(&self) -> Result<String> {
        match &self.subscription_id {
            Some(s) if !s.is_empty() => Ok(s.clone()),
            _ => bail!("no subscription configured: pass --subscription or set ARM_SUBSCRIPTION_ID"),
        }
    }

    /// Get effective poll interval
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::azure::client::DEFAULT_POLL_INTERVAL)
    }

    /// Pick a credential: a static token wins over a service principal
    pub fn credential(
        &self,
        static_token: Option<String>,
    ) -> Result<Arc<dyn TokenCredential>> {
        if let Some(token) = static_token.filter(|t| !t.is_empty()) {
            tracing::debug!("Using static access token");
            return Ok(Arc::new(StaticTokenCredential::new(token)));
        }

        match (&self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(tenant), Some(client), Some(secret)) => {
                tracing::debug!("Using client secret credential for client {}", client);
                Ok(Arc::new(ClientSecretCredential::new(
                    self.environment.authority(),
                    tenant.clone(),
                    client.clone(),
                    secret.clone(),
                )))
            }
            _ => bail!(
                "no credentials: set ARM_ACCESS_TOKEN or ARM_TENANT_ID, ARM_CLIENT_ID and ARM_CLIENT_SECRET"
            ),
        }
    }

    /// Build the shared ARM client from the effective settings
    pub fn build_client(&self, static_token: Option<String>) -> Result<ArmClient> {
        let credential = self.credential(static_token)?;
        let mut client = ArmClient::new(credential, &self.effective_subscription()?, self.environment)?
            .with_tenant(self.tenant_id.clone())
            .with_poll_interval(self.effective_poll_interval());
        if let Some(endpoint) = &self.resource_manager_endpoint {
            client = client.with_endpoint(endpoint);
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_precedence_flag_over_env_over_file() {
        let mut config = Config {
            subscription_id: Some("from-file".to_string()),
            tenant_id: Some("tenant-file".to_string()),
            ..Default::default()
        };
        config
            .apply_env(env(&[("ARM_SUBSCRIPTION_ID", "from-env")]))
            .unwrap();
        assert_eq!(config.subscription_id.as_deref(), Some("from-env"));
        assert_eq!(config.tenant_id.as_deref(), Some("tenant-file"));

        config.apply_overrides(&Overrides {
            subscription_id: Some("from-flag".to_string()),
            ..Default::default()
        });
        assert_eq!(config.effective_subscription().unwrap(), "from-flag");
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        let mut config = Config::default();
        assert!(config
            .apply_env(env(&[("ARM_ENVIRONMENT", "mars")]))
            .is_err());
        config
            .apply_env(env(&[("ARM_ENVIRONMENT", "USGovernment")]))
            .unwrap();
        assert_eq!(config.environment, CloudEnvironment::UsGovernment);
    }

    #[test]
    fn test_missing_subscription() {
        assert!(Config::default().effective_subscription().is_err());
    }

    #[test]
    fn test_missing_credentials() {
        assert!(Config::default().credential(None).is_err());
        assert!(Config::default()
            .credential(Some("token".to_string()))
            .is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip_skips_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            subscription_id: Some("sub".to_string()),
            client_secret: Some(SecretString::new("hunter2".to_string())),
            environment: CloudEnvironment::China,
            poll_interval_secs: Some(3),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("hunter2"));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.subscription_id.as_deref(), Some("sub"));
        assert_eq!(loaded.environment, CloudEnvironment::China);
        assert_eq!(loaded.effective_poll_interval(), Duration::from_secs(3));
        assert!(loaded.client_secret.is_none());
    }
}
