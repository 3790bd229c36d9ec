//! Resource IDs
//!
//! ARM identifies everything with a path of key/value segments:
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}/...`.

use crate::error::{ProviderError, Result};
use std::fmt;

/// A parsed ARM resource ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: String,
    /// Remaining key/value pairs in order of appearance
    pub path: Vec<(String, String)>,
}

impl ResourceId {
    pub fn parse(id: &str) -> Result<Self> {
        if id.is_empty() {
            return Err(ProviderError::invalid_id(id, "ID was empty"));
        }
        if !id.starts_with('/') {
            return Err(ProviderError::invalid_id(id, "ID must start with '/'"));
        }

        let components: Vec<&str> = id.trim_matches('/').split('/').collect();
        if components.len() % 2 != 0 {
            return Err(ProviderError::invalid_id(
                id,
                "the number of path segments is not divisible by 2",
            ));
        }

        let mut parsed = ResourceId {
            subscription_id: String::new(),
            resource_group: String::new(),
            provider: String::new(),
            path: Vec::new(),
        };

        for pair in components.chunks(2) {
            let (key, value) = (pair[0], pair[1]);
            if key.is_empty() {
                return Err(ProviderError::invalid_id(id, "key segment was empty"));
            }
            if value.is_empty() {
                return Err(ProviderError::invalid_id(
                    id,
                    format!("value for key {:?} was empty", key),
                ));
            }

            if key == "subscriptions" && parsed.subscription_id.is_empty() {
                parsed.subscription_id = value.to_string();
            } else if key.eq_ignore_ascii_case("resourceGroups") && parsed.resource_group.is_empty() {
                parsed.resource_group = value.to_string();
            } else if key == "providers" && parsed.provider.is_empty() {
                parsed.provider = value.to_string();
            } else {
                parsed.path.push((key.to_string(), value.to_string()));
            }
        }

        if parsed.subscription_id.is_empty() {
            return Err(ProviderError::invalid_id(id, "no subscription ID found"));
        }

        Ok(parsed)
    }

    /// Value for a path key
    pub fn path_value(&self, key: &str) -> Option<&str> {
        self.path
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value for a path key that must be present
    pub fn pop(&self, key: &str) -> Result<String> {
        self.path_value(key).map(str::to_string).ok_or_else(|| {
            ProviderError::invalid_id(&self.to_string(), format!("ID was missing the `{}` element", key))
        })
    }

    /// Error if any path key other than `keys` is present, or any key repeats
    pub fn expect_only(&self, keys: &[&str]) -> Result<()> {
        for (i, (k, _)) in self.path.iter().enumerate() {
            if !keys.contains(&k.as_str()) {
                return Err(ProviderError::invalid_id(
                    &self.to_string(),
                    format!("unexpected segment `{}`", k),
                ));
            }
            if self.path[..i].iter().any(|(seen, _)| seen == k) {
                return Err(ProviderError::invalid_id(
                    &self.to_string(),
                    format!("segment `{}` appears more than once", k),
                ));
            }
        }
        Ok(())
    }

    fn require_resource_group(&self) -> Result<()> {
        if self.resource_group.is_empty() {
            return Err(ProviderError::invalid_id(
                &self.to_string(),
                "ID was missing the `resourceGroups` element",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/subscriptions/{}", self.subscription_id)?;
        if !self.resource_group.is_empty() {
            write!(f, "/resourceGroups/{}", self.resource_group)?;
        }
        if !self.provider.is_empty() {
            write!(f, "/providers/{}", self.provider)?;
        }
        for (k, v) in &self.path {
            write!(f, "/{}/{}", k, v)?;
        }
        Ok(())
    }
}

/// Declares a strict ID type for `/subscriptions/../resourceGroups/../providers/{ns}/{k1}/{v1}/...`
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $provider:literal, [$($field:ident => $key:literal),+ $(,)?]) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub subscription_id: String,
            pub resource_group: String,
            $(pub $field: String,)+
        }

        impl $name {
            pub fn new(subscription_id: &str, resource_group: &str, $($field: &str),+) -> Self {
                Self {
                    subscription_id: subscription_id.to_string(),
                    resource_group: resource_group.to_string(),
                    $($field: $field.to_string(),)+
                }
            }

            pub fn parse(input: &str) -> Result<Self> {
                let id = ResourceId::parse(input)?;
                id.require_resource_group()?;
                if !id.provider.eq_ignore_ascii_case($provider) {
                    return Err(ProviderError::invalid_id(
                        input,
                        format!("expected provider {}", $provider),
                    ));
                }
                id.expect_only(&[$($key),+])?;
                Ok(Self {
                    subscription_id: id.subscription_id.clone(),
                    resource_group: id.resource_group.clone(),
                    $($field: id.pop($key)?,)+
                })
            }

            pub fn id(&self) -> String {
                let mut out = format!(
                    "/subscriptions/{}/resourceGroups/{}/providers/{}",
                    self.subscription_id, self.resource_group, $provider
                );
                $(
                    out.push_str(concat!("/", $key, "/"));
                    out.push_str(&self.$field);
                )+
                out
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.id())
            }
        }
    };
}

typed_id!(
    /// SQL server firewall rule
    FirewallRuleId, "Microsoft.Sql", [server_name => "servers", name => "firewallRules"]
);
typed_id!(
    /// SQL server failover group
    FailoverGroupId, "Microsoft.Sql", [server_name => "servers", name => "failoverGroups"]
);
typed_id!(StorageSyncServiceId, "Microsoft.StorageSync", [name => "storageSyncServices"]);
typed_id!(DashboardId, "Microsoft.Portal", [name => "dashboards"]);
typed_id!(VaultId, "Microsoft.KeyVault", [name => "vaults"]);
typed_id!(
    /// Automation account variable
    AutomationVariableId, "Microsoft.Automation", [account_name => "automationAccounts", name => "variables"]
);
typed_id!(
    /// Dev Test Lab policy
    DevTestPolicyId, "Microsoft.DevTestLab", [lab_name => "labs", policy_set_name => "policysets", name => "policies"]
);
typed_id!(ExpressRouteGatewayId, "Microsoft.Network", [name => "expressRouteGateways"]);
typed_id!(NetworkInterfaceId, "Microsoft.Network", [name => "networkInterfaces"]);
typed_id!(NetworkSecurityGroupId, "Microsoft.Network", [name => "networkSecurityGroups"]);
typed_id!(IotHubId, "Microsoft.Devices", [name => "IotHubs"]);
typed_id!(
    /// Data Factory dataset
    DataFactoryDatasetId, "Microsoft.DataFactory", [factory_name => "factories", name => "datasets"]
);

/// A Key Vault data-plane object: `https://{vault}/{collection}/{name}[/{version}]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedItemId {
    pub vault_base_url: String,
    pub nested_item_type: String,
    pub name: String,
    pub version: String,
}

impl NestedItemId {
    pub fn parse(id: &str) -> Result<Self> {
        let url = url::Url::parse(id)
            .map_err(|e| ProviderError::invalid_id(id, format!("not a URL: {}", e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ProviderError::invalid_id(id, "missing host"))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        if segments.len() != 2 && segments.len() != 3 {
            return Err(ProviderError::invalid_id(
                id,
                "expected `/{collection}/{name}` or `/{collection}/{name}/{version}`",
            ));
        }

        let base = match url.port() {
            Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
            None => format!("{}://{}/", url.scheme(), host),
        };

        Ok(Self {
            vault_base_url: base,
            nested_item_type: segments[0].to_string(),
            name: segments[1].to_string(),
            version: segments.get(2).map(|s| s.to_string()).unwrap_or_default(),
        })
    }
}

impl fmt::Display for NestedItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.vault_base_url.trim_end_matches('/'),
            self.nested_item_type,
            self.name
        )?;
        if !self.version.is_empty() {
            write!(f, "/{}", self.version)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_id() {
        let id = ResourceId::parse(
            "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Sql/servers/srv/firewallRules/fw",
        )
        .unwrap();
        assert_eq!(id.subscription_id, "sub1");
        assert_eq!(id.resource_group, "rg1");
        assert_eq!(id.provider, "Microsoft.Sql");
        assert_eq!(id.path_value("servers"), Some("srv"));
        assert_eq!(id.path_value("firewallRules"), Some("fw"));
    }

    #[test]
    fn test_resource_group_key_is_case_insensitive() {
        let id = ResourceId::parse("/subscriptions/s/resourcegroups/rg").unwrap();
        assert_eq!(id.resource_group, "rg");
    }

    #[test]
    fn test_parse_errors() {
        assert!(ResourceId::parse("").is_err());
        assert!(ResourceId::parse("subscriptions/s").is_err());
        assert!(ResourceId::parse("/subscriptions/s/resourceGroups").is_err());
        assert!(ResourceId::parse("/resourceGroups/rg").is_err());
        assert!(ResourceId::parse("/subscriptions//resourceGroups/rg").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let raw = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Automation/automationAccounts/acc/variables/v";
        assert_eq!(ResourceId::parse(raw).unwrap().to_string(), raw);
    }

    #[test]
    fn test_typed_id_round_trip() {
        let id = FailoverGroupId::new("s", "rg", "srv", "fg");
        assert_eq!(
            id.id(),
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/srv/failoverGroups/fg"
        );
        assert_eq!(FailoverGroupId::parse(&id.id()).unwrap(), id);
    }

    #[test]
    fn test_typed_id_rejects_wrong_shape() {
        // Wrong resource type
        assert!(FirewallRuleId::parse(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/srv/failoverGroups/fg"
        )
        .is_err());
        // Extra segment
        assert!(DashboardId::parse(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Portal/dashboards/d/extra/x"
        )
        .is_err());
        // Missing resource group
        assert!(VaultId::parse("/subscriptions/s/providers/Microsoft.KeyVault/vaults/v").is_err());
    }

    #[test]
    fn test_typed_id_rejects_repeated_segment() {
        let err = FirewallRuleId::parse(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/a/servers/b/firewallRules/fw",
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"), "{err}");
    }

    #[test]
    fn test_nested_item_id() {
        let id = NestedItemId::parse("https://my-vault.vault.azure.net/certificates/cert1/abc123").unwrap();
        assert_eq!(id.vault_base_url, "https://my-vault.vault.azure.net/");
        assert_eq!(id.nested_item_type, "certificates");
        assert_eq!(id.name, "cert1");
        assert_eq!(id.version, "abc123");
        assert_eq!(
            id.to_string(),
            "https://my-vault.vault.azure.net/certificates/cert1/abc123"
        );

        let unversioned = NestedItemId::parse("https://v.vault.azure.net/certificates/c").unwrap();
        assert_eq!(unversioned.version, "");
        assert!(NestedItemId::parse("https://v.vault.azure.net/certificates").is_err());
        assert!(NestedItemId::parse("not a url").is_err());
    }
}
