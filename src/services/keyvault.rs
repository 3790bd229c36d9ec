//! Key Vault certificates
//!
//! The certificate lives on the vault's data plane, so a read first resolves
//! the vault's URI through Resource Manager and then calls the vault itself.

use super::str_at;
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result};
use crate::resource::id::{NestedItemId, VaultId};
use crate::resource::{tags, validate, DataSourceHandler, Field, Kind, ResourceData, Schema};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::{json, Map, Value};

const KEY_VAULT_MANAGEMENT_API_VERSION: &str = "2019-09-01";
const KEY_VAULT_DATA_PLANE_API_VERSION: &str = "7.1";

pub struct CertificateDataSource;

/// Data-plane base URI (with trailing slash) of a vault, cached per vault ID
pub async fn base_uri_for_vault(client: &ArmClient, vault: &VaultId) -> Result<String> {
    let vault_id = vault.id();
    if let Some(uri) = client.cached_vault_uri(&vault_id) {
        return Ok(uri);
    }

    let url = client.resource_url(&vault_id, KEY_VAULT_MANAGEMENT_API_VERSION);
    let resp = client.get(&url).await?;
    let uri = str_at(&resp, "/properties/vaultUri");
    if uri.is_empty() {
        return Err(ProviderError::UnexpectedResponse(format!(
            "`properties.vaultUri` was nil for {}",
            vault_id
        )));
    }

    let uri = format!("{}/", uri.trim_end_matches('/'));
    client.cache_vault_uri(&vault_id, &uri);
    Ok(uri)
}

pub fn certificate_url(base_uri: &str, name: &str, version: &str) -> String {
    let mut url = format!("{}certificates/{}", base_uri, urlencoding::encode(name));
    if !version.is_empty() {
        url.push('/');
        url.push_str(&urlencoding::encode(version));
    }
    url.push_str("?api-version=");
    url.push_str(KEY_VAULT_DATA_PLANE_API_VERSION);
    url
}

/// DER bytes of `cer`; the service sends standard base64, older payloads url-safe
fn decode_certificate(cer: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(cer)
        .or_else(|_| URL_SAFE_NO_PAD.decode(cer.trim_end_matches('=')))
        .map_err(|e| ProviderError::UnexpectedResponse(format!("decoding certificate data: {}", e)))
}

/// Upper-case hex SHA-1 thumbprint from the base64url `x5t`
pub fn thumbprint_from_x5t(x5t: &str) -> Result<String> {
    let raw = URL_SAFE_NO_PAD
        .decode(x5t.trim_end_matches('='))
        .map_err(|e| ProviderError::UnexpectedResponse(format!("decoding x5t: {}", e)))?;
    Ok(hex::encode_upper(raw))
}

fn string_list(value: Option<&Value>) -> Value {
    let items: Vec<Value> = value
        .and_then(Value::as_array)
        .map(|a| a.iter().filter(|v| v.is_string()).cloned().collect())
        .unwrap_or_default();
    Value::Array(items)
}

fn int_at(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or_default()
}

fn bool_at(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or_default()
}

/// The certificate policy as a single-item block list
pub fn flatten_certificate_policy(input: Option<&Value>) -> Value {
    let Some(input) = input.filter(|v| v.is_object()) else {
        return json!([]);
    };

    let mut policy = Map::new();

    if let Some(issuer) = input.get("issuer") {
        policy.insert(
            "issuer_parameters".to_string(),
            json!([{ "name": str_at(issuer, "/name") }]),
        );
    }

    if let Some(props) = input.get("key_props") {
        policy.insert(
            "key_properties".to_string(),
            json!([{
                "curve": str_at(props, "/crv"),
                "exportable": bool_at(props, "exportable"),
                "key_size": int_at(props, "key_size"),
                "key_type": str_at(props, "/kty"),
                "reuse_key": bool_at(props, "reuse_key"),
            }]),
        );
    }

    let lifetime_actions: Vec<Value> = input
        .get("lifetime_actions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|action| {
            let mut action_output = Map::new();
            if let Some(act) = action.get("action") {
                action_output.insert("action_type".to_string(), json!(str_at(act, "/action_type")));
            }

            let mut trigger_output = Map::new();
            if let Some(trigger) = action.get("trigger") {
                for key in ["days_before_expiry", "lifetime_percentage"] {
                    if let Some(n) = trigger.get(key).and_then(Value::as_i64) {
                        trigger_output.insert(key.to_string(), json!(n));
                    }
                }
            }

            json!({
                "action": [Value::Object(action_output)],
                "trigger": [Value::Object(trigger_output)],
            })
        })
        .collect();
    policy.insert("lifetime_action".to_string(), Value::Array(lifetime_actions));

    if let Some(props) = input.get("secret_props") {
        policy.insert(
            "secret_properties".to_string(),
            json!([{ "content_type": str_at(props, "/contentType") }]),
        );
    }

    if let Some(props) = input.get("x509_props") {
        let sans = match props.get("sans").filter(|v| v.is_object()) {
            Some(san) => json!([{
                "emails": string_list(san.get("emails")),
                "dns_names": string_list(san.get("dns_names")),
                "upns": string_list(san.get("upns")),
            }]),
            None => json!([]),
        };
        policy.insert(
            "x509_certificate_properties".to_string(),
            json!([{
                "key_usage": string_list(props.get("key_usage")),
                "subject": str_at(props, "/subject"),
                "validity_in_months": int_at(props, "validity_months"),
                "extended_key_usage": string_list(props.get("ekus")),
                "subject_alternative_names": sans,
            }]),
        );
    }

    json!([Value::Object(policy)])
}

/// Set every computed field from a certificate bundle
pub fn flatten_certificate(cert: &Value, d: &mut ResourceData) -> Result<()> {
    let id = NestedItemId::parse(str_at(cert, "/id"))?;
    d.set("name", id.name.as_str());
    d.set("version", id.version.as_str());
    d.set("certificate_policy", flatten_certificate_policy(cert.get("policy")));
    d.set("secret_id", str_at(cert, "/sid"));

    let (data, data_base64) = match cert.get("cer").and_then(Value::as_str) {
        Some(cer) => {
            let der = decode_certificate(cer)?;
            (hex::encode_upper(&der), STANDARD.encode(&der))
        }
        None => (String::new(), String::new()),
    };
    d.set("certificate_data", data);
    d.set("certificate_data_base64", data_base64);

    let thumbprint = match cert.get("x5t").and_then(Value::as_str) {
        Some(x5t) => thumbprint_from_x5t(x5t)?,
        None => String::new(),
    };
    d.set("thumbprint", thumbprint);

    d.set("tags", tags::flatten(cert.get("tags")));
    Ok(())
}

fn certificate_policy_schema() -> Schema {
    let issuer = Schema::new().field("name", Field::string().computed());
    let key_properties = Schema::new()
        .field("curve", Field::string().computed())
        .field("exportable", Field::bool().computed())
        .field("key_size", Field::int().computed())
        .field("key_type", Field::string().computed())
        .field("reuse_key", Field::bool().computed());
    let action = Schema::new().field("action_type", Field::string().computed());
    let trigger = Schema::new()
        .field("days_before_expiry", Field::int().computed())
        .field("lifetime_percentage", Field::int().computed());
    let lifetime_action = Schema::new()
        .field("action", Field::block(action).computed())
        .field("trigger", Field::block(trigger).computed());
    let secret_properties = Schema::new().field("content_type", Field::string().computed());
    let sans = Schema::new()
        .field("emails", Field::list(Kind::String).computed())
        .field("dns_names", Field::list(Kind::String).computed())
        .field("upns", Field::list(Kind::String).computed());
    let x509 = Schema::new()
        .field("extended_key_usage", Field::list(Kind::String).computed())
        .field("key_usage", Field::list(Kind::String).computed())
        .field("subject", Field::string().computed())
        .field("subject_alternative_names", Field::block(sans).computed())
        .field("validity_in_months", Field::int().computed());

    Schema::new()
        .field("issuer_parameters", Field::block(issuer).computed())
        .field("key_properties", Field::block(key_properties).computed())
        .field("lifetime_action", Field::block(lifetime_action).computed())
        .field("secret_properties", Field::block(secret_properties).computed())
        .field("x509_certificate_properties", Field::block(x509).computed())
}

#[async_trait]
impl DataSourceHandler for CertificateDataSource {
    fn type_name(&self) -> &'static str {
        "azurerm_key_vault_certificate"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .field(
                "name",
                Field::string()
                    .required()
                    .validate(validate::key_vault_nested_item_name()),
            )
            .field(
                "key_vault_id",
                Field::string()
                    .required()
                    .validate(validate::typed_id(VaultId::parse)),
            )
            .field("version", Field::string().optional().computed())
            .field(
                "certificate_policy",
                Field::block(certificate_policy_schema()).computed(),
            )
            .field("secret_id", Field::string().computed())
            .field("certificate_data", Field::string().computed())
            .field("certificate_data_base64", Field::string().computed())
            .field("thumbprint", Field::string().computed())
            .field("tags", tags::schema_computed())
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let name = d.get_str("name").to_string();
        let vault = VaultId::parse(d.get_str("key_vault_id"))?;
        let version = d.get_str("version").to_string();

        let base_uri = base_uri_for_vault(client, &vault).await.map_err(|e| {
            e.context(format!("looking up base uri for Key {:?} in {}", name, vault))
        })?;

        let url = certificate_url(&base_uri, &name, &version);
        let cert = match client.get_data_plane(&url).await {
            Ok(cert) => cert,
            Err(e) if e.is_not_found() => {
                return Err(ProviderError::NotFound(format!(
                    "Certificate {:?} in Key Vault at URI {:?}",
                    name, base_uri
                )))
            }
            Err(e) => return Err(e.context("reading Key Vault Certificate")),
        };

        let cert_id = str_at(&cert, "/id");
        if cert_id.is_empty() {
            return Err(ProviderError::UnexpectedResponse(format!(
                "failure reading Key Vault Certificate ID for {:?}",
                name
            )));
        }
        d.set_id(cert_id);

        flatten_certificate(&cert, d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_url() {
        assert_eq!(
            certificate_url("https://vault.vault.azure.net/", "cert", ""),
            "https://vault.vault.azure.net/certificates/cert?api-version=7.1"
        );
        assert_eq!(
            certificate_url("https://vault.vault.azure.net/", "cert", "abc123"),
            "https://vault.vault.azure.net/certificates/cert/abc123?api-version=7.1"
        );
    }

    #[test]
    fn test_thumbprint() {
        let raw = [0xde_u8, 0xad, 0xbe, 0xef, 0x01];
        let x5t = URL_SAFE_NO_PAD.encode(raw);
        assert_eq!(thumbprint_from_x5t(&x5t).unwrap(), "DEADBEEF01");
    }

    #[test]
    fn test_flatten_certificate() {
        let der = [0x30_u8, 0x82, 0x01, 0x0a, 0xff];
        let cert = json!({
            "id": "https://vault.vault.azure.net/certificates/cert/v1",
            "sid": "https://vault.vault.azure.net/secrets/cert/v1",
            "x5t": URL_SAFE_NO_PAD.encode([0xab_u8, 0xcd]),
            "cer": STANDARD.encode(der),
            "policy": {
                "issuer": {"name": "Self"},
                "key_props": {"exportable": true, "kty": "RSA", "key_size": 2048, "reuse_key": false},
                "secret_props": {"contentType": "application/x-pkcs12"},
                "x509_props": {
                    "subject": "CN=example",
                    "validity_months": 12,
                    "key_usage": ["digitalSignature"],
                    "sans": {"dns_names": ["example.com"]}
                },
                "lifetime_actions": [
                    {"trigger": {"days_before_expiry": 30}, "action": {"action_type": "AutoRenew"}}
                ]
            },
            "tags": {"env": "test"}
        });

        let mut d = ResourceData::from_state("", Map::new());
        flatten_certificate(&cert, &mut d).unwrap();

        assert_eq!(d.get_str("name"), "cert");
        assert_eq!(d.get_str("version"), "v1");
        assert_eq!(d.get_str("certificate_data"), "3082010AFF");
        assert_eq!(d.get_str("certificate_data_base64"), STANDARD.encode(der));
        assert_eq!(d.get_str("thumbprint"), "ABCD");
        assert_eq!(d.get_str("secret_id"), "https://vault.vault.azure.net/secrets/cert/v1");

        let policy = &d.get_list("certificate_policy")[0];
        assert_eq!(policy["issuer_parameters"][0]["name"], json!("Self"));
        assert_eq!(policy["key_properties"][0]["key_size"], json!(2048));
        assert_eq!(
            policy["lifetime_action"][0]["trigger"][0],
            json!({"days_before_expiry": 30})
        );
        assert_eq!(
            policy["x509_certificate_properties"][0]["subject_alternative_names"][0]["dns_names"],
            json!(["example.com"])
        );
        assert_eq!(
            policy["x509_certificate_properties"][0]["extended_key_usage"],
            json!([])
        );
    }

    #[test]
    fn test_missing_policy_is_empty() {
        assert_eq!(flatten_certificate_policy(None), json!([]));
    }

    #[test]
    fn test_key_vault_id_is_validated() {
        let problems = CertificateDataSource.schema().validate(
            json!({
                "name": "cert",
                "key_vault_id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acct"
            })
            .as_object()
            .unwrap(),
        );
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("key_vault_id"));
    }
}
