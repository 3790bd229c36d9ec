//! Data Factory datasets

use super::{delete_ignoring_not_found, require_absent, str_at};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result, ResultExt};
use crate::resource::id::DataFactoryDatasetId;
use crate::resource::{validate, Field, Kind, ResourceData, ResourceHandler, Schema};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const DATA_FACTORY_API_VERSION: &str = "2018-06-01";

const DATASET_TYPE_AZURE_BLOB: &str = "AzureBlob";

/// Keys of an Azure Blob dataset's `properties` that map to fields;
/// anything else is an additional property
const KNOWN_PROPERTIES: &[&str] = &[
    "type",
    "typeProperties",
    "linkedServiceName",
    "description",
    "structure",
    "schema",
    "parameters",
    "annotations",
    "folder",
];

const COLUMN_TYPES: &[&str] = &[
    "Byte",
    "Byte[]",
    "Boolean",
    "Date",
    "DateTime",
    "DateTimeOffset",
    "Decimal",
    "Double",
    "Guid",
    "Int16",
    "Int32",
    "Int64",
    "Single",
    "String",
    "TimeSpan",
];

pub struct DatasetAzureBlob;

/// A plain string, or an expression evaluated at run time
pub fn expand_expression(input: &str, dynamic: bool) -> Value {
    if dynamic {
        json!({ "value": input, "type": "Expression" })
    } else {
        json!(input)
    }
}

/// The string value and whether it is an expression
pub fn flatten_expression(input: Option<&Value>) -> (String, bool) {
    match input {
        Some(Value::String(s)) => (s.clone(), false),
        Some(Value::Object(o)) => {
            let value = o.get("value").and_then(Value::as_str).unwrap_or_default();
            let dynamic = o.get("type").and_then(Value::as_str) == Some("Expression");
            (value.to_string(), dynamic)
        }
        _ => (String::new(), false),
    }
}

/// Dataset parameters: every value is a string parameter with a default
pub fn expand_parameters(input: &Map<String, Value>) -> Value {
    let params: Map<String, Value> = input
        .iter()
        .map(|(k, v)| (k.clone(), json!({ "type": "String", "defaultValue": v })))
        .collect();
    Value::Object(params)
}

pub fn flatten_parameters(input: Option<&Value>) -> Value {
    let mut output = Map::new();
    if let Some(params) = input.and_then(Value::as_object) {
        for (k, v) in params {
            match v.get("defaultValue").and_then(Value::as_str) {
                Some(default) => {
                    output.insert(k.clone(), json!(default));
                }
                None => tracing::warn!(
                    "Unable to flatten Data Factory parameter {:?}: default value is not a string",
                    k
                ),
            }
        }
    }
    Value::Object(output)
}

fn flatten_annotations(input: Option<&Value>) -> Value {
    let annotations: Vec<Value> = input
        .and_then(Value::as_array)
        .map(|a| a.iter().filter(|v| v.is_string()).cloned().collect())
        .unwrap_or_default();
    Value::Array(annotations)
}

/// Schema columns as the dataset `structure` list
pub fn expand_structure(columns: &[Value]) -> Value {
    let structure: Vec<Value> = columns
        .iter()
        .filter_map(Value::as_object)
        .map(|column| {
            let mut out = Map::new();
            out.insert(
                "name".to_string(),
                column.get("name").cloned().unwrap_or(Value::Null),
            );
            for key in ["type", "description"] {
                if let Some(v) = column.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()) {
                    out.insert(key.to_string(), json!(v));
                }
            }
            Value::Object(out)
        })
        .collect();
    Value::Array(structure)
}

pub fn flatten_structure(input: Option<&Value>) -> Value {
    let columns: Vec<Value> = input
        .and_then(Value::as_array)
        .map(|columns| {
            columns
                .iter()
                .filter_map(Value::as_object)
                .map(|column| {
                    let mut out = Map::new();
                    for key in ["name", "type", "description"] {
                        if let Some(v) = column.get(key).and_then(Value::as_str) {
                            out.insert(key.to_string(), json!(v));
                        }
                    }
                    Value::Object(out)
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(columns)
}

/// Request body for an Azure Blob dataset
pub fn expand_dataset(d: &ResourceData) -> Value {
    let mut properties = Map::new();

    // Additional properties sit alongside the typed ones
    if let Some(additional) = d.get("additional_properties").and_then(Value::as_object) {
        for (k, v) in additional {
            properties.insert(k.clone(), v.clone());
        }
    }

    properties.insert("type".to_string(), json!(DATASET_TYPE_AZURE_BLOB));
    properties.insert(
        "typeProperties".to_string(),
        json!({
            "folderPath": expand_expression(d.get_str("path"), d.get_bool("dynamic_path_enabled")),
            "fileName": expand_expression(d.get_str("filename"), d.get_bool("dynamic_filename_enabled")),
        }),
    );
    properties.insert(
        "linkedServiceName".to_string(),
        json!({
            "referenceName": d.get_str("linked_service_name"),
            "type": "LinkedServiceReference",
        }),
    );
    properties.insert("description".to_string(), json!(d.get_str("description")));

    if let Some(folder) = d.get_ok_str("folder") {
        properties.insert("folder".to_string(), json!({ "name": folder }));
    }
    if let Some(params) = d.get("parameters").and_then(Value::as_object).filter(|p| !p.is_empty()) {
        properties.insert("parameters".to_string(), expand_parameters(params));
    }
    if let Some(annotations) = d.get_ok_list("annotations") {
        properties.insert("annotations".to_string(), Value::Array(annotations.to_vec()));
    }
    if let Some(columns) = d.get_ok_list("schema_column") {
        properties.insert("structure".to_string(), expand_structure(columns));
    }

    json!({
        "properties": properties,
        "type": DATASET_TYPE_AZURE_BLOB,
    })
}

/// Configuration fields for a dataset's `properties`
pub fn flatten_dataset(properties: &Value, d: &mut ResourceData) {
    let additional: Map<String, Value> = properties
        .as_object()
        .map(|p| {
            p.iter()
                .filter(|(k, _)| !KNOWN_PROPERTIES.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    d.set("additional_properties", Value::Object(additional));

    if let Some(description) = properties.get("description").and_then(Value::as_str) {
        d.set("description", description);
    }

    d.set("parameters", flatten_parameters(properties.get("parameters")));
    d.set("annotations", flatten_annotations(properties.get("annotations")));

    if let Some(reference) = properties
        .pointer("/linkedServiceName/referenceName")
        .and_then(Value::as_str)
    {
        d.set("linked_service_name", reference);
    }

    if let Some(type_properties) = properties.get("typeProperties").filter(|v| v.is_object()) {
        let (filename, dynamic_filename) = flatten_expression(type_properties.get("fileName"));
        let (path, dynamic_path) = flatten_expression(type_properties.get("folderPath"));
        d.set("filename", filename);
        d.set("path", path);
        d.set("dynamic_filename_enabled", dynamic_filename);
        d.set("dynamic_path_enabled", dynamic_path);
    }

    if let Some(folder) = properties.pointer("/folder/name").and_then(Value::as_str) {
        d.set("folder", folder);
    }

    d.set("schema_column", flatten_structure(properties.get("structure")));
}

impl DatasetAzureBlob {
    async fn create_update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = DataFactoryDatasetId::new(
            &client.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("data_factory_name"),
            d.get_str("name"),
        );
        let url = client.resource_url(&id.id(), DATA_FACTORY_API_VERSION);
        let description = format!(
            "Data Factory Dataset Azure Blob {:?} (Data Factory {:?} / Resource Group {:?})",
            id.name, id.factory_name, id.resource_group
        );

        if d.is_new_resource() {
            require_absent(client, &url, self.type_name(), &description).await?;
        }

        client
            .put(&url, &expand_dataset(d))
            .await
            .context_with(|| format!("creating/updating {}", description))?;

        let resp = client
            .get(&url)
            .await
            .context_with(|| format!("retrieving {}", description))?;
        let resource_id = str_at(&resp, "/id");
        if resource_id.is_empty() {
            return Err(ProviderError::UnexpectedResponse(format!(
                "cannot read {}: the response has no ID",
                description
            )));
        }
        d.set_id(resource_id);

        self.read(client, d).await
    }
}

#[async_trait]
impl ResourceHandler for DatasetAzureBlob {
    fn type_name(&self) -> &'static str {
        "azurerm_data_factory_dataset_azure_blob"
    }

    fn schema(&self) -> Schema {
        let column = Schema::new()
            .field(
                "name",
                Field::string().required().validate(validate::no_empty_strings()),
            )
            .field(
                "type",
                Field::string()
                    .optional()
                    .validate(validate::string_in_slice(COLUMN_TYPES, false)),
            )
            .field(
                "description",
                Field::string().optional().validate(validate::no_empty_strings()),
            );

        Schema::new()
            .field(
                "name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::data_factory_item_name()),
            )
            .field(
                "data_factory_name",
                Field::string()
                    .required()
                    .force_new()
                    .validate(validate::data_factory_name()),
            )
            // ARM returns the resource group in lower case
            .field(
                "resource_group_name",
                super::resource_group_name().diff_suppress(validate::suppress_case_diff),
            )
            .field(
                "linked_service_name",
                Field::string().required().validate(validate::no_empty_strings()),
            )
            .field(
                "path",
                Field::string().optional().validate(validate::no_empty_strings()),
            )
            .field(
                "filename",
                Field::string().optional().validate(validate::no_empty_strings()),
            )
            .field("dynamic_path_enabled", Field::bool().optional().default(false))
            .field("dynamic_filename_enabled", Field::bool().optional().default(false))
            .field("parameters", Field::map().optional())
            .field(
                "description",
                Field::string().optional().validate(validate::no_empty_strings()),
            )
            .field("annotations", Field::list(Kind::String).optional())
            .field(
                "folder",
                Field::string().optional().validate(validate::no_empty_strings()),
            )
            .field("additional_properties", Field::map().optional())
            .field("schema_column", Field::block(column).optional())
    }

    fn validate_import_id(&self, id: &str) -> Result<()> {
        DataFactoryDatasetId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = DataFactoryDatasetId::parse(d.id())?;
        let url = client.resource_url(&id.id(), DATA_FACTORY_API_VERSION);
        let description = format!(
            "Data Factory Dataset Azure Blob {:?} (Data Factory {:?} / Resource Group {:?})",
            id.name, id.factory_name, id.resource_group
        );

        let resp = match client.get(&url).await {
            Ok(resp) => resp,
            Err(e) if e.is_not_found() => {
                tracing::info!("{} was not found - removing from state", description);
                d.set_id("");
                return Ok(());
            }
            Err(e) => return Err(e.context(format!("retrieving {}", description))),
        };

        d.set("name", str_at(&resp, "/name"));
        d.set("resource_group_name", id.resource_group.as_str());
        d.set("data_factory_name", id.factory_name.as_str());

        let properties = resp.get("properties").cloned().unwrap_or(Value::Null);
        let kind = str_at(&properties, "/type");
        if kind != DATASET_TYPE_AZURE_BLOB {
            return Err(ProviderError::UnexpectedResponse(format!(
                "classifying {}: expected {:?}, received {:?}",
                description, DATASET_TYPE_AZURE_BLOB, kind
            )));
        }

        flatten_dataset(&properties, d);
        Ok(())
    }

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        self.create_update(client, d).await
    }

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()> {
        let id = DataFactoryDatasetId::parse(d.id())?;
        let url = client.resource_url(&id.id(), DATA_FACTORY_API_VERSION);
        delete_ignoring_not_found(client, &url, false)
            .await
            .context_with(|| {
                format!(
                    "deleting Data Factory Dataset Azure Blob {:?} (Data Factory {:?} / Resource Group {:?})",
                    id.name, id.factory_name, id.resource_group
                )
            })
    }
}
