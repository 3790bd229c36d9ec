//! Provider dispatch
//!
//! Looks up the handler for a type name, validates configuration against
//! its schema, runs the operation under its deadline and returns the
//! resulting state.

use super::data::{ResourceData, ResourceState};
use super::handler::{DataSourceHandler, ResourceHandler};
use super::registry::{get_data_source, get_resource};
use super::schema::Schema;
use super::timeouts::{Operation, Timeouts};
use crate::azure::ArmClient;
use crate::error::{ProviderError, Result};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Configuration key holding per-invocation deadline overrides
const TIMEOUTS_KEY: &str = "timeouts";

/// Entry point for every resource and data source operation
#[derive(Clone)]
pub struct Provider {
    client: ArmClient,
}

impl Provider {
    pub fn new(client: ArmClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ArmClient {
        &self.client
    }

    /// Create a resource from configuration
    pub async fn create(&self, type_name: &str, config: Map<String, Value>) -> Result<ResourceState> {
        let handler = resource_handler(type_name)?;
        let (config, timeouts) = prepare(&handler.schema(), handler.timeouts(), config)?;

        tracing::info!("create: type={}", type_name);
        let mut d = ResourceData::new(config);
        with_deadline(
            type_name,
            Operation::Create,
            timeouts.create,
            handler.create(&self.client, &mut d),
        )
        .await?;

        Ok(d.into_state())
    }

    /// Refresh a resource; the returned state has an empty ID if it is gone
    pub async fn read(
        &self,
        type_name: &str,
        id: &str,
        attributes: Map<String, Value>,
    ) -> Result<ResourceState> {
        let handler = resource_handler(type_name)?;
        let timeouts = handler
            .timeouts()
            .with_overrides(attributes.get(TIMEOUTS_KEY))?;

        tracing::debug!("read: type={}, id={}", type_name, id);
        let mut d = ResourceData::from_state(id, attributes);
        with_deadline(
            type_name,
            Operation::Read,
            timeouts.read,
            handler.read(&self.client, &mut d),
        )
        .await?;

        Ok(d.into_state())
    }

    /// Apply new configuration to an existing resource
    ///
    /// Without a prior state the current remote state is read first.
    pub async fn update(
        &self,
        type_name: &str,
        id: &str,
        config: Map<String, Value>,
        prior: Option<Map<String, Value>>,
    ) -> Result<ResourceState> {
        let handler = resource_handler(type_name)?;
        let schema = handler.schema();
        let (config, timeouts) = prepare(&schema, handler.timeouts(), config)?;

        let prior = match prior {
            Some(prior) => prior,
            None => {
                let current = self.read(type_name, id, config.clone()).await?;
                if current.id.is_empty() {
                    return Err(ProviderError::NotFound(id.to_string()));
                }
                current.attributes
            }
        };

        let replace = schema.changed_force_new_fields(&prior, &config);
        if !replace.is_empty() {
            return Err(ProviderError::RequiresReplacement(replace));
        }

        tracing::info!("update: type={}, id={}", type_name, id);
        let merged = merge_computed(&schema, &prior, config);
        let mut d = ResourceData::from_state(id, merged).with_prior(prior);
        with_deadline(
            type_name,
            Operation::Update,
            timeouts.update,
            handler.update(&self.client, &mut d),
        )
        .await?;

        Ok(d.into_state())
    }

    /// Delete a resource; a missing object is not an error
    pub async fn delete(
        &self,
        type_name: &str,
        id: &str,
        attributes: Map<String, Value>,
    ) -> Result<()> {
        let handler = resource_handler(type_name)?;
        let timeouts = handler
            .timeouts()
            .with_overrides(attributes.get(TIMEOUTS_KEY))?;

        tracing::info!("delete: type={}, id={}", type_name, id);
        let mut d = ResourceData::from_state(id, attributes);
        with_deadline(
            type_name,
            Operation::Delete,
            timeouts.delete,
            handler.delete(&self.client, &mut d),
        )
        .await
    }

    /// Bring an existing remote object under management
    pub async fn import(&self, type_name: &str, id: &str) -> Result<ResourceState> {
        let handler = resource_handler(type_name)?;
        handler.validate_import_id(id)?;

        tracing::info!("import: type={}, id={}", type_name, id);
        let state = self.read(type_name, id, Map::new()).await?;
        if state.id.is_empty() {
            return Err(ProviderError::ImportNonExistent {
                resource_type: type_name.to_string(),
                id: id.to_string(),
            });
        }
        Ok(state)
    }

    /// Look up an existing object through a data source
    pub async fn read_data_source(
        &self,
        type_name: &str,
        config: Map<String, Value>,
    ) -> Result<ResourceState> {
        let handler = data_source_handler(type_name)?;
        let (config, timeouts) = prepare(&handler.schema(), handler.timeouts(), config)?;

        tracing::debug!("data source read: type={}", type_name);
        let mut d = ResourceData::new(config);
        with_deadline(
            type_name,
            Operation::Read,
            timeouts.read,
            handler.read(&self.client, &mut d),
        )
        .await?;

        Ok(d.into_state())
    }
}

fn resource_handler(type_name: &str) -> Result<Arc<dyn ResourceHandler>> {
    get_resource(type_name).ok_or_else(|| ProviderError::UnknownResourceType(type_name.to_string()))
}

fn data_source_handler(type_name: &str) -> Result<Arc<dyn DataSourceHandler>> {
    get_data_source(type_name)
        .ok_or_else(|| ProviderError::UnknownResourceType(type_name.to_string()))
}

/// Split off the timeouts block, validate the rest and fill in defaults
fn prepare(
    schema: &Schema,
    defaults: Timeouts,
    mut config: Map<String, Value>,
) -> Result<(Map<String, Value>, Timeouts)> {
    let timeouts = defaults.with_overrides(config.get(TIMEOUTS_KEY))?;
    config.remove(TIMEOUTS_KEY);
    // An ID carried over from a state file is not configuration
    config.remove("id");

    let problems = schema.validate(&config);
    if !problems.is_empty() {
        return Err(ProviderError::Validation(problems));
    }
    schema.apply_defaults(&mut config);

    Ok((config, timeouts))
}

/// Carry computed values the configuration does not set over from the prior state
fn merge_computed(
    schema: &Schema,
    prior: &Map<String, Value>,
    mut config: Map<String, Value>,
) -> Map<String, Value> {
    for (name, field) in schema.iter() {
        if !field.computed || config.get(name).map(|v| !v.is_null()).unwrap_or(false) {
            continue;
        }
        if let Some(value) = prior.get(name) {
            config.insert(name.to_string(), value.clone());
        }
    }
    config
}

async fn with_deadline<F>(
    type_name: &str,
    operation: Operation,
    deadline: Duration,
    fut: F,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                "{} of {} exceeded its {}s deadline",
                operation.as_str(),
                type_name,
                deadline.as_secs()
            );
            Err(ProviderError::Timeout {
                operation: operation.as_str().to_string(),
                resource_type: type_name.to_string(),
                minutes: deadline.as_secs() / 60,
            })
        }
    }
}
