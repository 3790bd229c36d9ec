//! Handler traits
//!
//! One implementation per cloud object type. Handlers are stateless; all
//! shared runtime state lives in the [`ArmClient`] passed to each call.

use super::data::ResourceData;
use super::id::ResourceId;
use super::schema::Schema;
use super::timeouts::Timeouts;
use crate::azure::ArmClient;
use crate::error::Result;
use async_trait::async_trait;

/// Create/read/update/delete logic bound to one resource type
///
/// `create` and `update` finish by reading the object back so the returned
/// state reflects what the server stored. `read` clears the ID when the
/// object no longer exists; `delete` treats a missing object as success.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Registered type name, e.g. `azurerm_sql_firewall_rule`
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Reject IDs of the wrong shape before an import reads them
    fn validate_import_id(&self, id: &str) -> Result<()> {
        ResourceId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()>;

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()>;

    async fn update(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()>;

    async fn delete(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()>;
}

/// Read-only lookup of an existing object
#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    async fn read(&self, client: &ArmClient, d: &mut ResourceData) -> Result<()>;
}
