//! Resource abstraction layer
//!
//! Everything a handler needs apart from the ARM client: field schemas and
//! validators, the flat data map, resource IDs, tags, deadlines, the handler
//! traits and the provider that dispatches to them.
//!
//! # Architecture
//!
//! - [`schema`] / [`validate`] - Field declarations and validators
//! - [`data`] - Working copy of a resource's fields
//! - [`id`] - ARM resource ID parsing
//! - [`registry`] - Type name to handler lookup
//! - [`provider`] - Validation, deadlines and dispatch
//!
//! # Example
//!
//! ```ignore
//! use azrm::resource::Provider;
//!
//! async fn allow_office(provider: &Provider) -> azrm::Result<()> {
//!     let config = serde_json::json!({
//!         "name": "office",
//!         "resource_group_name": "rg",
//!         "server_name": "sql-prod",
//!         "start_ip_address": "10.0.17.62",
//!         "end_ip_address": "10.0.17.62"
//!     });
//!     let state = provider
//!         .create("azurerm_sql_firewall_rule", config.as_object().cloned().unwrap_or_default())
//!         .await?;
//!     println!("{}", state.id);
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod handler;
pub mod id;
pub mod provider;
mod registry;
pub mod schema;
pub mod tags;
pub mod timeouts;
pub mod validate;

pub use data::{ResourceData, ResourceState};
pub use handler::{DataSourceHandler, ResourceHandler};
pub use provider::Provider;
pub use registry::*;
pub use schema::{Field, Kind, Schema};
pub use timeouts::Timeouts;
