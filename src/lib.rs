//! azrm - declarative Azure Resource Manager resource handlers
//!
//! Each supported resource type declares a field schema and implements
//! create, read, update, delete and import against the ARM REST API.

pub mod azure;
pub mod config;
pub mod error;
pub mod resource;
pub mod services;

pub use error::{ProviderError, Result};
