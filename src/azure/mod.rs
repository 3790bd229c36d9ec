//! Azure Resource Manager plumbing
//!
//! Token sources, the HTTP wrapper, the shared client, LRO polling and the
//! named locks used for read-modify-write against parent resources.

pub mod auth;
pub mod client;
pub mod http;
pub mod locks;
pub mod poller;

pub use client::ArmClient;
