//! Runtime configuration re-exports and utilities.
//!
//! The actual config types are defined in `ordis-core::config`.
//! This module re-exports them for convenience.

pub use ordis_core::config::{ProviderConfig, ServerConfig, ServiceConfig, SharedConfig};
