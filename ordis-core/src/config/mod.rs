//! Shared runtime configuration types.
//!
//! Defined in the core so the processors and the server agree on shapes;
//! the server's `config::runtime` module re-exports them. Each section sits
//! behind its own lock so a SIGHUP reload swaps sections independently
//! without stalling readers of the others.

use std::net::SocketAddr;
use std::sync::Arc;

use ordis_sdk::objects::Channel;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

/// Server listen configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

/// Service API authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Human-readable integrator name.
    pub name: String,
    /// Secret key for signing Service API request bodies.
    pub secret: String,
}

impl ServiceConfig {
    pub fn secret_bytes(&self) -> &[u8] {
        self.secret.as_bytes()
    }
}

/// One outbound channel provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The channel this provider transmits on.
    pub channel: Channel,
    /// Send endpoint of the provider's API.
    pub endpoint: Url,
    /// Bearer token for the provider's send API.
    pub api_key: String,
    /// Shared secret expected in `Ordis-Hook-Secret` on inbound callbacks.
    pub hook_secret: String,
}

/// Runtime configuration with separate locks per section.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub service: Arc<RwLock<ServiceConfig>>,
    pub providers: Arc<RwLock<Vec<ProviderConfig>>>,
}

impl SharedConfig {
    pub fn new(
        server: ServerConfig,
        service: ServiceConfig,
        providers: Vec<ProviderConfig>,
    ) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            service: Arc::new(RwLock::new(service)),
            providers: Arc::new(RwLock::new(providers)),
        }
    }
}
