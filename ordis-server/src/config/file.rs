//! TOML file configuration structures.
//!
//! These structs directly map to the `ordis-config.toml` file format. The
//! section types live in `ordis-core::config` so the processors can share
//! them; this module only assembles the file shape.

use ordis_core::config::{ProviderConfig, ServerConfig, ServiceConfig, SharedConfig};
use serde::{Deserialize, Serialize};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub service: ServiceConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl FileConfig {
    /// Convert to the shared runtime config with separate locks per section.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig::new(self.server, self.service, self.providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordis_sdk::objects::Channel;

    #[test]
    fn full_config_parses() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[service]
name = "Acme CRM"
secret = "service-secret"

[[providers]]
channel = "chat"
endpoint = "https://chat.example.com/v1/messages"
api_key = "chat-key"
hook_secret = "chat-hook-secret"

[[providers]]
channel = "voice"
endpoint = "https://voice.example.com/v1/calls"
api_key = "voice-key"
hook_secret = "voice-hook-secret"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.service.name, "Acme CRM");
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].channel, Channel::Voice);
    }

    #[test]
    fn server_section_is_optional() {
        let toml_str = r#"
[service]
name = "Acme CRM"
secret = "service-secret"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert!(config.providers.is_empty());
    }
}
