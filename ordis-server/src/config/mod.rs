//! Server configuration: TOML file loading and runtime types.

mod file;
pub mod runtime;

pub use file::FileConfig;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Loads (and re-loads, on SIGHUP) the TOML configuration file.
pub struct ConfigLoader {
    path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(path: &Path, listen_override: Option<SocketAddr>) -> Self {
        Self {
            path: path.to_path_buf(),
            listen_override,
        }
    }

    /// Read and parse the configuration file, applying the command-line
    /// listen override if one was given.
    pub fn load(&self) -> anyhow::Result<FileConfig> {
        let raw = std::fs::read_to_string(&self.path)?;
        let mut config: FileConfig = toml::from_str(&raw)?;
        if let Some(listen) = self.listen_override {
            config.server.listen = listen;
        }
        Ok(config)
    }

    /// Re-read the configuration file (SIGHUP handler).
    pub fn reload(&self) -> anyhow::Result<FileConfig> {
        self.load()
    }
}

/// The database URL comes from the environment, never the config file, so
/// credentials stay out of reloadable state.
pub fn get_database_url() -> anyhow::Result<String> {
    std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))
}
