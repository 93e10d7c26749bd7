//! Server configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ShareError;

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// What to share.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareSection {
    /// Name the share is announced under.
    pub name: String,

    /// Files offered for download, in listing order.
    pub files: Vec<PathBuf>,

    /// Directory served for `/` and other static paths.
    pub assets: PathBuf,
}

impl Default for ShareSection {
    fn default() -> Self {
        Self {
            name: "flyfile".to_string(),
            files: Vec::new(),
            assets: PathBuf::from("client"),
        }
    }
}

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    pub server: ServerSection,
    pub share: ShareSection,
}

impl ShareConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn from_file(path: &str) -> Result<Self, ShareError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ShareError::Config(format!("{path}: {e}")))?;
        toml::from_str(&content).map_err(|e| ShareError::Config(format!("{path}: {e}")))
    }
}
