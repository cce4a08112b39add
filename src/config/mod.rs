use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowOptions;

pub const DEFAULT_CONFIG_FILE: &str = "schooldesk.toml";

/// Layered configuration: built-in defaults, then the TOML file, then
/// `DESK_`-prefixed environment variables (highest precedence, nested keys
/// separated by `__`, e.g. `DESK_SERVER__PORT=9090`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret shared with the auth provider that signs bearer tokens.
    pub token_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub number_prefix: String,
    pub reopen_on_reply: bool,
    pub strict_transitions: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "dev-secret-change-me".to_string(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            number_prefix: "ECPS".to_string(),
            reopen_on_reply: false,
            strict_transitions: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DESK_").split("__"))
            .extract()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            number_prefix: self.workflow.number_prefix.clone(),
            reopen_on_reply: self.workflow.reopen_on_reply,
            strict_transitions: self.workflow.strict_transitions,
        }
    }
}
