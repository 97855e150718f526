//! Client settings loaded from YAML, with `.env` and environment overrides

use graphsockets::{ConnectionConfig, GraphQLClient, GraphSocketError, QueryMethod, SubProtocol};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const ENDPOINT_ENV_VAR: &str = "GRAPHQL_ENDPOINT";
pub const WS_ENDPOINT_ENV_VAR: &str = "GRAPHQL_WS_ENDPOINT";
pub const AUTH_TOKEN_ENV_VAR: &str = "GRAPHQL_AUTH_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Failed to build client: {0}")]
    ClientError(#[from] GraphSocketError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for one GraphQL endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub endpoint: String,

    /// Derived from `endpoint` when absent
    #[serde(default)]
    pub ws_endpoint: Option<String>,

    /// Default HTTP method (post, get)
    #[serde(default = "default_method")]
    pub method: String,

    /// Sub-protocol names, most preferred first
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub request_timeout_secs: Option<f64>,

    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Bearer token from the environment (not in YAML)
    #[serde(skip)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: f64,
    /// Keep-alive watchdog; absent disables it
    #[serde(default)]
    pub keep_alive_timeout_secs: Option<f64>,
    #[serde(default = "default_stop_grace_timeout")]
    pub stop_grace_timeout_secs: f64,
    #[serde(default)]
    pub ping_interval_secs: Option<f64>,
    #[serde(default)]
    pub init_payload: Option<serde_json::Value>,
    #[serde(default = "default_close_when_idle")]
    pub close_when_idle: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            handshake_timeout_secs: default_handshake_timeout(),
            keep_alive_timeout_secs: None,
            stop_grace_timeout_secs: default_stop_grace_timeout(),
            ping_interval_secs: None,
            init_payload: None,
            close_when_idle: default_close_when_idle(),
        }
    }
}

fn default_method() -> String {
    "post".to_string()
}

fn default_protocols() -> Vec<String> {
    SubProtocol::DEFAULT_PREFERENCE
        .iter()
        .map(|p| p.as_str().to_string())
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout() -> f64 {
    10.0
}

fn default_handshake_timeout() -> f64 {
    10.0
}

fn default_stop_grace_timeout() -> f64 {
    5.0
}

fn default_close_when_idle() -> bool {
    true
}

impl ClientSettings {
    /// Load settings from a YAML file, then `.env` and environment overrides
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut settings: ClientSettings = serde_yaml::from_str(&yaml_content)?;

        dotenv::dotenv().ok();
        settings.apply_overrides(|key| std::env::var(key).ok());

        settings.validate()?;
        Ok(settings)
    }

    /// Parse and validate YAML without consulting the environment
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: ClientSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply endpoint and token overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENDPOINT_ENV_VAR) {
            info!("Overriding endpoint from environment variable");
            self.endpoint = endpoint;
        }
        if let Some(ws_endpoint) = lookup(WS_ENDPOINT_ENV_VAR) {
            info!("Overriding websocket endpoint from environment variable");
            self.ws_endpoint = Some(ws_endpoint);
        }
        if let Some(token) = lookup(AUTH_TOKEN_ENV_VAR) {
            self.auth_token = Some(token);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError("endpoint cannot be empty".to_string()));
        }

        self.method
            .parse::<QueryMethod>()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.protocols.is_empty() {
            return Err(ConfigError::ValidationError(
                "protocols must name at least one sub-protocol".to_string(),
            ));
        }
        for name in &self.protocols {
            if SubProtocol::from_name(name).is_none() {
                return Err(ConfigError::ValidationError(format!("unknown sub-protocol '{}'", name)));
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let connection = &self.connection;
        let timeouts = [
            ("connection.connect_timeout_secs", Some(connection.connect_timeout_secs)),
            ("connection.handshake_timeout_secs", Some(connection.handshake_timeout_secs)),
            ("connection.keep_alive_timeout_secs", connection.keep_alive_timeout_secs),
            ("connection.stop_grace_timeout_secs", Some(connection.stop_grace_timeout_secs)),
            ("connection.ping_interval_secs", connection.ping_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (name, value) in timeouts {
            if let Some(value) = value {
                if !value.is_finite() || value <= 0.0 {
                    return Err(ConfigError::ValidationError(format!("{} must be greater than 0", name)));
                }
            }
        }

        Ok(())
    }

    pub fn query_method(&self) -> QueryMethod {
        self.method.parse().unwrap_or_default()
    }

    /// Sub-protocols in preference order; unknown names are skipped
    pub fn sub_protocols(&self) -> Vec<SubProtocol> {
        self.protocols
            .iter()
            .filter_map(|name| SubProtocol::from_name(name))
            .collect()
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let connection = &self.connection;
        let mut config = ConnectionConfig::new()
            .connect_timeout(Duration::from_secs_f64(connection.connect_timeout_secs))
            .handshake_timeout(Duration::from_secs_f64(connection.handshake_timeout_secs))
            .keep_alive_timeout(connection.keep_alive_timeout_secs.map(Duration::from_secs_f64))
            .stop_grace_timeout(Duration::from_secs_f64(connection.stop_grace_timeout_secs))
            .ping_interval(connection.ping_interval_secs.map(Duration::from_secs_f64))
            .close_when_idle(connection.close_when_idle)
            .protocols(self.sub_protocols());
        if let Some(payload) = &connection.init_payload {
            config = config.init_payload(payload.clone());
        }
        config
    }

    /// Build a client from these settings
    pub fn build_client(&self) -> Result<GraphQLClient> {
        self.validate()?;

        let mut builder = GraphQLClient::builder()
            .endpoint(self.endpoint.clone())
            .method(self.query_method())
            .protocols(self.sub_protocols())
            .connection_config(self.connection_config());

        for (name, value) in &self.headers {
            builder = builder.header(name.clone(), value.clone());
        }
        if let Some(token) = &self.auth_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(ws_endpoint) = &self.ws_endpoint {
            builder = builder.ws_endpoint(ws_endpoint.clone());
        }
        if let Some(timeout) = self.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs_f64(timeout));
        }

        Ok(builder.build()?)
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Endpoint: {}", self.endpoint);
        info!(
            "  WebSocket endpoint: {}",
            self.ws_endpoint.as_deref().unwrap_or("(derived)")
        );
        info!("  Method: {}", self.method);
        info!("  Protocols: {}", self.protocols.join(", "));
        info!("  Headers: {}", self.headers.len());
        info!("  Auth token: {}", if self.auth_token.is_some() { "set" } else { "not set" });
        info!("  Log level: {}", self.log_level);
    }
}
