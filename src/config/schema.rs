//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so a minimal config is valid.

use serde::{Deserialize, Serialize};

use crate::api::types::Flag;

/// Root configuration for the agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// API limits.
    pub api: ApiConfig,

    /// Authorization gate settings.
    pub authorization: AuthorizationConfig,

    /// Containerizer runtime endpoint.
    pub runtime: RuntimeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5051").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5051".to_string(),
        }
    }
}

/// API request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Maximum buffered (non-streaming) body size in bytes. Streaming
    /// attach bodies are never buffered and are not subject to this.
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// Authorization gate configuration.
///
/// When disabled, every authorization-sensitive call is allowed: the agent
/// is fail-open without an authorizer, by explicit policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Consult an external authorization service.
    pub enabled: bool,

    /// Endpoint of the authorization service.
    pub endpoint: String,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
        }
    }
}

/// Containerizer runtime endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Base URL of the runtime daemon the agent forwards container
    /// operations to.
    pub endpoint: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7070".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl AgentConfig {
    /// Flatten the configuration into dotted name/value flags, the shape
    /// GET_FLAGS reports.
    pub fn flags(&self) -> Vec<Flag> {
        let mut flags = Vec::new();
        if let Ok(value) = serde_json::to_value(self) {
            collect_flags(&mut flags, "", &value);
        }
        flags.sort_by(|a, b| a.name.cmp(&b.name));
        flags
    }
}

fn collect_flags(flags: &mut Vec<Flag>, prefix: &str, value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(fields) => {
            for (key, value) in fields {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_flags(flags, &name, value);
            }
        }
        serde_json::Value::String(text) => flags.push(Flag {
            name: prefix.to_string(),
            value: text.clone(),
        }),
        other => flags.push(Flag {
            name: prefix.to_string(),
            value: other.to_string(),
        }),
    }
}
