//! Configuration management with environment variable support and validation.

use anyhow::{anyhow, Result};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
            request_timeout_seconds: 30,
        }
    }
}

/// Endpoint addressed by an entity id.
///
/// With `id_param` set the id travels as a query parameter, otherwise it is
/// appended to `path` as a trailing segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedEndpoint {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_param: Option<String>,
}

impl KeyedEndpoint {
    pub fn query(path: &str, id_param: &str) -> Self {
        Self {
            path: path.to_string(),
            id_param: Some(id_param.to_string()),
        }
    }

    pub fn path(path: &str) -> Self {
        Self {
            path: path.to_string(),
            id_param: None,
        }
    }
}

/// Upstream routes for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEndpoints {
    pub list: String,
    pub get: KeyedEndpoint,
    pub create: String,
    pub update: String,
    pub delete: KeyedEndpoint,
}

impl ResourceEndpoints {
    pub fn tasks() -> Self {
        Self {
            list: "/task-api/list-tasks".to_string(),
            get: KeyedEndpoint::query("/task-api/list-task", "taskId"),
            create: "/task-api/create-task".to_string(),
            update: "/task-api/update-task".to_string(),
            delete: KeyedEndpoint::query("/task-api/delete-task", "taskId"),
        }
    }

    pub fn users() -> Self {
        Self {
            list: "/user-api/list-users".to_string(),
            get: KeyedEndpoint::query("/user-api/list-user", "userId"),
            create: "/user-api/create-user".to_string(),
            update: "/user-api/update-user".to_string(),
            delete: KeyedEndpoint::path("/user-api/delete-user"),
        }
    }
}

/// Upstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub tasks: ResourceEndpoints,
    pub users: ResourceEndpoints,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            connect_timeout_ms: 2_000,
            request_timeout_ms: 5_000,
            tasks: ResourceEndpoints::tasks(),
            users: ResourceEndpoints::users(),
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout_ms: u64,
    pub half_open_max_calls: u32,
    /// Route user reads through the task circuit so both resources share fate
    pub shared_circuit: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_ms: 30_000,
            half_open_max_calls: 3,
            shared_circuit: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            enable_target: false,
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub allowed_origins: Vec<String>,
    pub max_request_size_mb: usize,
    pub enable_rate_limiting: bool,
    pub rate_limit_per_minute: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_cors: false,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            max_request_size_mb: 2,
            enable_rate_limiting: true,
            rate_limit_per_minute: 6_000,
        }
    }
}

/// Main settings structure with all configuration sections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Start with default settings
            .add_source(config::File::from_str(
                include_str!("../config.toml"),
                config::FileFormat::Toml,
            ))
            // Add local config file if it exists
            .add_source(config::File::with_name("config").required(false))
            // Add environment variables with GATEWAY_ prefix
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("security.allowed_origins")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;

        Self::apply_env_overrides(&mut settings)?;

        settings.validate()?;

        Ok(settings)
    }

    /// Apply shortcut environment variable overrides
    fn apply_env_overrides(settings: &mut Settings) -> Result<()> {
        if let Ok(url) = std::env::var("GATEWAY_UPSTREAM_URL") {
            settings.upstream.base_url = url;
        }
        if let Ok(host) = std::env::var("GATEWAY_SERVER_HOST") {
            settings.server.host = host;
        }
        if let Ok(port) = std::env::var("GATEWAY_SERVER_PORT") {
            settings.server.port = port
                .parse()
                .map_err(|e| anyhow!("Invalid GATEWAY_SERVER_PORT '{}': {}", port, e))?;
        }

        Ok(())
    }

    /// Validate settings for consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        let base_url = self.upstream.base_url.trim();
        if base_url.is_empty() {
            return Err(anyhow!("Upstream base URL must be provided"));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!("Upstream base URL must be http(s): {}", base_url));
        }
        if self.upstream.request_timeout_ms == 0 || self.upstream.connect_timeout_ms == 0 {
            return Err(anyhow!("Upstream timeouts must be greater than 0"));
        }

        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 {
            return Err(anyhow!("Circuit breaker failure threshold cannot be 0"));
        }
        if breaker.half_open_max_calls == 0 {
            return Err(anyhow!("Circuit breaker must permit at least one half-open call"));
        }
        if breaker.open_timeout_ms == 0 {
            return Err(anyhow!("Circuit breaker open timeout cannot be 0"));
        }

        if self.security.enable_rate_limiting && self.security.rate_limit_per_minute == 0 {
            return Err(anyhow!("Rate limiting enabled with a limit of 0 requests per minute"));
        }

        Ok(())
    }

    /// Socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
