//! Server Configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `LEAFSCAN__SECTION__KEY` environment variables.

use crate::rate_limit::RateLimitConfig;
use config::{Config, ConfigError, Environment, File, FileFormat, FileSourceFile};
use inference_service::ServiceOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File read when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "leafscan.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LEAFSCAN";

/// Complete server configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub inference: ServiceOptions,
    pub logging: LoggingConfig,
}

/// Listener and middleware settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,
    pub rate_limit: RateLimitConfig,
    /// Install the Prometheus recorder and serve `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            rate_limit: RateLimitConfig::default(),
            metrics_enabled: true,
        }
    }
}

/// Where the artifact bundle lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        Self::build(file, Environment::with_prefix(ENV_PREFIX))
    }

    fn build(
        file: File<FileSourceFile, FileFormat>,
        env: Environment,
    ) -> Result<Self, ConfigError> {
        let env = env
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("inference.accepted_media_types")
            .try_parsing(true);

        let config: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.inference
            .validate()
            .map_err(|e| ConfigError::Message(format!("inference: {}", e)))?;

        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Message("server.bind must not be empty".into()));
        }
        if self.server.rate_limit.enabled
            && (self.server.rate_limit.per_second == 0 || self.server.rate_limit.burst_size == 0)
        {
            return Err(ConfigError::Message(
                "server.rate_limit needs positive per_second and burst_size".into(),
            ));
        }
        Ok(())
    }
}
