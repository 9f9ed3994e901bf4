//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
#[allow(dead_code)]
pub enum ConfigError {
    #[error("Failed to load environment variables: {0}")]
    EnvLoad(#[from] dotenvy::Error),

    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for container deployments
            port: 3000,
        }
    }
}

/// Governance engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of connections evaluated concurrently
    pub worker_limit: usize,
    /// Per-connection inspection timeout in seconds
    pub evaluator_timeout_secs: u64,
    /// Interval between health-check sweeps in seconds
    pub health_check_interval_secs: u64,
    /// Per-connector health-check timeout in seconds
    pub health_check_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_limit: 4,
            evaluator_timeout_secs: 30,
            health_check_interval_secs: 60,
            health_check_timeout_secs: 5,
        }
    }
}

impl EngineConfig {
    pub fn evaluator_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluator_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }
}

/// Audit emitter retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Maximum append attempts before surfacing a persistence error
    pub retry_attempts: u32,
    /// Base delay for exponential backoff in milliseconds
    pub retry_base_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub retry_max_delay_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2_000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub audit: AuditConfig,
    pub cors: CorsConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: env_parsed("HOST").unwrap_or_else(|| ServerConfig::default().host),
            port: env_parsed("PORT").unwrap_or_else(|| ServerConfig::default().port),
        };

        let engine_defaults = EngineConfig::default();
        let engine = EngineConfig {
            worker_limit: env_parsed("GOVERNANCE_WORKER_LIMIT")
                .filter(|n| *n > 0)
                .unwrap_or(engine_defaults.worker_limit),
            evaluator_timeout_secs: env_parsed("GOVERNANCE_EVALUATOR_TIMEOUT_SECS")
                .unwrap_or(engine_defaults.evaluator_timeout_secs),
            health_check_interval_secs: env_parsed("GOVERNANCE_HEALTH_INTERVAL_SECS")
                .unwrap_or(engine_defaults.health_check_interval_secs),
            health_check_timeout_secs: env_parsed("GOVERNANCE_HEALTH_TIMEOUT_SECS")
                .unwrap_or(engine_defaults.health_check_timeout_secs),
        };

        let audit_defaults = AuditConfig::default();
        let audit = AuditConfig {
            retry_attempts: env_parsed("AUDIT_RETRY_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(audit_defaults.retry_attempts),
            retry_base_delay_ms: env_parsed("AUDIT_RETRY_BASE_DELAY_MS")
                .unwrap_or(audit_defaults.retry_base_delay_ms),
            retry_max_delay_ms: env_parsed("AUDIT_RETRY_MAX_DELAY_MS")
                .unwrap_or(audit_defaults.retry_max_delay_ms),
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        Ok(Self {
            server,
            engine,
            audit,
            cors,
        })
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
