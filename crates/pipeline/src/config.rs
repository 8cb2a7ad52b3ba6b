//! Pipeline configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Deployment environment. Decides how loudly cache inconsistencies fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Pipeline configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `APP_ENV`: `development` or `production` (default: `development`)
/// - `CACHE_DEFAULT_TTL_SECS`: sliding TTL for cacheable requests that
///   declare none (default: `3600`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub environment: Environment,
    pub cache_default_ttl: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl PipelineConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            environment: lookup("APP_ENV")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.environment),
            cache_default_ttl: lookup("CACHE_DEFAULT_TTL_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_default_ttl),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_format),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_cache_default_ttl(mut self, ttl: Duration) -> Self {
        self.cache_default_ttl = ttl;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            cache_default_ttl: DEFAULT_CACHE_TTL,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}
