use std::env;
use std::fmt;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::queue::{QueueConfig, TenantId};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub queue: QueueRuntimeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat)?,
            Err(_) if environment == AppEnvironment::Production => LogFormat::Json,
            Err(_) => LogFormat::Compact,
        };

        let sweep_interval_secs = positive_var("QUEUE_SWEEP_INTERVAL_SECS", 30)?;
        let store_timeout_ms = positive_var("QUEUE_STORE_TIMEOUT_MS", 2000)?;
        let tenants_file = env::var("QUEUE_TENANTS_FILE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            queue: QueueRuntimeConfig {
                sweep_interval: Duration::from_secs(sweep_interval_secs),
                store_timeout: Duration::from_millis(store_timeout_ms),
                tenants_file,
            },
        })
    }
}

fn positive_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidDuration { variable: name }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Line format of the tracing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Process-wide queue settings; per-notaría parameters live in [`QueueConfig`].
#[derive(Debug, Clone)]
pub struct QueueRuntimeConfig {
    pub sweep_interval: Duration,
    pub store_timeout: Duration,
    pub tenants_file: Option<PathBuf>,
}

impl QueueRuntimeConfig {
    /// Reads the tenant file when configured, otherwise registers the demo notaría.
    pub fn tenants(&self) -> Result<Vec<(TenantId, QueueConfig)>, ConfigError> {
        match &self.tenants_file {
            Some(path) => load_tenants(path),
            None => Ok(vec![(TenantId::from("notaria-001"), QueueConfig::default())]),
        }
    }
}

/// Entry of the tenants file: a notaría id plus its queue parameters.
#[derive(Debug, Deserialize)]
struct TenantEntry {
    notaria_id: String,
    #[serde(flatten)]
    config: QueueConfig,
}

pub fn load_tenants(path: &Path) -> Result<Vec<(TenantId, QueueConfig)>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::TenantsFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_tenants(&raw)
}

fn parse_tenants(raw: &str) -> Result<Vec<(TenantId, QueueConfig)>, ConfigError> {
    let entries: Vec<TenantEntry> =
        serde_json::from_str(raw).map_err(|source| ConfigError::TenantsFormat { source })?;

    entries
        .into_iter()
        .map(|entry| {
            let tenant = TenantId(entry.notaria_id);
            entry
                .config
                .validate()
                .map_err(|reason| ConfigError::InvalidTenant {
                    notaria_id: tenant.0.clone(),
                    reason,
                })?;
            Ok((tenant, entry.config))
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidLogFormat,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDuration { variable: &'static str },
    TenantsFile { path: PathBuf, source: std::io::Error },
    TenantsFormat { source: serde_json::Error },
    InvalidTenant { notaria_id: String, reason: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidLogFormat => {
                write!(f, "APP_LOG_FORMAT must be either 'compact' or 'json'")
            }
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDuration { variable } => {
                write!(f, "{variable} must be a positive integer")
            }
            ConfigError::TenantsFile { path, .. } => {
                write!(f, "unable to read tenants file {}", path.display())
            }
            ConfigError::TenantsFormat { .. } => {
                write!(f, "tenants file must be a JSON array of queue configurations")
            }
            ConfigError::InvalidTenant { notaria_id, reason } => {
                write!(f, "tenant '{notaria_id}' has an invalid queue config: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidLogFormat
            | ConfigError::InvalidDuration { .. }
            | ConfigError::InvalidTenant { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::TenantsFile { source, .. } => Some(source),
            ConfigError::TenantsFormat { source } => Some(source),
        }
    }
}
