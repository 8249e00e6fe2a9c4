use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the QR code service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Artifact storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Retention cleanup configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port, 0 disables the Prometheus exporter
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Artifact storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one sub-folder per generated QR code
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Days between `created` and `expires` in stored metadata
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Retention cleanup configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Cutoff used when a generate request asks for cleanup
    #[serde(default = "default_cutoff_days")]
    pub on_generate_cutoff_days: u32,
    /// Seconds between background sweeps, 0 disables the sweeper
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Cutoff used by the background sweeper
    #[serde(default = "default_cutoff_days")]
    pub sweep_cutoff_days: u32,
}

/// Upper bound on `storage.retention_days` (about 100 years)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

// Default value functions
fn default_service_name() -> String {
    "qrcode-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("QR code")
}

fn default_retention_days() -> u32 {
    1
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_cutoff_days() -> u32 {
    1
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/qrcode").required(false))
            .add_source(config::File::with_name("/etc/qrcode/service").required(false))
            // Override with environment variables
            // QRCODE__STORAGE__ROOT -> storage.root
            .add_source(
                config::Environment::with_prefix("QRCODE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot work at runtime
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField("storage.root".to_string()));
        }

        if self.storage.retention_days == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "storage.retention_days".to_string(),
                message: "must be at least 1 so that expires > created".to_string(),
            });
        }

        if self.storage.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigValidationError::InvalidValue {
                field: "storage.retention_days".to_string(),
                message: format!("must not exceed {MAX_RETENTION_DAYS}"),
            });
        }

        if self.api.host.trim().is_empty() {
            return Err(ConfigValidationError::MissingField("api.host".to_string()));
        }

        Ok(())
    }

    /// Get the retention window as a chrono Duration
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.storage.retention_days))
    }

    /// Get the background sweep interval, `None` when disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.cleanup.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            on_generate_cutoff_days: default_cutoff_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_cutoff_days: default_cutoff_days(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
