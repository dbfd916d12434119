/// Configuration management for Roomwatch
use crate::{
    attribution::AttributionConfig,
    error::{ConsoleError, ConsoleResult},
    moderation::ModerationOptions,
    traffic::TrafficOptions,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main console configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub moderation: ModerationConfig,
    pub traffic: TrafficConfig,
    pub attribution: AttributionSettings,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Document store backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite { path: PathBuf },
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    /// Operation limit per batched write
    pub max_batch_ops: usize,
    /// Seconds between store health probes
    pub health_check_interval_secs: u64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret of the identity provider
    pub jwt_secret: String,
}

/// Moderation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    pub temp_ban_secs: i64,
    pub cascade_batch_size: usize,
}

/// Traffic estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    pub interval_secs: u64,
    pub bytes_per_user: u64,
    pub history_days: i64,
}

/// Caller attribution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionSettings {
    /// Query the lookup service; otherwise every entry records "unknown"
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_ms: u64,
}

/// Dashboard feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Audit entries kept in the live log view
    pub log_limit: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ConsoleConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ConsoleResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> ConsoleResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let hostname = var("CONSOLE_HOSTNAME", "127.0.0.1");
        let port = var("CONSOLE_PORT", "8080")
            .parse()
            .map_err(|_| ConsoleError::Validation("Invalid port number".to_string()))?;
        let version = var("CONSOLE_VERSION", env!("CARGO_PKG_VERSION"));

        let backend = match var("CONSOLE_STORE", "memory").to_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "sqlite" => StoreBackend::Sqlite {
                path: var("CONSOLE_DB_PATH", "./data/roomwatch.sqlite").into(),
            },
            other => {
                return Err(ConsoleError::Validation(format!(
                    "Unknown store backend: {}",
                    other
                )))
            }
        };
        let max_batch_ops = parse_or(&var("CONSOLE_MAX_BATCH_OPS", "500"), 500);
        let health_check_interval_secs = parse_or(&var("CONSOLE_HEALTH_CHECK_INTERVAL_SECS", "30"), 30);

        let jwt_secret = lookup("CONSOLE_JWT_SECRET")
            .ok_or_else(|| ConsoleError::Validation("JWT secret required".to_string()))?;

        let temp_ban_secs = parse_or(&var("CONSOLE_TEMP_BAN_SECS", "3600"), 3600);
        let cascade_batch_size = parse_or(&var("CONSOLE_CASCADE_BATCH_SIZE", "50"), 50);

        let interval_secs = parse_or(&var("CONSOLE_TRAFFIC_INTERVAL_SECS", "60"), 60);
        let bytes_per_user = parse_or(&var("CONSOLE_TRAFFIC_BYTES_PER_USER", "102400"), 102_400);
        let history_days = parse_or(&var("CONSOLE_TRAFFIC_HISTORY_DAYS", "7"), 7);

        let attribution_defaults = AttributionConfig::default();
        let attribution_enabled = var("CONSOLE_ATTRIBUTION_ENABLED", "false")
            .parse()
            .unwrap_or(false);
        let attribution_endpoint = var("CONSOLE_ATTRIBUTION_URL", &attribution_defaults.endpoint);
        let attribution_timeout_ms = parse_or(&var("CONSOLE_ATTRIBUTION_TIMEOUT_MS", "3000"), 3000);

        let log_limit = parse_or(&var("CONSOLE_LOG_LIMIT", "50"), 50);
        let log_level = var("RUST_LOG", "info");

        Ok(Self {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                backend,
                max_batch_ops,
                health_check_interval_secs,
            },
            authentication: AuthConfig { jwt_secret },
            moderation: ModerationConfig {
                temp_ban_secs,
                cascade_batch_size,
            },
            traffic: TrafficConfig {
                interval_secs,
                bytes_per_user,
                history_days,
            },
            attribution: AttributionSettings {
                enabled: attribution_enabled,
                endpoint: attribution_endpoint,
                timeout_ms: attribution_timeout_ms,
            },
            dashboard: DashboardConfig { log_limit },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ConsoleResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ConsoleError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ConsoleError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.storage.max_batch_ops == 0 {
            return Err(ConsoleError::Validation(
                "Batch operation limit must be positive".to_string(),
            ));
        }

        if self.moderation.temp_ban_secs <= 0
            || chrono::Duration::try_seconds(self.moderation.temp_ban_secs).is_none()
        {
            return Err(ConsoleError::Validation(
                "Temporary ban duration must be positive".to_string(),
            ));
        }

        if self.moderation.cascade_batch_size == 0
            || self.moderation.cascade_batch_size > self.storage.max_batch_ops
        {
            return Err(ConsoleError::Validation(format!(
                "Cascade batch size must be between 1 and {}",
                self.storage.max_batch_ops
            )));
        }

        if self.traffic.history_days <= 0
            || chrono::Duration::try_days(self.traffic.history_days).is_none()
        {
            return Err(ConsoleError::Validation(
                "Traffic history window must be a positive number of days".to_string(),
            ));
        }

        if self.storage.health_check_interval_secs == 0 {
            return Err(ConsoleError::Validation(
                "Health check interval must be positive".to_string(),
            ));
        }

        if self.traffic.interval_secs == 0 {
            return Err(ConsoleError::Validation(
                "Traffic interval must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn moderation_options(&self) -> ModerationOptions {
        ModerationOptions {
            temp_ban_duration: chrono::Duration::try_seconds(self.moderation.temp_ban_secs)
                .unwrap_or_else(|| chrono::Duration::hours(1)),
            cascade_batch_size: self.moderation.cascade_batch_size,
        }
    }

    pub fn traffic_options(&self) -> TrafficOptions {
        TrafficOptions {
            bytes_per_user: self.traffic.bytes_per_user,
            history_window: chrono::Duration::try_days(self.traffic.history_days)
                .unwrap_or_else(|| chrono::Duration::days(7)),
        }
    }

    pub fn attribution_config(&self) -> AttributionConfig {
        AttributionConfig {
            endpoint: self.attribution.endpoint.clone(),
            timeout: Duration::from_millis(self.attribution.timeout_ms),
            ..AttributionConfig::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: &str, default: T) -> T {
    value.parse().unwrap_or(default)
}
