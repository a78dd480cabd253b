use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

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
    pub kyc: KycConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            kyc: KycConfig::from_env()?,
        })
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

pub const DEFAULT_MAX_REJECTIONS: u32 = 3;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;
const DEFAULT_VERIFICATION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VERIFICATION_BACKOFF_SECS: [u64; 2] = [5, 20];
const DEFAULT_FACIAL_SESSION_TTL_SECS: u64 = 15 * 60;
const DEFAULT_INACTIVITY_EXPIRY_DAYS: u32 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Dials for the KYC onboarding workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycConfig {
    /// Rejections a driver may accumulate before `retry` is refused.
    pub max_rejections: u32,
    pub max_upload_bytes: usize,
    /// Upper bound on a single verification adapter call.
    pub verification_timeout: Duration,
    /// Delay before each additional verification attempt.
    pub verification_backoff: Vec<Duration>,
    pub facial_session_ttl: Duration,
    pub inactivity_expiry_days: u32,
    pub sweep_interval: Duration,
    pub reviewers: Vec<String>,
}

impl Default for KycConfig {
    fn default() -> Self {
        Self {
            max_rejections: DEFAULT_MAX_REJECTIONS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            verification_timeout: Duration::from_secs(DEFAULT_VERIFICATION_TIMEOUT_SECS),
            verification_backoff: DEFAULT_VERIFICATION_BACKOFF_SECS
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
            facial_session_ttl: Duration::from_secs(DEFAULT_FACIAL_SESSION_TTL_SECS),
            inactivity_expiry_days: DEFAULT_INACTIVITY_EXPIRY_DAYS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            reviewers: Vec::new(),
        }
    }
}

impl KycConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let verification_backoff = match env::var("KYC_VERIFICATION_BACKOFF_SECS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| {
                    value
                        .parse::<u64>()
                        .map(Duration::from_secs)
                        .map_err(|_| ConfigError::InvalidNumber {
                            key: "KYC_VERIFICATION_BACKOFF_SECS",
                            value: raw.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => defaults.verification_backoff,
        };

        let reviewers = env::var("KYC_REVIEWERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            max_rejections: parse_env("KYC_MAX_REJECTIONS", defaults.max_rejections)?,
            max_upload_bytes: parse_env("KYC_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            verification_timeout: Duration::from_secs(parse_env(
                "KYC_VERIFICATION_TIMEOUT_SECS",
                defaults.verification_timeout.as_secs(),
            )?),
            verification_backoff,
            facial_session_ttl: Duration::from_secs(parse_env(
                "KYC_FACIAL_SESSION_TTL_SECS",
                defaults.facial_session_ttl.as_secs(),
            )?),
            inactivity_expiry_days: parse_env(
                "KYC_INACTIVITY_EXPIRY_DAYS",
                defaults.inactivity_expiry_days,
            )?,
            sweep_interval: Duration::from_secs(parse_env(
                "KYC_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
            reviewers,
        })
    }
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
