use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{Datelike, Utc};

const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 3;

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
    pub review: ReviewConfig,
    pub budget: BudgetSeedConfig,
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

        let max_commit_attempts = match env::var("REVIEW_MAX_COMMIT_ATTEMPTS") {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(value) if value >= 1 => value,
                _ => return Err(ConfigError::InvalidCommitAttempts { value: raw }),
            },
            Err(_) => DEFAULT_MAX_COMMIT_ATTEMPTS,
        };

        let fiscal_year = match env::var("BUDGET_FISCAL_YEAR") {
            Ok(raw) => raw
                .trim()
                .parse::<i32>()
                .map_err(|_| ConfigError::InvalidFiscalYear { value: raw })?,
            Err(_) => Utc::now().year(),
        };

        let allocated = match env::var("BUDGET_ALLOCATED") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidAllocation { value: raw })?,
            Err(_) => 0,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            review: ReviewConfig {
                max_commit_attempts,
            },
            budget: BudgetSeedConfig {
                fiscal_year,
                allocated,
            },
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for decision intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewConfig {
    /// Number of times a submission re-reads the case after losing a revision race.
    pub max_commit_attempts: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

/// Budget period provisioned when the server boots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetSeedConfig {
    pub fiscal_year: i32,
    pub allocated: u64,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCommitAttempts { value: String },
    InvalidFiscalYear { value: String },
    InvalidAllocation { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCommitAttempts { value } => write!(
                f,
                "REVIEW_MAX_COMMIT_ATTEMPTS must be a positive integer (found '{value}')"
            ),
            ConfigError::InvalidFiscalYear { value } => {
                write!(f, "BUDGET_FISCAL_YEAR must be a year (found '{value}')")
            }
            ConfigError::InvalidAllocation { value } => write!(
                f,
                "BUDGET_ALLOCATED must be a non-negative amount (found '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidCommitAttempts { .. }
            | ConfigError::InvalidFiscalYear { .. }
            | ConfigError::InvalidAllocation { .. } => None,
        }
    }
}
