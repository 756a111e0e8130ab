use std::env;
use std::fmt;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::workflows::ingest::IngestOptions;
use crate::workflows::ratings::OrgHierarchy;
use crate::workflows::scoring::{ScoringConfig, ScoringConfigError};

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
    pub scoreboard: ScoreboardConfig,
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

        let activity_skip_rows = match env::var("SCOREBOARD_ACTIVITY_SKIP_ROWS") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidNumber {
                    variable: "SCOREBOARD_ACTIVITY_SKIP_ROWS",
                })?,
            Err(_) => 0,
        };

        let path_var = |name: &str| {
            env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scoreboard: ScoreboardConfig {
                rules_path: path_var("SCOREBOARD_RULES_PATH"),
                hierarchy_path: path_var("SCOREBOARD_HIERARCHY_PATH"),
                store_path: path_var("SCOREBOARD_STORE_PATH"),
                activity_skip_rows,
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where the scoring rules, org hierarchy and published period live.
#[derive(Debug, Clone, Default)]
pub struct ScoreboardConfig {
    /// JSON [`ScoringConfig`]; the standard rules apply when unset.
    pub rules_path: Option<PathBuf>,
    /// JSON supervisor to subordinates map.
    pub hierarchy_path: Option<PathBuf>,
    /// JSON snapshot file; the period is kept in memory only when unset.
    pub store_path: Option<PathBuf>,
    pub activity_skip_rows: usize,
}

impl ScoreboardConfig {
    pub fn scoring_rules(&self) -> Result<ScoringConfig, ConfigError> {
        let rules = match &self.rules_path {
            Some(path) => read_json::<ScoringConfig>(path)?,
            None => ScoringConfig::standard(),
        };
        rules.validate().map_err(ConfigError::InvalidRules)?;
        Ok(rules)
    }

    /// The configured hierarchy, or `None` when no file is set.
    pub fn hierarchy(&self) -> Result<Option<OrgHierarchy>, ConfigError> {
        self.hierarchy_path
            .as_deref()
            .map(read_json::<OrgHierarchy>)
            .transpose()
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions::default().with_activity_skip_rows(self.activity_skip_rows)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    ReadFile { path: PathBuf, source: std::io::Error },
    ParseFile { path: PathBuf, source: serde_json::Error },
    InvalidRules(ScoringConfigError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a non-negative integer")
            }
            ConfigError::ReadFile { path, .. } => {
                write!(f, "unable to read {}", path.display())
            }
            ConfigError::ParseFile { path, source } => {
                write!(f, "invalid JSON in {}: {source}", path.display())
            }
            ConfigError::InvalidRules(err) => write!(f, "invalid scoring rules: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::ReadFile { source, .. } => Some(source),
            ConfigError::ParseFile { source, .. } => Some(source),
            ConfigError::InvalidRules(err) => Some(err),
        }
    }
}
