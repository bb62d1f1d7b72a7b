//! Configuration system for the Insights server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, engine, limits, logging)
//! 2. .env file - loaded into the environment by `main`
//!
//! Environment variables always override config.yaml values. A missing
//! config file means defaults.

use std::path::{Path, PathBuf};

use insights_query::{FacadeConfig, Query};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// DuckDB database file; in-memory when unset
    pub database: Option<PathBuf>,

    /// SQL script run once at start-up, e.g. to create demo tables
    pub init_script: Option<PathBuf>,

    pub cache_max_entries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: None,
            init_script: None,
            cache_max_entries: insights_duck::ResultCache::DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// YAML list of query records saved into the store at start-up
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: PathBuf::from("./logs"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub store: StoreConfig,
    pub execution: FacadeConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = read(path)?;
            Self::from_yaml(path, &contents)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_yaml(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        // an empty file parses as null
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("INSIGHTS_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("INSIGHTS_SERVER_PORT") {
            if let Ok(port_num) = port.parse() {
                self.server.port = port_num;
            }
        }

        if let Ok(database) = std::env::var("INSIGHTS_DATABASE") {
            self.engine.database = Some(PathBuf::from(database));
        }
        if let Ok(seed) = std::env::var("INSIGHTS_SEED_FILE") {
            self.store.seed_file = Some(PathBuf::from(seed));
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = PathBuf::from(dir);
        }
    }
}

/// Read the seed file: a YAML list of query records
pub fn read_seed_queries(path: &Path) -> Result<Vec<Query>, ConfigError> {
    let contents = read(path)?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_script(path: &Path) -> Result<String, ConfigError> {
    read(path)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
