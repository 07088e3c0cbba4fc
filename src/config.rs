// Application configuration
// YAML-backed settings for the key-value backend, session lifetimes, and the
// relational database, with a factory for the configured store

use crate::kv::{
    DragonflyKeyValueStore, DragonflyOptions, InMemoryKeyValueStore, KeyValueStore, KvError,
};
use crate::session::{SessionSettings, SESSION_ID_LENGTH, SESSION_TTL};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub kv: KvBackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Which key-value backend to run against
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KvBackendConfig {
    /// Process-local store; development and tests only
    #[default]
    Memory,
    /// Networked Dragonfly (or Redis) instance
    Dragonfly {
        host: String,
        port: u16,
        #[serde(default)]
        database_id: i64,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
}

/// Session lifetime settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session TTL in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    /// Random bytes per session id; hex encoding doubles the character count
    #[serde(default = "default_session_id_byte_length")]
    pub id_byte_length: usize,
}

fn default_session_ttl_secs() -> u64 {
    SESSION_TTL.as_secs()
}

fn default_session_id_byte_length() -> usize {
    SESSION_ID_LENGTH
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            id_byte_length: default_session_id_byte_length(),
        }
    }
}

impl SessionConfig {
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            ttl: Duration::from_secs(self.ttl_secs),
            id_byte_length: self.id_byte_length,
        }
    }
}

/// Relational database settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.session.ttl_secs == 0 {
            return Err("Session TTL must be greater than zero".to_string());
        }

        if self.session.id_byte_length == 0 {
            return Err("Session id byte length must be greater than zero".to_string());
        }

        if let KvBackendConfig::Dragonfly { host, .. } = &self.kv {
            if host.is_empty() {
                return Err("Dragonfly host must not be empty".to_string());
            }
        }

        if let Some(database) = &self.database {
            if database.url.is_empty() {
                return Err("Database URL must not be empty".to_string());
            }
        }

        Ok(())
    }
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Arc<AppConfig>, String> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

    let config: AppConfig = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Failed to parse YAML config: {}", e))?;

    config.validate()?;

    info!("Configuration loaded successfully");

    Ok(Arc::new(config))
}

/// Load configuration with fallback options
pub fn load_config_with_fallback() -> Result<Arc<AppConfig>, String> {
    // Try loading from environment variable first
    if let Ok(config_path) = std::env::var("CONFIG_PATH") {
        match load_config(&config_path) {
            Ok(config) => return Ok(config),
            Err(e) => warn!(
                "Failed to load config from CONFIG_PATH ({}): {}",
                config_path, e
            ),
        }
    }

    // Try common config file locations
    let paths = vec!["config.yaml", "config.yml"];

    for path in paths {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    Err(
        "No configuration file found. Please create a config.yaml file or set the CONFIG_PATH \
        environment variable."
            .to_string(),
    )
}

/// Build the configured key-value store
pub async fn create_key_value_store(config: &AppConfig) -> Result<Arc<dyn KeyValueStore>, KvError> {
    match &config.kv {
        KvBackendConfig::Memory => Ok(Arc::new(InMemoryKeyValueStore::new())),
        KvBackendConfig::Dragonfly {
            host,
            port,
            database_id,
            username,
            password,
        } => {
            let store = DragonflyKeyValueStore::connect(&DragonflyOptions {
                host: host.clone(),
                port: *port,
                database_id: *database_id,
                username: username.clone(),
                password: password.clone(),
            })
            .await?;

            Ok(Arc::new(store))
        }
    }
}
