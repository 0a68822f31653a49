//! Configuration Management
//!
//! Named connection strings, so callers refer to "reporting" instead of
//! pasting credentials on every call.
//!
//! # Configuration Locations
//! - Local: `.sprocket/config.json` (team-shareable, per-project)
//! - Global: `<config dir>/sprocket/connections.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Environment variable `SPROCKET_CONNECTION_<NAME>` (highest priority)
//! 2. Local config file
//! 3. Global config file
//!
//! A stored connection holds either the connection string itself or the name
//! of an environment variable that holds it (`connection_string_env`), and may
//! override the executor timeouts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SprocketError};
use crate::executor::ExecutorSettings;

/// Prefix of the environment variables that override stored connections
pub const ENV_PREFIX: &str = "SPROCKET_CONNECTION_";

/// Connections stored in one config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRegistry {
    #[serde(default)]
    pub connections: BTreeMap<String, StoredConnection>,

    /// Connection used when no name is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// One named connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConnection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Environment variable holding the connection string (keeps secrets out of the file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reader_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_timeout_secs: Option<u64>,
}

impl StoredConnection {
    #[must_use]
    pub fn from_connection_string(connection_string: impl Into<String>) -> Self {
        Self { connection_string: Some(connection_string.into()), ..Self::default() }
    }

    /// The connection string, read from the environment when configured so
    ///
    /// # Errors
    /// Returns `ConfigError` if the referenced variable is unset or neither
    /// field is present.
    pub fn resolve(&self, name: &str) -> Result<String> {
        if let Some(env_var) = &self.connection_string_env {
            return std::env::var(env_var).map_err(|_| {
                SprocketError::config_error(format!(
                    "Environment variable {env_var} not found for connection '{name}'"
                ))
            });
        }

        self.connection_string
            .clone()
            .ok_or_else(|| SprocketError::config_error(format!("Connection '{name}' has no connection string")))
    }

    /// Apply this connection's timeout overrides to a settings value
    fn apply_timeouts(&self, settings: &mut ExecutorSettings) {
        if let Some(secs) = self.command_timeout_secs {
            settings.command_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.reader_timeout_secs {
            settings.reader_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.fill_timeout_secs {
            settings.fill_timeout = Duration::from_secs(secs);
        }
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.sprocket/config.json` (team-shareable)
    Local,
    /// Global config: `<config dir>/sprocket/connections.json` (per-user)
    Global,
}

impl ConfigLocation {
    pub fn path(self) -> Result<PathBuf> {
        match self {
            Self::Local => local_config_path(),
            Self::Global => global_config_path(),
        }
    }
}

/// Get path to local config file (`.sprocket/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()
        .map_err(|e| SprocketError::config_error(format!("Could not determine current directory: {e}")))?;

    Ok(current_dir.join(".sprocket").join("config.json"))
}

/// Get path to global config file (`<config dir>/sprocket/connections.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| SprocketError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("sprocket").join("connections.json"))
}

/// Load a registry; a missing file is an empty registry
pub fn load_registry(path: &Path) -> Result<ConnectionRegistry> {
    if !path.exists() {
        return Ok(ConnectionRegistry::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| SprocketError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents)
        .map_err(|e| SprocketError::config_error(format!("Invalid config file format: {e}")))
}

/// Save a registry, creating the parent directory if needed
pub fn save_registry(path: &Path, registry: &ConnectionRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SprocketError::config_error(format!("Could not create config directory: {e}")))?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|e| SprocketError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents).map_err(|e| SprocketError::config_error(format!("Could not write config file: {e}")))
}

/// Merge two registries; `local` wins for connections with the same name
#[must_use]
pub fn merge_registries(global: ConnectionRegistry, local: ConnectionRegistry) -> ConnectionRegistry {
    let mut merged = global;
    merged.connections.extend(local.connections);
    if local.default.is_some() {
        merged.default = local.default;
    }
    merged
}

/// Load local and global registries merged with local precedence
pub fn load_with_precedence() -> Result<ConnectionRegistry> {
    let global = load_registry(&global_config_path()?)?;
    let local = load_registry(&local_config_path()?)?;
    Ok(merge_registries(global, local))
}

/// Environment variable that overrides the named connection
///
/// `reporting-db` becomes `SPROCKET_CONNECTION_REPORTING_DB`.
#[must_use]
pub fn env_var_name(name: &str) -> String {
    let suffix: String =
        name.chars().map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' }).collect();
    format!("{ENV_PREFIX}{suffix}")
}

/// Pick the connection name, falling back to the registry default
fn connection_name<'a>(registry: &'a ConnectionRegistry, name: Option<&'a str>) -> Result<&'a str> {
    name.or(registry.default.as_deref()).ok_or_else(|| {
        let available: Vec<_> = registry.connections.keys().collect();
        SprocketError::config_error(format!(
            "No connection name given and no default connection set. Available connections: {available:?}"
        ))
    })
}

/// Look up a connection string in an already loaded registry
///
/// The environment override is checked first.
pub fn connection_string_from(registry: &ConnectionRegistry, name: Option<&str>) -> Result<String> {
    let name = connection_name(registry, name)?;

    if let Ok(value) = std::env::var(env_var_name(name)) {
        return Ok(value);
    }

    registry
        .connections
        .get(name)
        .ok_or_else(|| {
            let available: Vec<_> = registry.connections.keys().collect();
            SprocketError::config_error(format!(
                "Connection '{name}' not found. Available connections: {available:?}"
            ))
        })?
        .resolve(name)
}

/// Connection string for a named connection
///
/// # Errors
/// Returns `ConfigError` if the connection is not configured anywhere.
pub fn get_connection_string(name: &str) -> Result<String> {
    connection_string_from(&load_with_precedence()?, Some(name))
}

/// Executor settings for a named connection (or the default one)
pub fn settings_from(registry: &ConnectionRegistry, name: Option<&str>) -> Result<ExecutorSettings> {
    let mut settings = ExecutorSettings::new(connection_string_from(registry, name)?);

    let name = connection_name(registry, name)?;
    if let Some(stored) = registry.connections.get(name) {
        stored.apply_timeouts(&mut settings);
    }

    Ok(settings)
}

/// Executor settings for a named connection, loaded from the config files
pub fn resolve_settings(name: Option<&str>) -> Result<ExecutorSettings> {
    settings_from(&load_with_precedence()?, name)
}

/// Add or replace a connection; the first connection becomes the default
///
/// Returns the path of the file written.
pub fn save_connection(name: &str, connection: StoredConnection, location: ConfigLocation) -> Result<PathBuf> {
    let path = location.path()?;
    save_connection_to(&path, name, connection)?;
    Ok(path)
}

/// [`save_connection`] against an explicit file
pub fn save_connection_to(path: &Path, name: &str, connection: StoredConnection) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SprocketError::invalid_input("Connection name cannot be empty"));
    }

    let mut registry = load_registry(path)?;
    if registry.connections.is_empty() {
        registry.default = Some(name.to_string());
    }
    registry.connections.insert(name.to_string(), connection);

    save_registry(path, &registry)?;
    tracing::debug!(connection = name, path = %path.display(), "connection saved");
    Ok(())
}

/// Names of all configured connections (never the strings themselves)
pub fn list_connections() -> Result<Vec<String>> {
    Ok(load_with_precedence()?.connections.into_keys().collect())
}
