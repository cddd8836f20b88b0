mod loader;
pub mod value;

use std::collections::HashMap;
use std::path::Path;

pub use value::{ConfigValue, FromConfigValue};

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
    /// A section was loaded but one of its values is unusable.
    Invalid { key: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Invalid { key, message } => {
                write!(f, "Invalid config value for '{key}': {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A strongly-typed configuration section read from a [`StowageConfig`].
///
/// ```ignore
/// impl FromConfig for DatabaseConfig {
///     fn prefix() -> &'static str { "stowage.database" }
///     fn from_config(config: &StowageConfig) -> Result<Self, ConfigError> {
///         Ok(Self { url: config.get("stowage.database.url")?, .. })
///     }
/// }
///
/// let db: DatabaseConfig = StowageConfig::load("dev")?.section()?;
/// ```
pub trait FromConfig: Sized {
    /// The key prefix of this section (e.g., `"stowage.database"`).
    fn prefix() -> &'static str;

    fn from_config(config: &StowageConfig) -> Result<Self, ConfigError>;
}

/// Configuration loaded from YAML files, `.env` files, and environment variables.
///
/// Resolution order (lowest to highest priority):
/// 1. `stowage.yaml` (base)
/// 2. `stowage-{profile}.yaml` (profile override)
/// 3. `.env` file (loaded into process environment)
/// 4. `.env.{profile}` file (loaded into process environment)
/// 5. `STOWAGE_*` environment variables
///
/// Keys are matched with `.` and `_` treated alike and case-insensitively, so
/// `STOWAGE_DATABASE_POOL_MAX` overrides `stowage.database.pool_max`.
/// `.env` files never overwrite already-set environment variables.
///
/// Profile is determined by: `STOWAGE_PROFILE` env var > argument.
#[derive(Debug, Clone)]
pub struct StowageConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

const ENV_PREFIX: &str = "STOWAGE_";

impl StowageConfig {
    /// Load configuration for `profile` from the current working directory.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."), profile)
    }

    /// Load configuration for `profile`, looking for YAML and `.env` files in `dir`.
    pub fn load_from(dir: &Path, profile: &str) -> Result<Self, ConfigError> {
        let active_profile =
            std::env::var("STOWAGE_PROFILE").unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();

        loader::load_yaml_file(&dir.join("stowage.yaml"), &mut values)?;
        loader::load_yaml_file(&dir.join(format!("stowage-{active_profile}.yaml")), &mut values)?;

        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(format!(".env.{active_profile}")));

        for (env_key, env_val) in std::env::vars() {
            if env_key.starts_with(ENV_PREFIX) && env_key != "STOWAGE_PROFILE" {
                values.insert(normalize_key(&env_key), ConfigValue::String(env_val));
            }
        }

        tracing::debug!(profile = %active_profile, keys = values.len(), "configuration loaded");

        Ok(StowageConfig {
            values,
            profile: active_profile,
        })
    }

    /// Create a config from a YAML string (useful for testing).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(StowageConfig {
            values,
            profile: profile.to_string(),
        })
    }

    /// Create an empty config (useful for testing).
    pub fn empty() -> Self {
        StowageConfig {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    /// Set a value programmatically.
    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(normalize_key(key), value);
    }

    /// Get a typed value for the given dot-separated key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the key does not exist, or
    /// `ConfigError::TypeMismatch` if the value cannot be converted.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(&normalize_key(key))
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Get a typed value, returning `default` if the key is missing.
    ///
    /// A present but malformed value is still an error.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> Result<V, ConfigError> {
        match self.get(key) {
            Err(ConfigError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(&normalize_key(key))
    }

    /// The active profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Build a typed section.
    pub fn section<S: FromConfig>(&self) -> Result<S, ConfigError> {
        S::from_config(self)
    }
}

fn normalize_key(key: &str) -> String {
    key.to_lowercase().replace('.', "_")
}
