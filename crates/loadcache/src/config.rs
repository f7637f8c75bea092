//! Configuration loading
//!
//! Settings come from an optional TOML file, overridden by `LOADCACHE__*`
//! environment variables (`LOADCACHE__CACHE__MAX_SIZE=4194304`).

use anyhow::{Context, Result};
use loadcache_core::{CacheConfig, DocumentSettings};
use loadcache_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::info;

const ENV_PREFIX: &str = "LOADCACHE";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub document: DocumentSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a file and the process environment
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with(path, ::config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with(path: &str, env: ::config::Environment) -> Result<Self> {
        let config_path = Path::new(path);
        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
        }

        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(config_path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                env.prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        if config_path.exists() {
            info!("Loaded configuration from {}", path);
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "Failed to serialize configuration")
    }

    /// Save configuration to a file atomically
    ///
    /// Writes to a temporary file in the target directory, then renames it.
    pub fn save(&self, path: &str) -> Result<()> {
        let content = self.to_toml()?;

        let path_obj = Path::new(path);
        let parent = match path_obj.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let temp_file = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
        {
            let mut file = temp_file.as_file();
            file.write_all(content.as_bytes())
                .with_context(|| "Failed to write to temp file")?;
            file.sync_all()
                .with_context(|| "Failed to sync temp file")?;
        }

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {}", path))?;

        info!("Saved configuration to {}", path);
        Ok(())
    }
}
