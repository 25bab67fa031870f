use crate::models::AppConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the application configuration inside the data directory
pub const CONFIG_FILE_NAME: &str = "modwatch.yaml";

/// Prefix of environment variables that override file values
pub const ENV_PREFIX: &str = "MODWATCH";

/// Configuration manager for the modwatch data directory.
///
/// Layout:
/// - `modwatch.yaml`: Catalog connection settings ([`AppConfig`])
/// - `state/`: Persisted tracked mods, history and tracking settings
/// - `logs/`: Rotating log files
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified data directory.
    ///
    /// # Arguments
    /// * `config_dir` - Data directory (created if missing)
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the application configuration.
    ///
    /// Values come from `modwatch.yaml` (optional) and are overridden by
    /// `MODWATCH_*` environment variables, e.g. `MODWATCH_API_TOKEN`.
    /// Anything not set falls back to the [`AppConfig`] defaults. A file that
    /// exists but does not parse is an error.
    pub fn load_app_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            tracing::info!(
                "Config file not found at {}, using defaults and environment",
                self.config_path
            );
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::from(self.config_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read app config: {}", self.config_path))?;

        let app_config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse app config: {}", self.config_path))?;

        tracing::debug!("Catalog endpoint: {}", app_config.base_url);
        Ok(app_config)
    }

    /// Save the application configuration file.
    ///
    /// # Arguments
    /// * `config` - The AppConfig to save
    pub fn save_app_config(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize app config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write app config: {}", self.config_path))?;

        tracing::info!("Saved app config to {}", self.config_path);
        Ok(())
    }

    /// Get the data directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Directory holding the persisted tracker state
    pub fn state_dir(&self) -> Utf8PathBuf {
        self.config_dir.join("state")
    }

    /// Directory holding log files
    pub fn log_dir(&self) -> Utf8PathBuf {
        self.config_dir.join("logs")
    }
}
