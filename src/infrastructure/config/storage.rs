//! Reading and writing `config.toml`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::app_config::{AppConfig, CONFIG_FILE_NAME};

/// Failure to locate, read or write the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform has no configuration directory for this user.
    #[error("no configuration directory available")]
    ConfigDirNotFound,
    /// Reading or writing the file failed.
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration could not be rendered as TOML.
    #[error("config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Owns the directory `config.toml` lives in.
///
/// A missing file is created with defaults. A file that does not parse is
/// left untouched and the defaults are used for the run.
pub struct StorageManager {
    config_dir: PathBuf,
}

impl StorageManager {
    /// Uses the platform configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigDirNotFound`] if the platform has none.
    pub fn new() -> Result<Self, ConfigError> {
        AppConfig::default_config_dir()
            .map(Self::with_dir)
            .ok_or(ConfigError::ConfigDirNotFound)
    }

    /// Uses `config_dir` instead of the platform directory.
    #[must_use]
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// The directory holding `config.toml`.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Creates the configuration directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if it cannot be created.
    pub fn ensure_config_dir(&self) -> Result<(), ConfigError> {
        if !self.config_dir.exists() {
            info!(dir = %self.config_dir.display(), "Creating configuration directory");
            fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Loads the configuration from `path_override`, or from `config.toml`
    /// in the configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, or a missing file
    /// cannot be created.
    pub fn load_config(&self, path_override: Option<&Path>) -> Result<AppConfig, ConfigError> {
        self.ensure_config_dir()?;
        let path = path_override.map_or_else(|| self.config_file(), Path::to_path_buf);

        if !path.exists() {
            info!(path = %path.display(), "No config file, writing defaults");
            let config = AppConfig::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            Self::write_atomic(&path, &config)?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)?;
        match toml::from_str::<AppConfig>(&content) {
            Ok(config) => {
                debug!(path = %path.display(), "Loaded config");
                Ok(config)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unparseable config, using defaults");
                Ok(AppConfig::default())
            }
        }
    }

    /// Writes `config` to `config.toml` in the configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be written.
    pub fn save_config(&self, config: &AppConfig) -> Result<(), ConfigError> {
        self.ensure_config_dir()?;
        Self::write_atomic(&self.config_file(), config)
    }

    /// Renders `data` into a temporary file beside `path`, then renames it
    /// over `path`.
    fn write_atomic<T: Serialize>(path: &Path, data: &T) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(data)?;
        let dir = path
            .parent()
            .ok_or_else(|| std::io::Error::other("config path has no parent directory"))?;

        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        staged.write_all(content.as_bytes())?;
        staged.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
