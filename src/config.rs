//! Configuration management for the files provider
//!
//! The provider is configured once at construction. Values come from an
//! optional TOML file with `WIKI_FILES_*` environment overrides, or are built in
//! code by the host.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::storage::IoSettings;
use crate::storage::validation::{case_key, validate_name};

/// Default names of the two sandbox roots under the data directory.
pub const DEFAULT_UPLOAD_DIR: &str = "Upload";
pub const DEFAULT_ATTACHMENTS_DIR: &str = "Attachments";

const ENV_PREFIX: &str = "WIKI_FILES";

/// Provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Base real directory supplied by the host
    pub data_directory: String,

    /// Sandbox root for generic files, relative to `data_directory`
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Sandbox root for page attachments, relative to `data_directory`
    #[serde(default = "default_attachments_dir")]
    pub attachments_dir: String,

    /// Buffer size for store/retrieve copies
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Attempts for host operations failing with a transient `PermissionDenied`
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_upload_dir() -> String {
    DEFAULT_UPLOAD_DIR.to_string()
}

fn default_attachments_dir() -> String {
    DEFAULT_ATTACHMENTS_DIR.to_string()
}

fn default_buffer_size() -> usize {
    IoSettings::default().buffer_size
}

fn default_max_retries() -> usize {
    IoSettings::default().max_retries
}

impl StorageConfig {
    /// Default configuration rooted at `data_directory`.
    pub fn with_data_directory(data_directory: impl AsRef<Path>) -> Self {
        Self {
            data_directory: data_directory.as_ref().to_string_lossy().into_owned(),
            upload_dir: default_upload_dir(),
            attachments_dir: default_attachments_dir(),
            buffer_size: default_buffer_size(),
            max_retries: default_max_retries(),
        }
    }

    /// Load configuration from `wiki-files.toml` with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let config_paths = ["wiki-files", "config/wiki-files"];

        let mut builder = Config::builder();
        for config_path in &config_paths {
            builder = builder.add_source(File::with_name(config_path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let config: StorageConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file with environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let config: StorageConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_directory.trim().is_empty() {
            return Err(ConfigError::Message(
                "data_directory cannot be empty".into(),
            ));
        }

        for (key, value) in [
            ("upload_dir", &self.upload_dir),
            ("attachments_dir", &self.attachments_dir),
        ] {
            if validate_name(value).is_err() {
                return Err(ConfigError::Message(format!(
                    "{key} must be a single directory name, got {value:?}"
                )));
            }
        }

        if case_key(&self.upload_dir) == case_key(&self.attachments_dir) {
            return Err(ConfigError::Message(
                "upload_dir and attachments_dir must differ".into(),
            ));
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::Message(
                "buffer_size must be greater than 0".into(),
            ));
        }

        if self.max_retries == 0 {
            return Err(ConfigError::Message(
                "max_retries must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Real root of the generic file namespace
    pub fn upload_root(&self) -> PathBuf {
        Path::new(&self.data_directory).join(&self.upload_dir)
    }

    /// Real root of the attachment namespace
    pub fn attachments_root(&self) -> PathBuf {
        Path::new(&self.data_directory).join(&self.attachments_dir)
    }

    pub fn io_settings(&self) -> IoSettings {
        IoSettings {
            buffer_size: self.buffer_size,
            max_retries: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::with_data_directory("/srv/wiki");
        assert!(config.validate().is_ok());
        assert!(config.upload_root().ends_with(DEFAULT_UPLOAD_DIR));
        assert!(config.attachments_root().ends_with(DEFAULT_ATTACHMENTS_DIR));
        assert_eq!(config.io_settings().buffer_size, 8192);
    }

    #[test]
    fn test_load_from_file_applies_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wiki-files.toml");
        std::fs::write(&path, "data_directory = \"/srv/wiki\"\nbuffer_size = 4096\n").unwrap();

        let config = StorageConfig::load_from(&path).unwrap();
        assert_eq!(config.data_directory, "/srv/wiki");
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.upload_dir, DEFAULT_UPLOAD_DIR);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_rejects_clashing_roots() {
        let mut config = StorageConfig::with_data_directory("/srv/wiki");
        config.attachments_dir = "upload".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nested_root_names() {
        let mut config = StorageConfig::with_data_directory("/srv/wiki");
        config.upload_dir = "../escape".into();
        assert!(config.validate().is_err());
        config.upload_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_buffer() {
        let mut config = StorageConfig::with_data_directory("/srv/wiki");
        config.buffer_size = 0;
        assert!(config.validate().is_err());
    }
}
