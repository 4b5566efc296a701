//! TOML-backed engine configuration.
//!
//! Loads `EngineConfig` from `config.toml`, falling back to defaults when
//! the file is missing or empty, and saves it atomically (temporary file +
//! fsync + rename in the same directory).

use crate::paths::ParleyPaths;
use parley_core::config::EngineConfig;
use parley_core::error::{ParleyError, Result};
use std::fs::{self, File};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

pub struct TomlConfigRepository {
    path: PathBuf,
}

impl TomlConfigRepository {
    /// Repository over the platform default `config.toml`.
    pub fn new_default() -> Result<Self> {
        let path = ParleyPaths::config_file().map_err(|e| ParleyError::config(e.to_string()))?;
        Ok(Self::with_path(path))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and validates the configuration.
    ///
    /// - Missing or empty file: `EngineConfig::default()`
    /// - Unparseable or invalid file: error
    pub fn load(&self) -> Result<EngineConfig> {
        if !self.path.exists() {
            tracing::debug!("[Config] {:?} not found, using defaults", self.path);
            return Ok(EngineConfig::default());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(EngineConfig::default());
        }

        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!("[Config] Loaded configuration from {:?}", self.path);
        Ok(config)
    }

    /// Validates and writes the configuration atomically.
    pub fn save(&self, config: &EngineConfig) -> Result<()> {
        config.validate()?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(config)?;

        let tmp_path = self.temp_path()?;
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(toml_string.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)?;
        tracing::info!("[Config] Saved configuration to {:?}", self.path);
        Ok(())
    }

    /// Writes the defaults unless a file already exists. Returns whether a
    /// file was written.
    pub fn init_default(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.save(&EngineConfig::default())?;
        Ok(true)
    }

    fn temp_path(&self) -> Result<PathBuf> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| ParleyError::config("Config path has no parent directory"))?;
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| ParleyError::config("Config path has no file name"))?;
        Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlConfigRepository::with_path(temp_dir.path().join("config.toml"));
        assert_eq!(repo.load().unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_save_and_load_roundtrip_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let repo = TomlConfigRepository::with_path(&path);

        let mut config = EngineConfig::default();
        config.windows.max_visible = 2;
        config.billing.resume_grace_secs = 30;
        repo.save(&config).unwrap();

        assert_eq!(repo.load().unwrap(), config);
        assert!(!temp_dir.path().join("nested").join(".config.toml.tmp").exists());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[billing]\nwarn_after_secs = 500\n").unwrap();

        let repo = TomlConfigRepository::with_path(&path);
        assert!(matches!(repo.load(), Err(ParleyError::Config(_))));

        fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(
            repo.load(),
            Err(ParleyError::Serialization { .. })
        ));
    }

    #[test]
    fn test_init_default_does_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[windows]\nmax_visible = 5\n").unwrap();

        let repo = TomlConfigRepository::with_path(&path);
        assert!(!repo.init_default().unwrap());
        assert_eq!(repo.load().unwrap().windows.max_visible, 5);
    }
}
