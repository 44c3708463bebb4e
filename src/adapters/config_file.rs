//! JSON configuration file adapter.
//!
//! Implements [`ConfigPort`] on a single JSON document.  A missing file
//! yields [`SorterConfig::default()`]; any field left out of the document
//! takes its default as well.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::info;

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SorterConfig;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<SorterConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("CONFIG | {} not found, using defaults", self.path.display());
                return Ok(SorterConfig::default());
            }
            Err(e) => return Err(ConfigError::Io(e.kind())),
        };
        let cfg: SorterConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        cfg.validate().map_err(ConfigError::ValidationFailed)?;
        info!("CONFIG | loaded {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &SorterConfig) -> Result<(), ConfigError> {
        config.validate().map_err(ConfigError::ValidationFailed)?;
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| ConfigError::Io(e.kind()))?;
        }
        fs::write(&self.path, text).map_err(|e| ConfigError::Io(e.kind()))?;
        info!("CONFIG | saved {}", self.path.display());
        Ok(())
    }
}
