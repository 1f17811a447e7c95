use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    digest::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE},
    error::{ConfigError, DigestError},
};

/// Tunables for a digest run.
///
/// Loaded from a TOML file and then overridden by command-line flags:
///
/// ```toml
/// chunk_size_bytes = 1048576
/// deep = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Size of each chunk read from disk. Larger chunks mean fewer barriers
    /// per file and a higher peak memory of two chunks per running digest.
    pub chunk_size_bytes: usize,

    /// Also compute MD5 and SHA1.
    pub deep: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            deep: false,
        }
    }
}

impl DigestConfig {
    /// Read a configuration from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Convert a configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// Read a configuration from a TOML file.
    pub fn from_file(filepath: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(filepath)?;
        let config = Self::from_toml(&contents)?;
        debug!("loaded {:?} from {:?}", config, filepath);
        Ok(config)
    }

    /// Loads `filepath` when given, otherwise the defaults.
    pub fn load(filepath: Option<&Path>) -> Result<Self, ConfigError> {
        match filepath {
            Some(filepath) => Self::from_file(filepath),
            None => Ok(Self::default()),
        }
    }

    /// Applies command-line flags on top of the loaded values.
    pub fn with_overrides(mut self, chunk_size: Option<usize>, deep: bool) -> Self {
        if let Some(chunk_size) = chunk_size {
            self.chunk_size_bytes = chunk_size;
        }
        self.deep |= deep;
        self
    }

    pub fn validate(&self) -> Result<(), DigestError> {
        if self.chunk_size_bytes == 0 || self.chunk_size_bytes > MAX_CHUNK_SIZE {
            return Err(DigestError::InvalidChunkSize(self.chunk_size_bytes));
        }
        Ok(())
    }
}
