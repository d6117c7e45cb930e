// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{RawSpawnConfig, SpawnConfig};
use crate::errors::ConfigError;

/// Read and deserialize a profile without semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSpawnConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: RawSpawnConfig = toml::from_str(&contents)?;
    debug!(path = %path.display(), "loaded spawn profile");
    Ok(config)
}

/// Read, deserialize and validate a profile.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SpawnConfig, ConfigError> {
    let raw = load_from_path(&path)?;
    SpawnConfig::try_from(raw)
}

/// Parse a profile from a string, as [`load_and_validate`] would.
pub fn parse_and_validate(contents: &str) -> Result<SpawnConfig, ConfigError> {
    let raw: RawSpawnConfig = toml::from_str(contents)?;
    SpawnConfig::try_from(raw)
}
