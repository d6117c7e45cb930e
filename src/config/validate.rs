// src/config/validate.rs

use std::collections::BTreeSet;

use crate::config::model::{RawSpawnConfig, SpawnConfig};
use crate::errors::ConfigError;
use crate::types::{Stdio, StreamKind};

impl TryFrom<RawSpawnConfig> for SpawnConfig {
    type Error = ConfigError;

    fn try_from(raw: RawSpawnConfig) -> Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let config = SpawnConfig::new_unchecked(raw);
        config.to_request().validate()?;
        Ok(config)
    }
}

fn validate_raw_config(cfg: &RawSpawnConfig) -> Result<(), ConfigError> {
    ensure_has_argv(cfg)?;
    validate_fds(cfg)?;
    validate_environment(cfg)?;
    Ok(())
}

fn ensure_has_argv(cfg: &RawSpawnConfig) -> Result<(), ConfigError> {
    if cfg.argv.is_empty() {
        return Err(ConfigError::Invalid(
            "profile must set a non-empty `argv`".to_string(),
        ));
    }
    if cfg.argv[0].is_empty() && cfg.program.is_none() {
        return Err(ConfigError::Invalid(
            "`argv[0]` is empty and no `program` is given".to_string(),
        ));
    }
    Ok(())
}

/// Same rules the remap table enforces at spawn time, reported with the
/// profile's own field names.
fn validate_fds(cfg: &RawSpawnConfig) -> Result<(), ConfigError> {
    let mut targets = BTreeSet::new();

    let stdio = [
        (StreamKind::Stdin, cfg.stdio.stdin),
        (StreamKind::Stdout, cfg.stdio.stdout),
        (StreamKind::Stderr, cfg.stdio.stderr),
    ];
    for (stream, mode) in stdio {
        if mode.normalized() != Stdio::Inherit {
            targets.insert(stream.fd());
        }
    }

    for (i, remap) in cfg.remap.iter().enumerate() {
        if remap.source < 0 || remap.target < 0 {
            return Err(ConfigError::Invalid(format!(
                "remap[{i}]: fds must not be negative (source = {}, target = {})",
                remap.source, remap.target
            )));
        }
        if !targets.insert(remap.target) {
            return Err(ConfigError::Invalid(format!(
                "remap[{i}]: target fd {} is already assigned",
                remap.target
            )));
        }
    }
    Ok(())
}

fn validate_environment(cfg: &RawSpawnConfig) -> Result<(), ConfigError> {
    let env = &cfg.environment;
    for key in env.set.keys().chain(env.unset.iter()) {
        if key.is_empty() || key.contains('=') {
            return Err(ConfigError::Invalid(format!(
                "invalid environment variable name '{key}'"
            )));
        }
    }
    if let Some(key) = env.unset.iter().find(|k| env.set.contains_key(*k)) {
        return Err(ConfigError::Invalid(format!(
            "environment variable '{key}' is both set and unset"
        )));
    }
    Ok(())
}
