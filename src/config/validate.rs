// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, StoreKind};
use crate::errors::{DatadagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DatadagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.store, raw.runner))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_store(cfg)?;
    validate_runner(cfg)?;
    Ok(())
}

fn validate_store(cfg: &RawConfigFile) -> Result<()> {
    if cfg.store.kind != StoreKind::Filesystem {
        return Ok(());
    }
    match cfg.store.root {
        Some(ref root) if !root.as_os_str().is_empty() => Ok(()),
        _ => Err(DatadagError::ConfigError(
            "[store].root is required when kind = \"filesystem\"".to_string(),
        )),
    }
}

fn validate_runner(cfg: &RawConfigFile) -> Result<()> {
    if cfg.runner.max_workers == 0 {
        return Err(DatadagError::ConfigError(
            "[runner].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
