// src/config/validate.rs

use std::path::Path;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DevdagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DevdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.scheduler,
            raw.executor,
            raw.generator,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_scheduler(cfg)?;
    validate_executor(cfg)?;
    validate_generator(cfg)?;
    Ok(())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.scheduler;

    if s.max_concurrency == 0 {
        return Err(DevdagError::ConfigError(
            "[scheduler].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    if s.shutdown_timeout_secs == 0 {
        return Err(DevdagError::ConfigError(
            "[scheduler].shutdown_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if s.agent_id.trim().is_empty() {
        return Err(DevdagError::ConfigError(
            "[scheduler].agent_id must not be empty".to_string(),
        ));
    }

    if s.supported_agent_types.is_empty() {
        return Err(DevdagError::ConfigError(
            "[scheduler].supported_agent_types must list at least one agent type".to_string(),
        ));
    }

    Ok(())
}

fn validate_executor(cfg: &RawConfigFile) -> Result<()> {
    let e = &cfg.executor;

    if e.output_dir.as_os_str().is_empty() {
        return Err(DevdagError::ConfigError(
            "[executor].output_dir must not be empty".to_string(),
        ));
    }

    ensure_plain_file_name("primary_file", &e.primary_file)?;
    ensure_plain_file_name("metadata_file", &e.metadata_file)?;

    if e.primary_file == e.metadata_file {
        return Err(DevdagError::ConfigError(format!(
            "[executor].primary_file and metadata_file must differ (both '{}')",
            e.primary_file
        )));
    }

    if e.slug_max_len == 0 {
        return Err(DevdagError::ConfigError(
            "[executor].slug_max_len must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn ensure_plain_file_name(key: &str, name: &str) -> Result<()> {
    let path = Path::new(name);
    let plain = !name.is_empty()
        && path.file_name().map(|f| f == path.as_os_str()).unwrap_or(false);

    if !plain {
        return Err(DevdagError::ConfigError(format!(
            "[executor].{key} must be a plain file name (got '{name}')"
        )));
    }
    Ok(())
}

fn validate_generator(cfg: &RawConfigFile) -> Result<()> {
    let g = &cfg.generator;

    if g.cmd.trim().is_empty() {
        return Err(DevdagError::ConfigError(
            "[generator].cmd must not be empty".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&g.temperature) {
        return Err(DevdagError::ConfigError(format!(
            "[generator].temperature must be within 0.0..=2.0 (got {})",
            g.temperature
        )));
    }

    Ok(())
}
