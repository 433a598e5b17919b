//! Target database configuration.
//!
//! The set of databases a deep delete walks is supplied at run time from a
//! JSON file, never compiled in. Every target shares the `server` location
//! and names its own database selector, or points at an explicit path.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AppError, AppResult};

pub const CONFIG_ENV: &str = "KERZZ_ADMIN_CONFIG";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const CONFIG_DIR_NAME: &str = "kerzz-admin";
const CONFIG_FILE_NAME: &str = "targets.json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no target databases are configured")]
    NoTargets,
    #[error("target #{index} has an empty name")]
    EmptyName { index: usize },
    #[error("target name `{name}` is configured more than once")]
    DuplicateName { name: String },
    #[error("target `{name}` must set exactly one of `database` or `path`")]
    AmbiguousLocation { name: String },
    #[error("target `{name}` uses a relative database but no `server` is configured")]
    MissingServer { name: String },
}

impl ConfigError {
    fn code(&self) -> &'static str {
        match self {
            ConfigError::NoTargets => "CONFIG/NO_TARGETS",
            ConfigError::EmptyName { .. } => "CONFIG/EMPTY_NAME",
            ConfigError::DuplicateName { .. } => "CONFIG/DUPLICATE_NAME",
            ConfigError::AmbiguousLocation { .. } => "CONFIG/AMBIGUOUS_LOCATION",
            ConfigError::MissingServer { .. } => "CONFIG/MISSING_SERVER",
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(error: ConfigError) -> Self {
        AppError::new(error.code(), error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<PathBuf>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    pub targets: Vec<TargetConfig>,
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// One resolved database a deep delete pass connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDatabase {
    pub name: String,
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl TargetsConfig {
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let config: TargetsConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "read_targets_config")
                .with_context("path", path.display().to_string())
        })?;
        Self::from_json(&raw).map_err(|err| err.with_context("path", path.display().to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        let mut seen = HashSet::new();
        for (index, target) in self.targets.iter().enumerate() {
            let name = target.name.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(ConfigError::DuplicateName {
                    name: name.to_string(),
                });
            }
            match (&target.database, &target.path) {
                (Some(database), None) => {
                    if self.server.is_none() && Path::new(database).is_relative() {
                        return Err(ConfigError::MissingServer {
                            name: name.to_string(),
                        });
                    }
                }
                (None, Some(_)) => {}
                _ => {
                    return Err(ConfigError::AmbiguousLocation {
                        name: name.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Resolves every target to a concrete location, in configuration order.
    pub fn resolve(&self) -> AppResult<Vec<TargetDatabase>> {
        self.validate()?;
        let mut targets = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let name = target.name.trim().to_string();
            let path = match (&target.path, &target.database, &self.server) {
                (Some(path), _, _) => path.clone(),
                (None, Some(database), Some(server)) => server.join(database),
                (None, Some(database), None) => PathBuf::from(database),
                (None, None, _) => return Err(ConfigError::AmbiguousLocation { name }.into()),
            };
            targets.push(TargetDatabase {
                name,
                path,
                busy_timeout_ms: self.busy_timeout_ms,
            });
        }
        Ok(targets)
    }
}

/// Picks the configuration file: explicit flag, then environment, then the
/// per-user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> AppResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(from_env) = std::env::var(CONFIG_ENV) {
        if !from_env.trim().is_empty() {
            return Ok(PathBuf::from(from_env));
        }
    }
    let base = dirs::config_dir().ok_or_else(|| {
        AppError::new(
            "CONFIG/NO_CONFIG_DIR",
            "Unable to resolve the platform configuration directory",
        )
    })?;
    Ok(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
