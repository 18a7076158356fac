use std::io;
use std::path::{Path, PathBuf};

use intake_spec::EngineOptions;
use intake_spec::persist::DEFAULT_SAVE_DEBOUNCE_MS;
use jiff::SignedDuration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "intake.config.json";

const APP_DIR: &str = "physio-intake";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no data directory found; pass --store-dir")]
    NoDataDir,
}

/// Deployment settings. Every field is optional; flags and env win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IntakeConfig {
    /// Where submissions are POSTed.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    #[serde(default)]
    pub save_debounce_ms: Option<i64>,
}

impl IntakeConfig {
    pub fn engine_options(&self, endpoint: Option<String>) -> EngineOptions {
        let debounce = self
            .save_debounce_ms
            .filter(|ms| *ms >= 0)
            .unwrap_or(DEFAULT_SAVE_DEBOUNCE_MS);
        EngineOptions {
            save_debounce: SignedDuration::from_millis(debounce),
            endpoint: endpoint.or_else(|| self.endpoint.clone()),
        }
    }
}

/// Reads `path`, or the default file when present. An explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<IntakeConfig, ConfigError> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if !required && err.kind() == io::ErrorKind::NotFound => {
            return Ok(IntakeConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Flag (or `INTAKE_STORE_DIR`), then the config file, then the user data dir.
pub fn resolve_store_dir(
    flag: Option<PathBuf>,
    config: &IntakeConfig,
) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = flag.or_else(|| config.store_dir.clone()) {
        return Ok(dir);
    }
    let base = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    Ok(base.join(APP_DIR))
}
