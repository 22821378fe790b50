//! Engine configuration loading.
//!
//! Configuration lives in a small JSON or YAML file. The path comes from
//! `RAILYARD_CONFIG_PATH` when set, otherwise the standard configuration
//! directory (`~/.config/railyard/engine.json` on most platforms, with
//! `engine.yaml` accepted as well). A missing file yields the defaults; an
//! unreadable or malformed one is an error so a typo never silently changes
//! engine limits.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::expand_tilde;

/// Environment variable allowing callers to override the configuration file path.
pub const CONFIG_PATH_ENV: &str = "RAILYARD_CONFIG_PATH";

/// Default filenames looked up in the configuration directory.
const CONFIG_FILE_NAMES: [&str; 3] = ["engine.json", "engine.yaml", "engine.yml"];

/// Default loop safety cap.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
/// Default upper bound on foreach concurrency.
pub const DEFAULT_MAX_FOREACH_CONCURRENCY: usize = 16;
/// Default id prefix marking internal bookkeeping steps.
pub const DEFAULT_INTERNAL_STEP_PREFIX: &str = "__";

/// Error surfaced when reading the configuration file fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config {path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Tunables consumed by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Loop cap applied when a loop step does not declare `maxIterations`.
    pub default_max_iterations: u32,
    /// Upper bound for a foreach step's `concurrency`.
    pub max_foreach_concurrency: usize,
    /// Step id prefix marking internal bookkeeping steps.
    pub internal_step_prefix: String,
    /// Pass handler error messages through secret redaction before emitting them.
    pub redact_step_errors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: DEFAULT_MAX_ITERATIONS,
            max_foreach_concurrency: DEFAULT_MAX_FOREACH_CONCURRENCY,
            internal_step_prefix: DEFAULT_INTERNAL_STEP_PREFIX.to_string(),
            redact_step_errors: true,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Loads the configuration from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "engine config not found; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config: EngineConfig = if is_yaml(path) {
            serde_yaml::from_str(&data).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_json::from_str(&data).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.validate()?;
        debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_max_iterations == 0 {
            return Err(ConfigError::Invalid("defaultMaxIterations must be at least 1".into()));
        }
        if self.max_foreach_concurrency == 0 {
            return Err(ConfigError::Invalid("maxForeachConcurrency must be at least 1".into()));
        }
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("yaml") || extension.eq_ignore_ascii_case("yml"))
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(expand_tilde(trimmed));
        }
    }

    let directory = config_dir()?.join("railyard");
    CONFIG_FILE_NAMES
        .iter()
        .map(|file_name| directory.join(file_name))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&temp_dir.path().join("absent.json")).expect("load defaults");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_json_overrides_only_given_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("engine.json");
        fs::write(&path, r#"{ "defaultMaxIterations": 5 }"#).unwrap();

        let config = EngineConfig::load_from(&path).expect("load config");
        assert_eq!(config.default_max_iterations, 5);
        assert_eq!(config.max_foreach_concurrency, DEFAULT_MAX_FOREACH_CONCURRENCY);
        assert!(config.redact_step_errors);
    }

    #[test]
    fn yaml_files_are_supported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("engine.yaml");
        fs::write(&path, "maxForeachConcurrency: 4\ninternalStepPrefix: \"sys_\"\n").unwrap();

        let config = EngineConfig::load_from(&path).expect("load yaml config");
        assert_eq!(config.max_foreach_concurrency, 4);
        assert_eq!(config.internal_step_prefix, "sys_");
    }

    #[test]
    fn zero_limits_are_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("engine.json");
        fs::write(&path, r#"{ "maxForeachConcurrency": 0 }"#).unwrap();

        let error = EngineConfig::load_from(&path).expect_err("zero concurrency is invalid");
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn environment_override_is_honoured() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("custom.json");
        fs::write(&path, r#"{ "defaultMaxIterations": 7 }"#).unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(path.to_str().unwrap()), || {
            let config = EngineConfig::load().expect("load from env path");
            assert_eq!(config.default_max_iterations, 7);
        });
    }
}
