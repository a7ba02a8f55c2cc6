//! Session configuration.
//!
//! A session needs a model identifier and, optionally, the directory the
//! backend stores model weights in. Both come from a [`ConfigSource`], which
//! can be a plain map or the process environment (with `.env` fallback).

use crate::error::{Error, Result};
use crate::storage;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key holding the model identifier
pub const MODEL_NAME_KEY: &str = "MODEL_NAME";
/// Key holding the model storage directory
pub const STORAGE_LOCATION_KEY: &str = "LLAMA_MODELS";

/// A read-only mapping of configuration keys to string values
pub trait ConfigSource {
    /// Look up the value for `key`
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

impl<S: ConfigSource + ?Sized> ConfigSource for &S {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// Configuration read from the process environment, with values from a
/// `.env` file used for keys the environment does not define.
///
/// The process environment itself is never modified.
#[derive(Debug, Default, Clone)]
pub struct EnvSource {
    dotenv: HashMap<String, String>,
}

impl EnvSource {
    /// Only the process environment, no `.env` fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// The process environment with `.env` from the current directory as fallback.
    ///
    /// A missing `.env` file is not an error.
    pub fn load() -> Result<Self> {
        Self::from_file(".env")
    }

    /// The process environment with the given dotenv file as fallback.
    ///
    /// A missing file is not an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No dotenv file at {}", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(Error::IoError(e)),
        };

        let dotenv = parse_dotenv(&contents);
        debug!("Loaded {} entries from {}", dotenv.len(), path.display());
        Ok(Self { dotenv })
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.dotenv.get(key).cloned())
    }
}

// Parse `KEY=VALUE` lines the way dotenv files are usually written
fn parse_dotenv(contents: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            values.insert(key.to_string(), value.to_string());
        }
    }
    values
}

/// Validated configuration for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// The model identifier passed to the backend on every call
    pub(crate) model: String,
    /// Where the backend stores model weights (default: backend's choice)
    pub(crate) storage_location: Option<PathBuf>,
}

impl SessionConfig {
    /// Create a configuration for the given model
    pub fn new(model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let model = model.trim();
        if model.is_empty() {
            return Err(Error::ConfigError(format!(
                "{} must not be empty",
                MODEL_NAME_KEY
            )));
        }
        Ok(Self {
            model: model.to_string(),
            storage_location: None,
        })
    }

    /// Set the model storage location. An empty path leaves it unset.
    pub fn with_storage_location(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.storage_location = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        };
        self
    }

    /// Resolve a configuration from `source`.
    ///
    /// Fails if the model identifier is absent or empty. This has no side
    /// effects; see [`SessionConfig::apply`].
    pub fn resolve(source: &impl ConfigSource) -> Result<Self> {
        let model = source.get(MODEL_NAME_KEY).ok_or_else(|| {
            Error::ConfigError(format!("{} is not set", MODEL_NAME_KEY))
        })?;
        let config = Self::new(model)?;

        let config = match source.get(STORAGE_LOCATION_KEY) {
            Some(location) if !location.trim().is_empty() => {
                config.with_storage_location(location.trim())
            }
            _ => config,
        };

        debug!(model = %config.model, storage_location = ?config.storage_location, "Resolved session configuration");
        Ok(config)
    }

    /// Forward the storage location, if any, to the process-wide backend
    /// configuration. Returns `true` if the stored value changed.
    pub fn apply(&self) -> bool {
        match &self.storage_location {
            Some(path) => storage::set_storage_location(path),
            None => false,
        }
    }

    /// The model identifier
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The model storage location
    pub fn storage_location(&self) -> Option<&Path> {
        self.storage_location.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_model_only() {
        let config = SessionConfig::resolve(&source(&[("MODEL_NAME", "demo-model")])).unwrap();
        assert_eq!(config.model(), "demo-model");
        assert_eq!(config.storage_location(), None);
    }

    #[test]
    fn test_resolve_with_storage_location() {
        let config = SessionConfig::resolve(&source(&[
            ("MODEL_NAME", "demo-model"),
            ("LLAMA_MODELS", "/srv/models"),
        ]))
        .unwrap();
        assert_eq!(config.storage_location(), Some(Path::new("/srv/models")));
    }

    #[test]
    fn test_missing_model_is_config_error() {
        let err = SessionConfig::resolve(&source(&[("LLAMA_MODELS", "/srv/models")])).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_empty_model_is_config_error() {
        let err = SessionConfig::resolve(&source(&[("MODEL_NAME", "  ")])).unwrap_err();
        assert!(err.is_config());
        assert!(SessionConfig::new("").is_err());
    }

    #[test]
    fn test_empty_storage_location_is_unset() {
        let config = SessionConfig::resolve(&source(&[
            ("MODEL_NAME", "demo-model"),
            ("LLAMA_MODELS", ""),
        ]))
        .unwrap();
        assert_eq!(config.storage_location(), None);
        assert!(!config.apply());

        let config = SessionConfig::new("demo-model")
            .unwrap()
            .with_storage_location("");
        assert_eq!(config.storage_location(), None);
    }

    #[test]
    fn test_btreemap_source() {
        let mut map = BTreeMap::new();
        map.insert("MODEL_NAME".to_string(), "demo-model".to_string());
        assert_eq!(SessionConfig::resolve(&map).unwrap().model(), "demo-model");
    }

    #[test]
    fn test_parse_dotenv() {
        let values = parse_dotenv(
            "# local settings\n\
             MODEL_NAME=llama3.1\n\
             export LLAMA_MODELS=\"/srv/models\"\n\
             \n\
             QUOTED='single'\n\
             =ignored\n\
             not a pair\n",
        );
        assert_eq!(values.get("MODEL_NAME").map(String::as_str), Some("llama3.1"));
        assert_eq!(values.get("LLAMA_MODELS").map(String::as_str), Some("/srv/models"));
        assert_eq!(values.get("QUOTED").map(String::as_str), Some("single"));
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_env_source_falls_back_to_dotenv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "EZRUNNER_TEST_ONLY_IN_DOTENV=from-file").unwrap();

        let env = EnvSource::from_file(file.path()).unwrap();
        assert_eq!(
            env.get("EZRUNNER_TEST_ONLY_IN_DOTENV").as_deref(),
            Some("from-file")
        );
        assert_eq!(env.get("EZRUNNER_TEST_NOT_SET_ANYWHERE"), None);
    }

    #[test]
    fn test_process_environment_wins_over_dotenv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "PATH=from-file").unwrap();

        let env = EnvSource::from_file(file.path()).unwrap();
        match std::env::var("PATH") {
            Ok(path) => {
                assert_eq!(env.get("PATH"), Some(path));
                assert_ne!(env.get("PATH").as_deref(), Some("from-file"));
            }
            Err(_) => assert_eq!(env.get("PATH").as_deref(), Some("from-file")),
        }
    }

    #[test]
    fn test_unreadable_dotenv_is_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = EnvSource::from_file(dir.path()).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_env_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvSource::from_file(dir.path().join(".env")).unwrap();
        assert_eq!(env.get("EZRUNNER_TEST_NOT_SET_ANYWHERE"), None);
    }
}
