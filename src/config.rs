use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_CLEANED_FILE, DEFAULT_COLLECTION, DEFAULT_DATABASE, DEFAULT_MAX_BULK_INSERT,
    DEFAULT_SOURCE_FILE, DEFAULT_STORE_URI, ENV_CLEANED_FILE, ENV_COLLECTION, ENV_DATABASE,
    ENV_MAX_BULK_INSERT, ENV_SOURCE_FILE, ENV_STORE_URI,
};
use crate::error::{PipelineError, Result};
use crate::storage::StoreEndpoint;

/// Everything a pipeline run needs to know, gathered once and passed to every
/// stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Raw CSV to normalize.
    pub source_path: PathBuf,
    /// Cleaned CSV written by the normalize stage and read by the loader.
    pub cleaned_path: PathBuf,
    /// `memory://` or `sqlite://<dir>`.
    pub store_uri: String,
    pub database: String,
    pub collection: String,
    /// Largest batch the loader submits in its single bulk insert.
    pub max_bulk_insert: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from(DEFAULT_SOURCE_FILE),
            cleaned_path: PathBuf::from(DEFAULT_CLEANED_FILE),
            store_uri: DEFAULT_STORE_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            max_bulk_insert: DEFAULT_MAX_BULK_INSERT,
        }
    }
}

/// Command-line values; each one set replaces whatever the lower layers said.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source_path: Option<PathBuf>,
    pub cleaned_path: Option<PathBuf>,
    pub store_uri: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
}

impl Config {
    /// Defaults, then the optional TOML file, then `lookup`. Not validated, so
    /// a higher layer can still replace a bad value.
    pub fn layered<F>(config_file: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(v) = overrides.source_path {
            self.source_path = v;
        }
        if let Some(v) = overrides.cleaned_path {
            self.cleaned_path = v;
        }
        if let Some(v) = overrides.store_uri {
            self.store_uri = v;
        }
        if let Some(v) = overrides.database {
            self.database = v;
        }
        if let Some(v) = overrides.collection {
            self.collection = v;
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Overrides fields from environment-style variables. `lookup` abstracts
    /// the environment so callers can supply their own map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(ENV_SOURCE_FILE) {
            self.source_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_CLEANED_FILE) {
            self.cleaned_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_STORE_URI) {
            self.store_uri = v;
        }
        if let Some(v) = non_empty(ENV_DATABASE) {
            self.database = v;
        }
        if let Some(v) = non_empty(ENV_COLLECTION) {
            self.collection = v;
        }
        if let Some(v) = non_empty(ENV_MAX_BULK_INSERT) {
            self.max_bulk_insert = v.trim().parse().map_err(|_| {
                PipelineError::Config(format!("{ENV_MAX_BULK_INSERT} must be a positive integer, got '{v}'"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(PipelineError::Config("database name is empty".to_string()));
        }
        if self.collection.trim().is_empty() {
            return Err(PipelineError::Config("collection name is empty".to_string()));
        }
        if self.max_bulk_insert == 0 {
            return Err(PipelineError::Config(
                "max_bulk_insert must be greater than zero".to_string(),
            ));
        }
        StoreEndpoint::parse(&self.store_uri)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.source_path, PathBuf::from("healthcare_dataset.csv"));
        assert_eq!(config.cleaned_path, PathBuf::from("healthcare_dataset_cleaned.csv"));
        assert_eq!(config.database, "healthcare");
        assert_eq!(config.collection, "patients");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl.toml");
        fs::write(&path, "collection = \"from_file\"\ndatabase = \"clinic\"\n").unwrap();

        let mut config = Config::from_file(&path).unwrap();
        assert_eq!(config.collection, "from_file");
        assert_eq!(config.store_uri, DEFAULT_STORE_URI);

        let env: HashMap<&str, &str> = [
            ("COLLECTION_NAME", "from_env"),
            ("STORE_URI", "memory://"),
            ("DB_NAME", "  "),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.collection, "from_env");
        assert_eq!(config.store_uri, "memory://");
        assert_eq!(config.database, "clinic");
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "MAX_BULK_INSERT").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let config = Config {
            collection: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            store_uri: "mongodb://localhost:27017/".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_replace_invalid_lower_layers() {
        let env = |k: &str| (k == "STORE_URI").then(|| "mongodb://localhost:27017/".to_string());

        let config = Config::layered(None, env).unwrap();
        assert!(config.validate().is_err());

        let mut config = Config::layered(None, env).unwrap();
        config.apply_overrides(Overrides {
            store_uri: Some("sqlite://data".to_string()),
            collection: Some("admissions".to_string()),
            ..Overrides::default()
        });
        config.validate().unwrap();
        assert_eq!(config.store_uri, "sqlite://data");
        assert_eq!(config.collection, "admissions");
        assert_eq!(config.database, "healthcare");
    }

    #[test]
    fn test_unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<Config>("colection = \"typo\"").is_err());
    }
}
