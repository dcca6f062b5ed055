//! Per-environment configuration
//!
//! Stored as YAML in `~/.kubesealplus/config.yaml`:
//!
//! ```yaml
//! environments:
//!   production:
//!     cert: https://sealed-secrets.example.com/v1/cert.pem
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// The only per-environment key currently understood
pub const CERT_KEY: &str = "cert";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDoc {
    #[serde(default)]
    pub environments: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigDoc {
    /// Load from `path`, returning an empty document if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using empty config");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::io(path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| Error::Config {
            environment: "<environment>".to_string(),
            message: format!("cannot parse YAML in config file '{}': {}", path.display(), e),
        })
    }

    /// Write to `path`, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
        }

        let content = serde_yaml::to_string(self).map_err(|e| Error::Config {
            environment: "<environment>".to_string(),
            message: format!("cannot serialize config: {}", e),
        })?;
        fs::write(path, content).map_err(|e| Error::io(path, e))?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }

    pub fn set(&mut self, environment: &str, key: &str, value: &str) {
        self.environments
            .entry(environment.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, environment: &str, key: &str) -> Option<&str> {
        self.environments
            .get(environment)
            .and_then(|env| env.get(key))
            .map(String::as_str)
    }

    /// Certificate location for `environment`
    pub fn cert(&self, environment: &str) -> Result<&str> {
        match self.get(environment, CERT_KEY) {
            Some(cert) if !cert.trim().is_empty() => Ok(cert),
            _ => Err(Error::Config {
                environment: environment.to_string(),
                message: format!("no certificate configured for environment '{}'", environment),
            }),
        }
    }
}

/// Config document bound to the file it lives in
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ConfigDoc> {
        ConfigDoc::load(&self.path)
    }

    /// Certificate location for `environment`
    pub fn cert(&self, environment: &str) -> Result<String> {
        let doc = self.load()?;
        doc.cert(environment).map(str::to_string)
    }

    /// Set `key` for `environment` and persist
    pub fn set(&self, environment: &str, key: &str, value: &str) -> Result<()> {
        if key != CERT_KEY {
            return Err(Error::Validation(format!(
                "unknown config key '{}', expected '{}'",
                key, CERT_KEY
            )));
        }
        let mut doc = self.load()?;
        doc.set(environment, key, value);
        doc.save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let doc = ConfigDoc::load(&tmp.path().join("config.yaml")).unwrap();
        assert!(doc.environments.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.yaml");

        let mut doc = ConfigDoc::default();
        doc.set("production", "cert", "/etc/cert.pem");
        doc.set("staging", "cert", "https://example.com/v1/cert.pem");
        doc.save(&path).unwrap();

        let loaded = ConfigDoc::load(&path).unwrap();
        assert_eq!(loaded, doc);
        assert_eq!(loaded.cert("production").unwrap(), "/etc/cert.pem");
    }

    #[test]
    fn test_missing_environment_has_hint() {
        let doc = ConfigDoc::default();
        let err = doc.cert("production").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("kubesealplus config production cert"));
    }

    #[test]
    fn test_invalid_yaml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "environments: [").unwrap();
        assert!(matches!(ConfigDoc::load(&path), Err(Error::Config { .. })));
    }

    #[test]
    fn test_store_set_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(&tmp.path().join("config.yaml"));
        store.set("production", "cert", "a.pem").unwrap();
        store.set("production", "cert", "b.pem").unwrap();
        assert_eq!(store.cert("production").unwrap(), "b.pem");
    }

    #[test]
    fn test_store_rejects_unknown_key() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(&tmp.path().join("config.yaml"));
        assert!(matches!(
            store.set("production", "token", "x"),
            Err(Error::Validation(_))
        ));
        assert!(!store.path().exists());
    }
}
