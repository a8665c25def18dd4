//! Load/save of the persisted configuration document.
//!
//! The document lives as a single YAML file. A missing file is not an error:
//! the default document is materialized and persisted back, so a `load`
//! right after is idempotent. Every other read failure surfaces as a
//! [`StorageError`].

mod models;

pub use models::{
    CollectionRule, Configuration, ConnectionConfig, FilterValue, LibraryConfig, Settings,
};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use crate::storage::StorageError;

/// Owner of the persisted configuration document. Single writer; concurrent
/// saves are serialized on the interior lock.
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        ConfigStore {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration document.
    ///
    /// A missing file yields the default document, immediately persisted so
    /// later loads read back the same value.
    pub fn load(&self) -> Result<Configuration, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_yaml::from_str(&raw).map_err(|err| StorageError::Parse {
                path: self.path.clone(),
                reason: err.to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No configuration found at {:?}, materializing defaults",
                    self.path
                );
                let config = Configuration::default_from_env();
                self.save(&config)?;
                Ok(config)
            }
            Err(err) => Err(StorageError::Read {
                path: self.path.clone(),
                source: err,
            }),
        }
    }

    /// Full overwrite of the persisted document. Creates the containing
    /// directory if absent.
    pub fn save(&self, config: &Configuration) -> Result<(), StorageError> {
        let mut config = config.clone();
        config.normalize();
        config.validate()?;

        let raw = serde_yaml::to_string(&config).map_err(|err| StorageError::Parse {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;

        let _guard = self.write_lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| StorageError::Write {
                path: self.path.clone(),
                source: err,
            })?;
        }
        fs::write(&self.path, raw).map_err(|err| StorageError::Write {
            path: self.path.clone(),
            source: err,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("config.yml"));
        (dir, store)
    }

    #[test]
    fn test_load_materializes_and_persists_default() {
        let (_dir, store) = make_store();

        let first = store.load().unwrap();
        assert!(store.path().exists());

        // Second load reads the persisted file, no re-defaulting.
        let second = store.load().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_dir, store) = make_store();

        let mut config = Configuration::default();
        config.connection.url = "http://localhost:8096".to_string();
        config.connection.api_key = "abc123".to_string();
        config.settings.dry_run = true;
        config.settings.update_interval = 7200;

        store.save(&config).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.settings.dry_run);
    }

    #[test]
    fn test_save_normalizes_trailing_slash() {
        let (_dir, store) = make_store();

        let mut config = Configuration::default();
        config.connection.url = "http://localhost:8096/".to_string();
        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.connection.url, "http://localhost:8096");
    }

    #[test]
    fn test_save_rejects_invalid_document() {
        let (_dir, store) = make_store();

        let mut config = Configuration::default();
        config.settings.update_interval = 0;
        let result = store.save(&config);
        assert!(matches!(
            result,
            Err(StorageError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_load_surfaces_corrupt_document() {
        let (dir, store) = make_store();
        std::fs::write(dir.path().join("config.yml"), "{{{{ not yaml").unwrap();

        let result = store.load();
        assert!(matches!(result, Err(StorageError::Parse { .. })));
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.yml"));

        store.save(&Configuration::default()).unwrap();
        assert!(store.path().exists());
    }
}
