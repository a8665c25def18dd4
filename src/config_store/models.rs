//! The configuration document consumed by the Kometa worker.
//!
//! This is the YAML document edited through the dashboard and passed to the
//! worker on each run. It is always fully defined after a load: a missing
//! file materializes the default document below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub libraries: BTreeMap<String, LibraryConfig>,
    #[serde(default)]
    pub settings: Settings,
}

/// Jellyfin connection parameters.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the Jellyfin server, no trailing slash.
    pub url: String,
    /// API token. Empty means not configured yet.
    pub api_key: String,
}

// The api_key is a secret and must never end up in logs.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// One media library and its named collection rules.
///
/// Map keys are the rule names chosen by the user, so uniqueness within a
/// library holds by construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionRule>,
}

/// A single collection rule: display name plus filter criteria.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionRule {
    pub name: String,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterValue>,
}

/// Value of a single filter criterion.
///
/// Filter keys are free-form (genre, year, year_range, studio, rating...)
/// but values are restricted to this closed set of kinds so the document
/// stays checkable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Integer(i64),
    Float(f64),
    /// Inclusive two-element range, e.g. `[1990, 1999]`.
    Range([i64; 2]),
    Text(String),
}

/// Worker behavior toggles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between scheduled worker runs.
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
    #[serde(default = "default_true")]
    pub create_missing_collections: bool,
    #[serde(default = "default_true")]
    pub update_posters: bool,
    /// Simulate only, apply nothing.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_update_interval() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            update_interval: default_update_interval(),
            create_missing_collections: true,
            update_posters: true,
            dry_run: false,
        }
    }
}

impl Default for Configuration {
    /// Template document: empty connection, one example library/collection
    /// pair the user can edit in place.
    fn default() -> Self {
        let mut filters = BTreeMap::new();
        filters.insert("genre".to_string(), FilterValue::Text("Action".to_string()));
        filters.insert(
            "studio".to_string(),
            FilterValue::Text("Marvel Studios".to_string()),
        );

        let mut collections = BTreeMap::new();
        collections.insert(
            "marvel".to_string(),
            CollectionRule {
                name: "Films Marvel".to_string(),
                filters,
            },
        );

        let mut libraries = BTreeMap::new();
        libraries.insert("Films".to_string(), LibraryConfig { collections });

        Configuration {
            connection: ConnectionConfig {
                url: String::new(),
                api_key: String::new(),
            },
            libraries,
            settings: Settings::default(),
        }
    }
}

impl Configuration {
    /// Default document with the connection sourced from the environment
    /// when present.
    pub fn default_from_env() -> Self {
        let mut config = Configuration::default();
        if let Ok(url) = std::env::var("JELLYFIN_URL") {
            config.connection.url = url.trim_end_matches('/').to_string();
        }
        if let Ok(api_key) = std::env::var("JELLYFIN_API_KEY") {
            config.connection.api_key = api_key;
        }
        config
    }

    /// Strip the trailing slash from the connection URL.
    pub fn normalize(&mut self) {
        self.connection.url = self.connection.url.trim_end_matches('/').to_string();
    }

    /// Check the document invariants. An empty URL is allowed and means the
    /// connection has not been configured yet.
    pub fn validate(&self) -> Result<(), crate::storage::StorageError> {
        use crate::storage::StorageError;

        let url = &self.connection.url;
        if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(StorageError::InvalidConfiguration(format!(
                "connection url must be http(s): {}",
                url
            )));
        }
        if url.ends_with('/') {
            return Err(StorageError::InvalidConfiguration(
                "connection url must not end with a slash".to_string(),
            ));
        }
        if self.settings.update_interval == 0 {
            return Err(StorageError::InvalidConfiguration(
                "settings.update_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
