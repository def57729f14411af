//! Loader configuration (modlink.toml)
//!
//! ```toml
//! base = "https://example.com/app/"
//! import-map-file = "importmap.json"
//! module-types = ["json", "text"]
//!
//! [import-map.imports]
//! "lodash" = "/vendor/lodash.js"
//!
//! [import-map.scopes."/legacy/"]
//! "lodash" = "/vendor/lodash-v3.js"
//! ```
//!
//! The inline `[import-map]` table is applied on top of `import-map-file`.

use modlink_importmap::{ConfigError, ImportMapTable, RawImportMap};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::id::SyntheticKind;

/// Errors that can occur while reading loader configuration
#[derive(Debug, Error)]
pub enum LoaderConfigError {
    /// I/O error reading the config file
    #[error("Failed to read loader config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("Failed to parse loader config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config parsed but is not usable
    #[error("Invalid loader config: {0}")]
    Validation(String),

    /// Referenced or inline import map is invalid
    #[error("Invalid import map: {0}")]
    ImportMap(#[from] ConfigError),
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct LoaderConfig {
    /// Referrer for top-level imports
    pub base: Url,

    /// JSON import map on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_map_file: Option<PathBuf>,

    /// Synthetic kinds the loader accepts
    #[serde(default = "default_module_types")]
    pub module_types: Vec<SyntheticKind>,

    /// Inline import map, applied after `import_map_file`
    #[serde(default, skip_serializing_if = "RawImportMap::is_empty")]
    pub import_map: RawImportMap,
}

fn default_module_types() -> Vec<SyntheticKind> {
    SyntheticKind::ALL.to_vec()
}

impl LoaderConfig {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            import_map_file: None,
            import_map: RawImportMap::new(),
            module_types: default_module_types(),
        }
    }

    /// Read configuration from a TOML file
    ///
    /// A relative `import-map-file` is taken relative to the config file's
    /// directory.
    pub fn from_file(path: &Path) -> Result<Self, LoaderConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;

        if let (Some(file), Some(dir)) = (&config.import_map_file, path.parent()) {
            if file.is_relative() {
                config.import_map_file = Some(dir.join(file));
            }
        }
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_str(content: &str) -> Result<Self, LoaderConfigError> {
        let config: LoaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LoaderConfigError> {
        if self.base.cannot_be_a_base() {
            return Err(LoaderConfigError::Validation(format!(
                "base '{}' cannot be used to resolve relative specifiers",
                self.base
            )));
        }

        for (index, kind) in self.module_types.iter().enumerate() {
            if self.module_types[..index].contains(kind) {
                return Err(LoaderConfigError::Validation(format!(
                    "module type '{}' listed more than once",
                    kind
                )));
            }
        }

        Ok(())
    }

    /// Normalize the configured import maps into one table
    pub fn import_map_table(&self) -> Result<ImportMapTable, ConfigError> {
        let table = match &self.import_map_file {
            Some(path) => ImportMapTable::normalize(&RawImportMap::from_file(path)?, &self.base)?,
            None => ImportMapTable::empty(),
        };
        if self.import_map.is_empty() {
            return Ok(table);
        }
        table.extend(&self.import_map, &self.base)
    }
}
