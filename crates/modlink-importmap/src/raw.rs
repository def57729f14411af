//! Raw (un-normalized) import maps
//!
//! The raw form is exactly what a host hands over: a JSON object with
//! optional `imports` and `scopes` members. Values are kept as JSON so that
//! normalization can report malformed entries precisely.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

use crate::table::ConfigError;

/// An import map as written by its author
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawImportMap {
    /// Top-level specifier map
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub imports: Map<String, Value>,

    /// Scope prefix -> specifier map
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub scopes: Map<String, Value>,
}

impl RawImportMap {
    /// Create an empty raw map
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw map from JSON text
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Read and parse a raw map from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Build a raw map from an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(ConfigError::Malformed(format!(
                    "import map must be a JSON object, found {}",
                    json_kind(&other)
                )))
            }
        };

        let imports = take_object(&mut object, "imports")?;
        let scopes = take_object(&mut object, "scopes")?;

        for key in object.keys() {
            debug!(member = %key, "ignoring unknown import map member");
        }

        Ok(Self { imports, scopes })
    }

    /// Add a top-level mapping
    pub fn with_import(mut self, key: impl Into<String>, address: impl Into<String>) -> Self {
        self.imports.insert(key.into(), Value::String(address.into()));
        self
    }

    /// Add a mapping inside a scope, creating the scope if needed
    pub fn with_scoped_import(
        mut self,
        scope: impl Into<String>,
        key: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        let entry = self
            .scopes
            .entry(scope.into())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = entry {
            map.insert(key.into(), Value::String(address.into()));
        }
        self
    }

    /// Whether the map has no entries at all
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.scopes.is_empty()
    }
}

fn take_object(object: &mut Map<String, Value>, member: &str) -> Result<Map<String, Value>, ConfigError> {
    match object.remove(member) {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(ConfigError::Malformed(format!(
            "\"{}\" must be a JSON object, found {}",
            member,
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
