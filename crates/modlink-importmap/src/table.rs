//! Normalized import map tables
//!
//! A table is built once from a raw map and a base location and never
//! mutated afterwards. Every specifier map keeps its keys ordered by length
//! (longest first) and then lexicographically, so the first prefix hit during
//! a scan is the longest one.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::raw::{json_kind, RawImportMap};
use crate::resolve::{resolve, ResolveError};
use crate::specifier::{is_relative_like, resolve_url_like};

/// Errors that make an import map unusable
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the map from disk
    #[error("Failed to read import map: {0}")]
    Io(#[from] std::io::Error),

    /// Map text is not valid JSON
    #[error("Failed to parse import map: {0}")]
    Json(#[from] serde_json::Error),

    /// Map has the wrong shape
    #[error("Malformed import map: {0}")]
    Malformed(String),

    /// A specifier key cannot be turned into a lookup key
    #[error("Unresolvable import map key: '{0}'")]
    UnresolvableKey(String),

    /// A scope prefix cannot be resolved against the base location
    #[error("Unresolvable scope prefix '{scope}' (base: {base})")]
    UnresolvableScope { scope: String, base: String },

    /// A mapping value is not a resolvable location
    #[error("Unresolvable address '{address}' for key '{key}'")]
    UnresolvableAddress { key: String, address: String },
}

/// Where a mapping entry points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Absolute location the key maps to
    Location(String),
    /// Key explicitly mapped to `null`; matching specifiers fail to resolve
    Blocked,
}

impl Target {
    fn to_json(&self) -> Value {
        match self {
            Target::Location(location) => Value::String(location.clone()),
            Target::Blocked => Value::Null,
        }
    }
}

/// Result of looking a key up in a specifier map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingMatch<'a> {
    /// The map key that matched
    pub key: &'a str,
    /// What the key maps to
    pub target: &'a Target,
    /// Part of the looked-up key after the matched prefix (empty on exact match)
    pub remainder: &'a str,
}

/// Normalized specifier -> target entries, longest key first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecifierMap {
    entries: Vec<(String, Target)>,
}

fn key_order(a: &str, b: &str) -> Ordering {
    b.len().cmp(&a.len()).then_with(|| a.cmp(b))
}

impl SpecifierMap {
    fn from_entries(entries: BTreeMap<String, Target>) -> Self {
        let mut entries: Vec<(String, Target)> = entries.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| key_order(a, b));
        Self { entries }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in lookup order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Target)> {
        self.entries.iter().map(|(key, target)| (key.as_str(), target))
    }

    /// Get the target of an exact key
    pub fn get(&self, key: &str) -> Option<&Target> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, target)| target)
    }

    /// Look a key up: exact match first, then the longest `/`-terminated prefix
    pub fn lookup<'a>(&'a self, key: &'a str) -> Option<MappingMatch<'a>> {
        if let Some((matched, target)) = self.entries.iter().find(|(candidate, _)| candidate == key) {
            return Some(MappingMatch {
                key: matched,
                target,
                remainder: "",
            });
        }

        self.entries
            .iter()
            .find(|(candidate, _)| candidate.ends_with('/') && key.starts_with(candidate.as_str()))
            .map(|(matched, target)| MappingMatch {
                key: matched,
                target,
                remainder: &key[matched.len()..],
            })
    }

    /// Entries of `self` overridden by entries of `other`
    fn merged(&self, other: &SpecifierMap) -> SpecifierMap {
        let mut entries: BTreeMap<String, Target> = self.entries.iter().cloned().collect();
        for (key, target) in &other.entries {
            entries.insert(key.clone(), target.clone());
        }
        Self::from_entries(entries)
    }

    fn to_json(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(key, target)| (key.clone(), target.to_json()))
            .collect()
    }
}

/// A normalized, immutable import map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportMapTable {
    imports: SpecifierMap,
    /// Scope prefix -> map, longest prefix first, prefixes unique
    scopes: Vec<(String, SpecifierMap)>,
}

impl ImportMapTable {
    /// A table with no mappings; every bare specifier fails to resolve
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalize a raw map against `base`
    ///
    /// Entries whose key ends in `/` but whose address does not are dropped
    /// with a warning. Anything else that cannot be normalized is an error.
    pub fn normalize(raw: &RawImportMap, base: &Url) -> Result<Self, ConfigError> {
        let imports = normalize_specifier_map(&raw.imports, base)?;

        let mut scopes: BTreeMap<String, SpecifierMap> = BTreeMap::new();
        for (prefix, map) in &raw.scopes {
            let scope = base.join(prefix).map_err(|_| ConfigError::UnresolvableScope {
                scope: prefix.clone(),
                base: base.to_string(),
            })?;
            let Value::Object(map) = map else {
                return Err(ConfigError::Malformed(format!(
                    "scope '{}' must map to an object, found {}",
                    prefix,
                    json_kind(map)
                )));
            };
            let normalized = normalize_specifier_map(map, base)?;
            let scope = String::from(scope);
            let merged = match scopes.remove(&scope) {
                Some(existing) => existing.merged(&normalized),
                None => normalized,
            };
            scopes.insert(scope, merged);
        }

        let mut scopes: Vec<(String, SpecifierMap)> = scopes.into_iter().collect();
        scopes.sort_by(|(a, _), (b, _)| key_order(a, b));

        Ok(Self { imports, scopes })
    }

    /// Parse and normalize a JSON import map
    pub fn from_json(text: &str, base: &Url) -> Result<Self, ConfigError> {
        Self::normalize(&RawImportMap::from_json(text)?, base)
    }

    /// Produce a new table with `raw` layered over this one
    ///
    /// Entries of the fragment override existing entries with the same key,
    /// scope by scope.
    pub fn extend(&self, raw: &RawImportMap, base: &Url) -> Result<Self, ConfigError> {
        let fragment = Self::normalize(raw, base)?;
        Ok(self.merged(&fragment))
    }

    fn merged(&self, other: &ImportMapTable) -> ImportMapTable {
        let imports = self.imports.merged(&other.imports);

        let mut scopes: BTreeMap<String, SpecifierMap> = self.scopes.iter().cloned().collect();
        for (prefix, map) in &other.scopes {
            let merged = match scopes.remove(prefix) {
                Some(existing) => existing.merged(map),
                None => map.clone(),
            };
            scopes.insert(prefix.clone(), merged);
        }
        let mut scopes: Vec<(String, SpecifierMap)> = scopes.into_iter().collect();
        scopes.sort_by(|(a, _), (b, _)| key_order(a, b));

        ImportMapTable { imports, scopes }
    }

    /// Top-level specifier map
    pub fn imports(&self) -> &SpecifierMap {
        &self.imports
    }

    /// All scopes, longest prefix first
    pub fn scopes(&self) -> impl Iterator<Item = (&str, &SpecifierMap)> {
        self.scopes.iter().map(|(prefix, map)| (prefix.as_str(), map))
    }

    /// Scopes whose prefix matches `referrer`, longest prefix first
    pub fn matching_scopes<'a>(&'a self, referrer: &'a str) -> impl Iterator<Item = &'a SpecifierMap> + 'a {
        self.scopes
            .iter()
            .filter(move |(prefix, _)| {
                referrer == prefix || (prefix.ends_with('/') && referrer.starts_with(prefix.as_str()))
            })
            .map(|(_, map)| map)
    }

    /// Resolve `specifier` imported from `referrer` with this table
    pub fn resolve(&self, specifier: &str, referrer: &Url) -> Result<Url, ResolveError> {
        resolve(specifier, referrer, self)
    }

    /// Convert back to the raw form; normalizing the result yields `self`
    pub fn to_raw(&self) -> RawImportMap {
        RawImportMap {
            imports: self.imports.to_json(),
            scopes: self
                .scopes
                .iter()
                .map(|(prefix, map)| (prefix.clone(), Value::Object(map.to_json())))
                .collect(),
        }
    }
}

impl Serialize for ImportMapTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_raw().serialize(serializer)
    }
}

fn normalize_key(key: &str, base: &Url) -> Result<String, ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::UnresolvableKey(key.to_string()));
    }
    if is_relative_like(key) {
        return resolve_url_like(key, base)
            .map(String::from)
            .ok_or_else(|| ConfigError::UnresolvableKey(key.to_string()));
    }
    Ok(resolve_url_like(key, base)
        .map(String::from)
        .unwrap_or_else(|| key.to_string()))
}

fn normalize_specifier_map(raw: &Map<String, Value>, base: &Url) -> Result<SpecifierMap, ConfigError> {
    let mut entries = BTreeMap::new();

    for (key, value) in raw {
        let normalized_key = normalize_key(key, base)?;

        let target = match value {
            Value::Null => Target::Blocked,
            Value::String(address) => {
                let location = resolve_url_like(address, base).ok_or_else(|| {
                    ConfigError::UnresolvableAddress {
                        key: key.clone(),
                        address: address.clone(),
                    }
                })?;
                Target::Location(location.into())
            }
            other => {
                return Err(ConfigError::Malformed(format!(
                    "value for '{}' must be a string or null, found {}",
                    key,
                    json_kind(other)
                )));
            }
        };

        if normalized_key.ends_with('/') {
            if let Target::Location(location) = &target {
                if !location.ends_with('/') {
                    warn!(
                        key = %key,
                        address = %location,
                        "dropping import map entry: key ends with '/' but address does not"
                    );
                    continue;
                }
            }
        }

        entries.insert(normalized_key, target);
    }

    Ok(SpecifierMap::from_entries(entries))
}
