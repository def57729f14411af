//! Modlink import maps
//!
//! This crate turns raw import maps into normalized, queryable tables and
//! resolves import specifiers against them:
//! - Raw map model (`imports` + `scopes`) read from JSON or any serde source
//! - Normalization against a base location, with longest-prefix ordering
//! - Extension with new fragments (producing a new table)
//! - Specifier resolution with scoped overrides and blocked entries

pub mod raw;
pub mod resolve;
pub mod specifier;
pub mod table;

pub use raw::RawImportMap;
pub use resolve::{resolve, ResolveError};
pub use specifier::{is_relative_like, resolve_url_like};
pub use table::{ConfigError, ImportMapTable, MappingMatch, SpecifierMap, Target};

/// Re-exported so callers can build base locations without a direct `url` dependency.
pub use url::Url;
