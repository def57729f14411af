//! Specifier resolution
//!
//! Resolution order for `specifier` imported from `referrer`:
//! 1. URL-like specifiers are resolved against the referrer first; the
//!    result is both the lookup key and the fallback location
//! 2. Scopes matching the referrer, longest prefix first
//! 3. The top-level `imports` map
//! 4. The location from step 1, or a bare-specifier error

use thiserror::Error;
use tracing::trace;
use url::Url;

use crate::specifier::resolve_url_like;
use crate::table::{ImportMapTable, MappingMatch, Target};

/// Errors that can occur while resolving a specifier
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Bare specifier with no import map entry
    #[error("Unable to resolve bare specifier '{specifier}' from {referrer}")]
    BareSpecifier { specifier: String, referrer: String },

    /// Specifier matched an entry mapped to `null`
    #[error("Import of '{specifier}' from {referrer} is blocked by the import map")]
    Blocked { specifier: String, referrer: String },

    /// Mapping produced something that is not a location under its address
    #[error("Import map entry '{key}' maps '{specifier}' to invalid location '{target}'")]
    InvalidTarget {
        specifier: String,
        key: String,
        target: String,
    },
}

/// Resolve `specifier` imported from `referrer` using `table`
pub fn resolve(specifier: &str, referrer: &Url, table: &ImportMapTable) -> Result<Url, ResolveError> {
    let located = resolve_url_like(specifier, referrer);
    let key = located.as_ref().map(Url::as_str).unwrap_or(specifier);

    let matched = table
        .matching_scopes(referrer.as_str())
        .find_map(|scope| scope.lookup(key))
        .or_else(|| table.imports().lookup(key));

    let resolved = match matched {
        Some(matched) => apply(matched, specifier, referrer)?,
        None => located.ok_or_else(|| ResolveError::BareSpecifier {
            specifier: specifier.to_string(),
            referrer: referrer.to_string(),
        })?,
    };

    trace!(specifier, referrer = %referrer, location = %resolved, "resolved specifier");
    Ok(resolved)
}

fn apply(matched: MappingMatch<'_>, specifier: &str, referrer: &Url) -> Result<Url, ResolveError> {
    let address = match matched.target {
        Target::Location(address) => address,
        Target::Blocked => {
            return Err(ResolveError::Blocked {
                specifier: specifier.to_string(),
                referrer: referrer.to_string(),
            });
        }
    };

    let target = format!("{}{}", address, matched.remainder);
    let invalid = || ResolveError::InvalidTarget {
        specifier: specifier.to_string(),
        key: matched.key.to_string(),
        target: target.clone(),
    };

    let url = Url::parse(&target).map_err(|_| invalid())?;
    // "pkg/../../x" must not escape the mapped package
    if !url.as_str().starts_with(address.as_str()) {
        return Err(invalid());
    }
    Ok(url)
}
