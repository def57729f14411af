//! Specifier classification
//!
//! A specifier is either URL-like (relative, absolute-path, or carrying a
//! scheme) or bare. Only bare specifiers depend on the import map to resolve.

use url::Url;

/// Whether a specifier is syntactically relative or absolute-path.
pub fn is_relative_like(specifier: &str) -> bool {
    specifier.starts_with('/')
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
}

/// Resolve a URL-like specifier against `base`.
///
/// Returns `None` for bare specifiers (`lodash`, `@org/pkg/util`), which
/// have no meaning without an import map entry.
pub fn resolve_url_like(specifier: &str, base: &Url) -> Option<Url> {
    if is_relative_like(specifier) {
        return base.join(specifier).ok();
    }
    Url::parse(specifier).ok()
}
