//! Module identities and kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use url::Url;

/// Canonical identity of a module: its absolute resolved location
///
/// Equality is by value; many specifiers may resolve to one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Rc<str>);

impl ModuleId {
    /// The identity as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identity as a location, used as referrer for its own imports
    pub fn to_url(&self) -> Option<Url> {
        Url::parse(&self.0).ok()
    }
}

impl From<Url> for ModuleId {
    fn from(url: Url) -> Self {
        Self(Rc::from(String::from(url)))
    }
}

impl From<&Url> for ModuleId {
    fn from(url: &Url) -> Self {
        Self(Rc::from(url.as_str()))
    }
}

impl FromStr for ModuleId {
    type Err = url::ParseError;

    /// Parse an absolute location into an identity
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Url::parse(s).map(Self::from)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content kinds handled by synthetic loaders instead of code evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntheticKind {
    /// JSON document, exported as the parsed value
    Json,
    /// Stylesheet, exported as text
    Css,
    /// Plain text
    Text,
}

impl SyntheticKind {
    /// All built-in kinds
    pub const ALL: [SyntheticKind; 3] = [SyntheticKind::Json, SyntheticKind::Css, SyntheticKind::Text];

    /// Tag name as written in import requests
    pub fn as_str(self) -> &'static str {
        match self {
            SyntheticKind::Json => "json",
            SyntheticKind::Css => "css",
            SyntheticKind::Text => "text",
        }
    }
}

impl fmt::Display for SyntheticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyntheticKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(SyntheticKind::Json),
            "css" => Ok(SyntheticKind::Css),
            "text" => Ok(SyntheticKind::Text),
            other => Err(format!("unknown module type '{}'", other)),
        }
    }
}

/// How a module's content becomes a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleKind {
    /// Code module registered through dynamic execution
    #[default]
    Code,
    /// Non-code content wrapped into a single `default` export
    Synthetic(SyntheticKind),
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Code => f.write_str("code"),
            ModuleKind::Synthetic(kind) => write!(f, "{}", kind),
        }
    }
}

/// A dependency as declared by a registration: specifier plus kind tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub specifier: String,
    pub kind: ModuleKind,
}

impl Dependency {
    /// A code dependency
    pub fn code(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            kind: ModuleKind::Code,
        }
    }

    /// A dependency tagged with a synthetic kind
    pub fn synthetic(specifier: impl Into<String>, kind: SyntheticKind) -> Self {
        Self {
            specifier: specifier.into(),
            kind: ModuleKind::Synthetic(kind),
        }
    }

    /// A JSON dependency
    pub fn json(specifier: impl Into<String>) -> Self {
        Self::synthetic(specifier, SyntheticKind::Json)
    }
}

impl From<&str> for Dependency {
    fn from(specifier: &str) -> Self {
        Self::code(specifier)
    }
}

impl From<String> for Dependency {
    fn from(specifier: String) -> Self {
        Self::code(specifier)
    }
}
