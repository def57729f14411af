//! Host contracts
//!
//! The engine never retrieves or evaluates anything itself. A host supplies:
//! - Retrieval: identity -> source text or a ready registration
//! - Dynamic execution: source text -> a registration, reported through a
//!   [`Registrar`]
//! - Optional synthetic loaders for tagged content (JSON, CSS, text)

use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::id::{ModuleId, ModuleKind};
use crate::namespace::Value;
use crate::registration::Registration;

/// Retrieval failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Nothing exists at the location
    #[error("module not found")]
    NotFound,

    /// Retrieval itself failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Retrieved content is not what was asked for
    #[error("content mismatch: expected {expected}, got {found}")]
    ContentMismatch { expected: String, found: String },
}

/// Line/column inside module source (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source text could not be turned into a module
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}{}", describe_position(.position))]
pub struct SourceError {
    pub message: String,
    pub position: Option<SourcePosition>,
}

fn describe_position(position: &Option<SourcePosition>) -> String {
    position.map(|p| format!(" at {}", p)).unwrap_or_default()
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(SourcePosition { line, column }),
        }
    }
}

/// What retrieval produced
pub enum Fetched {
    /// Source text to hand to dynamic execution (or a synthetic loader)
    Source(String),
    /// A registration the host already has
    Registration(Registration),
}

impl fmt::Debug for Fetched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetched::Source(source) => f.debug_tuple("Source").field(&source.len()).finish(),
            Fetched::Registration(registration) => f.debug_tuple("Registration").field(registration).finish(),
        }
    }
}

/// Slot a host's dynamic execution registers into
///
/// One registrar exists per instantiation, so concurrent instantiations
/// never see each other's registrations.
pub struct Registrar {
    id: ModuleId,
    slot: RefCell<Option<Registration>>,
}

impl Registrar {
    pub(crate) fn new(id: ModuleId) -> Self {
        Self {
            id,
            slot: RefCell::new(None),
        }
    }

    /// Identity being instantiated
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Record the registration produced by evaluating the module
    ///
    /// If evaluation registers more than once, the last registration wins.
    pub fn register(&self, registration: Registration) {
        if self.slot.replace(Some(registration)).is_some() {
            debug!(module = %self.id, "replacing earlier registration");
        }
    }

    pub(crate) fn take(self) -> Option<Registration> {
        self.slot.into_inner()
    }
}

/// Loader callbacks supplied by the embedding runtime
pub trait ModuleHost {
    /// Retrieve the module at `id`
    fn fetch(&self, id: &ModuleId, kind: ModuleKind) -> LocalBoxFuture<'static, Result<Fetched, FetchError>>;

    /// Evaluate retrieved source for `id`, registering through `registrar`
    ///
    /// The default registers nothing, so source-only hosts fail with "no
    /// registration produced" until they override this.
    fn evaluate(&self, source: &str, id: &ModuleId, registrar: &Registrar) -> Result<(), SourceError> {
        let _ = (source, id, registrar);
        Ok(())
    }
}

/// Alternate loader for a synthetic kind: source text -> `default` export
pub trait SyntheticLoader {
    fn synthesize(&self, id: &ModuleId, source: &str) -> Result<Value, SourceError>;
}

/// Parses JSON documents
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLoader;

impl SyntheticLoader for JsonLoader {
    fn synthesize(&self, _id: &ModuleId, source: &str) -> Result<Value, SourceError> {
        serde_json::from_str(source).map_err(|e| SourceError::at(e.to_string(), e.line(), e.column()))
    }
}

/// Exports content verbatim as a string (stylesheets, plain text)
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

impl SyntheticLoader for TextLoader {
    fn synthesize(&self, _id: &ModuleId, source: &str) -> Result<Value, SourceError> {
        Ok(Value::String(source.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id() -> ModuleId {
        "https://example.com/data.json".parse().unwrap()
    }

    #[test]
    fn test_json_loader_parses() {
        let value = JsonLoader.synthesize(&id(), r#"{ "a": [1, 2] }"#).unwrap();
        assert_eq!(value, json!({ "a": [1, 2] }));
    }

    #[test]
    fn test_json_loader_reports_position() {
        let err = JsonLoader.synthesize(&id(), "{\n  \"a\": ,\n}").unwrap_err();
        let position = err.position.unwrap();
        assert_eq!(position.line, 2);
        assert!(err.to_string().contains(" at 2:"));
    }

    #[test]
    fn test_text_loader_keeps_content() {
        let value = TextLoader.synthesize(&id(), "body { color: red }").unwrap();
        assert_eq!(value, json!("body { color: red }"));
    }

    #[test]
    fn test_registrar_last_registration_wins() {
        let registrar = Registrar::new(id());
        registrar.register(Registration::new(["./a.js"], |_, _| crate::Declaration::new()));
        registrar.register(Registration::new(["./b.js", "./c.js"], |_, _| crate::Declaration::new()));

        let registration = registrar.take().unwrap();
        assert_eq!(registration.dependencies().len(), 2);
    }
}
