//! Load error types
//!
//! Every error here is `Clone`: instantiate, link, and completion handles are
//! memoized futures, and each waiter receives its own copy of the same
//! failure.

use modlink_importmap::ResolveError;
use thiserror::Error;

use crate::host::{FetchError, SourceError};
use crate::id::{ModuleId, SyntheticKind};

/// Why an instantiation failed
#[derive(Debug, Clone, Error)]
pub enum InstantiateErrorKind {
    /// Retrieval failed
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// Source could not be turned into a registration
    #[error("{0}")]
    Parse(SourceError),

    /// Host finished without registering anything for the module
    #[error("no registration produced")]
    NoRegistration,

    /// Module is tagged with a kind no synthetic loader handles
    #[error("no loader registered for module type '{0}'")]
    UnsupportedKind(SyntheticKind),

    /// Record was evicted or its loader dropped mid-instantiation
    #[error("module was evicted or its loader no longer exists")]
    Detached,
}

/// A module could not be instantiated; cached on the module's record
#[derive(Debug, Clone, Error)]
#[error("Failed to instantiate {id}: {kind}")]
pub struct InstantiateError {
    pub id: ModuleId,
    pub kind: InstantiateErrorKind,
}

impl InstantiateError {
    pub(crate) fn new(id: &ModuleId, kind: impl Into<InstantiateErrorKind>) -> Self {
        Self {
            id: id.clone(),
            kind: kind.into(),
        }
    }
}

/// A module threw (or its completion rejected) while executing
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionFailure {
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for ExecutionFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ExecutionFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Execution failure attributed to the module whose body failed
#[derive(Debug, Clone, Error)]
#[error("Execution of {id} failed: {failure}")]
pub struct ExecutionError {
    pub id: ModuleId,
    pub failure: ExecutionFailure,
}

/// A dependency failure seen from an importer
///
/// `trail` runs from `id` down to the identity that failed first.
#[derive(Debug, Clone, Error)]
#[error("Failed to link {id} (via {}): {cause}", format_trail(.trail))]
pub struct LinkError {
    pub id: ModuleId,
    pub trail: Vec<ModuleId>,
    pub cause: Box<LoadError>,
}

impl LinkError {
    /// Wrap `cause` as a failure of `id`, prepending `id` to the trail
    pub(crate) fn wrap(id: &ModuleId, cause: LoadError) -> Self {
        let mut trail = vec![id.clone()];
        trail.extend(cause.trail());
        Self {
            id: id.clone(),
            trail,
            cause: Box::new(cause),
        }
    }
}

fn format_trail(trail: &[ModuleId]) -> String {
    trail
        .iter()
        .map(ModuleId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Everything `import_module` can fail with
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Specifier could not be resolved to an identity
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Module could not be instantiated
    #[error(transparent)]
    Instantiate(#[from] InstantiateError),

    /// A dependency of the module failed
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Module body (or a dependency's body) failed
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Module context outlived its loader
    #[error("Module {0} belongs to a loader that no longer exists")]
    Detached(ModuleId),
}

impl LoadError {
    /// Identity the error is reported against, if any
    pub fn module(&self) -> Option<&ModuleId> {
        match self {
            LoadError::Resolve(_) => None,
            LoadError::Instantiate(err) => Some(&err.id),
            LoadError::Link(err) => Some(&err.id),
            LoadError::Execution(err) => Some(&err.id),
            LoadError::Detached(id) => Some(id),
        }
    }

    /// The first failure, with every link wrapper removed
    pub fn root_cause(&self) -> &LoadError {
        let mut current = self;
        while let LoadError::Link(link) = current {
            current = &link.cause;
        }
        current
    }

    /// Identities from this error's module down to the root cause
    pub fn trail(&self) -> Vec<ModuleId> {
        match self {
            LoadError::Link(err) => err.trail.clone(),
            LoadError::Resolve(_) => Vec::new(),
            other => other.module().cloned().into_iter().collect(),
        }
    }
}
