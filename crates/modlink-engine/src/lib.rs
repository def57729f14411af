//! Modlink engine
//!
//! Loads module graphs described by registrations:
//! - Registry: one load record per resolved identity, owned by a [`Loader`]
//! - Instantiation: host retrieval, dynamic evaluation, synthetic modules
//! - Linking: concurrent dependency instantiation with live-binding setters
//! - Execution: post-order, exactly-once, cycle-safe, with suspending bodies
//!
//! The engine is single-threaded and executor-agnostic: every async operation
//! returns a local boxed future that any executor can drive.

mod context;
mod execute;
mod instantiate;
mod link;
mod registry;

pub mod config;
pub mod error;
pub mod host;
pub mod id;
pub mod loader;
pub mod namespace;
pub mod record;
pub mod registration;

pub use config::{LoaderConfig, LoaderConfigError};
pub use context::ModuleContext;
pub use error::{ExecutionError, ExecutionFailure, InstantiateError, InstantiateErrorKind, LinkError, LoadError};
pub use host::{
    FetchError, Fetched, JsonLoader, ModuleHost, Registrar, SourceError, SourcePosition, SyntheticLoader, TextLoader,
};
pub use id::{Dependency, ModuleId, ModuleKind, SyntheticKind};
pub use loader::{Loader, LoaderBuilder};
pub use namespace::{Namespace, Value};
pub use record::{Completion, Exporter, LoadRecord};
pub use registration::{Declaration, ExecuteFn, Execution, Registration, Setter};

pub use modlink_importmap::{ConfigError, ImportMapTable, RawImportMap, ResolveError, Url};
