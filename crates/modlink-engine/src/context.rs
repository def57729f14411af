//! Module context
//!
//! Handed to every registration's `declare` so module code can resolve and
//! import relative to itself with the same import map as the loader.

use futures::future::{self, FutureExt, LocalBoxFuture};
use std::fmt;
use std::rc::Weak;

use crate::error::LoadError;
use crate::id::{ModuleId, ModuleKind};
use crate::loader::{Loader, LoaderInner};
use crate::namespace::Namespace;

#[derive(Clone)]
pub struct ModuleContext {
    id: ModuleId,
    loader: Weak<LoaderInner>,
}

impl ModuleContext {
    pub(crate) fn new(id: ModuleId, loader: Weak<LoaderInner>) -> Self {
        Self { id, loader }
    }

    /// Identity of the module this context belongs to (its `import.meta.url`)
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    fn loader(&self) -> Result<Loader, LoadError> {
        self.loader
            .upgrade()
            .map(Loader::from_inner)
            .ok_or_else(|| LoadError::Detached(self.id.clone()))
    }

    /// Resolve `specifier` as if imported by this module
    pub fn resolve(&self, specifier: &str) -> Result<ModuleId, LoadError> {
        self.loader()?.resolve(specifier, Some(&self.id))
    }

    /// Dynamically import `specifier` from this module
    pub fn import(&self, specifier: &str) -> LocalBoxFuture<'static, Result<Namespace, LoadError>> {
        self.import_kind(specifier, ModuleKind::Code)
    }

    /// Dynamically import `specifier` with an explicit kind tag
    pub fn import_kind(&self, specifier: &str, kind: ModuleKind) -> LocalBoxFuture<'static, Result<Namespace, LoadError>> {
        match self.loader() {
            Ok(loader) => loader.import_kind(specifier, Some(&self.id), kind),
            Err(err) => future::ready(Err(err)).boxed_local(),
        }
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext").field("id", &self.id).finish()
    }
}
