//! Registrations
//!
//! A registration is what a module's code produces once evaluated: the
//! dependencies it imports and a `declare` function. Declaring hands the
//! module its exporter and context and yields one setter slot per dependency
//! plus the execution function for the module body.

use futures::future::{FutureExt, LocalBoxFuture};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use crate::context::ModuleContext;
use crate::error::ExecutionFailure;
use crate::id::Dependency;
use crate::namespace::{Namespace, Value};
use crate::record::Exporter;

/// Receives a dependency's namespace whenever its bindings change
pub type Setter = Rc<dyn Fn(&Namespace)>;

/// Module body; runs at most once
pub type ExecuteFn = Box<dyn FnOnce() -> Execution>;

pub(crate) type DeclareFn = Box<dyn FnOnce(&Exporter, &ModuleContext) -> Declaration>;

/// Outcome of invoking a module body
pub enum Execution {
    /// Body ran to completion synchronously
    Complete(Result<(), ExecutionFailure>),
    /// Body suspended; the future settles when it finishes
    Suspended(LocalBoxFuture<'static, Result<(), ExecutionFailure>>),
}

impl Execution {
    /// Body finished successfully
    pub fn done() -> Self {
        Execution::Complete(Ok(()))
    }

    /// Body threw
    pub fn fail(failure: impl Into<ExecutionFailure>) -> Self {
        Execution::Complete(Err(failure.into()))
    }

    /// Body continues asynchronously
    pub fn suspend<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), ExecutionFailure>> + 'static,
    {
        Execution::Suspended(future.boxed_local())
    }
}

impl From<Result<(), ExecutionFailure>> for Execution {
    fn from(result: Result<(), ExecutionFailure>) -> Self {
        Execution::Complete(result)
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Execution::Complete(result) => f.debug_tuple("Complete").field(result).finish(),
            Execution::Suspended(_) => f.write_str("Suspended(..)"),
        }
    }
}

/// What `declare` returns: setter slots and the module body
#[derive(Default)]
pub struct Declaration {
    pub(crate) setters: Vec<Option<Setter>>,
    pub(crate) execute: Option<ExecuteFn>,
}

impl Declaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the setter for the next dependency
    pub fn setter(mut self, setter: impl Fn(&Namespace) + 'static) -> Self {
        self.setters.push(Some(Rc::new(setter)));
        self
    }

    /// Leave the next dependency without a setter
    pub fn no_setter(mut self) -> Self {
        self.setters.push(None);
        self
    }

    /// Set the module body
    pub fn execute(mut self, execute: impl FnOnce() -> Execution + 'static) -> Self {
        self.execute = Some(Box::new(execute));
        self
    }
}

/// A module's registration
pub struct Registration {
    dependencies: Vec<Dependency>,
    declare: DeclareFn,
}

impl Registration {
    /// Create a registration from its dependency list and declare function
    pub fn new<I, D, F>(dependencies: I, declare: F) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dependency>,
        F: FnOnce(&Exporter, &ModuleContext) -> Declaration + 'static,
    {
        Self {
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            declare: Box::new(declare),
        }
    }

    /// No-dependency registration exporting `value` as `default` when executed
    pub fn synthetic(value: Value) -> Self {
        Self::new(Vec::<Dependency>::new(), move |exports, _| {
            let exports = exports.clone();
            Declaration::new().execute(move || {
                exports.export("default", value);
                Execution::done()
            })
        })
    }

    /// Declared dependencies, in order
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub(crate) fn into_parts(self) -> (Vec<Dependency>, DeclareFn) {
        (self.dependencies, self.declare)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
