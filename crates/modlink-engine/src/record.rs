//! Load records
//!
//! One record exists per module identity. It owns the module's namespace and
//! its memoized instantiate and link futures, and tracks execution state:
//!
//! ```text
//! NotStarted --take--> InProgress --settle--> Done
//!                                        \--> Failed (sticky)
//! ```

use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::trace;

use crate::context::ModuleContext;
use crate::error::{InstantiateError, LoadError};
use crate::id::{Dependency, ModuleId, ModuleKind};
use crate::namespace::{Namespace, Value};
use crate::registration::{ExecuteFn, Registration, Setter};

pub(crate) type InstantiateFuture = Shared<LocalBoxFuture<'static, Result<(), InstantiateError>>>;
pub(crate) type LinkFuture = Shared<LocalBoxFuture<'static, Result<(), LoadError>>>;

/// Handle that settles when a module (and everything it waited on) finished executing
pub type Completion = Shared<LocalBoxFuture<'static, Result<(), LoadError>>>;

#[derive(Default)]
enum ExecState {
    #[default]
    NotStarted,
    /// Body taken; completion present only if something suspended
    InProgress(Option<Completion>),
    Done,
    Failed(LoadError),
}

/// What the executor should do with a record it reached
pub(crate) enum ExecutionStep {
    /// First visit: run dependencies, then this body (if the module has one)
    Start(Option<ExecuteFn>),
    /// Already running; wait on the handle if there is one
    InFlight(Option<Completion>),
    Done,
    Failed(LoadError),
}

#[derive(Default)]
struct RecordState {
    dependencies: Vec<Dependency>,
    /// This module's setters, one slot per dependency
    setters: Vec<Option<Setter>>,
    dependency_records: Option<Vec<Rc<LoadRecord>>>,
    /// Importers' setters awaiting notification of this module's exports
    importer_setters: Vec<Setter>,
    has_hoisted_exports: bool,
    execute: Option<ExecuteFn>,
    exec: ExecState,
}

/// Bookkeeping for one module identity
pub struct LoadRecord {
    id: ModuleId,
    kind: ModuleKind,
    namespace: Namespace,
    instantiated: InstantiateFuture,
    linked: LinkFuture,
    state: RefCell<RecordState>,
}

impl LoadRecord {
    /// Create a record whose instantiate and link futures are built from a
    /// weak handle to the record itself
    pub(crate) fn new<I, L>(id: ModuleId, kind: ModuleKind, instantiate: I, link: L) -> Rc<Self>
    where
        I: FnOnce(Weak<LoadRecord>) -> LocalBoxFuture<'static, Result<(), InstantiateError>>,
        L: FnOnce(Weak<LoadRecord>) -> LocalBoxFuture<'static, Result<(), LoadError>>,
    {
        Rc::new_cyclic(|weak| Self {
            id,
            kind,
            namespace: Namespace::new(),
            instantiated: instantiate(weak.clone()).shared(),
            linked: link(weak.clone()).shared(),
            state: RefCell::new(RecordState::default()),
        })
    }

    /// A record for a module that is already executed, with the given exports
    pub(crate) fn settled(id: ModuleId, bindings: impl IntoIterator<Item = (String, Value)>) -> Rc<Self> {
        let record = Self::new(
            id,
            ModuleKind::Code,
            |_| future::ready(Ok(())).boxed_local(),
            |_| future::ready(Ok(())).boxed_local(),
        );
        {
            let mut state = record.state.borrow_mut();
            state.dependency_records = Some(Vec::new());
            state.has_hoisted_exports = true;
            state.exec = ExecState::Done;
        }
        for (name, value) in bindings {
            record.namespace.set(&name, value);
        }
        record
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Live handle to the module's exports
    pub fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    pub(crate) fn instantiated(&self) -> InstantiateFuture {
        self.instantiated.clone()
    }

    pub(crate) fn linked(&self) -> LinkFuture {
        self.linked.clone()
    }

    /// Run the registration's declare function and store what it produced
    ///
    /// No state borrow is held while `declare` runs, so hoisted exports made
    /// from inside it go straight through [`LoadRecord::export`].
    pub(crate) fn declare(self: &Rc<Self>, registration: Registration, context: &ModuleContext) {
        let (dependencies, declare) = registration.into_parts();
        let dependency_count = dependencies.len();
        self.state.borrow_mut().dependencies = dependencies;

        let exporter = Exporter {
            record: Rc::downgrade(self),
        };
        let declaration = declare(&exporter, context);

        let mut setters = declaration.setters;
        if setters.len() > dependency_count {
            trace!(module = %self.id, extra = setters.len() - dependency_count, "ignoring setters without a dependency");
        }
        setters.resize_with(dependency_count, || None);

        let mut state = self.state.borrow_mut();
        state.setters = setters;
        state.execute = declaration.execute;
    }

    /// Declared dependencies, in order
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.state.borrow().dependencies.clone()
    }

    pub(crate) fn setter(&self, index: usize) -> Option<Setter> {
        self.state.borrow().setters.get(index).cloned().flatten()
    }

    /// Identities of the linked dependencies (empty until linked)
    pub fn dependency_ids(&self) -> Vec<ModuleId> {
        self.dependency_records()
            .iter()
            .map(|record| record.id.clone())
            .collect()
    }

    pub(crate) fn dependency_records(&self) -> Vec<Rc<LoadRecord>> {
        self.state.borrow().dependency_records.clone().unwrap_or_default()
    }

    pub(crate) fn set_dependency_records(&self, records: Vec<Rc<LoadRecord>>) {
        let mut state = self.state.borrow_mut();
        debug_assert!(state.dependency_records.is_none(), "dependency records are set once");
        if state.dependency_records.is_none() {
            state.dependency_records = Some(records);
        }
    }

    pub fn has_hoisted_exports(&self) -> bool {
        self.state.borrow().has_hoisted_exports
    }

    /// Register an importer's setter; it is called on every later change
    pub(crate) fn add_importer_setter(&self, setter: Setter) {
        self.state.borrow_mut().importer_setters.push(setter);
    }

    /// Write bindings and notify importers if anything changed
    pub(crate) fn export(&self, bindings: impl IntoIterator<Item = (String, Value)>) {
        self.state.borrow_mut().has_hoisted_exports = true;

        let mut changed = false;
        for (name, value) in bindings {
            changed |= self.namespace.set(&name, value);
        }
        if changed {
            self.notify_importers();
        }
    }

    fn notify_importers(&self) {
        // setters may export (re-exports) or register new setters while running
        let setters = self.state.borrow().importer_setters.clone();
        trace!(module = %self.id, count = setters.len(), "notifying importers");
        for setter in setters {
            setter(&self.namespace);
        }
    }

    pub(crate) fn take_execution(&self) -> ExecutionStep {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        match &state.exec {
            ExecState::Failed(err) => ExecutionStep::Failed(err.clone()),
            ExecState::InProgress(completion) => ExecutionStep::InFlight(completion.clone()),
            ExecState::Done => ExecutionStep::Done,
            ExecState::NotStarted => {
                let execute = state.execute.take();
                state.exec = ExecState::InProgress(None);
                ExecutionStep::Start(execute)
            }
        }
    }

    /// Completion handle while in flight
    pub(crate) fn completion(&self) -> Option<Completion> {
        match &self.state.borrow().exec {
            ExecState::InProgress(completion) => completion.clone(),
            _ => None,
        }
    }

    pub(crate) fn set_completion(&self, completion: Completion) {
        let mut state = self.state.borrow_mut();
        if matches!(state.exec, ExecState::InProgress(_)) {
            state.exec = ExecState::InProgress(Some(completion));
        }
    }

    pub(crate) fn settle(&self, result: &Result<(), LoadError>) {
        let mut state = self.state.borrow_mut();
        state.execute = None;
        state.exec = match result {
            Ok(()) => ExecState::Done,
            Err(err) => ExecState::Failed(err.clone()),
        };
    }

    /// Whether the body ran to completion
    pub fn is_executed(&self) -> bool {
        matches!(self.state.borrow().exec, ExecState::Done)
    }

    /// The sticky execution error, if execution failed
    pub fn execution_error(&self) -> Option<LoadError> {
        match &self.state.borrow().exec {
            ExecState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for LoadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Handed to `declare`; writes the module's exports
#[derive(Clone)]
pub struct Exporter {
    record: Weak<LoadRecord>,
}

impl Exporter {
    /// Export one binding, returning the value (like an assignment expression)
    pub fn export(&self, name: &str, value: impl Into<Value>) -> Value {
        let value = value.into();
        if let Some(record) = self.record.upgrade() {
            record.export([(name.to_string(), value.clone())]);
        }
        value
    }

    /// Export several bindings with a single importer notification
    pub fn export_all<I, K>(&self, bindings: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        if let Some(record) = self.record.upgrade() {
            record.export(bindings.into_iter().map(|(name, value)| (name.into(), value)));
        }
    }

    /// Identity of the exporting module
    pub fn module(&self) -> Option<ModuleId> {
        self.record.upgrade().map(|record| record.id.clone())
    }
}
