//! Common utilities for engine integration tests.

#![allow(dead_code)]

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use modlink_engine::{
    Declaration, Dependency, Execution, FetchError, Fetched, Loader, ModuleHost, ModuleId, ModuleKind, Registrar,
    Registration, SourceError, Url, Value,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const BASE: &str = "https://example.com/";

/// Builds a fresh registration each time the module is fetched
pub type Factory = Rc<dyn Fn() -> Registration>;

/// Shared execution log
pub type Log = Rc<RefCell<Vec<String>>>;

enum Entry {
    Registration(Factory),
    Source(String),
}

#[derive(Default)]
struct HostState {
    modules: RefCell<HashMap<String, Entry>>,
    fetches: RefCell<HashMap<String, usize>>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
    log: Log,
}

/// In-memory host; clones share state so a test keeps a handle after
/// giving one to the loader
#[derive(Clone, Default)]
pub struct StubHost {
    state: Rc<HostState>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn base() -> Url {
    Url::parse(BASE).unwrap()
}

pub fn id(path: &str) -> ModuleId {
    base().join(path).unwrap().into()
}

impl StubHost {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    pub fn loader(&self) -> Loader {
        Loader::new(self.clone(), base())
    }

    /// Serve a registration for `path`
    pub fn module(&self, path: &str, factory: Factory) -> &Self {
        self.state
            .modules
            .borrow_mut()
            .insert(id(path).to_string(), Entry::Registration(factory));
        self
    }

    /// Serve source text for `path`
    ///
    /// Source is line based: `import <specifier>` declares a dependency,
    /// `export <name> = <json>` exports when the body runs. Anything else
    /// is a syntax error.
    pub fn source(&self, path: &str, text: &str) -> &Self {
        self.state
            .modules
            .borrow_mut()
            .insert(id(path).to_string(), Entry::Source(text.to_string()));
        self
    }

    /// Hold the next fetch of `path` until the returned sender fires
    pub fn gate(&self, path: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.gates.borrow_mut().insert(id(path).to_string(), rx);
        tx
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.state
            .fetches
            .borrow()
            .get(id(path).as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn log(&self) -> Log {
        self.state.log.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.log.borrow().clone()
    }

    /// Module that logs `name` when its body runs
    pub fn logged(&self, path: &str, name: &'static str, dependencies: &[&'static str]) -> &Self {
        self.module(path, logged(&self.log(), name, dependencies))
    }
}

pub fn logged(log: &Log, name: &'static str, dependencies: &[&'static str]) -> Factory {
    let log = log.clone();
    let dependencies = dependencies.to_vec();
    Rc::new(move || {
        let log = log.clone();
        Registration::new(dependencies.clone(), move |_, _| {
            Declaration::new().execute(move || {
                log.borrow_mut().push(name.to_string());
                Execution::done()
            })
        })
    })
}

impl ModuleHost for StubHost {
    fn fetch(&self, id: &ModuleId, _kind: ModuleKind) -> LocalBoxFuture<'static, Result<Fetched, FetchError>> {
        *self
            .state
            .fetches
            .borrow_mut()
            .entry(id.to_string())
            .or_default() += 1;

        let gate = self.state.gates.borrow_mut().remove(id.as_str());
        let fetched = match self.state.modules.borrow().get(id.as_str()) {
            Some(Entry::Registration(factory)) => Ok(Fetched::Registration(factory())),
            Some(Entry::Source(text)) => Ok(Fetched::Source(text.clone())),
            None => Err(FetchError::NotFound),
        };

        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            fetched
        }
        .boxed_local()
    }

    fn evaluate(&self, source: &str, id: &ModuleId, registrar: &Registrar) -> Result<(), SourceError> {
        if source.trim().is_empty() {
            return Ok(());
        }

        let mut dependencies = Vec::new();
        let mut exports: Vec<(String, Value)> = Vec::new();
        for (index, line) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(specifier) = line.strip_prefix("import ") {
                dependencies.push(Dependency::code(specifier.trim()));
            } else if let Some(rest) = line.strip_prefix("export ") {
                let (name, value) = rest
                    .split_once('=')
                    .ok_or_else(|| SourceError::at("expected '='", line_no, 8))?;
                let value = serde_json::from_str(value.trim())
                    .map_err(|e| SourceError::at(e.to_string(), line_no, e.column()))?;
                exports.push((name.trim().to_string(), value));
            } else {
                return Err(SourceError::at(format!("unexpected '{}'", line), line_no, 1));
            }
        }

        let log = self.log();
        let name = id.as_str().rsplit('/').next().unwrap_or_default().to_string();
        registrar.register(Registration::new(dependencies, move |exporter, _| {
            let exporter = exporter.clone();
            Declaration::new().execute(move || {
                exporter.export_all(exports);
                log.borrow_mut().push(name);
                Execution::done()
            })
        }));
        Ok(())
    }
}
