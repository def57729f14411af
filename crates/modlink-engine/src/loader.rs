//! Loader
//!
//! The public entry point. A loader owns one registry, one import map, and the
//! host it asks for module registrations. Importing a specifier:
//!
//! ```text
//! resolve -> get_or_create -> instantiate -> link (whole graph) -> execute -> namespace
//! ```

use futures::future::{self, FutureExt, LocalBoxFuture};
use modlink_importmap::{ConfigError, ImportMapTable, RawImportMap};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};
use url::Url;

use crate::config::{LoaderConfig, LoaderConfigError};
use crate::context::ModuleContext;
use crate::error::LoadError;
use crate::execute;
use crate::host::{JsonLoader, ModuleHost, SyntheticLoader, TextLoader};
use crate::id::{ModuleId, ModuleKind, SyntheticKind};
use crate::instantiate::instantiate;
use crate::link;
use crate::namespace::{Namespace, Value};
use crate::record::LoadRecord;
use crate::registration::Registration;
use crate::registry::Registry;

pub(crate) struct LoaderInner {
    base: Url,
    table: RefCell<Rc<ImportMapTable>>,
    registry: RefCell<Registry>,
    pub(crate) host: Rc<dyn ModuleHost>,
    synthetic: FxHashMap<SyntheticKind, Rc<dyn SyntheticLoader>>,
    defined: RefCell<FxHashMap<ModuleId, Registration>>,
}

impl LoaderInner {
    pub(crate) fn resolve(&self, specifier: &str, referrer: Option<&ModuleId>) -> Result<ModuleId, LoadError> {
        let referrer = referrer
            .and_then(ModuleId::to_url)
            .unwrap_or_else(|| self.base.clone());
        let table = self.table.borrow().clone();
        let resolved = modlink_importmap::resolve(specifier, &referrer, &table)?;
        Ok(ModuleId::from(resolved))
    }

    /// Existing record for `id`, or a new one whose instantiation starts on first poll
    ///
    /// Lookup and insertion happen without suspending, so concurrent importers
    /// of one identity always share one record.
    pub(crate) fn get_or_create(self: &Rc<Self>, id: ModuleId, kind: ModuleKind) -> Rc<LoadRecord> {
        if let Some(record) = self.registry.borrow().get(&id) {
            if record.kind() != kind {
                trace!(module = %id, existing = %record.kind(), requested = %kind, "kind differs from existing record");
            }
            return record;
        }

        let instantiate_loader = Rc::downgrade(self);
        let link_loader = Rc::downgrade(self);
        let instantiate_id = id.clone();
        let link_id = id.clone();
        let record = LoadRecord::new(
            id.clone(),
            kind,
            move |record| instantiate(instantiate_loader, instantiate_id, record).boxed_local(),
            move |record| link::link_record(link_loader, link_id, record).boxed_local(),
        );
        self.registry.borrow_mut().insert(record.clone());
        debug!(module = %id, %kind, "created load record");
        record
    }

    pub(crate) fn take_defined(&self, id: &ModuleId) -> Option<Registration> {
        self.defined.borrow_mut().remove(id)
    }

    pub(crate) fn synthetic_loader(&self, kind: SyntheticKind) -> Option<Rc<dyn SyntheticLoader>> {
        self.synthetic.get(&kind).cloned()
    }
}

/// Builds a [`Loader`]
pub struct LoaderBuilder {
    host: Rc<dyn ModuleHost>,
    base: Url,
    table: ImportMapTable,
    synthetic: FxHashMap<SyntheticKind, Rc<dyn SyntheticLoader>>,
}

impl LoaderBuilder {
    /// Builder with an empty import map and the built-in JSON, CSS, and text loaders
    pub fn new(host: impl ModuleHost + 'static, base: Url) -> Self {
        Self::with_host(Rc::new(host), base)
    }

    pub fn with_host(host: Rc<dyn ModuleHost>, base: Url) -> Self {
        let mut synthetic: FxHashMap<SyntheticKind, Rc<dyn SyntheticLoader>> = FxHashMap::default();
        synthetic.insert(SyntheticKind::Json, Rc::new(JsonLoader));
        synthetic.insert(SyntheticKind::Css, Rc::new(TextLoader));
        synthetic.insert(SyntheticKind::Text, Rc::new(TextLoader));
        Self {
            host,
            base,
            table: ImportMapTable::empty(),
            synthetic,
        }
    }

    pub fn import_map(mut self, table: ImportMapTable) -> Self {
        self.table = table;
        self
    }

    /// Register (or replace) the loader for a synthetic kind
    pub fn synthetic_loader(mut self, kind: SyntheticKind, loader: impl SyntheticLoader + 'static) -> Self {
        self.synthetic.insert(kind, Rc::new(loader));
        self
    }

    /// Disable a synthetic kind; imports tagged with it fail to instantiate
    pub fn without_synthetic(mut self, kind: SyntheticKind) -> Self {
        self.synthetic.remove(&kind);
        self
    }

    pub fn build(self) -> Loader {
        Loader {
            inner: Rc::new(LoaderInner {
                base: self.base,
                table: RefCell::new(Rc::new(self.table)),
                registry: RefCell::new(Registry::new()),
                host: self.host,
                synthetic: self.synthetic,
                defined: RefCell::new(FxHashMap::default()),
            }),
        }
    }
}

/// Module loader with its own registry and import map
#[derive(Clone)]
pub struct Loader {
    inner: Rc<LoaderInner>,
}

impl Loader {
    pub fn new(host: impl ModuleHost + 'static, base: Url) -> Self {
        LoaderBuilder::new(host, base).build()
    }

    pub fn builder(host: impl ModuleHost + 'static, base: Url) -> LoaderBuilder {
        LoaderBuilder::new(host, base)
    }

    /// Build a loader from configuration
    ///
    /// Synthetic kinds missing from `config.module_types` are disabled.
    pub fn from_config(config: &LoaderConfig, host: impl ModuleHost + 'static) -> Result<Self, LoaderConfigError> {
        config.validate()?;
        let table = config.import_map_table()?;
        let mut builder = LoaderBuilder::new(host, config.base.clone()).import_map(table);
        for kind in SyntheticKind::ALL {
            if !config.module_types.contains(&kind) {
                builder = builder.without_synthetic(kind);
            }
        }
        debug!(base = %config.base, module_types = ?config.module_types, "loader configured");
        Ok(builder.build())
    }

    pub(crate) fn from_inner(inner: Rc<LoaderInner>) -> Self {
        Self { inner }
    }

    /// Location used as referrer for top-level imports
    pub fn base(&self) -> &Url {
        &self.inner.base
    }

    /// The normalized import map currently in effect
    pub fn import_map(&self) -> Rc<ImportMapTable> {
        self.inner.table.borrow().clone()
    }

    /// Merge another import map into the current one
    ///
    /// Affects resolutions made after the call; modules already linked keep
    /// their resolved dependencies.
    pub fn extend_import_map(&self, raw: &RawImportMap) -> Result<(), ConfigError> {
        let extended = self.import_map().extend(raw, &self.inner.base)?;
        *self.inner.table.borrow_mut() = Rc::new(extended);
        debug!("import map extended");
        Ok(())
    }

    /// Resolve `specifier` against `referrer` (or the base location)
    pub fn resolve(&self, specifier: &str, referrer: Option<&ModuleId>) -> Result<ModuleId, LoadError> {
        self.inner.resolve(specifier, referrer)
    }

    /// Import a code module and wait for its namespace
    pub fn import_module(&self, specifier: &str, referrer: Option<&ModuleId>) -> LocalBoxFuture<'static, Result<Namespace, LoadError>> {
        self.import_kind(specifier, referrer, ModuleKind::Code)
    }

    /// Import with an explicit kind tag
    ///
    /// The record is looked up (or created) before the returned future is
    /// first polled.
    pub fn import_kind(
        &self,
        specifier: &str,
        referrer: Option<&ModuleId>,
        kind: ModuleKind,
    ) -> LocalBoxFuture<'static, Result<Namespace, LoadError>> {
        let id = match self.inner.resolve(specifier, referrer) {
            Ok(id) => id,
            Err(err) => {
                debug!(specifier, error = %err, "resolution failed");
                return future::ready(Err(err)).boxed_local();
            }
        };
        trace!(specifier, module = %id, "import");
        let record = self.inner.get_or_create(id, kind);
        let loader = self.inner.clone();
        async move {
            // keeps the registry alive while the import is pending
            let _loader = loader;
            link::link_graph(&record).await?;
            execute::run(&record).await
        }
        .boxed_local()
    }

    /// Context for code running as `referrer`
    pub fn create_context(&self, referrer: ModuleId) -> ModuleContext {
        ModuleContext::new(referrer, Rc::downgrade(&self.inner))
    }

    /// Pre-seed a registration; the next instantiation of `id` uses it instead of the host
    ///
    /// Has no effect on a record that already exists.
    pub fn define(&self, id: ModuleId, registration: Registration) {
        if self.inner.registry.borrow().contains(&id) {
            trace!(module = %id, "define ignored, record exists");
            return;
        }
        debug!(module = %id, "registration defined");
        self.inner.defined.borrow_mut().insert(id, registration);
    }

    /// Inject an already-executed module with the given bindings
    pub fn set<I, K>(&self, id: ModuleId, bindings: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let record = LoadRecord::settled(
            id.clone(),
            bindings.into_iter().map(|(name, value)| (name.into(), value)),
        );
        self.inner.defined.borrow_mut().remove(&id);
        if self.inner.registry.borrow_mut().insert(record).is_some() {
            debug!(module = %id, "replaced existing record");
        }
    }

    /// Namespace of a fully executed module
    pub fn get(&self, id: &ModuleId) -> Option<Namespace> {
        self.inner
            .registry
            .borrow()
            .get(id)
            .filter(|record| record.is_executed())
            .map(|record| record.namespace())
    }

    pub fn has(&self, id: &ModuleId) -> bool {
        self.inner.registry.borrow().contains(id)
    }

    /// Record for `id`, if one exists
    pub fn record(&self, id: &ModuleId) -> Option<Rc<LoadRecord>> {
        self.inner.registry.borrow().get(id)
    }

    /// Identities in the registry
    pub fn entries(&self) -> Vec<ModuleId> {
        self.inner.registry.borrow().ids()
    }

    /// Evict `id`; the next import instantiates it afresh
    ///
    /// Importers that already linked against the old record keep it.
    pub fn delete(&self, id: &ModuleId) -> bool {
        let removed = self.inner.registry.borrow_mut().remove(id).is_some();
        let undefined = self.inner.defined.borrow_mut().remove(id).is_some();
        if removed {
            debug!(module = %id, "record deleted");
        }
        removed || undefined
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("base", &self.inner.base.as_str())
            .field("modules", &self.inner.registry.borrow().len())
            .finish_non_exhaustive()
    }
}
