//! Linking
//!
//! A record is linked once its own instantiation settled and every dependency
//! has been resolved, instantiated, and wired to this record's setters. Only
//! the dependencies' instantiation is awaited, never their linking, so cycles
//! cannot wait on themselves.

use futures::future::{self, FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

use crate::error::{LinkError, LoadError};
use crate::id::{Dependency, ModuleId};
use crate::loader::LoaderInner;
use crate::record::LoadRecord;

pub(crate) async fn link_record(loader: Weak<LoaderInner>, id: ModuleId, record: Weak<LoadRecord>) -> Result<(), LoadError> {
    let record = record.upgrade().ok_or_else(|| LoadError::Detached(id.clone()))?;
    record.instantiated().await?;

    let loader = loader.upgrade().ok_or_else(|| LoadError::Detached(id.clone()))?;
    let dependencies = record.dependencies();
    trace!(module = %id, count = dependencies.len(), "linking dependencies");

    let pending = dependencies
        .into_iter()
        .enumerate()
        .map(|(index, dependency)| link_dependency(&loader, &record, index, dependency));
    let records = future::try_join_all(pending).await?;

    record.set_dependency_records(records);
    Ok(())
}

async fn link_dependency(
    loader: &Rc<LoaderInner>,
    record: &Rc<LoadRecord>,
    index: usize,
    dependency: Dependency,
) -> Result<Rc<LoadRecord>, LoadError> {
    let wrap = |cause: LoadError| LoadError::Link(LinkError::wrap(record.id(), cause));

    let dep_id = loader
        .resolve(&dependency.specifier, Some(record.id()))
        .map_err(wrap)?;
    let dep = loader.get_or_create(dep_id, dependency.kind);
    dep.instantiated()
        .await
        .map_err(|err| wrap(LoadError::Instantiate(err)))?;

    if let Some(setter) = record.setter(index) {
        dep.add_importer_setter(setter.clone());
        // catch up on bindings exported during declaration
        if dep.has_hoisted_exports() {
            setter(&dep.namespace());
        }
    }
    Ok(dep)
}

/// Link every record reachable from `root`
///
/// A failure is reported against `root`, with the trail of importers that led
/// to the failing module.
pub(crate) async fn link_graph(root: &Rc<LoadRecord>) -> Result<(), LoadError> {
    let mut seen = FxHashSet::default();
    let mut discovered_by: FxHashMap<ModuleId, ModuleId> = FxHashMap::default();
    let mut pending = FuturesUnordered::new();

    seen.insert(root.id().clone());
    pending.push(await_linked(root.clone()));

    while let Some((record, result)) = pending.next().await {
        if let Err(err) = result {
            return Err(with_importer_trail(err, record.id(), &discovered_by));
        }
        for dep in record.dependency_records() {
            if seen.insert(dep.id().clone()) {
                discovered_by.insert(dep.id().clone(), record.id().clone());
                pending.push(await_linked(dep));
            }
        }
    }

    debug!(module = %root.id(), modules = seen.len(), "graph linked");
    Ok(())
}

fn await_linked(record: Rc<LoadRecord>) -> LocalBoxFuture<'static, (Rc<LoadRecord>, Result<(), LoadError>)> {
    async move {
        let result = record.linked().await;
        (record, result)
    }
    .boxed_local()
}

fn with_importer_trail(mut err: LoadError, failed: &ModuleId, discovered_by: &FxHashMap<ModuleId, ModuleId>) -> LoadError {
    let mut current = failed;
    while let Some(importer) = discovered_by.get(current) {
        err = LoadError::Link(LinkError::wrap(importer, err));
        current = importer;
    }
    err
}
