//! Post-order execution
//!
//! Dependencies run before their importers, in declaration order. Each body
//! runs at most once. A module already on the current path (a cycle) is
//! skipped; one suspended elsewhere hands back its completion handle so the
//! importer can wait on it. A failed dependency stops its importer, but
//! siblings that already started are still awaited before the failure is
//! reported.

use futures::future::{self, FutureExt, LocalBoxFuture};
use rustc_hash::FxHashSet;
use std::rc::Rc;
use tracing::{trace, warn};

use crate::error::{ExecutionError, ExecutionFailure, LoadError};
use crate::id::ModuleId;
use crate::namespace::Namespace;
use crate::record::{Completion, ExecutionStep, LoadRecord};
use crate::registration::{ExecuteFn, Execution};

enum Body {
    Finished(Result<(), LoadError>),
    Suspended(LocalBoxFuture<'static, Result<(), LoadError>>),
}

/// Execute the linked graph under `root` and return its namespace
pub(crate) async fn run(root: &Rc<LoadRecord>) -> Result<Namespace, LoadError> {
    let mut seen = FxHashSet::default();
    if let Some(completion) = execute(root, &mut seen)? {
        completion.await?;
    }
    Ok(root.namespace())
}

/// Execute `record` after its dependencies
///
/// Returns a completion handle when something in the subtree suspended; `None`
/// means everything already finished synchronously.
pub(crate) fn execute(record: &Rc<LoadRecord>, seen: &mut FxHashSet<ModuleId>) -> Result<Option<Completion>, LoadError> {
    if !seen.insert(record.id().clone()) {
        return Ok(record.completion());
    }

    let execute = match record.take_execution() {
        ExecutionStep::Failed(err) => return Err(err),
        ExecutionStep::InFlight(completion) => return Ok(completion),
        ExecutionStep::Done => return Ok(None),
        ExecutionStep::Start(execute) => execute,
    };

    let mut waiting = Vec::new();
    for dep in record.dependency_records() {
        match self::execute(&dep, seen) {
            Ok(Some(completion)) => waiting.push(completion),
            Ok(None) => {}
            Err(err) if waiting.is_empty() => {
                record.settle(&Err(err.clone()));
                return Err(err);
            }
            Err(err) => {
                // started siblings still have to be driven to the end
                trace!(module = %record.id(), waiting = waiting.len(), "dependency failed, draining siblings");
                let drained = drain(waiting, Some(err));
                return Ok(Some(complete_after(record, drained, future::ready(Ok(())).boxed_local())));
            }
        }
    }

    if waiting.is_empty() {
        trace!(module = %record.id(), "executing");
        return match run_body(record.id(), execute) {
            Body::Finished(result) => {
                settle(record, &result);
                result.map(|()| None)
            }
            Body::Suspended(body) => Ok(Some(complete_after(record, future::ready(Ok(())).boxed_local(), body))),
        };
    }

    trace!(module = %record.id(), waiting = waiting.len(), "waiting on dependencies");
    let id = record.id().clone();
    let deferred = async move {
        trace!(module = %id, "executing");
        match run_body(&id, execute) {
            Body::Finished(result) => result,
            Body::Suspended(body) => body.await,
        }
    }
    .boxed_local();
    Ok(Some(complete_after(record, drain(waiting, None), deferred)))
}

/// Wait for every completion, then report `failed` or the first error in
/// dependency order
fn drain(waiting: Vec<Completion>, failed: Option<LoadError>) -> LocalBoxFuture<'static, Result<(), LoadError>> {
    future::join_all(waiting)
        .map(move |results| match failed {
            Some(err) => Err(err),
            None => results.into_iter().collect(),
        })
        .boxed_local()
}

fn run_body(id: &ModuleId, execute: Option<ExecuteFn>) -> Body {
    let Some(execute) = execute else {
        return Body::Finished(Ok(()));
    };
    let fail = {
        let id = id.clone();
        move |failure: ExecutionFailure| LoadError::Execution(ExecutionError { id, failure })
    };
    match execute() {
        Execution::Complete(result) => Body::Finished(result.map_err(fail)),
        Execution::Suspended(body) => Body::Suspended(async move { body.await.map_err(fail) }.boxed_local()),
    }
}

/// Build the record's completion handle: wait on `before`, then `body`, then settle
fn complete_after(
    record: &Rc<LoadRecord>,
    before: LocalBoxFuture<'static, Result<(), LoadError>>,
    body: LocalBoxFuture<'static, Result<(), LoadError>>,
) -> Completion {
    let weak = Rc::downgrade(record);
    let completion = async move {
        let result = match before.await {
            Ok(()) => body.await,
            Err(err) => Err(err),
        };
        if let Some(record) = weak.upgrade() {
            settle(&record, &result);
        }
        result
    }
    .boxed_local()
    .shared();
    record.set_completion(completion.clone());
    completion
}

fn settle(record: &LoadRecord, result: &Result<(), LoadError>) {
    if let Err(err) = result {
        warn!(module = %record.id(), error = %err, "execution failed");
    }
    record.settle(result);
}
