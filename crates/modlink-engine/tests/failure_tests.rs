//! Integration tests for failure handling
//!
//! Failures are attributed to the module that failed, carry the trail of
//! importers from the root, and are cached: nothing is retried or re-run.

mod common;

use common::{id, StubHost};
use futures::channel::oneshot;
use futures::executor::{block_on, LocalPool};
use futures::task::LocalSpawnExt;
use modlink_engine::{
    Declaration, Dependency, Execution, ExecutionFailure, FetchError, InstantiateErrorKind, LoadError, Loader, ModuleKind,
    RawImportMap, Registration, ResolveError, SyntheticKind,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn test_bare_specifier_without_mapping() {
    let host = StubHost::new();
    let loader = host.loader();

    let err = block_on(loader.import_module("lodash", None)).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Resolve(ResolveError::BareSpecifier { ref specifier, .. }) if specifier == "lodash"
    ));
    assert!(err.module().is_none());
}

#[test]
fn test_blocked_specifier() {
    let host = StubHost::new();
    let loader = host.loader();
    let raw = RawImportMap::from_json(r#"{ "imports": { "tracker": null } }"#).unwrap();
    loader.extend_import_map(&raw).unwrap();

    let err = block_on(loader.import_module("tracker", None)).unwrap_err();
    assert!(matches!(err, LoadError::Resolve(ResolveError::Blocked { .. })));
}

#[test]
fn test_missing_module_reports_trail() {
    let host = StubHost::new();
    host.logged("main.js", "main", &["./b.js"])
        .logged("b.js", "b", &["./missing.js"]);

    let loader = host.loader();
    let err = block_on(loader.import_module("./main.js", None)).unwrap_err();

    assert_eq!(err.module(), Some(&id("main.js")));
    assert_eq!(err.trail(), vec![id("main.js"), id("b.js"), id("missing.js")]);
    assert!(matches!(
        err.root_cause(),
        LoadError::Instantiate(inner) if matches!(inner.kind, InstantiateErrorKind::Fetch(FetchError::NotFound))
    ));
    assert!(host.executed().is_empty());
}

#[test]
fn test_unresolvable_dependency_fails_link() {
    let host = StubHost::new();
    host.logged("main.js", "main", &["left-pad"]);

    let loader = host.loader();
    let err = block_on(loader.import_module("./main.js", None)).unwrap_err();

    assert_eq!(err.trail(), vec![id("main.js")]);
    assert!(matches!(err.root_cause(), LoadError::Resolve(ResolveError::BareSpecifier { .. })));
}

#[test]
fn test_root_instantiation_failure_is_not_wrapped() {
    let host = StubHost::new();
    let loader = host.loader();

    let err = block_on(loader.import_module("./nowhere.js", None)).unwrap_err();
    assert!(matches!(err, LoadError::Instantiate(ref inner) if inner.id == id("nowhere.js")));
}

#[test]
fn test_instantiation_failure_is_memoized() {
    let host = StubHost::new();
    let release = host.gate("broken.js");
    let loader = host.loader();

    let failures = Rc::new(RefCell::new(Vec::new()));
    let mut pool = LocalPool::new();
    for _ in 0..5 {
        let import = loader.import_module("./broken.js", None);
        let failures = failures.clone();
        pool.spawner()
            .spawn_local(async move {
                if let Err(err) = import.await {
                    failures.borrow_mut().push(err.to_string());
                }
            })
            .unwrap();
    }

    pool.run_until_stalled();
    release.send(()).unwrap();
    pool.run();

    assert_eq!(failures.borrow().len(), 5);
    assert!(failures.borrow().iter().all(|message| *message == failures.borrow()[0]));
    assert_eq!(host.fetch_count("broken.js"), 1);

    // later callers see the cached failure too
    assert!(block_on(loader.import_module("./broken.js", None)).is_err());
    assert_eq!(host.fetch_count("broken.js"), 1);
}

#[test]
fn test_failed_dependency_shared_by_importers() {
    let host = StubHost::new();
    host.logged("a.js", "a", &["./gone.js"])
        .logged("b.js", "b", &["./gone.js"]);

    let loader = host.loader();
    let a = block_on(loader.import_module("./a.js", None)).unwrap_err();
    let b = block_on(loader.import_module("./b.js", None)).unwrap_err();

    assert_eq!(a.trail(), vec![id("a.js"), id("gone.js")]);
    assert_eq!(b.trail(), vec![id("b.js"), id("gone.js")]);
    assert_eq!(host.fetch_count("gone.js"), 1);
}

#[test]
fn test_execution_failure_is_sticky() {
    let host = StubHost::new();
    let runs = Rc::new(RefCell::new(0));

    let counter = runs.clone();
    host.module(
        "throws.js",
        Rc::new(move || {
            let counter = counter.clone();
            Registration::new(Vec::<Dependency>::new(), move |_, _| {
                Declaration::new().execute(move || {
                    *counter.borrow_mut() += 1;
                    Execution::fail("boom")
                })
            })
        }),
    )
    .logged("main.js", "main", &["./throws.js"])
    .logged("other.js", "other", &["./throws.js"]);

    let loader = host.loader();
    let first = block_on(loader.import_module("./main.js", None)).unwrap_err();
    let second = block_on(loader.import_module("./main.js", None)).unwrap_err();
    let third = block_on(loader.import_module("./other.js", None)).unwrap_err();

    for err in [&first, &second, &third] {
        assert!(matches!(
            err,
            LoadError::Execution(inner) if inner.id == id("throws.js") && inner.failure.message == "boom"
        ));
    }
    assert_eq!(*runs.borrow(), 1);
    assert!(host.executed().is_empty());

    let record = loader.record(&id("main.js")).unwrap();
    assert!(!record.is_executed());
    assert!(record.execution_error().is_some());
}

#[test]
fn test_suspended_failure_is_sticky() {
    let host = StubHost::new();
    host.module(
        "async-throws.js",
        Rc::new(|| {
            Registration::new(Vec::<Dependency>::new(), |_, _| {
                Declaration::new().execute(|| Execution::suspend(async { Err::<(), _>(ExecutionFailure::new("late failure")) }))
            })
        }),
    )
    .logged("main.js", "main", &["./async-throws.js"]);

    let loader = host.loader();
    let first = block_on(loader.import_module("./main.js", None)).unwrap_err();
    let second = block_on(loader.import_module("./async-throws.js", None)).unwrap_err();

    assert!(matches!(first, LoadError::Execution(ref inner) if inner.id == id("async-throws.js")));
    assert!(matches!(second, LoadError::Execution(ref inner) if inner.failure.message == "late failure"));
    assert!(host.executed().is_empty());
}

#[test]
fn test_json_parse_error_has_position() {
    let host = StubHost::new();
    host.source("bad.json", "{\n  \"a\": 1,\n  \"b\": \n}");

    let loader = host.loader();
    let err = block_on(loader.import_kind("./bad.json", None, ModuleKind::Synthetic(SyntheticKind::Json))).unwrap_err();

    let LoadError::Instantiate(inner) = err else {
        panic!("expected instantiate error");
    };
    let InstantiateErrorKind::Parse(source_error) = inner.kind else {
        panic!("expected parse error");
    };
    assert_eq!(source_error.position.unwrap().line, 4);
}

#[test]
fn test_source_syntax_error_has_position() {
    let host = StubHost::new();
    host.source("broken.js", "export ok = 1\nthis is not valid");

    let loader = host.loader();
    let err = block_on(loader.import_module("./broken.js", None)).unwrap_err();

    assert!(matches!(
        err,
        LoadError::Instantiate(ref inner)
            if matches!(&inner.kind, InstantiateErrorKind::Parse(e) if e.position.map(|p| p.line) == Some(2))
    ));
}

#[test]
fn test_source_without_registration() {
    let host = StubHost::new();
    host.source("empty.js", "");

    let loader = host.loader();
    let err = block_on(loader.import_module("./empty.js", None)).unwrap_err();

    assert!(matches!(
        err,
        LoadError::Instantiate(ref inner) if matches!(inner.kind, InstantiateErrorKind::NoRegistration)
    ));
}

#[test]
fn test_disabled_synthetic_kind() {
    let host = StubHost::new();
    host.source("theme.css", "body {}");

    let loader = Loader::builder(host.clone(), common::base())
        .without_synthetic(SyntheticKind::Css)
        .build();
    let err = block_on(loader.import_kind("./theme.css", None, ModuleKind::Synthetic(SyntheticKind::Css))).unwrap_err();

    assert!(matches!(
        err,
        LoadError::Instantiate(ref inner)
            if matches!(inner.kind, InstantiateErrorKind::UnsupportedKind(SyntheticKind::Css))
    ));
    assert_eq!(host.fetch_count("theme.css"), 0);
}

#[test]
fn test_failed_module_can_be_reloaded_after_delete() {
    let host = StubHost::new();
    let loader = host.loader();

    assert!(block_on(loader.import_module("./late.js", None)).is_err());

    host.logged("late.js", "late", &[]);
    assert!(loader.delete(&id("late.js")));
    block_on(loader.import_module("./late.js", None)).unwrap();

    assert_eq!(host.executed(), vec!["late"]);
    assert_eq!(host.fetch_count("late.js"), 2);
}

#[test]
fn test_failing_dependency_still_finishes_suspended_sibling() {
    let host = StubHost::new();
    let finished = Rc::new(Cell::new(false));

    let flag = finished.clone();
    host.module(
        "slow.js",
        Rc::new(move || {
            let flag = flag.clone();
            Registration::new(Vec::<Dependency>::new(), move |_, _| {
                Declaration::new().execute(move || {
                    Execution::suspend(async move {
                        flag.set(true);
                        Ok::<(), ExecutionFailure>(())
                    })
                })
            })
        }),
    )
    .module(
        "bad.js",
        Rc::new(|| {
            Registration::new(Vec::<Dependency>::new(), |_, _| {
                Declaration::new().execute(|| Execution::fail("boom"))
            })
        }),
    )
    .logged("main.js", "main", &["./slow.js", "./bad.js"]);

    let loader = host.loader();
    let err = block_on(loader.import_module("./main.js", None)).unwrap_err();

    assert!(matches!(
        err,
        LoadError::Execution(ref inner) if inner.id == id("bad.js") && inner.failure.message == "boom"
    ));
    assert!(finished.get());
    assert!(loader.record(&id("slow.js")).unwrap().is_executed());
    assert!(loader.get(&id("slow.js")).is_some());

    // the importer never ran and keeps the dependency's error
    assert!(host.executed().is_empty());
    let main = loader.record(&id("main.js")).unwrap();
    assert!(!main.is_executed());
    assert!(matches!(
        main.execution_error(),
        Some(LoadError::Execution(ref inner)) if inner.id == id("bad.js")
    ));
}

#[test]
fn test_suspended_failure_waits_for_slower_sibling() {
    let host = StubHost::new();
    let (release, gate) = oneshot::channel::<()>();
    let gate = Rc::new(RefCell::new(Some(gate)));
    let finished = Rc::new(Cell::new(false));

    let flag = finished.clone();
    host.module(
        "slow.js",
        Rc::new(move || {
            let gate = gate.clone();
            let flag = flag.clone();
            Registration::new(Vec::<Dependency>::new(), move |_, _| {
                Declaration::new().execute(move || {
                    let gate = gate.borrow_mut().take();
                    Execution::suspend(async move {
                        if let Some(gate) = gate {
                            let _ = gate.await;
                        }
                        flag.set(true);
                        Ok::<(), ExecutionFailure>(())
                    })
                })
            })
        }),
    )
    .module(
        "bad.js",
        Rc::new(|| {
            Registration::new(Vec::<Dependency>::new(), |_, _| {
                Declaration::new()
                    .execute(|| Execution::suspend(async { Err::<(), _>(ExecutionFailure::new("late boom")) }))
            })
        }),
    )
    .logged("main.js", "main", &["./slow.js", "./bad.js"]);

    let loader = host.loader();
    let outcome = Rc::new(RefCell::new(None));
    let mut pool = LocalPool::new();

    let import = loader.import_module("./main.js", None);
    let slot = outcome.clone();
    pool.spawner()
        .spawn_local(async move {
            *slot.borrow_mut() = Some(import.await);
        })
        .unwrap();

    pool.run_until_stalled();
    assert!(outcome.borrow().is_none());
    assert!(!finished.get());
    assert!(loader.record(&id("bad.js")).unwrap().execution_error().is_some());

    release.send(()).unwrap();
    pool.run_until_stalled();

    assert!(finished.get());
    assert!(loader.record(&id("slow.js")).unwrap().is_executed());
    assert!(host.executed().is_empty());

    let Some(Err(err)) = outcome.borrow_mut().take() else {
        panic!("import should have failed");
    };
    assert!(matches!(
        err,
        LoadError::Execution(ref inner) if inner.id == id("bad.js") && inner.failure.message == "late boom"
    ));
}
