//! Instantiation
//!
//! Turns an identity into a declared record:
//! 1. A registration pre-seeded with `define` is used as is
//! 2. Otherwise the host retrieves the module
//! 3. Source text goes to the synthetic loader for tagged kinds, or to the
//!    host's dynamic execution for code
//! 4. The registration is declared against the record (hoisted exports land
//!    in the namespace here)

use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

use crate::context::ModuleContext;
use crate::error::{InstantiateError, InstantiateErrorKind};
use crate::host::{Fetched, Registrar};
use crate::id::{ModuleId, ModuleKind};
use crate::loader::LoaderInner;
use crate::record::LoadRecord;
use crate::registration::Registration;

pub(crate) async fn instantiate(
    loader: Weak<LoaderInner>,
    id: ModuleId,
    record: Weak<LoadRecord>,
) -> Result<(), InstantiateError> {
    let detached = || InstantiateError::new(&id, InstantiateErrorKind::Detached);
    let loader = loader.upgrade().ok_or_else(detached)?;
    let kind = record.upgrade().ok_or_else(detached)?.kind();

    debug!(module = %id, %kind, "instantiating");

    let registration = match loader.take_defined(&id) {
        Some(registration) => {
            trace!(module = %id, "using defined registration");
            registration
        }
        None => obtain(&loader, &id, kind)
            .await
            .inspect_err(|err| warn!(module = %id, error = %err.kind, "instantiation failed"))?,
    };

    let record = record.upgrade().ok_or_else(detached)?;
    let context = ModuleContext::new(id.clone(), Rc::downgrade(&loader));
    record.declare(registration, &context);

    debug!(
        module = %id,
        dependencies = record.dependencies().len(),
        hoisted = record.has_hoisted_exports(),
        "instantiated"
    );
    Ok(())
}

async fn obtain(loader: &LoaderInner, id: &ModuleId, kind: ModuleKind) -> Result<Registration, InstantiateError> {
    let synthetic = match kind {
        ModuleKind::Code => None,
        ModuleKind::Synthetic(tag) => Some(
            loader
                .synthetic_loader(tag)
                .ok_or_else(|| InstantiateError::new(id, InstantiateErrorKind::UnsupportedKind(tag)))?,
        ),
    };

    let source = match loader.host.fetch(id, kind).await {
        Ok(Fetched::Registration(registration)) => return Ok(registration),
        Ok(Fetched::Source(source)) => source,
        Err(err) => return Err(InstantiateError::new(id, err)),
    };

    if let Some(synthetic) = synthetic {
        let value = synthetic
            .synthesize(id, &source)
            .map_err(|err| InstantiateError::new(id, InstantiateErrorKind::Parse(err)))?;
        return Ok(Registration::synthetic(value));
    }

    let registrar = Registrar::new(id.clone());
    loader
        .host
        .evaluate(&source, id, &registrar)
        .map_err(|err| InstantiateError::new(id, InstantiateErrorKind::Parse(err)))?;

    registrar
        .take()
        .ok_or_else(|| InstantiateError::new(id, InstantiateErrorKind::NoRegistration))
}
