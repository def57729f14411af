//! Load registry
//!
//! Maps each module identity to its single load record. The registry belongs
//! to one loader; independent loaders never share records.

use rustc_hash::FxHashMap;
use std::rc::Rc;

use crate::id::ModuleId;
use crate::record::LoadRecord;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    records: FxHashMap<ModuleId, Rc<LoadRecord>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, id: &ModuleId) -> Option<Rc<LoadRecord>> {
        self.records.get(id).cloned()
    }

    pub(crate) fn contains(&self, id: &ModuleId) -> bool {
        self.records.contains_key(id)
    }

    /// Insert a record, returning the one it replaced
    pub(crate) fn insert(&mut self, record: Rc<LoadRecord>) -> Option<Rc<LoadRecord>> {
        self.records.insert(record.id().clone(), record)
    }

    pub(crate) fn remove(&mut self, id: &ModuleId) -> Option<Rc<LoadRecord>> {
        self.records.remove(id)
    }

    /// All identities, sorted for stable output
    pub(crate) fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.records.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
