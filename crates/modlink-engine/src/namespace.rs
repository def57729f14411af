//! Module namespaces
//!
//! A namespace is the live view of a module's exports. It only ever grows:
//! bindings are added or updated, never removed.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Value of an exported binding
pub type Value = serde_json::Value;

/// Shared handle to a module's exports
#[derive(Clone, Default)]
pub struct Namespace {
    bindings: Rc<RefCell<IndexMap<String, Value>>>,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of an export
    pub fn get(&self, name: &str) -> Option<Value> {
        self.bindings.borrow().get(name).cloned()
    }

    /// Whether an export exists
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    /// Export names in the order they were first exported
    pub fn keys(&self) -> Vec<String> {
        self.bindings.borrow().keys().cloned().collect()
    }

    /// Number of exports
    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    /// Whether nothing has been exported yet
    pub fn is_empty(&self) -> bool {
        self.bindings.borrow().is_empty()
    }

    /// Snapshot of all exports as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.bindings
                .borrow()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        )
    }

    /// Whether two handles refer to the same module's exports
    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Rc::ptr_eq(&self.bindings, &other.bindings)
    }

    /// Write a binding; returns whether anything changed
    pub(crate) fn set(&self, name: &str, value: Value) -> bool {
        let mut bindings = self.bindings.borrow_mut();
        match bindings.get(name) {
            Some(current) if *current == value => false,
            _ => {
                bindings.insert(name.to_string(), value);
                true
            }
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.bindings.borrow().iter()).finish()
    }
}
