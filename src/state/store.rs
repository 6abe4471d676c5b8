//! StateStore - current value of every tracked device field
//!
//! Written only from the listener's message-handling path; read-through
//! access for the variable and feedback layers. Each `apply` holds the
//! write lock for the whole overwrite, so readers never see a partial update.

use super::types::{Field, FieldUpdate, FieldValue};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Full mapping from field to current value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    values: BTreeMap<Field, FieldValue>,
}

impl StatusSnapshot {
    fn defaults() -> Self {
        Self {
            values: Field::all()
                .iter()
                .map(|f| (*f, f.default_value()))
                .collect(),
        }
    }

    /// Value of a field; every tracked field is always present
    pub fn get(&self, field: Field) -> &FieldValue {
        // Snapshots are only built from `defaults()`, which covers every field
        &self.values[&field]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Field, &FieldValue)> {
        self.values.iter()
    }
}

/// Stores device status and hands out consistent snapshots
#[derive(Clone)]
pub struct StateStore {
    values: Arc<RwLock<StatusSnapshot>>,
}

impl StateStore {
    /// Create a store with every field at its default value
    pub fn new() -> Self {
        Self {
            values: Arc::new(RwLock::new(StatusSnapshot::defaults())),
        }
    }

    /// Reset all fields to their defaults
    pub fn initialize(&self) {
        *self.values.write() = StatusSnapshot::defaults();
    }

    /// Overwrite a field, returning whether the value changed
    pub fn apply(&self, update: &FieldUpdate) -> bool {
        let mut values = self.values.write();
        match values.values.insert(update.field, update.value.clone()) {
            Some(previous) => previous != update.value,
            None => true,
        }
    }

    pub fn read(&self, field: Field) -> FieldValue {
        self.values.read().get(field).clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.values.read().clone()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
