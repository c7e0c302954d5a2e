//! Factory snapshots and the persistence collaborator.
//!
//! The engine only produces and consumes [`FactorySnapshot`] values; how they
//! are encoded and where they live is up to the [`FactoryPersistence`]
//! implementation. Component ids survive a round trip because the snapshot
//! carries the slot map itself.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::component::Component;
use crate::error::PersistenceError;
use crate::id::ComponentId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorySnapshot {
    /// Also the storage id.
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub components: SlotMap<ComponentId, Component>,
    /// Insertion order of `components`.
    pub order: Vec<ComponentId>,
}

impl FactorySnapshot {
    /// Components in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &Component)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.components.get(id).map(|c| (id, c)))
    }

    pub fn component_by_name(&self, name: &str) -> Option<(ComponentId, &Component)> {
        self.iter().find(|(_, c)| c.name() == name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Reads and stores factory snapshots by id.
pub trait FactoryPersistence: Send + Sync {
    fn read(&self, id: &str) -> Result<FactorySnapshot, PersistenceError>;
    fn persist(&self, snapshot: &FactorySnapshot) -> Result<(), PersistenceError>;
    /// Returns `false` if nothing was stored under `id`.
    fn delete(&self, id: &str) -> Result<bool, PersistenceError>;
}

/// Keeps snapshots in memory. Useful for tests and short-lived runs.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    store: Mutex<BTreeMap<String, FactorySnapshot>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<String> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl FactoryPersistence for MemoryPersistence {
    fn read(&self, id: &str) -> Result<FactorySnapshot, PersistenceError> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }

    fn persist(&self, snapshot: &FactorySnapshot) -> Result<(), PersistenceError> {
        if snapshot.name.trim().is_empty() {
            return Err(PersistenceError::MissingId);
        }
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.name.clone(), snapshot.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        Ok(self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some())
    }
}
