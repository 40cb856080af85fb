//! The service registry
//!
//! A fixed-capacity generational arena of service slots with secondary
//! indices by label, endpoint, and pid. Freed cells bump their
//! generation, so a stale [`SlotId`] held across a free (or a reuse)
//! fails to resolve instead of aliasing the new occupant.
//!
//! The label index tracks which instance currently *owns* a label:
//! during a restart handover, the retiring instance keeps the label
//! until the replacement is activated.

use crate::slot::ServiceSlot;
use core_types::{Endpoint, Pid, SlotId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Registry allocation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Every cell is occupied
    #[error("no free service slot")]
    Full,
}

struct Cell {
    generation: u32,
    slot: Option<ServiceSlot>,
}

/// Fixed-capacity arena of service slots
pub struct Registry {
    cells: Vec<Cell>,
    by_label: HashMap<String, SlotId>,
    by_endpoint: HashMap<Endpoint, SlotId>,
    by_pid: HashMap<Pid, SlotId>,
    in_use: usize,
}

impl Registry {
    /// Creates a registry with `capacity` cells
    pub fn with_capacity(capacity: usize) -> Self {
        let mut cells = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            cells.push(Cell {
                generation: 0,
                slot: None,
            });
        }
        Self {
            cells,
            by_label: HashMap::new(),
            by_endpoint: HashMap::new(),
            by_pid: HashMap::new(),
            in_use: 0,
        }
    }

    /// Places a slot into the first free cell
    ///
    /// The label index is not touched; the caller claims the label with
    /// [`bind_label`] once the slot should own it.
    ///
    /// [`bind_label`]: Registry::bind_label
    pub fn alloc(&mut self, slot: ServiceSlot) -> Result<SlotId, RegistryError> {
        let index = self
            .cells
            .iter()
            .position(|c| c.slot.is_none())
            .ok_or(RegistryError::Full)?;
        let cell = &mut self.cells[index];
        cell.slot = Some(slot);
        self.in_use += 1;
        Ok(SlotId::new(index as u32, cell.generation))
    }

    /// Removes a slot, bumping the cell generation
    ///
    /// All index entries pointing at this slot are dropped; the label
    /// entry only if this slot owns it.
    pub fn free(&mut self, id: SlotId) -> Option<ServiceSlot> {
        let cell = self.cells.get_mut(id.index() as usize)?;
        if cell.generation != id.generation() || cell.slot.is_none() {
            return None;
        }
        let slot = cell.slot.take()?;
        cell.generation = cell.generation.wrapping_add(1);
        self.in_use -= 1;

        if self.by_label.get(slot.label.as_str()) == Some(&id) {
            self.by_label.remove(slot.label.as_str());
        }
        if let Some(endpoint) = slot.endpoint {
            if self.by_endpoint.get(&endpoint) == Some(&id) {
                self.by_endpoint.remove(&endpoint);
            }
        }
        if let Some(pid) = slot.pid {
            if self.by_pid.get(&pid) == Some(&id) {
                self.by_pid.remove(&pid);
            }
        }
        Some(slot)
    }

    /// Resolves a slot id, failing on a stale generation
    pub fn get(&self, id: SlotId) -> Option<&ServiceSlot> {
        let cell = self.cells.get(id.index() as usize)?;
        if cell.generation != id.generation() {
            return None;
        }
        cell.slot.as_ref()
    }

    /// Mutable variant of [`get`]
    ///
    /// [`get`]: Registry::get
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut ServiceSlot> {
        let cell = self.cells.get_mut(id.index() as usize)?;
        if cell.generation != id.generation() {
            return None;
        }
        cell.slot.as_mut()
    }

    /// Records the process identity of a slot and indexes it
    pub fn set_identity(&mut self, id: SlotId, pid: Pid, endpoint: Endpoint) {
        if let Some(slot) = self.get_mut(id) {
            slot.pid = Some(pid);
            slot.endpoint = Some(endpoint);
            self.by_pid.insert(pid, id);
            self.by_endpoint.insert(endpoint, id);
        }
    }

    /// Claims the slot's label for it
    ///
    /// Fails silently if the slot is stale; overwrites an existing
    /// owner, so callers check for duplicates first where that matters.
    pub fn bind_label(&mut self, id: SlotId) {
        if let Some(slot) = self.get(id) {
            let label = slot.label.as_str().to_string();
            self.by_label.insert(label, id);
        }
    }

    /// Returns the slot currently owning a label
    pub fn lookup_by_label(&self, label: &str) -> Option<SlotId> {
        self.by_label.get(label).copied()
    }

    /// Returns the slot a process endpoint belongs to
    pub fn lookup_by_endpoint(&self, endpoint: Endpoint) -> Option<SlotId> {
        self.by_endpoint.get(&endpoint).copied()
    }

    /// Returns the slot a process id belongs to
    pub fn lookup_by_pid(&self, pid: Pid) -> Option<SlotId> {
        self.by_pid.get(&pid).copied()
    }

    /// Returns the ids of all in-use slots, in registry order
    pub fn ids_in_order(&self) -> Vec<SlotId> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.slot.is_some())
            .map(|(i, c)| SlotId::new(i as u32, c.generation))
            .collect()
    }

    /// Number of in-use slots
    pub fn len(&self) -> usize {
        self.in_use
    }

    /// True when no slot is in use
    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    /// Total number of cells
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Serializable snapshot of the full supervision table
    pub fn service_table(&self) -> Vec<SlotSummary> {
        self.cells
            .iter()
            .filter_map(|c| c.slot.as_ref())
            .map(SlotSummary::from_slot)
            .collect()
    }

    /// Serializable snapshot of the public identity table
    pub fn public_table(&self) -> Vec<PublicEntry> {
        self.cells
            .iter()
            .filter_map(|c| c.slot.as_ref())
            .map(|s| PublicEntry {
                label: s.label.as_str().to_string(),
                endpoint: s.endpoint,
            })
            .collect()
    }
}

/// One row of the supervision table, as copied out to info callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub label: String,
    pub endpoint: Option<Endpoint>,
    pub pid: Option<u32>,
    pub initializing: bool,
    pub exiting: bool,
    pub terminated: bool,
    pub updating: bool,
    pub period: u64,
    pub backoff: u64,
    pub restarts: u32,
}

impl SlotSummary {
    fn from_slot(slot: &ServiceSlot) -> Self {
        Self {
            label: slot.label.as_str().to_string(),
            endpoint: slot.endpoint,
            pid: slot.pid.map(|p| p.as_raw()),
            initializing: slot.flags.is_initializing(),
            exiting: slot.flags.is_exiting(),
            terminated: slot.flags.is_terminated(),
            updating: slot.flags.is_updating(),
            period: slot.period.as_raw(),
            backoff: slot.backoff,
            restarts: slot.restarts,
        }
    }
}

/// One row of the public identity table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicEntry {
    pub label: String,
    pub endpoint: Option<Endpoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ServiceLabel;
    use ipc::StartParams;

    fn slot(label: &str) -> ServiceSlot {
        let params = StartParams::new(label, "/sbin/test");
        ServiceSlot::from_params(ServiceLabel::new(label).unwrap(), &params)
    }

    #[test]
    fn test_alloc_free_and_capacity() {
        let mut reg = Registry::with_capacity(2);
        let a = reg.alloc(slot("aa")).unwrap();
        let b = reg.alloc(slot("bb")).unwrap();
        assert_eq!(reg.alloc(slot("cc")), Err(RegistryError::Full));
        assert_eq!(reg.len(), 2);

        reg.free(a).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.get(b).is_some());
    }

    #[test]
    fn test_stale_id_after_free() {
        let mut reg = Registry::with_capacity(1);
        let a = reg.alloc(slot("aa")).unwrap();
        reg.free(a).unwrap();

        let b = reg.alloc(slot("bb")).unwrap();
        assert_eq!(a.index(), b.index());
        assert!(reg.get(a).is_none());
        assert_eq!(reg.get(b).unwrap().label.as_str(), "bb");
    }

    #[test]
    fn test_label_ownership_survives_shadow_alloc() {
        let mut reg = Registry::with_capacity(4);
        let old = reg.alloc(slot("fs")).unwrap();
        reg.bind_label(old);

        // replacement with the same label does not steal the binding
        let new = reg.alloc(slot("fs")).unwrap();
        assert_eq!(reg.lookup_by_label("fs"), Some(old));

        // until it is explicitly rebound
        reg.bind_label(new);
        assert_eq!(reg.lookup_by_label("fs"), Some(new));

        // freeing the old owner must not drop the new binding
        reg.free(old).unwrap();
        assert_eq!(reg.lookup_by_label("fs"), Some(new));
    }

    #[test]
    fn test_identity_indices() {
        let mut reg = Registry::with_capacity(2);
        let id = reg.alloc(slot("net")).unwrap();
        let pid = Pid::from_raw(9);
        let endpoint = Endpoint::new();
        reg.set_identity(id, pid, endpoint);

        assert_eq!(reg.lookup_by_pid(pid), Some(id));
        assert_eq!(reg.lookup_by_endpoint(endpoint), Some(id));

        reg.free(id).unwrap();
        assert_eq!(reg.lookup_by_pid(pid), None);
        assert_eq!(reg.lookup_by_endpoint(endpoint), None);
    }

    #[test]
    fn test_ids_in_order() {
        let mut reg = Registry::with_capacity(3);
        let a = reg.alloc(slot("aa")).unwrap();
        let b = reg.alloc(slot("bb")).unwrap();
        let c = reg.alloc(slot("cc")).unwrap();
        reg.free(b);
        assert_eq!(reg.ids_in_order(), vec![a, c]);
    }

    #[test]
    fn test_table_snapshots_serialize() {
        let mut reg = Registry::with_capacity(2);
        let id = reg.alloc(slot("fs")).unwrap();
        reg.bind_label(id);
        reg.set_identity(id, Pid::from_raw(4), Endpoint::new());

        let table = reg.service_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].label, "fs");
        assert_eq!(table[0].pid, Some(4));

        let json = serde_json::to_string(&table).unwrap();
        let back: Vec<SlotSummary> = serde_json::from_str(&json).unwrap();
        assert_eq!(table, back);
    }
}
