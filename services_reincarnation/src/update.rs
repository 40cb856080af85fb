//! The live-update transaction
//!
//! At most one update runs at a time. The transaction owns the pairing
//! of the old instance (the anchor, which received the update request
//! and must prepare) and the not-yet-running replacement; the slots
//! themselves only carry an `updating` flag.

use core_types::{SlotId, Tick, Ticks};

/// State of the single in-flight live update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTransaction {
    anchor: SlotId,
    replacement: SlotId,
    started_at: Tick,
    prepare_budget: Ticks,
    roles_swapped: bool,
}

impl UpdateTransaction {
    /// Opens a transaction between a live anchor and its replacement
    pub fn new(anchor: SlotId, replacement: SlotId, started_at: Tick, budget: Ticks) -> Self {
        Self {
            anchor,
            replacement,
            started_at,
            prepare_budget: budget,
            roles_swapped: false,
        }
    }

    /// The old instance: received the request, owes the deferred reply
    pub fn anchor(&self) -> SlotId {
        self.anchor
    }

    /// The new instance, created but not run until prepare succeeds
    pub fn replacement(&self) -> SlotId {
        self.replacement
    }

    /// Returns true if a slot is either half of this transaction
    pub fn involves(&self, id: SlotId) -> bool {
        self.anchor == id || self.replacement == id
    }

    /// Marks the label handover from anchor to replacement as done
    pub fn mark_swapped(&mut self) {
        self.roles_swapped = true;
    }

    /// True once the replacement holds the label
    pub fn is_swapped(&self) -> bool {
        self.roles_swapped
    }

    /// True once the whole transaction has outlived its budget
    ///
    /// The budget covers everything up to finalization: the prepare
    /// phase and, after the swap, the replacement's initialization.
    pub fn deadline_passed(&self, now: Tick) -> bool {
        now.since(self.started_at) > self.prepare_budget
    }
}
