//! Unique identifiers for supervised system services

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque process identity used for messaging
///
/// An endpoint names one live instance of a service. Every instance
/// (including the replacement half of a live update) gets a fresh
/// endpoint; endpoints are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(Uuid);

impl Endpoint {
    /// Creates a new random endpoint
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an endpoint from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self.0)
    }
}

/// Numeric process id assigned at process creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid(u32);

impl Pid {
    /// Creates a pid from a raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

/// Generational handle to a registry slot
///
/// A slot id pairs an arena index with the generation the cell had when
/// the slot was allocated. Lookups with a stale handle (the cell was
/// freed, possibly reused) fail instead of aliasing the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    /// Creates a slot id from its parts
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the arena index
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the generation
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({}#{})", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uniqueness() {
        let e1 = Endpoint::new();
        let e2 = Endpoint::new();
        assert_ne!(e1, e2);
    }

    #[test]
    fn test_endpoint_from_uuid() {
        let uuid = Uuid::new_v4();
        let endpoint = Endpoint::from_uuid(uuid);
        assert_eq!(endpoint.as_uuid(), uuid);
    }

    #[test]
    fn test_pid_roundtrip() {
        let pid = Pid::from_raw(42);
        assert_eq!(pid.as_raw(), 42);
        assert_eq!(pid.to_string(), "Pid(42)");
    }

    #[test]
    fn test_slot_id_parts() {
        let id = SlotId::new(3, 7);
        assert_eq!(id.index(), 3);
        assert_eq!(id.generation(), 7);
    }

    #[test]
    fn test_slot_id_generation_distinguishes_reuse() {
        let first = SlotId::new(0, 0);
        let reused = SlotId::new(0, 1);
        assert_ne!(first, reused);
    }
}
