//! # Reincarnation Service
//!
//! The supervision core of the system: it starts, stops, restarts,
//! refreshes, and live-updates system services, watches their health,
//! and reclaims the slots of instances that die behind its back.
//!
//! ## Philosophy
//!
//! - **Explicit state machine**: every service instance occupies one
//!   registry slot whose named flags change only through transition
//!   methods; there is no bitmask twiddling and no hidden mode.
//! - **Deferred replies are records, not sentinels**: when an operation
//!   cannot be answered until a later event (init-ready, process exit),
//!   the caller is stored in the slot and the dispatcher returns a
//!   `Deferred` disposition. Exactly one reply is sent later.
//! - **Events drive everything**: requests, self-reports, process
//!   exits, and tick alarms are the only inputs; each is handled by one
//!   entry point on [`ReincarnationServer`].
//! - **The world behind a trait**: all effects go through
//!   `kernel_api::SystemApi`, so the whole server runs deterministically
//!   against a simulated system in tests.

mod dispatcher;
mod monitor;
mod reaper;
mod registry;
mod server;
mod slot;
mod update;

pub use registry::{PublicEntry, Registry, RegistryError, SlotSummary};
pub use server::ReincarnationServer;
pub use slot::{PendingReply, ServiceFlags, ServiceSlot};
pub use update::UpdateTransaction;

use core_types::Ticks;

/// Interval between tick-alarm wakeups of the health monitor
pub const TICK_INTERVAL: Ticks = Ticks::from_raw(1);

/// Health-check period applied while a service is still initializing
pub const INIT_GRACE_PERIOD: Ticks = Ticks::from_raw(10);

/// Prepare budget used when an update request passes zero
pub const DEFAULT_PREPARE_BUDGET: Ticks = Ticks::from_raw(25);

/// Upper bound on the caller-supplied prepare budget
pub const MAX_PREPARE_BUDGET: Ticks = Ticks::from_raw(100);

/// Cap on the crash-restart backoff, in ticks
pub const MAX_BACKOFF: u64 = 32;

/// Default number of registry slots
pub const DEFAULT_CAPACITY: usize = 64;
