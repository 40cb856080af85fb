//! # Kernel API
//!
//! The boundary between the reincarnation service and its external
//! collaborators: the kernel, the process manager, and the IPC
//! transport.
//!
//! ## Philosophy
//!
//! Everything the supervision core does to the outside world goes
//! through the [`SystemApi`] trait: process creation, signalling,
//! identity publication, asynchronous messaging, caller-memory copies,
//! the periodic alarm, and child reaping. Multiple implementations are
//! possible:
//! - Simulated system (for deterministic testing)
//! - Real kernel bindings (syscalls)
//!
//! Nothing in this trait blocks. Operations either complete immediately
//! or complete later through a separate event (a self-report, a tick, a
//! child-exit notification).

pub mod error;
pub mod system;

pub use error::SystemError;
pub use system::{ExitStatus, Signal, SystemApi};
