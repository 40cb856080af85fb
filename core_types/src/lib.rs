//! # Core Types
//!
//! Fundamental identifiers shared by the reincarnation service and its
//! collaborators.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: endpoints, pids, and slot handles are
//!   distinct types that cannot be confused.
//! - **No dangling handles**: slot handles are generational, so a freed
//!   and reused registry cell can never be addressed through a stale id.
//! - **Identity is not authority**: a label names a logical service; it
//!   grants nothing by itself.

pub mod ids;
pub mod label;
pub mod time;

pub use ids::{Endpoint, Pid, SlotId};
pub use label::{LabelError, ServiceLabel, MAX_LABEL_LEN, MAX_LOOKUP_NAME_LEN, MIN_LABEL_LEN};
pub use time::{Tick, Ticks};
