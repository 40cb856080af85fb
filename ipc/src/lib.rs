//! # Inter-Process Communication
//!
//! Message types exchanged between the reincarnation service, its
//! callers, and the services it supervises.
//!
//! ## Philosophy
//!
//! - **Messages, not shared memory**: everything crossing the boundary
//!   is an explicit, serializable value.
//! - **Deferral is a protocol signal, not an error**: a handler that
//!   cannot reply yet returns [`Disposition::Deferred`]; the reply is
//!   issued later from the event that completes the operation.
//! - **Error codes are typed**: [`RsError`] is the complete result
//!   taxonomy surfaced at the boundary.
//!
//! The wire format itself (how these values are framed and moved) is the
//! transport's concern and is out of scope here.

pub mod instruction;
pub mod reply;
pub mod request;

pub use instruction::Instruction;
pub use reply::{Disposition, Reply, ReplyEnvelope, RsError};
pub use request::{
    ReportOutcome, Request, RequestKind, SelfReport, StartParams, TableSelector, UpdateStateToken,
};
