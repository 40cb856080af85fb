//! Replies and the boundary error taxonomy

use crate::request::RequestKind;
use core_types::Endpoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced at the request boundary
///
/// Every variant maps to one row of the result taxonomy: validation and
/// lookup failures are produced before any state mutation, conflicts
/// after allocation but never leaving an orphaned slot behind.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsError {
    /// Unknown label or unexpected reporter
    #[error("service not found")]
    NotFound,

    /// Duplicate label, update already in progress, or a reply already
    /// pending for the slot
    #[error("conflicting operation: {0}")]
    Conflict(String),

    /// Malformed length, null update token, or out-of-range budget
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The permission gate denied the call
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No free slot in the registry
    #[error("service table is full")]
    OutOfSlots,

    /// A system-interface call failed
    #[error("system call failed: {0}")]
    System(String),
}

/// Successful reply payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Plain success
    Ok,
    /// Resolved endpoint (label lookup)
    Endpoint(Endpoint),
}

/// A reply routed back to a caller, immediately or late
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Caller the reply is addressed to
    pub to: Endpoint,
    /// The request being answered
    pub request: RequestKind,
    /// Outcome
    pub result: Result<Reply, RsError>,
}

impl ReplyEnvelope {
    /// Creates a reply envelope
    pub fn new(to: Endpoint, request: RequestKind, result: Result<Reply, RsError>) -> Self {
        Self {
            to,
            request,
            result,
        }
    }
}

/// What the dispatcher tells the transport to do with a request
///
/// `Deferred` means "don't reply yet": the caller identity has been
/// recorded in the slot and exactly one reply will be issued later,
/// from the event that completes the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Reply to the caller now
    Reply(Reply),
    /// Hold the reply; a pending-reply record was stored
    Deferred,
}

impl Disposition {
    /// Returns true for an immediate reply
    pub fn is_reply(&self) -> bool {
        matches!(self, Disposition::Reply(_))
    }

    /// Returns true for a deferred reply
    pub fn is_deferred(&self) -> bool {
        matches!(self, Disposition::Deferred)
    }
}
