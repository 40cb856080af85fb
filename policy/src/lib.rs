//! # Permission Gate
//!
//! The authorization boundary consulted before every state-changing
//! request the reincarnation service handles.
//!
//! ## Philosophy
//!
//! - **Mechanism not policy**: the supervision core asks; the gate
//!   decides. Denials are never second-guessed locally.
//! - **Deterministic and side-effect free**: a gate evaluates the same
//!   inputs to the same decision, every time.
//! - **Pluggable**: the core works with any implementation, including
//!   the allow-everything gate used by most tests.
//!
//! ## Non-Goals
//!
//! This is NOT an authentication system, a user/group model, or a
//! policy language. It is the contract the supervision core expects
//! from whatever makes the authorization decision.

use core_types::Endpoint;
use ipc::RequestKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Decision returned by a permission gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    /// The call may proceed
    Allow,
    /// The call is rejected with a reason
    Deny { reason: String },
}

impl GateDecision {
    /// Creates a deny decision
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    /// Returns true if the call may proceed
    pub fn is_allow(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateDecision::Allow => write!(f, "Allow"),
            GateDecision::Deny { reason } => write!(f, "Deny: {}", reason),
        }
    }
}

/// The permission gate trait
///
/// `target` is the label of the slot the request operates on, when the
/// request names one (stop, restart, refresh, update); requests that
/// allocate or act system-wide pass `None`.
pub trait PermissionGate {
    /// Evaluates one call
    fn check(
        &self,
        caller: Endpoint,
        request: RequestKind,
        target: Option<&str>,
    ) -> GateDecision;

    /// Returns the gate's name (for diagnostics)
    fn name(&self) -> &str;
}

/// Reference implementation: allows every call
#[derive(Debug, Clone, Default)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn check(
        &self,
        _caller: Endpoint,
        _request: RequestKind,
        _target: Option<&str>,
    ) -> GateDecision {
        GateDecision::Allow
    }

    fn name(&self) -> &str {
        "AllowAll"
    }
}

/// Reference implementation: denies listed (request kind, label) pairs
///
/// A rule with no label denies the request kind for every target.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    rules: HashSet<(RequestKind, Option<String>)>,
}

impl DenyList {
    /// Creates an empty deny list
    pub fn new() -> Self {
        Self::default()
    }

    /// Denies a request kind for every target
    pub fn deny_kind(mut self, kind: RequestKind) -> Self {
        self.rules.insert((kind, None));
        self
    }

    /// Denies a request kind for one labeled service
    pub fn deny_for(mut self, kind: RequestKind, label: impl Into<String>) -> Self {
        self.rules.insert((kind, Some(label.into())));
        self
    }
}

impl PermissionGate for DenyList {
    fn check(
        &self,
        _caller: Endpoint,
        request: RequestKind,
        target: Option<&str>,
    ) -> GateDecision {
        if self.rules.contains(&(request, None)) {
            return GateDecision::deny(format!("{} calls are not permitted", request));
        }
        if let Some(label) = target {
            if self.rules.contains(&(request, Some(label.to_string()))) {
                return GateDecision::deny(format!("{} is not permitted for '{}'", request, label));
            }
        }
        GateDecision::Allow
    }

    fn name(&self) -> &str {
        "DenyList"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let gate = AllowAll;
        let decision = gate.check(Endpoint::new(), RequestKind::Start, None);
        assert!(decision.is_allow());
    }

    #[test]
    fn test_deny_list_by_kind() {
        let gate = DenyList::new().deny_kind(RequestKind::Shutdown);
        assert!(!gate
            .check(Endpoint::new(), RequestKind::Shutdown, None)
            .is_allow());
        assert!(gate
            .check(Endpoint::new(), RequestKind::Start, None)
            .is_allow());
    }

    #[test]
    fn test_deny_list_by_target() {
        let gate = DenyList::new().deny_for(RequestKind::Stop, "fs.root");
        assert!(!gate
            .check(Endpoint::new(), RequestKind::Stop, Some("fs.root"))
            .is_allow());
        assert!(gate
            .check(Endpoint::new(), RequestKind::Stop, Some("net"))
            .is_allow());
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(GateDecision::Allow.to_string(), "Allow");
        assert_eq!(GateDecision::deny("nope").to_string(), "Deny: nope");
    }
}
