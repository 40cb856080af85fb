//! Per-service slot state
//!
//! One slot describes one instance of a supervised service: its
//! identity, lifecycle flags, health-monitor timestamps, crash-restart
//! bookkeeping, and (at most one) caller waiting for a deferred reply.

use core_types::{Endpoint, Pid, ServiceLabel, SlotId, Tick, Ticks};
use ipc::{RequestKind, RsError, StartParams};

/// A caller waiting for the reply to a deferred operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    /// Who gets the reply
    pub caller: Endpoint,
    /// Which request the reply answers
    pub request: RequestKind,
}

/// Named lifecycle flags of a service instance
///
/// Fields are private; the flags change only through the transition
/// methods below, which keep the combinations legal. "In use" is not a
/// flag: a slot is in use exactly while it occupies a registry cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFlags {
    initializing: bool,
    exiting: bool,
    refreshing: bool,
    terminated: bool,
    no_ping_reply: bool,
    updating: bool,
}

impl ServiceFlags {
    /// Entering initialization: the instance was just made runnable
    pub fn begin_init(&mut self) {
        self.initializing = true;
        self.terminated = false;
        self.no_ping_reply = false;
    }

    /// The instance reported init-ready successfully
    pub fn complete_init(&mut self) {
        self.initializing = false;
    }

    /// A stop was requested; `refresh` marks the stop-then-restart form
    pub fn begin_stop(&mut self, refresh: bool) {
        self.exiting = true;
        self.refreshing = refresh;
    }

    /// System shutdown: the instance is expected to go away and must
    /// not be revived
    pub fn mark_exiting(&mut self) {
        self.exiting = true;
        self.refreshing = false;
    }

    /// The process is confirmed gone
    pub fn confirm_exit(&mut self) {
        self.terminated = true;
        self.initializing = false;
    }

    /// The instance missed a heartbeat window and was force-killed
    pub fn mark_no_ping_reply(&mut self) {
        self.no_ping_reply = true;
    }

    /// Marks or clears participation in a live update
    pub fn set_updating(&mut self, updating: bool) {
        self.updating = updating;
    }

    /// Still waiting for the instance's init-ready report
    pub fn is_initializing(&self) -> bool {
        self.initializing
    }

    /// An orderly stop (or shutdown) is in progress or completed
    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    /// The current stop will be followed by a restart
    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    /// The process is gone; the slot records a dead instance
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// A missed heartbeat already triggered a force kill
    pub fn missed_heartbeat(&self) -> bool {
        self.no_ping_reply
    }

    /// The slot is one half of the active update transaction
    pub fn is_updating(&self) -> bool {
        self.updating
    }
}

/// One registry slot: a single instance of a supervised service
#[derive(Debug, Clone)]
pub struct ServiceSlot {
    /// Service label; unique among live services
    pub label: ServiceLabel,
    /// Program image the instance runs
    pub program: String,
    /// Health-check period; zero disables periodic polling
    pub period: Ticks,
    /// Recovery script run after a crash instead of a direct restart
    pub script: Option<String>,
    /// Messaging identity, assigned at process creation
    pub endpoint: Option<Endpoint>,
    /// Process id, assigned at process creation
    pub pid: Option<Pid>,
    /// Lifecycle flags
    pub flags: ServiceFlags,
    /// Last tick the instance was known alive (heartbeat received)
    pub alive_tm: Tick,
    /// Tick the most recent heartbeat ping was sent
    pub check_tm: Tick,
    /// When the pending stop signal was delivered, if one is
    pub stop_tm: Option<Tick>,
    /// Remaining ticks before a scheduled crash restart fires
    pub backoff: u64,
    /// How many times this service has been restarted after a crash
    pub restarts: u32,
    /// Retiring predecessor instance, during a restart handover
    pub prev: Option<SlotId>,
    pending_reply: Option<PendingReply>,
}

impl ServiceSlot {
    /// Builds a slot from validated start parameters
    pub fn from_params(label: ServiceLabel, params: &StartParams) -> Self {
        Self {
            label,
            program: params.program.clone(),
            period: params.period.unwrap_or(Ticks::ZERO),
            script: params.script.clone(),
            endpoint: None,
            pid: None,
            flags: ServiceFlags::default(),
            alive_tm: Tick::from_raw(0),
            check_tm: Tick::from_raw(0),
            stop_tm: None,
            backoff: 0,
            restarts: 0,
            prev: None,
            pending_reply: None,
        }
    }

    /// Builds the replacement slot for a crash restart or refresh
    ///
    /// The replacement inherits label, program, period, script, and the
    /// restart count (incremented); identity and timestamps start fresh.
    pub fn successor_of(old: &ServiceSlot) -> Self {
        Self {
            label: old.label.clone(),
            program: old.program.clone(),
            period: old.period,
            script: old.script.clone(),
            endpoint: None,
            pid: None,
            flags: ServiceFlags::default(),
            alive_tm: Tick::from_raw(0),
            check_tm: Tick::from_raw(0),
            stop_tm: None,
            backoff: 0,
            restarts: old.restarts + 1,
            prev: None,
            pending_reply: None,
        }
    }

    /// Records the caller of a deferred operation
    ///
    /// Fails with a conflict if a reply is already owed for this slot;
    /// the caller's state is left untouched in that case.
    pub fn defer_reply(&mut self, caller: Endpoint, request: RequestKind) -> Result<(), RsError> {
        if self.pending_reply.is_some() {
            return Err(RsError::Conflict(
                "a reply is already pending for this service".to_string(),
            ));
        }
        self.pending_reply = Some(PendingReply { caller, request });
        Ok(())
    }

    /// Takes the pending reply record, if any
    pub fn take_pending_reply(&mut self) -> Option<PendingReply> {
        self.pending_reply.take()
    }

    /// Moves a pending reply from another slot onto this one
    ///
    /// Used when a replacement instance takes over the obligation to
    /// answer the original caller.
    pub fn inherit_pending_reply(&mut self, pending: Option<PendingReply>) {
        if pending.is_some() {
            self.pending_reply = pending;
        }
    }

    /// Returns true while a deferred reply is owed
    pub fn has_pending_reply(&self) -> bool {
        self.pending_reply.is_some()
    }

    /// Peeks at the pending reply record
    pub fn pending_reply(&self) -> Option<&PendingReply> {
        self.pending_reply.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(label: &str) -> ServiceSlot {
        let params = StartParams::new(label, "/sbin/test");
        ServiceSlot::from_params(ServiceLabel::new(label).unwrap(), &params)
    }

    #[test]
    fn test_flag_transitions() {
        let mut flags = ServiceFlags::default();
        flags.begin_init();
        assert!(flags.is_initializing());

        flags.complete_init();
        assert!(!flags.is_initializing());

        flags.begin_stop(true);
        assert!(flags.is_exiting());
        assert!(flags.is_refreshing());

        flags.confirm_exit();
        assert!(flags.is_terminated());
    }

    #[test]
    fn test_begin_init_clears_stale_crash_state() {
        let mut flags = ServiceFlags::default();
        flags.confirm_exit();
        flags.mark_no_ping_reply();

        flags.begin_init();
        assert!(!flags.is_terminated());
        assert!(!flags.missed_heartbeat());
    }

    #[test]
    fn test_second_deferral_is_a_conflict() {
        let mut s = slot("fs");
        let first = Endpoint::new();
        s.defer_reply(first, RequestKind::Start).unwrap();

        let err = s.defer_reply(Endpoint::new(), RequestKind::Stop).unwrap_err();
        assert!(matches!(err, RsError::Conflict(_)));

        // the original record survives untouched
        assert_eq!(s.pending_reply().unwrap().caller, first);
        assert_eq!(s.pending_reply().unwrap().request, RequestKind::Start);
    }

    #[test]
    fn test_successor_inherits_parameters_and_counts_restart() {
        let params = StartParams::new("net", "/sbin/net")
            .with_period(Ticks::from_raw(5))
            .with_script("/etc/rc.net");
        let mut old = ServiceSlot::from_params(ServiceLabel::new("net").unwrap(), &params);
        old.restarts = 2;

        let new = ServiceSlot::successor_of(&old);
        assert_eq!(new.label, old.label);
        assert_eq!(new.program, old.program);
        assert_eq!(new.period, Ticks::from_raw(5));
        assert_eq!(new.script.as_deref(), Some("/etc/rc.net"));
        assert_eq!(new.restarts, 3);
        assert!(new.endpoint.is_none());
        assert!(!new.has_pending_reply());
    }

    #[test]
    fn test_inherit_pending_reply_moves_obligation() {
        let mut old = slot("fs");
        let caller = Endpoint::new();
        old.defer_reply(caller, RequestKind::Start).unwrap();

        let mut new = ServiceSlot::successor_of(&old);
        new.inherit_pending_reply(old.take_pending_reply());

        assert!(!old.has_pending_reply());
        assert_eq!(new.pending_reply().unwrap().caller, caller);
    }
}
