//! The reincarnation server
//!
//! Owns the registry, the single update transaction, and the shutdown
//! flag, and provides the lifecycle primitives the dispatcher, health
//! monitor, and reaper are built from. All effects go through the
//! system interface handed into each call; the server itself holds no
//! kernel state.

use crate::registry::Registry;
use crate::slot::ServiceSlot;
use crate::update::UpdateTransaction;
use crate::{DEFAULT_CAPACITY, TICK_INTERVAL};
use core_types::SlotId;
use diagnostics::DiagnosticsLog;
use ipc::{Reply, ReplyEnvelope, RequestKind, RsError};
use kernel_api::{Signal, SystemApi};
use policy::{GateDecision, PermissionGate};

/// The supervision core
pub struct ReincarnationServer<G: PermissionGate> {
    pub(crate) registry: Registry,
    pub(crate) update: Option<UpdateTransaction>,
    pub(crate) shutting_down: bool,
    pub(crate) gate: G,
    pub(crate) log: DiagnosticsLog,
}

impl<G: PermissionGate> ReincarnationServer<G> {
    /// Creates a server with the default registry capacity
    pub fn new(gate: G) -> Self {
        Self::with_capacity(gate, DEFAULT_CAPACITY)
    }

    /// Creates a server with an explicit registry capacity
    pub fn with_capacity(gate: G, capacity: usize) -> Self {
        Self {
            registry: Registry::with_capacity(capacity),
            update: None,
            shutting_down: false,
            gate,
            log: DiagnosticsLog::default(),
        }
    }

    /// The service registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The in-flight update transaction, if any
    pub fn update_transaction(&self) -> Option<&UpdateTransaction> {
        self.update.as_ref()
    }

    /// True once a shutdown request was accepted
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// The diagnostics log
    pub fn log(&self) -> &DiagnosticsLog {
        &self.log
    }

    /// Consults the permission gate for one call
    pub(crate) fn check_permission(
        &mut self,
        caller: core_types::Endpoint,
        request: RequestKind,
        target: Option<&str>,
    ) -> Result<(), RsError> {
        match self.gate.check(caller, request, target) {
            GateDecision::Allow => Ok(()),
            GateDecision::Deny { reason } => {
                self.log.warn(format!(
                    "{} denied {} from {}: {}",
                    self.gate.name(),
                    request,
                    caller,
                    reason
                ));
                Err(RsError::PermissionDenied(reason))
            }
        }
    }

    /// Creates the process image for a slot and records its identity
    pub(crate) fn create_instance<S: SystemApi>(
        &mut self,
        sys: &mut S,
        id: SlotId,
    ) -> Result<(), RsError> {
        let (program, label) = {
            let slot = self.registry.get(id).ok_or(RsError::NotFound)?;
            (slot.program.clone(), slot.label.clone())
        };
        let (pid, endpoint) = sys
            .create_process(&program, &label)
            .map_err(|e| RsError::System(e.to_string()))?;
        self.registry.set_identity(id, pid, endpoint);
        Ok(())
    }

    /// Publishes the slot's label → endpoint binding system-wide
    pub(crate) fn publish_instance<S: SystemApi>(
        &mut self,
        sys: &mut S,
        id: SlotId,
    ) -> Result<(), RsError> {
        let (label, endpoint) = {
            let slot = self.registry.get(id).ok_or(RsError::NotFound)?;
            (slot.label.clone(), slot.endpoint)
        };
        let endpoint = endpoint.ok_or_else(|| {
            RsError::System("instance has no endpoint to publish".to_string())
        })?;
        sys.publish_label(&label, endpoint)
            .map_err(|e| RsError::System(e.to_string()))
    }

    /// Makes a created instance runnable and starts its init window
    ///
    /// An initializing instance is treated as having an outstanding
    /// heartbeat until it reports ready, so a hung init is caught by
    /// the same timeout path as a missed ping.
    pub(crate) fn run_instance<S: SystemApi>(
        &mut self,
        sys: &mut S,
        id: SlotId,
    ) -> Result<(), RsError> {
        let endpoint = self
            .registry
            .get(id)
            .and_then(|s| s.endpoint)
            .ok_or_else(|| RsError::System("instance has no endpoint to run".to_string()))?;
        sys.run_process(endpoint)
            .map_err(|e| RsError::System(e.to_string()))?;
        let now = sys.uptime();
        if let Some(slot) = self.registry.get_mut(id) {
            slot.flags.begin_init();
            slot.alive_tm = now;
            slot.check_tm = now + TICK_INTERVAL;
        }
        Ok(())
    }

    /// Delivers the stop signal and starts the stop watchdog
    pub(crate) fn stop_instance<S: SystemApi>(
        &mut self,
        sys: &mut S,
        id: SlotId,
        refresh: bool,
    ) -> Result<(), RsError> {
        let pid = self
            .registry
            .get(id)
            .and_then(|s| s.pid)
            .ok_or(RsError::NotFound)?;
        sys.signal_process(pid, Signal::Terminate)
            .map_err(|e| RsError::System(e.to_string()))?;
        let now = sys.uptime();
        if let Some(slot) = self.registry.get_mut(id) {
            slot.flags.begin_stop(refresh);
            slot.stop_tm = Some(now);
        }
        Ok(())
    }

    /// Force-kills an instance (watchdog and failure paths)
    pub(crate) fn crash_instance<S: SystemApi>(&mut self, sys: &mut S, id: SlotId) {
        let Some(slot) = self.registry.get(id) else {
            return;
        };
        let label = slot.label.clone();
        let Some(pid) = slot.pid else {
            return;
        };
        match sys.signal_process(pid, Signal::Kill) {
            Ok(()) => self.log.warn(format!("force-killed '{}' ({})", label, pid)),
            Err(e) => self
                .log
                .warn(format!("failed to kill '{}' ({}): {}", label, pid, e)),
        }
    }

    /// Sends the reply owed for a deferred operation, if one is owed
    ///
    /// At most one reply per deferral: the pending record is consumed
    /// before sending, and a delivery failure is logged, not retried.
    pub(crate) fn late_reply<S: SystemApi>(
        &mut self,
        sys: &mut S,
        id: SlotId,
        result: Result<Reply, RsError>,
    ) {
        let pending = self
            .registry
            .get_mut(id)
            .and_then(|s| s.take_pending_reply());
        if let Some(p) = pending {
            let envelope = ReplyEnvelope::new(p.caller, p.request, result);
            if let Err(e) = sys.send_reply(envelope) {
                self.log
                    .warn(format!("failed to deliver late reply to {}: {}", p.caller, e));
            }
        }
    }

    /// Frees a slot and withdraws its label binding if it owns one
    pub(crate) fn cleanup_instance<S: SystemApi>(&mut self, sys: &mut S, id: SlotId) {
        let Some(label) = self.registry.get(id).map(|s| s.label.clone()) else {
            return;
        };
        let owns_label = self.registry.lookup_by_label(label.as_str()) == Some(id);
        if self.registry.free(id).is_some() && owns_label {
            if let Err(e) = sys.unpublish_label(&label) {
                self.log
                    .warn(format!("failed to unpublish '{}': {}", label, e));
            }
        }
    }

    /// Hands the label over to a replacement instance
    pub(crate) fn activate_instance<S: SystemApi>(&mut self, sys: &mut S, id: SlotId) {
        self.registry.bind_label(id);
        let Some(slot) = self.registry.get(id) else {
            return;
        };
        let label = slot.label.clone();
        if let Some(endpoint) = slot.endpoint {
            if let Err(e) = sys.publish_label(&label, endpoint) {
                self.log
                    .warn(format!("failed to republish '{}': {}", label, e));
            }
        }
    }

    /// Revives a dead service
    ///
    /// With a recovery script configured, the script is launched and
    /// drives the revival through explicit requests; otherwise a
    /// successor instance is created directly, linked to its retiring
    /// predecessor, and started. Returns the successor's slot id on a
    /// direct revival.
    pub(crate) fn restart_service<S: SystemApi>(
        &mut self,
        sys: &mut S,
        id: SlotId,
    ) -> Result<Option<SlotId>, RsError> {
        let (script, label) = {
            let slot = self.registry.get(id).ok_or(RsError::NotFound)?;
            (slot.script.clone(), slot.label.clone())
        };

        if let Some(script) = script {
            sys.launch_recovery_script(&script, &label)
                .map_err(|e| RsError::System(e.to_string()))?;
            self.log
                .info(format!("launched recovery script for '{}'", label));
            return Ok(None);
        }

        let successor = {
            let old = self.registry.get(id).ok_or(RsError::NotFound)?;
            ServiceSlot::successor_of(old)
        };
        let new_id = self
            .registry
            .alloc(successor)
            .map_err(|_| RsError::OutOfSlots)?;

        if let Err(e) = self.create_instance(sys, new_id) {
            self.registry.free(new_id);
            return Err(e);
        }

        // the successor takes over the deferred reply, if one is owed
        let pending = self
            .registry
            .get_mut(id)
            .and_then(|s| s.take_pending_reply());
        if let Some(new) = self.registry.get_mut(new_id) {
            new.inherit_pending_reply(pending);
            new.prev = Some(id);
        }

        if let Err(e) = self.run_instance(sys, new_id) {
            let pending = self
                .registry
                .get_mut(new_id)
                .and_then(|s| s.take_pending_reply());
            if let Some(old) = self.registry.get_mut(id) {
                old.inherit_pending_reply(pending);
            }
            self.registry.free(new_id);
            return Err(e);
        }

        self.log.info(format!("restarting '{}'", label));
        Ok(Some(new_id))
    }

    /// Closes the update transaction, committing or rolling back
    ///
    /// On success the replacement already holds the label; the anchor
    /// is retired and the original caller gets a success reply. On
    /// failure the label is handed back to the anchor if the swap had
    /// happened, the replacement is discarded, and the caller gets the
    /// error. Either way exactly one late reply is sent.
    pub(crate) fn end_update<S: SystemApi>(
        &mut self,
        sys: &mut S,
        outcome: Result<(), RsError>,
    ) {
        let Some(txn) = self.update.take() else {
            return;
        };
        let anchor = txn.anchor();
        let replacement = txn.replacement();

        if let Some(slot) = self.registry.get_mut(anchor) {
            slot.flags.set_updating(false);
        }
        if let Some(slot) = self.registry.get_mut(replacement) {
            slot.flags.set_updating(false);
        }

        match outcome {
            Ok(()) => {
                self.late_reply(sys, anchor, Ok(Reply::Ok));
                // the anchor quiesced during prepare; retire it
                self.crash_instance(sys, anchor);
                self.cleanup_instance(sys, anchor);
                self.log.info("update committed".to_string());
            }
            Err(e) => {
                if txn.is_swapped() {
                    self.activate_instance(sys, anchor);
                }
                self.late_reply(sys, anchor, Err(e.clone()));
                // the replacement may already be dead; best effort
                self.crash_instance(sys, replacement);
                self.cleanup_instance(sys, replacement);
                self.log.warn(format!("update failed: {}", e));
            }
        }
    }
}
