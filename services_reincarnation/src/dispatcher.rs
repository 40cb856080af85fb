//! Request dispatch and event handling
//!
//! One entry point per input the reincarnation service reacts to:
//! external requests ([`handle_request`]), self-reports from supervised
//! services ([`handle_self_report`]), and process-exit events
//! ([`handle_process_exit`]). Validation happens before any state is
//! touched, so a rejected request leaves the registry exactly as it
//! found it.
//!
//! [`handle_request`]: ReincarnationServer::handle_request
//! [`handle_self_report`]: ReincarnationServer::handle_self_report
//! [`handle_process_exit`]: ReincarnationServer::handle_process_exit

use crate::server::ReincarnationServer;
use crate::slot::ServiceSlot;
use crate::update::UpdateTransaction;
use crate::{DEFAULT_PREPARE_BUDGET, MAX_BACKOFF, MAX_PREPARE_BUDGET};
use core_types::{Endpoint, Pid, ServiceLabel, Tick, Ticks, MAX_LOOKUP_NAME_LEN, MIN_LABEL_LEN};
use ipc::{
    Disposition, Instruction, Reply, Request, RequestKind, RsError, SelfReport, StartParams,
    TableSelector, UpdateStateToken,
};
use kernel_api::{ExitStatus, Signal, SystemApi};
use policy::PermissionGate;

fn describe_exit(status: ExitStatus) -> &'static str {
    match status {
        ExitStatus::Exited(_) => "exited",
        ExitStatus::Signaled(Signal::Terminate) => "terminated by signal",
        ExitStatus::Signaled(Signal::Kill) => "killed",
    }
}

impl<G: PermissionGate> ReincarnationServer<G> {
    /// Handles one external request
    ///
    /// `caller` is `None` only for internally originated shutdowns.
    /// A `Deferred` disposition means the caller was recorded in a slot
    /// and will receive exactly one late reply from a later event.
    pub fn handle_request<S: SystemApi>(
        &mut self,
        sys: &mut S,
        caller: Option<Endpoint>,
        request: Request,
    ) -> Result<Disposition, RsError> {
        if let Request::Shutdown = request {
            return self.do_shutdown(sys, caller);
        }
        let caller = caller
            .ok_or_else(|| RsError::InvalidArgument("request requires a caller".to_string()))?;
        match request {
            Request::Start { params } => self.do_start(sys, caller, params),
            Request::Stop { label } => self.do_stop(sys, caller, &label),
            Request::Restart { label } => self.do_restart(sys, caller, &label),
            Request::Refresh { label } => self.do_refresh(sys, caller, &label),
            Request::Update {
                params,
                state,
                prepare_budget,
            } => self.do_update(sys, caller, params, state, prepare_budget),
            Request::Info { selector } => self.do_info(sys, caller, selector),
            Request::LabelLookup { name, len } => self.do_label_lookup(caller, &name, len),
            Request::Shutdown => unreachable!("handled above"),
        }
    }

    fn do_start<S: SystemApi>(
        &mut self,
        sys: &mut S,
        caller: Endpoint,
        params: StartParams,
    ) -> Result<Disposition, RsError> {
        let label = ServiceLabel::new(params.label.clone())
            .map_err(|e| RsError::InvalidArgument(e.to_string()))?;
        self.check_permission(caller, RequestKind::Start, None)?;

        if self.registry.lookup_by_label(label.as_str()).is_some() {
            self.log
                .warn(format!("start of '{}' rejected: duplicate label", label));
            return Err(RsError::Conflict("duplicate label".to_string()));
        }

        let slot = ServiceSlot::from_params(label.clone(), &params);
        let id = self.registry.alloc(slot).map_err(|_| RsError::OutOfSlots)?;
        self.registry.bind_label(id);

        if let Err(e) = self.create_instance(sys, id) {
            self.registry.free(id);
            return Err(e);
        }
        if let Err(e) = self.publish_instance(sys, id) {
            self.discard_instance(sys, id);
            return Err(e);
        }
        if let Err(e) = self.run_instance(sys, id) {
            self.discard_instance(sys, id);
            return Err(e);
        }

        if let Some(slot) = self.registry.get_mut(id) {
            slot.defer_reply(caller, RequestKind::Start)?;
        }
        self.log.info(format!("starting '{}'", label));
        Ok(Disposition::Deferred)
    }

    fn do_stop<S: SystemApi>(
        &mut self,
        sys: &mut S,
        caller: Endpoint,
        label: &str,
    ) -> Result<Disposition, RsError> {
        ServiceLabel::new(label).map_err(|e| RsError::InvalidArgument(e.to_string()))?;
        let id = self.registry.lookup_by_label(label).ok_or_else(|| {
            self.log.debug(format!("stop of unknown service '{}'", label));
            RsError::NotFound
        })?;
        self.check_permission(caller, RequestKind::Stop, Some(label))?;

        let slot = self.registry.get(id).ok_or(RsError::NotFound)?;
        if slot.flags.is_terminated() {
            // recovery-script finalization of an already-dead service
            self.cleanup_instance(sys, id);
            self.log.info(format!("'{}' taken down", label));
            return Ok(Disposition::Reply(Reply::Ok));
        }
        if slot.has_pending_reply() {
            return Err(RsError::Conflict(
                "a reply is already pending for this service".to_string(),
            ));
        }

        self.stop_instance(sys, id, false)?;
        if let Some(slot) = self.registry.get_mut(id) {
            slot.defer_reply(caller, RequestKind::Stop)?;
        }
        self.log.info(format!("stopping '{}'", label));
        Ok(Disposition::Deferred)
    }

    fn do_restart<S: SystemApi>(
        &mut self,
        sys: &mut S,
        caller: Endpoint,
        label: &str,
    ) -> Result<Disposition, RsError> {
        ServiceLabel::new(label).map_err(|e| RsError::InvalidArgument(e.to_string()))?;
        let id = self
            .registry
            .lookup_by_label(label)
            .ok_or(RsError::NotFound)?;
        self.check_permission(caller, RequestKind::Restart, Some(label))?;

        let slot = self.registry.get(id).ok_or(RsError::NotFound)?;
        if !slot.flags.is_terminated() {
            return Err(RsError::Conflict("service is still running".to_string()));
        }

        // clear the script reference across the revival so the restart
        // is direct instead of invoking the script again, then restore
        // it on both instances
        let script = self.registry.get_mut(id).and_then(|s| s.script.take());
        let result = self.restart_service(sys, id);
        if let Some(script) = script {
            if let Some(slot) = self.registry.get_mut(id) {
                slot.script = Some(script.clone());
            }
            if let Ok(Some(new_id)) = &result {
                if let Some(slot) = self.registry.get_mut(*new_id) {
                    slot.script = Some(script);
                }
            }
        }
        result?;
        Ok(Disposition::Reply(Reply::Ok))
    }

    fn do_refresh<S: SystemApi>(
        &mut self,
        sys: &mut S,
        caller: Endpoint,
        label: &str,
    ) -> Result<Disposition, RsError> {
        ServiceLabel::new(label).map_err(|e| RsError::InvalidArgument(e.to_string()))?;
        let id = self
            .registry
            .lookup_by_label(label)
            .ok_or(RsError::NotFound)?;
        self.check_permission(caller, RequestKind::Refresh, Some(label))?;

        let slot = self.registry.get(id).ok_or(RsError::NotFound)?;
        if slot.flags.is_terminated() {
            return Err(RsError::Conflict("service is not running".to_string()));
        }

        self.stop_instance(sys, id, true)?;
        self.log.info(format!("refreshing '{}'", label));
        Ok(Disposition::Reply(Reply::Ok))
    }

    fn do_update<S: SystemApi>(
        &mut self,
        sys: &mut S,
        caller: Endpoint,
        params: StartParams,
        state: UpdateStateToken,
        prepare_budget: i64,
    ) -> Result<Disposition, RsError> {
        let label = ServiceLabel::new(params.label.clone())
            .map_err(|e| RsError::InvalidArgument(e.to_string()))?;
        self.check_permission(caller, RequestKind::Update, Some(label.as_str()))?;

        if state.is_null() {
            return Err(RsError::InvalidArgument(
                "null update state".to_string(),
            ));
        }
        let budget = if prepare_budget == 0 {
            DEFAULT_PREPARE_BUDGET
        } else if prepare_budget < 0 || prepare_budget as u64 > MAX_PREPARE_BUDGET.as_raw() {
            return Err(RsError::InvalidArgument(
                "prepare budget out of range".to_string(),
            ));
        } else {
            Ticks::from_raw(prepare_budget as u64)
        };

        let anchor = self
            .registry
            .lookup_by_label(label.as_str())
            .ok_or(RsError::NotFound)?;

        if self.update.is_some() {
            self.log.warn(format!(
                "update of '{}' rejected: an update is already in progress",
                label
            ));
            return Err(RsError::Conflict(
                "an update is already in progress".to_string(),
            ));
        }
        {
            let slot = self.registry.get(anchor).ok_or(RsError::NotFound)?;
            if slot.flags.is_terminated()
                || slot.flags.is_exiting()
                || slot.flags.is_initializing()
            {
                return Err(RsError::Conflict(
                    "service is not in a stable state".to_string(),
                ));
            }
            if slot.has_pending_reply() {
                return Err(RsError::Conflict(
                    "a reply is already pending for this service".to_string(),
                ));
            }
        }

        // the replacement inherits unspecified settings from the old
        // version
        let mut new_params = params;
        {
            let old = self.registry.get(anchor).ok_or(RsError::NotFound)?;
            if new_params.period.is_none() {
                new_params.period = Some(old.period);
            }
            if new_params.script.is_none() {
                new_params.script = old.script.clone();
            }
        }

        // the replacement exists but is not run until prepare succeeds
        let slot = ServiceSlot::from_params(label.clone(), &new_params);
        let replacement = self.registry.alloc(slot).map_err(|_| RsError::OutOfSlots)?;
        if let Err(e) = self.create_instance(sys, replacement) {
            self.registry.free(replacement);
            return Err(e);
        }

        let anchor_endpoint = self
            .registry
            .get(anchor)
            .and_then(|s| s.endpoint)
            .ok_or_else(|| RsError::System("service has no endpoint".to_string()))?;
        if let Err(e) = sys.send_instruction(
            anchor_endpoint,
            Instruction::PrepareUpdate { state, budget },
        ) {
            self.discard_instance(sys, replacement);
            return Err(RsError::System(e.to_string()));
        }

        let now = sys.uptime();
        self.update = Some(UpdateTransaction::new(anchor, replacement, now, budget));
        if let Some(slot) = self.registry.get_mut(anchor) {
            slot.flags.set_updating(true);
            slot.defer_reply(caller, RequestKind::Update)?;
        }
        if let Some(slot) = self.registry.get_mut(replacement) {
            slot.flags.set_updating(true);
        }

        self.log.info(format!(
            "updating '{}' (prepare budget {})",
            label, budget
        ));
        Ok(Disposition::Deferred)
    }

    fn do_shutdown<S: SystemApi>(
        &mut self,
        _sys: &mut S,
        caller: Option<Endpoint>,
    ) -> Result<Disposition, RsError> {
        if let Some(caller) = caller {
            self.check_permission(caller, RequestKind::Shutdown, None)?;
        }
        self.shutting_down = true;
        for id in self.registry.ids_in_order() {
            if let Some(slot) = self.registry.get_mut(id) {
                slot.flags.mark_exiting();
            }
        }
        self.log
            .info("shutting down: all services marked exiting".to_string());
        Ok(Disposition::Reply(Reply::Ok))
    }

    fn do_info<S: SystemApi>(
        &mut self,
        sys: &mut S,
        caller: Endpoint,
        selector: TableSelector,
    ) -> Result<Disposition, RsError> {
        self.check_permission(caller, RequestKind::Info, None)?;
        let bytes = match selector {
            TableSelector::ServiceTable => serde_json::to_vec(&self.registry.service_table()),
            TableSelector::PublicTable => serde_json::to_vec(&self.registry.public_table()),
        }
        .map_err(|e| RsError::System(e.to_string()))?;
        sys.copy_to_caller(caller, &bytes)
            .map_err(|e| RsError::System(e.to_string()))?;
        Ok(Disposition::Reply(Reply::Ok))
    }

    fn do_label_lookup(
        &mut self,
        _caller: Endpoint,
        name: &[u8],
        len: usize,
    ) -> Result<Disposition, RsError> {
        if len < MIN_LABEL_LEN || len >= MAX_LOOKUP_NAME_LEN {
            return Err(RsError::InvalidArgument(
                "name length out of range".to_string(),
            ));
        }
        if len > name.len() {
            return Err(RsError::InvalidArgument(
                "declared length exceeds the name buffer".to_string(),
            ));
        }
        let name = std::str::from_utf8(&name[..len])
            .map_err(|_| RsError::InvalidArgument("name is not valid UTF-8".to_string()))?;
        let id = self
            .registry
            .lookup_by_label(name)
            .ok_or(RsError::NotFound)?;
        let endpoint = self
            .registry
            .get(id)
            .and_then(|s| s.endpoint)
            .ok_or(RsError::NotFound)?;
        Ok(Disposition::Reply(Reply::Endpoint(endpoint)))
    }

    /// Handles a self-report from a supervised service
    ///
    /// Reports from unknown endpoints, or reports that do not match the
    /// reporter's state, are logged and ignored; they never mutate the
    /// registry.
    pub fn handle_self_report<S: SystemApi>(
        &mut self,
        sys: &mut S,
        from: Endpoint,
        report: SelfReport,
    ) {
        let Some(id) = self.registry.lookup_by_endpoint(from) else {
            self.log
                .warn(format!("self-report from unknown endpoint {}", from));
            return;
        };
        match report {
            SelfReport::InitReady { result } => self.on_init_ready(sys, id, result),
            SelfReport::UpdateReady { result } => self.on_update_ready(sys, id, result),
        }
    }

    fn on_init_ready<S: SystemApi>(
        &mut self,
        sys: &mut S,
        id: core_types::SlotId,
        result: ipc::ReportOutcome,
    ) {
        let Some(slot) = self.registry.get(id) else {
            return;
        };
        let label = slot.label.clone();
        if !slot.flags.is_initializing() {
            self.log.warn(format!(
                "unexpected init-ready from '{}' (not initializing)",
                label
            ));
            return;
        }

        if let ipc::ReportOutcome::Failure(code) = result {
            self.log.warn(format!(
                "'{}' failed to initialize (code {})",
                label, code
            ));
            let failed_replacement = self
                .update
                .as_ref()
                .is_some_and(|txn| txn.replacement() == id);
            if failed_replacement {
                self.end_update(
                    sys,
                    Err(RsError::Conflict(format!(
                        "replacement failed to initialize (code {})",
                        code
                    ))),
                );
            } else {
                self.crash_instance(sys, id);
            }
            return;
        }

        let now = sys.uptime();
        if let Some(slot) = self.registry.get_mut(id) {
            slot.flags.complete_init();
            slot.alive_tm = now;
            slot.check_tm = Tick::from_raw(0);
        }
        self.late_reply(sys, id, Ok(Reply::Ok));

        let committed_update = self
            .update
            .as_ref()
            .is_some_and(|txn| txn.replacement() == id);
        if committed_update {
            self.end_update(sys, Ok(()));
            return;
        }

        // restart handover: the successor takes the label, the retiring
        // instance's slot is reclaimed
        let prev = self.registry.get(id).and_then(|s| s.prev);
        if let Some(old) = prev {
            self.activate_instance(sys, id);
            self.cleanup_instance(sys, old);
            if let Some(slot) = self.registry.get_mut(id) {
                slot.prev = None;
            }
            self.log.info(format!("'{}' restarted", label));
        } else {
            self.log.info(format!("'{}' initialized", label));
        }
    }

    fn on_update_ready<S: SystemApi>(
        &mut self,
        sys: &mut S,
        id: core_types::SlotId,
        result: ipc::ReportOutcome,
    ) {
        let Some(txn) = self.update.as_ref() else {
            self.log
                .warn("update-ready with no update in progress".to_string());
            return;
        };
        if txn.anchor() != id {
            self.log.warn(
                "update-ready from a process that is not the preparing instance".to_string(),
            );
            return;
        }

        if let ipc::ReportOutcome::Failure(code) = result {
            self.end_update(
                sys,
                Err(RsError::Conflict(format!(
                    "prepare failed with code {}",
                    code
                ))),
            );
            return;
        }

        // prepare succeeded: hand the label to the replacement and let
        // it initialize
        let replacement = txn.replacement();
        if let Some(txn) = self.update.as_mut() {
            txn.mark_swapped();
        }
        self.activate_instance(sys, replacement);
        if let Err(e) = self.run_instance(sys, replacement) {
            self.end_update(sys, Err(e));
        }
    }

    /// Handles the exit of a supervised process
    ///
    /// This is the orderly path: a stop completes, a refresh rolls into
    /// its restart, a crash schedules recovery, and an exit during a
    /// live update aborts the transaction.
    pub fn handle_process_exit<S: SystemApi>(
        &mut self,
        sys: &mut S,
        pid: Pid,
        status: ExitStatus,
    ) {
        let Some(id) = self.registry.lookup_by_pid(pid) else {
            self.log
                .debug(format!("exit of unsupervised process {}", pid));
            return;
        };

        if let Some(txn) = self.update.as_ref() {
            if txn.replacement() == id {
                self.end_update(
                    sys,
                    Err(RsError::Conflict(
                        "replacement instance died during the update".to_string(),
                    )),
                );
                return;
            }
            if txn.anchor() == id {
                self.end_update(
                    sys,
                    Err(RsError::Conflict(
                        "service died while preparing for the update".to_string(),
                    )),
                );
                // fall through: the anchor's death is handled like any
                // other exit
            }
        }

        let Some(slot) = self.registry.get_mut(id) else {
            return;
        };
        let was_exiting = slot.flags.is_exiting();
        let was_refreshing = slot.flags.is_refreshing();
        slot.flags.confirm_exit();
        slot.stop_tm = None;
        let label = slot.label.clone();
        let has_script = slot.script.is_some();

        if was_exiting {
            if was_refreshing && !self.shutting_down {
                if let Err(e) = self.restart_service(sys, id) {
                    self.log
                        .error(format!("refresh restart of '{}' failed: {}", label, e));
                    // no revival is coming; finish as a plain stop
                    self.late_reply(sys, id, Ok(Reply::Ok));
                    self.cleanup_instance(sys, id);
                }
            } else {
                self.late_reply(sys, id, Ok(Reply::Ok));
                self.cleanup_instance(sys, id);
                self.log.info(format!("'{}' stopped", label));
            }
            return;
        }

        self.log
            .warn(format!("'{}' {}", label, describe_exit(status)));
        if has_script {
            if let Err(e) = self.restart_service(sys, id) {
                self.log
                    .error(format!("recovery script for '{}' failed: {}", label, e));
            }
        } else if let Some(slot) = self.registry.get_mut(id) {
            let backoff = (1u64 << slot.restarts.min(6)).min(MAX_BACKOFF);
            slot.backoff = backoff;
            self.log.info(format!(
                "will restart '{}' in {} ticks",
                label, backoff
            ));
        }
    }

    fn discard_instance<S: SystemApi>(&mut self, sys: &mut S, id: core_types::SlotId) {
        if let Some(pid) = self.registry.get(id).and_then(|s| s.pid) {
            let _ = sys.signal_process(pid, Signal::Kill);
        }
        self.cleanup_instance(sys, id);
    }
}
