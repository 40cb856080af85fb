//! The reaper
//!
//! Sweeps children that terminated outside the supervised stop
//! protocol (killed by another manager, double-fault teardown). The
//! whole group of slots belonging to the affected logical service is
//! reclaimed without the stop sequence; a deferred reply still owed by
//! a reclaimed slot is answered with an error, so no caller waits
//! forever. The update transaction is cleared only when a reclaimed
//! slot is one of its two halves.

use crate::server::ReincarnationServer;
use ipc::RsError;
use kernel_api::SystemApi;
use policy::PermissionGate;

impl<G: PermissionGate> ReincarnationServer<G> {
    /// Drains the reap queue and reclaims orphaned slots
    pub fn handle_child_exits<S: SystemApi>(&mut self, sys: &mut S) {
        while let Some((pid, _status)) = sys.reap_next() {
            let Some(id) = self.registry.lookup_by_pid(pid) else {
                self.log.debug(format!("reaped unknown process {}", pid));
                continue;
            };
            let Some(label) = self.registry.get(id).map(|s| s.label.clone()) else {
                continue;
            };
            self.log.warn(format!(
                "'{}' was reaped outside the stop protocol",
                label
            ));

            // every slot belonging to this logical service goes with it
            let mut group = vec![id];
            if let Some(prev) = self.registry.get(id).and_then(|s| s.prev) {
                if self.registry.get(prev).is_some() {
                    group.push(prev);
                }
            }
            for other in self.registry.ids_in_order() {
                if self.registry.get(other).and_then(|s| s.prev) == Some(id)
                    && !group.contains(&other)
                {
                    group.push(other);
                }
            }
            if let Some(txn) = self.update.as_ref() {
                if txn.involves(id) {
                    let partner = if txn.anchor() == id {
                        txn.replacement()
                    } else {
                        txn.anchor()
                    };
                    if self.registry.get(partner).is_some() && !group.contains(&partner) {
                        group.push(partner);
                    }
                }
            }

            for member in group {
                if self.update.as_ref().is_some_and(|t| t.involves(member)) {
                    self.update = None;
                    self.log
                        .warn("update abandoned: a participant was reaped".to_string());
                }
                if self
                    .registry
                    .get(member)
                    .is_some_and(|s| s.has_pending_reply())
                {
                    self.log.warn(format!(
                        "answering the reply owed by '{}' with an error",
                        label
                    ));
                    self.late_reply(
                        sys,
                        member,
                        Err(RsError::System("service was reaped".to_string())),
                    );
                }
                self.cleanup_instance(sys, member);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Endpoint;
    use ipc::{ReportOutcome, Request, SelfReport, StartParams, UpdateStateToken};
    use kernel_api::{ExitStatus, Signal};
    use policy::AllowAll;
    use sim_kernel::SimulatedSystem;

    fn server() -> ReincarnationServer<AllowAll> {
        ReincarnationServer::with_capacity(AllowAll, 8)
    }

    fn start_service(
        srv: &mut ReincarnationServer<AllowAll>,
        sys: &mut SimulatedSystem,
        label: &str,
    ) -> core_types::Pid {
        srv.handle_request(
            sys,
            Some(Endpoint::new()),
            Request::Start {
                params: StartParams::new(label, format!("/sbin/{}", label)),
            },
        )
        .unwrap();
        let id = srv.registry().lookup_by_label(label).unwrap();
        let endpoint = srv.registry().get(id).unwrap().endpoint.unwrap();
        srv.handle_self_report(
            sys,
            endpoint,
            SelfReport::InitReady {
                result: ReportOutcome::Success,
            },
        );
        srv.registry().get(id).unwrap().pid.unwrap()
    }

    #[test]
    fn test_unknown_pid_is_ignored() {
        let mut sys = SimulatedSystem::new();
        let mut srv = server();
        let (pid, _) = sys
            .create_process("/sbin/stray", &core_types::ServiceLabel::new("st").unwrap())
            .unwrap();
        sys.inject_exit(pid, ExitStatus::Exited(0));
        srv.handle_child_exits(&mut sys);
        assert!(srv.registry().is_empty());
    }

    #[test]
    fn test_reaped_service_is_reclaimed_without_reply() {
        let mut sys = SimulatedSystem::new();
        let mut srv = server();
        let pid = start_service(&mut srv, &mut sys, "fs");
        let replies_before = sys.replies().len();

        sys.inject_exit(pid, ExitStatus::Signaled(Signal::Kill));
        srv.handle_child_exits(&mut sys);

        assert!(srv.registry().is_empty());
        assert!(sys.published_endpoint("fs").is_none());
        assert_eq!(sys.replies().len(), replies_before);
    }

    #[test]
    fn test_reap_during_handover_reclaims_both_instances() {
        let mut sys = SimulatedSystem::new();
        let mut srv = server();
        let pid = start_service(&mut srv, &mut sys, "fs");

        // crash and immediate revival: old and successor coexist
        srv.handle_process_exit(&mut sys, pid, ExitStatus::Signaled(Signal::Kill));
        sys.advance(core_types::Ticks::from_raw(1));
        srv.handle_tick(&mut sys);
        assert_eq!(srv.registry().len(), 2);

        // the successor is reaped before it ever initialized
        let succ = srv
            .registry()
            .ids_in_order()
            .into_iter()
            .find(|i| srv.registry().get(*i).unwrap().flags.is_initializing())
            .unwrap();
        let succ_pid = srv.registry().get(succ).unwrap().pid.unwrap();
        sys.inject_exit(succ_pid, ExitStatus::Signaled(Signal::Kill));
        srv.handle_child_exits(&mut sys);

        assert!(srv.registry().is_empty());
    }

    #[test]
    fn test_reap_of_update_half_clears_the_transaction() {
        let mut sys = SimulatedSystem::new();
        let mut srv = server();
        let pid = start_service(&mut srv, &mut sys, "fs");
        start_service(&mut srv, &mut sys, "net");

        srv.handle_request(
            &mut sys,
            Some(Endpoint::new()),
            Request::Update {
                params: StartParams::new("fs", "/sbin/fs-v2"),
                state: UpdateStateToken::from_raw(1),
                prepare_budget: 0,
            },
        )
        .unwrap();
        assert!(srv.update_transaction().is_some());
        assert_eq!(srv.registry().len(), 3);

        sys.inject_exit(pid, ExitStatus::Signaled(Signal::Kill));
        srv.handle_child_exits(&mut sys);

        assert!(srv.update_transaction().is_none());
        // both update halves are gone; the unrelated service survives
        assert_eq!(srv.registry().len(), 1);
        assert!(srv.registry().lookup_by_label("net").is_some());
        assert!(srv.registry().lookup_by_label("fs").is_none());
    }

    #[test]
    fn test_reaped_update_anchor_still_answers_the_caller() {
        let mut sys = SimulatedSystem::new();
        let mut srv = server();
        let pid = start_service(&mut srv, &mut sys, "fs");

        let caller = Endpoint::new();
        srv.handle_request(
            &mut sys,
            Some(caller),
            Request::Update {
                params: StartParams::new("fs", "/sbin/fs-v2"),
                state: UpdateStateToken::from_raw(1),
                prepare_budget: 0,
            },
        )
        .unwrap();
        assert!(sys.replies_to(caller).is_empty());

        sys.inject_exit(pid, ExitStatus::Signaled(Signal::Kill));
        srv.handle_child_exits(&mut sys);

        // exactly one reply, carrying the error
        let replies = sys.replies_to(caller);
        assert_eq!(replies.len(), 1);
        assert!(matches!(replies[0].result, Err(RsError::System(_))));
        assert!(srv.update_transaction().is_none());
        assert!(srv.registry().is_empty());
    }

    #[test]
    fn test_reap_of_bystander_leaves_the_transaction_alone() {
        let mut sys = SimulatedSystem::new();
        let mut srv = server();
        start_service(&mut srv, &mut sys, "fs");
        let net_pid = start_service(&mut srv, &mut sys, "net");

        srv.handle_request(
            &mut sys,
            Some(Endpoint::new()),
            Request::Update {
                params: StartParams::new("fs", "/sbin/fs-v2"),
                state: UpdateStateToken::from_raw(1),
                prepare_budget: 0,
            },
        )
        .unwrap();

        sys.inject_exit(net_pid, ExitStatus::Exited(1));
        srv.handle_child_exits(&mut sys);

        assert!(srv.update_transaction().is_some());
        assert_eq!(srv.registry().len(), 2);
    }
}
