//! Recovery Test Utilities
//!
//! Shared helpers for the recovery and live-update integration tests.
//!
//! ## Test Philosophy
//!
//! - **Deterministic failures**: crashes, hung stops, and missed
//!   heartbeats are injected through the simulated system
//! - **Invariants under faults**: the registry, the label bindings, and
//!   the single update transaction stay consistent through every
//!   failure path
//! - **Exactly one reply**: a deferred request is answered once, no
//!   matter which event completes it

use core_types::{Endpoint, Pid};
use ipc::{ReportOutcome, Request, SelfReport, StartParams};
use policy::AllowAll;
use services_reincarnation::ReincarnationServer;
use sim_kernel::SimulatedSystem;

/// Bootstrap helper: a simulated system and a permissive server
pub fn test_bootstrap() -> (SimulatedSystem, ReincarnationServer<AllowAll>) {
    let sys = SimulatedSystem::new();
    let server = ReincarnationServer::new(AllowAll);
    (sys, server)
}

/// Starts a service and drives it through a successful initialization
///
/// Returns the caller that issued the start, and the pid and endpoint
/// of the running instance.
pub fn running_service(
    sys: &mut SimulatedSystem,
    server: &mut ReincarnationServer<AllowAll>,
    params: StartParams,
) -> (Endpoint, Pid, Endpoint) {
    let label = params.label.clone();
    let caller = Endpoint::new();
    let disposition = server
        .handle_request(sys, Some(caller), Request::Start { params })
        .expect("start request failed");
    assert!(disposition.is_deferred());

    let (pid, endpoint) = instance_identity(server, &label);
    report_init_ready(sys, server, endpoint, ReportOutcome::Success);
    (caller, pid, endpoint)
}

/// Returns the pid and endpoint of the instance owning a label
pub fn instance_identity(
    server: &ReincarnationServer<AllowAll>,
    label: &str,
) -> (Pid, Endpoint) {
    let id = server
        .registry()
        .lookup_by_label(label)
        .expect("label not registered");
    let slot = server.registry().get(id).expect("stale slot id");
    (
        slot.pid.expect("instance has no pid"),
        slot.endpoint.expect("instance has no endpoint"),
    )
}

/// Delivers an init-ready self-report
pub fn report_init_ready(
    sys: &mut SimulatedSystem,
    server: &mut ReincarnationServer<AllowAll>,
    from: Endpoint,
    result: ReportOutcome,
) {
    server.handle_self_report(sys, from, SelfReport::InitReady { result });
}

/// Delivers an update-ready self-report
pub fn report_update_ready(
    sys: &mut SimulatedSystem,
    server: &mut ReincarnationServer<AllowAll>,
    from: Endpoint,
    result: ReportOutcome,
) {
    server.handle_self_report(sys, from, SelfReport::UpdateReady { result });
}
