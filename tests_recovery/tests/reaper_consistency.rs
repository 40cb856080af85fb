//! Reaper Consistency Tests
//!
//! Validates that exits collected outside the stop protocol reclaim
//! every slot of the affected logical service while leaving unrelated
//! services and transactions intact.

use core_types::{Endpoint, Ticks};
use ipc::{Request, StartParams, UpdateStateToken};
use kernel_api::{ExitStatus, Signal};
use tests_recovery::{running_service, test_bootstrap};

/// Test: a reaped service disappears completely, with no reply
#[test]
fn test_reaped_service_is_fully_reclaimed() {
    let (mut sys, mut server) = test_bootstrap();
    let (_, pid, _) = running_service(&mut sys, &mut server, StartParams::new("fs", "/sbin/fs"));
    running_service(&mut sys, &mut server, StartParams::new("net", "/sbin/net"));
    let replies_before = sys.replies().len();

    sys.inject_exit(pid, ExitStatus::Signaled(Signal::Kill));
    server.handle_child_exits(&mut sys);

    assert_eq!(server.registry().len(), 1);
    assert!(server.registry().lookup_by_label("fs").is_none());
    assert!(sys.published_endpoint("fs").is_none());
    assert!(server.registry().lookup_by_label("net").is_some());
    assert_eq!(sys.replies().len(), replies_before);
}

/// Test: reaping one half of a restart handover reclaims both halves
#[test]
fn test_reap_during_handover_reclaims_the_pair() {
    let (mut sys, mut server) = test_bootstrap();
    let (_, pid, _) = running_service(&mut sys, &mut server, StartParams::new("fs", "/sbin/fs"));

    server.handle_process_exit(&mut sys, pid, ExitStatus::Signaled(Signal::Kill));
    sys.advance(Ticks::from_raw(1));
    server.handle_tick(&mut sys);
    assert_eq!(server.registry().len(), 2);

    let succ_pid = server
        .registry()
        .ids_in_order()
        .into_iter()
        .filter_map(|id| server.registry().get(id))
        .find(|slot| slot.flags.is_initializing())
        .and_then(|slot| slot.pid)
        .expect("no successor pid");
    sys.inject_exit(succ_pid, ExitStatus::Signaled(Signal::Kill));
    server.handle_child_exits(&mut sys);

    assert!(server.registry().is_empty());
    assert!(sys.published_endpoint("fs").is_none());
}

/// Test: reaping an update participant abandons the transaction but
/// spares bystanders
#[test]
fn test_reap_of_update_half_spares_bystanders() {
    let (mut sys, mut server) = test_bootstrap();
    let (_, fs_pid, _) = running_service(&mut sys, &mut server, StartParams::new("fs", "/sbin/fs"));
    running_service(&mut sys, &mut server, StartParams::new("net", "/sbin/net"));

    server
        .handle_request(
            &mut sys,
            Some(Endpoint::new()),
            Request::Update {
                params: StartParams::new("fs", "/sbin/fs-v2"),
                state: UpdateStateToken::from_raw(1),
                prepare_budget: 0,
            },
        )
        .expect("update failed");
    assert_eq!(server.registry().len(), 3);

    sys.inject_exit(fs_pid, ExitStatus::Signaled(Signal::Kill));
    server.handle_child_exits(&mut sys);

    assert!(server.update_transaction().is_none());
    assert_eq!(server.registry().len(), 1);
    assert!(server.registry().lookup_by_label("net").is_some());

    // the system keeps running: ticks pass without incident
    sys.advance(Ticks::from_raw(1));
    server.handle_tick(&mut sys);
}
