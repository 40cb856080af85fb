//! Service Lifecycle Tests
//!
//! Validates the orderly paths: start, stop, refresh, lookup, info,
//! and shutdown, including the deferred-reply protocol around them.

use core_types::Endpoint;
use ipc::{Disposition, Reply, ReportOutcome, Request, RequestKind, RsError, StartParams, TableSelector};
use kernel_api::ExitStatus;
use policy::AllowAll;
use services_reincarnation::{ReincarnationServer, SlotSummary};
use tests_recovery::{instance_identity, report_init_ready, running_service, test_bootstrap};

/// Test: a service is started, resolved, and stopped
///
/// This validates that:
/// 1. The start reply is deferred until the service reports ready
/// 2. The label resolves to the live endpoint while running
/// 3. The stop reply is deferred until the process exit is confirmed
/// 4. The slot and the published label are reclaimed afterwards
#[test]
fn test_start_resolve_stop_roundtrip() {
    let (mut sys, mut server) = test_bootstrap();
    let (caller, pid, endpoint) =
        running_service(&mut sys, &mut server, StartParams::new("fs", "/sbin/fs"));

    let replies = sys.replies_to(caller);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].result, Ok(Reply::Ok));
    assert_eq!(sys.published_endpoint("fs"), Some(endpoint));

    let resolved = server
        .handle_request(
            &mut sys,
            Some(Endpoint::new()),
            Request::LabelLookup {
                name: b"fs".to_vec(),
                len: 2,
            },
        )
        .expect("lookup failed");
    assert_eq!(resolved, Disposition::Reply(Reply::Endpoint(endpoint)));

    let stopper = Endpoint::new();
    let disposition = server
        .handle_request(
            &mut sys,
            Some(stopper),
            Request::Stop {
                label: "fs".to_string(),
            },
        )
        .expect("stop failed");
    assert!(disposition.is_deferred());
    assert!(sys.replies_to(stopper).is_empty());

    server.handle_process_exit(&mut sys, pid, ExitStatus::Exited(0));

    let replies = sys.replies_to(stopper);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].request, RequestKind::Stop);
    assert_eq!(replies[0].result, Ok(Reply::Ok));
    assert!(server.registry().is_empty());
    assert!(sys.published_endpoint("fs").is_none());
}

/// Test: a duplicate label is rejected and leaves exactly one slot
#[test]
fn test_duplicate_label_leaves_one_slot() {
    let (mut sys, mut server) = test_bootstrap();
    running_service(&mut sys, &mut server, StartParams::new("net", "/sbin/net"));

    let err = server
        .handle_request(
            &mut sys,
            Some(Endpoint::new()),
            Request::Start {
                params: StartParams::new("net", "/sbin/other"),
            },
        )
        .unwrap_err();
    assert!(matches!(err, RsError::Conflict(_)));
    assert_eq!(server.registry().len(), 1);

    // the surviving instance is the original
    let (_, endpoint) = instance_identity(&server, "net");
    assert_eq!(sys.published_endpoint("net"), Some(endpoint));
}

/// Test: operations against an unknown label fail without mutating
/// anything
#[test]
fn test_unknown_label_mutates_nothing() {
    let (mut sys, mut server) = test_bootstrap();
    for request in [
        Request::Stop {
            label: "ghost".to_string(),
        },
        Request::Restart {
            label: "ghost".to_string(),
        },
        Request::Refresh {
            label: "ghost".to_string(),
        },
    ] {
        let err = server
            .handle_request(&mut sys, Some(Endpoint::new()), request)
            .unwrap_err();
        assert_eq!(err, RsError::NotFound);
    }
    assert!(server.registry().is_empty());
    assert!(sys.replies().is_empty());
    assert!(sys.signals().is_empty());
}

/// Test: refresh keeps the label while cycling the instance
#[test]
fn test_refresh_cycles_the_instance() {
    let (mut sys, mut server) = test_bootstrap();
    let (_, pid, old_endpoint) =
        running_service(&mut sys, &mut server, StartParams::new("net", "/sbin/net"));

    let disposition = server
        .handle_request(
            &mut sys,
            Some(Endpoint::new()),
            Request::Refresh {
                label: "net".to_string(),
            },
        )
        .expect("refresh failed");
    assert_eq!(disposition, Disposition::Reply(Reply::Ok));

    server.handle_process_exit(&mut sys, pid, ExitStatus::Exited(0));

    // the successor is initializing under the same label
    let succ = server
        .registry()
        .ids_in_order()
        .into_iter()
        .find(|id| server.registry().get(*id).unwrap().flags.is_initializing())
        .expect("no successor instance");
    let new_endpoint = server.registry().get(succ).unwrap().endpoint.unwrap();
    report_init_ready(&mut sys, &mut server, new_endpoint, ReportOutcome::Success);

    assert_eq!(server.registry().len(), 1);
    assert_ne!(new_endpoint, old_endpoint);
    assert_eq!(sys.published_endpoint("net"), Some(new_endpoint));
}

/// Test: the info query copies a table the caller can deserialize
#[test]
fn test_info_table_is_consistent() {
    let (mut sys, mut server) = test_bootstrap();
    running_service(&mut sys, &mut server, StartParams::new("fs", "/sbin/fs"));
    running_service(&mut sys, &mut server, StartParams::new("net", "/sbin/net"));

    let caller = Endpoint::new();
    server
        .handle_request(
            &mut sys,
            Some(caller),
            Request::Info {
                selector: TableSelector::ServiceTable,
            },
        )
        .expect("info failed");

    let copies = sys.copies_to(caller);
    assert_eq!(copies.len(), 1);
    let table: Vec<SlotSummary> = serde_json::from_slice(copies[0]).expect("bad table payload");
    assert_eq!(table.len(), 2);
    let mut labels: Vec<_> = table.iter().map(|row| row.label.as_str()).collect();
    labels.sort_unstable();
    assert_eq!(labels, vec!["fs", "net"]);
}

/// Test: shutdown drains the system and suppresses revival
///
/// This validates that:
/// 1. A crashed service waiting out its backoff is never revived once
///    shutdown begins
/// 2. Running services are treated as orderly exits and reclaimed
#[test]
fn test_shutdown_drains_without_revival() {
    let (mut sys, mut server) = test_bootstrap();
    let (_, crashed_pid, _) =
        running_service(&mut sys, &mut server, StartParams::new("fs", "/sbin/fs"));
    let (_, live_pid, _) =
        running_service(&mut sys, &mut server, StartParams::new("net", "/sbin/net"));

    server.handle_process_exit(
        &mut sys,
        crashed_pid,
        ExitStatus::Signaled(kernel_api::Signal::Kill),
    );

    server
        .handle_request(&mut sys, None, Request::Shutdown)
        .expect("shutdown failed");
    assert!(server.is_shutting_down());

    // ticks pass; the backoff is consumed but nothing is revived
    for _ in 0..4 {
        sys.advance(core_types::Ticks::from_raw(1));
        server.handle_tick(&mut sys);
    }
    assert_eq!(server.registry().len(), 2);
    assert!(sys.script_launches().is_empty());

    // the live service exits; its slot is reclaimed
    server.handle_process_exit(&mut sys, live_pid, ExitStatus::Exited(0));
    assert_eq!(server.registry().len(), 1);
    assert!(sys.published_endpoint("net").is_none());
}

/// Test: the registry rejects allocations when full and recovers after
/// a slot is reclaimed
#[test]
fn test_full_registry_recovers_after_stop() {
    let mut sys = sim_kernel::SimulatedSystem::new();
    let mut server = ReincarnationServer::with_capacity(AllowAll, 1);
    let (_, pid, _) = running_service(&mut sys, &mut server, StartParams::new("fs", "/sbin/fs"));

    let err = server
        .handle_request(
            &mut sys,
            Some(Endpoint::new()),
            Request::Start {
                params: StartParams::new("net", "/sbin/net"),
            },
        )
        .unwrap_err();
    assert_eq!(err, RsError::OutOfSlots);

    server
        .handle_request(
            &mut sys,
            Some(Endpoint::new()),
            Request::Stop {
                label: "fs".to_string(),
            },
        )
        .expect("stop failed");
    server.handle_process_exit(&mut sys, pid, ExitStatus::Exited(0));

    running_service(&mut sys, &mut server, StartParams::new("net", "/sbin/net"));
    assert_eq!(server.registry().len(), 1);
}
