//! The health monitor
//!
//! Driven by the one-shot tick alarm: every pass checks the update
//! deadline, counts down crash-restart backoffs, enforces the stop
//! watchdog, and runs the heartbeat protocol, then rearms the alarm.
//! Losing the alarm would silently stop all supervision, so a rearm
//! failure is fatal.

use crate::server::ReincarnationServer;
use crate::{INIT_GRACE_PERIOD, TICK_INTERVAL};
use core_types::Endpoint;
use ipc::{Instruction, RsError};
use kernel_api::SystemApi;
use policy::PermissionGate;

impl<G: PermissionGate> ReincarnationServer<G> {
    /// Records a heartbeat (ping answer) from a supervised service
    pub fn handle_heartbeat<S: SystemApi>(&mut self, sys: &S, from: Endpoint) {
        let now = sys.uptime();
        if let Some(id) = self.registry.lookup_by_endpoint(from) {
            if let Some(slot) = self.registry.get_mut(id) {
                slot.alive_tm = now;
            }
        }
    }

    /// Runs one pass of the health monitor and rearms the tick alarm
    pub fn handle_tick<S: SystemApi>(&mut self, sys: &mut S) {
        let now = sys.uptime();

        // the whole update transaction lives under one deadline, from
        // prepare through the replacement's initialization
        if let Some(txn) = self.update.as_ref() {
            if txn.deadline_passed(now) {
                let anchor = txn.anchor();
                let swapped = txn.is_swapped();
                self.log
                    .warn("update failed: deadline passed".to_string());
                self.end_update(sys, Err(RsError::Conflict("update timed out".to_string())));
                // pre-swap the anchor is the one that failed to prepare;
                // post-swap end_update already killed the replacement
                if !swapped {
                    self.crash_instance(sys, anchor);
                }
            }
        }

        for id in self.registry.ids_in_order() {
            let Some(slot) = self.registry.get(id) else {
                continue;
            };
            if slot.flags.is_updating() {
                continue;
            }

            // a scheduled crash restart counts down first
            if slot.backoff > 0 {
                let exiting = slot.flags.is_exiting();
                let fire = {
                    let Some(slot) = self.registry.get_mut(id) else {
                        continue;
                    };
                    slot.backoff -= 1;
                    slot.backoff == 0
                };
                if fire && !exiting {
                    if let Err(e) = self.restart_service(sys, id) {
                        self.log.error(format!("scheduled restart failed: {}", e));
                        // the waiting caller hears the failure
                        self.late_reply(sys, id, Err(e));
                    }
                }
                continue;
            }

            let label = slot.label.clone();
            let terminated = slot.flags.is_terminated();
            let initializing = slot.flags.is_initializing();
            let missed = slot.flags.missed_heartbeat();
            let has_pid = slot.pid.is_some();
            let endpoint = slot.endpoint;
            let alive_tm = slot.alive_tm;
            let check_tm = slot.check_tm;
            let stop_tm = slot.stop_tm;
            let configured_period = slot.period;

            // stop watchdog: a stop signal that went unanswered for two
            // intervals escalates to a forced kill, once
            if let Some(stop_tm) = stop_tm {
                if !terminated && has_pid && now.since(stop_tm) > TICK_INTERVAL * 2 {
                    if let Some(slot) = self.registry.get_mut(id) {
                        slot.stop_tm = None;
                    }
                    self.log
                        .warn(format!("'{}' ignored its stop signal", label));
                    self.crash_instance(sys, id);
                }
                continue;
            }

            if terminated {
                continue;
            }

            // heartbeat: an initializing instance runs under the init
            // grace period instead of its configured one
            let period = if initializing {
                INIT_GRACE_PERIOD
            } else {
                configured_period
            };
            if period.is_zero() {
                continue;
            }

            if alive_tm < check_tm {
                // a ping (or the init acknowledgement) is outstanding
                if !missed && has_pid && now.since(alive_tm) > period * 2 {
                    if let Some(slot) = self.registry.get_mut(id) {
                        slot.flags.mark_no_ping_reply();
                    }
                    self.log
                        .warn(format!("'{}' missed its heartbeat window", label));
                    self.crash_instance(sys, id);
                }
            } else if now.since(check_tm) > period {
                if let Some(endpoint) = endpoint {
                    match sys.send_instruction(endpoint, Instruction::Ping) {
                        Ok(()) => {
                            if let Some(slot) = self.registry.get_mut(id) {
                                slot.check_tm = now;
                            }
                        }
                        Err(e) => self
                            .log
                            .warn(format!("failed to ping '{}': {}", label, e)),
                    }
                }
            }
        }

        // without the alarm the monitor never runs again; nothing can
        // recover from that
        if let Err(e) = sys.set_tick_alarm(TICK_INTERVAL) {
            panic!("failed to rearm the tick alarm: {}", e);
        }
    }
}
