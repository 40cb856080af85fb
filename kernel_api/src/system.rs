//! The system interface trait

use crate::SystemError;
use core_types::{Endpoint, Pid, ServiceLabel, Tick, Ticks};
use ipc::{Instruction, ReplyEnvelope};
use serde::{Deserialize, Serialize};

/// Signals the reincarnation service can deliver to a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Polite request to exit (SIGTERM equivalent)
    Terminate,
    /// Forced termination (SIGKILL equivalent); used to simulate a crash
    Kill,
}

/// How a reaped child terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    /// Voluntary exit with a status code
    Exited(i32),
    /// Terminated by a signal
    Signaled(Signal),
}

/// The interface to the kernel, process manager, and transport
///
/// This is the complete set of effects the supervision core can have on
/// the rest of the system. Implementations must be non-blocking: a call
/// either completes or fails immediately, and longer-running outcomes
/// (process exits, self-reports) are delivered back as events.
pub trait SystemApi {
    /// Creates a process image for a service instance
    ///
    /// The process exists but is not schedulable until [`run_process`]
    /// is called; a live update uses this gap to build the replacement
    /// instance without running it.
    ///
    /// [`run_process`]: SystemApi::run_process
    fn create_process(
        &mut self,
        program: &str,
        label: &ServiceLabel,
    ) -> Result<(Pid, Endpoint), SystemError>;

    /// Makes a created process schedulable
    fn run_process(&mut self, endpoint: Endpoint) -> Result<(), SystemError>;

    /// Delivers a signal to a process
    fn signal_process(&mut self, pid: Pid, signal: Signal) -> Result<(), SystemError>;

    /// Publishes a label → endpoint binding to the rest of the system
    fn publish_label(&mut self, label: &ServiceLabel, endpoint: Endpoint)
        -> Result<(), SystemError>;

    /// Withdraws a published label
    fn unpublish_label(&mut self, label: &ServiceLabel) -> Result<(), SystemError>;

    /// Sends an asynchronous instruction to a service instance
    fn send_instruction(&mut self, to: Endpoint, instruction: Instruction)
        -> Result<(), SystemError>;

    /// Sends a reply (immediate or late) to a caller
    fn send_reply(&mut self, reply: ReplyEnvelope) -> Result<(), SystemError>;

    /// Copies raw bytes into the caller's address space (info queries)
    fn copy_to_caller(&mut self, to: Endpoint, bytes: &[u8]) -> Result<(), SystemError>;

    /// Arms the one-shot tick alarm `delta` ticks from now
    ///
    /// The alarm is the only recurring trigger the health monitor has;
    /// callers treat a failure here as fatal.
    fn set_tick_alarm(&mut self, delta: Ticks) -> Result<(), SystemError>;

    /// Collects one terminated child, if any (non-blocking)
    fn reap_next(&mut self) -> Option<(Pid, ExitStatus)>;

    /// Launches a recovery script for a crashed service
    fn launch_recovery_script(
        &mut self,
        script: &str,
        label: &ServiceLabel,
    ) -> Result<(), SystemError>;

    /// Returns the current uptime in ticks
    fn uptime(&self) -> Tick;
}
