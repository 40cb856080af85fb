//! # Simulated System
//!
//! An in-process implementation of the system interface for testing the
//! supervision core.
//!
//! ## Purpose
//!
//! The simulated system allows testing supervision behavior without a
//! kernel:
//! - Runs under `cargo test`
//! - Deterministic (controlled tick clock, no real concurrency)
//! - Inspectable (every instruction, reply, signal, publication, alarm,
//!   and copy-out is recorded)
//!
//! ## Philosophy
//!
//! **Testability is a first-class design constraint.**
//!
//! This is not a mock with canned answers - it is a small working model
//! of the world the reincarnation service runs in: processes are
//! created, run, signalled, and reaped; time advances only when a test
//! says so.

use core_types::{Endpoint, Pid, ServiceLabel, Tick, Ticks};
use ipc::{Instruction, ReplyEnvelope};
use kernel_api::{ExitStatus, Signal, SystemApi, SystemError};
use std::collections::{HashMap, VecDeque};

/// One simulated process
#[derive(Debug, Clone)]
pub struct SimProcess {
    /// Messaging identity
    pub endpoint: Endpoint,
    /// Label the process was created under
    pub label: ServiceLabel,
    /// Program image
    pub program: String,
    /// True once `run_process` was called
    pub running: bool,
    /// False once the process terminated (killed or exit injected)
    pub alive: bool,
}

/// Simulated system state
pub struct SimulatedSystem {
    now: Tick,
    next_pid: u32,
    processes: HashMap<Pid, SimProcess>,
    endpoint_index: HashMap<Endpoint, Pid>,
    published: HashMap<String, Endpoint>,
    instructions: Vec<(Endpoint, Instruction)>,
    replies: Vec<ReplyEnvelope>,
    signals: Vec<(Pid, Signal)>,
    copies: Vec<(Endpoint, Vec<u8>)>,
    armed_alarms: u64,
    reap_queue: VecDeque<(Pid, ExitStatus)>,
    script_launches: Vec<(String, String)>,
    fail_next_create: bool,
    fail_alarm: bool,
}

impl SimulatedSystem {
    /// Creates a fresh simulated system at tick zero
    pub fn new() -> Self {
        Self {
            now: Tick::from_raw(0),
            next_pid: 1,
            processes: HashMap::new(),
            endpoint_index: HashMap::new(),
            published: HashMap::new(),
            instructions: Vec::new(),
            replies: Vec::new(),
            signals: Vec::new(),
            copies: Vec::new(),
            armed_alarms: 0,
            reap_queue: VecDeque::new(),
            script_launches: Vec::new(),
            fail_next_create: false,
            fail_alarm: false,
        }
    }

    /// Advances the simulated clock
    pub fn advance(&mut self, delta: Ticks) -> Tick {
        self.now = self.now + delta;
        self.now
    }

    /// Makes the next `create_process` call fail
    pub fn fail_next_create(&mut self) {
        self.fail_next_create = true;
    }

    /// Makes every alarm rearm fail (exercises the fatal path)
    pub fn fail_alarms(&mut self) {
        self.fail_alarm = true;
    }

    /// Marks a process as terminated and queues it for reaping
    pub fn inject_exit(&mut self, pid: Pid, status: ExitStatus) {
        if let Some(proc) = self.processes.get_mut(&pid) {
            proc.alive = false;
        }
        self.reap_queue.push_back((pid, status));
    }

    /// Returns the process table entry for a pid
    pub fn process(&self, pid: Pid) -> Option<&SimProcess> {
        self.processes.get(&pid)
    }

    /// Returns true if the process exists and has not terminated
    pub fn process_alive(&self, pid: Pid) -> bool {
        self.processes.get(&pid).is_some_and(|p| p.alive)
    }

    /// Returns the endpoint a label is published under, if any
    pub fn published_endpoint(&self, label: &str) -> Option<Endpoint> {
        self.published.get(label).copied()
    }

    /// Returns every recorded instruction sent to `endpoint`
    pub fn instructions_for(&self, endpoint: Endpoint) -> Vec<&Instruction> {
        self.instructions
            .iter()
            .filter(|(to, _)| *to == endpoint)
            .map(|(_, i)| i)
            .collect()
    }

    /// Returns all recorded replies
    pub fn replies(&self) -> &[ReplyEnvelope] {
        &self.replies
    }

    /// Returns replies addressed to one caller
    pub fn replies_to(&self, caller: Endpoint) -> Vec<&ReplyEnvelope> {
        self.replies.iter().filter(|r| r.to == caller).collect()
    }

    /// Returns all recorded signals
    pub fn signals(&self) -> &[(Pid, Signal)] {
        &self.signals
    }

    /// Returns the bytes copied out to one caller
    pub fn copies_to(&self, caller: Endpoint) -> Vec<&[u8]> {
        self.copies
            .iter()
            .filter(|(to, _)| *to == caller)
            .map(|(_, bytes)| bytes.as_slice())
            .collect()
    }

    /// Returns how many times the tick alarm was armed
    pub fn armed_alarms(&self) -> u64 {
        self.armed_alarms
    }

    /// Returns recorded recovery-script launches as (script, label)
    pub fn script_launches(&self) -> &[(String, String)] {
        &self.script_launches
    }
}

impl Default for SimulatedSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemApi for SimulatedSystem {
    fn create_process(
        &mut self,
        program: &str,
        label: &ServiceLabel,
    ) -> Result<(Pid, Endpoint), SystemError> {
        if self.fail_next_create {
            self.fail_next_create = false;
            return Err(SystemError::CreateFailed("injected failure".to_string()));
        }
        let pid = Pid::from_raw(self.next_pid);
        self.next_pid += 1;
        let endpoint = Endpoint::new();
        self.processes.insert(
            pid,
            SimProcess {
                endpoint,
                label: label.clone(),
                program: program.to_string(),
                running: false,
                alive: true,
            },
        );
        self.endpoint_index.insert(endpoint, pid);
        Ok((pid, endpoint))
    }

    fn run_process(&mut self, endpoint: Endpoint) -> Result<(), SystemError> {
        let pid = self
            .endpoint_index
            .get(&endpoint)
            .copied()
            .ok_or_else(|| SystemError::ProcessNotFound(endpoint.to_string()))?;
        let proc = self
            .processes
            .get_mut(&pid)
            .ok_or_else(|| SystemError::ProcessNotFound(endpoint.to_string()))?;
        proc.running = true;
        Ok(())
    }

    fn signal_process(&mut self, pid: Pid, signal: Signal) -> Result<(), SystemError> {
        let proc = self
            .processes
            .get_mut(&pid)
            .ok_or_else(|| SystemError::ProcessNotFound(pid.to_string()))?;
        self.signals.push((pid, signal));
        if signal == Signal::Kill {
            proc.alive = false;
        }
        Ok(())
    }

    fn publish_label(
        &mut self,
        label: &ServiceLabel,
        endpoint: Endpoint,
    ) -> Result<(), SystemError> {
        self.published.insert(label.as_str().to_string(), endpoint);
        Ok(())
    }

    fn unpublish_label(&mut self, label: &ServiceLabel) -> Result<(), SystemError> {
        self.published.remove(label.as_str());
        Ok(())
    }

    fn send_instruction(
        &mut self,
        to: Endpoint,
        instruction: Instruction,
    ) -> Result<(), SystemError> {
        self.instructions.push((to, instruction));
        Ok(())
    }

    fn send_reply(&mut self, reply: ReplyEnvelope) -> Result<(), SystemError> {
        self.replies.push(reply);
        Ok(())
    }

    fn copy_to_caller(&mut self, to: Endpoint, bytes: &[u8]) -> Result<(), SystemError> {
        self.copies.push((to, bytes.to_vec()));
        Ok(())
    }

    fn set_tick_alarm(&mut self, _delta: Ticks) -> Result<(), SystemError> {
        if self.fail_alarm {
            return Err(SystemError::AlarmFailed("injected failure".to_string()));
        }
        self.armed_alarms += 1;
        Ok(())
    }

    fn reap_next(&mut self) -> Option<(Pid, ExitStatus)> {
        self.reap_queue.pop_front()
    }

    fn launch_recovery_script(
        &mut self,
        script: &str,
        label: &ServiceLabel,
    ) -> Result<(), SystemError> {
        self.script_launches
            .push((script.to_string(), label.as_str().to_string()));
        Ok(())
    }

    fn uptime(&self) -> Tick {
        self.now
    }
}
