//! Requests accepted by the reincarnation service

use core_types::Ticks;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied parameters for starting (or updating) a service
///
/// The label is carried as a raw string: validation happens in the
/// dispatcher, before any slot is touched, so a malformed label is
/// rejected with an invalid-argument error rather than a transport
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartParams {
    /// Requested service label, unique among live services
    pub label: String,
    /// Program image to execute
    pub program: String,
    /// Health-check period; `None` inherits a default (live update) or
    /// disables periodic polling (start)
    pub period: Option<Ticks>,
    /// Recovery script invoked after a crash instead of a direct restart
    pub script: Option<String>,
}

impl StartParams {
    /// Creates parameters with polling and recovery disabled
    pub fn new(label: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            period: None,
            script: None,
        }
    }

    /// Sets the health-check period
    pub fn with_period(mut self, period: Ticks) -> Self {
        self.period = Some(period);
        self
    }

    /// Sets the recovery script
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }
}

/// Live-update state token handed to the old instance at prepare time
///
/// The token is opaque to the reincarnation service; only the null
/// sentinel is interpreted (and rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStateToken(u32);

impl UpdateStateToken {
    /// The null sentinel; never a valid update state
    pub const NULL: UpdateStateToken = UpdateStateToken(0);

    /// Creates a token from a raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    /// Returns true for the null sentinel
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Registry table selected by an info query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableSelector {
    /// Full per-slot supervision table
    ServiceTable,
    /// Public identity table (label and endpoint only)
    PublicTable,
}

/// An external request, carried to the dispatcher by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Start a new system service
    Start { params: StartParams },
    /// Stop a service by label
    Stop { label: String },
    /// Restart an already-terminated service (recovery script path)
    Restart { label: String },
    /// Stop and restart a service in place
    Refresh { label: String },
    /// Live-update a service to a new version
    Update {
        params: StartParams,
        state: UpdateStateToken,
        /// Prepare-phase budget in ticks; zero selects the default
        prepare_budget: i64,
    },
    /// Bring the whole system down
    Shutdown,
    /// Copy a registry table into the caller's address space
    Info { selector: TableSelector },
    /// Resolve a label to an endpoint
    ///
    /// `len` is the caller-declared name length; it is validated against
    /// the name buffer bounds before the name bytes are interpreted.
    LabelLookup { name: Vec<u8>, len: usize },
}

impl Request {
    /// Returns the kind of this request
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Start { .. } => RequestKind::Start,
            Request::Stop { .. } => RequestKind::Stop,
            Request::Restart { .. } => RequestKind::Restart,
            Request::Refresh { .. } => RequestKind::Refresh,
            Request::Update { .. } => RequestKind::Update,
            Request::Shutdown => RequestKind::Shutdown,
            Request::Info { .. } => RequestKind::Info,
            Request::LabelLookup { .. } => RequestKind::LabelLookup,
        }
    }
}

/// Request kinds, used for permission checks and deferred-reply records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Start,
    Stop,
    Restart,
    Refresh,
    Update,
    Shutdown,
    Info,
    LabelLookup,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Start => "start",
            RequestKind::Stop => "stop",
            RequestKind::Restart => "restart",
            RequestKind::Refresh => "refresh",
            RequestKind::Update => "update",
            RequestKind::Shutdown => "shutdown",
            RequestKind::Info => "info",
            RequestKind::LabelLookup => "lookup",
        };
        write!(f, "{}", name)
    }
}

/// Outcome code carried by a self-report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportOutcome {
    /// The reported phase completed successfully
    Success,
    /// The reported phase failed with a service-specific code
    Failure(u32),
}

impl ReportOutcome {
    /// Returns true on success
    pub fn is_success(&self) -> bool {
        matches!(self, ReportOutcome::Success)
    }
}

/// Events a supervised service reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfReport {
    /// Initialization finished (success or simulated-crash-worthy failure)
    InitReady { result: ReportOutcome },
    /// Live-update prepare phase finished
    UpdateReady { result: ReportOutcome },
}
