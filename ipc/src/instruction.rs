//! Asynchronous instructions sent to supervised services
//!
//! Instructions are fire-and-forget: the reincarnation service never
//! blocks on a supervised process. Acknowledgements, where they exist,
//! arrive later as separate self-report events.

use crate::request::UpdateStateToken;
use core_types::Ticks;
use serde::{Deserialize, Serialize};

/// An instruction from the reincarnation service to a service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Liveness ping; a healthy service refreshes its alive timestamp
    Ping,
    /// Quiesce and transfer state to the replacement instance
    ///
    /// Sent to the *old* instance at the start of a live update. The
    /// instance must answer with an update-ready self-report within the
    /// budget.
    PrepareUpdate {
        state: UpdateStateToken,
        budget: Ticks,
    },
}
