//! System interface error types

use thiserror::Error;

/// Errors that can occur at the system interface
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SystemError {
    /// Process image could not be created
    #[error("failed to create process: {0}")]
    CreateFailed(String),

    /// No process with the given identity
    #[error("process not found: {0}")]
    ProcessNotFound(String),

    /// Asynchronous send failed
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Label publication failed
    #[error("failed to publish identity: {0}")]
    PublishFailed(String),

    /// Copy into the caller's address space failed
    #[error("memory copy failed: {0}")]
    CopyFailed(String),

    /// The tick alarm could not be armed
    #[error("failed to arm tick alarm: {0}")]
    AlarmFailed(String),

    /// Recovery script could not be launched
    #[error("failed to launch recovery script: {0}")]
    ScriptFailed(String),
}
