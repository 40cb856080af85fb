//! Service labels
//!
//! A label is the caller-chosen, human-readable identity of a logical
//! service. It is stable across restarts and live updates, while the
//! endpoint changes with every instance.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Minimum accepted label/name length
pub const MIN_LABEL_LEN: usize = 2;

/// Maximum label length (exclusive bound on the raw byte count)
pub const MAX_LABEL_LEN: usize = 48;

/// Capacity of the name buffer accepted by label lookups
pub const MAX_LOOKUP_NAME_LEN: usize = 100;

/// Errors from label validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    /// Length outside the accepted window
    #[error("label length {0} outside [{MIN_LABEL_LEN}, {MAX_LABEL_LEN})")]
    BadLength(usize),

    /// Not valid UTF-8
    #[error("label is not valid UTF-8")]
    NotUtf8,
}

/// A validated, bounded-length service label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceLabel(String);

impl ServiceLabel {
    /// Validates and wraps a label string
    pub fn new(label: impl Into<String>) -> Result<Self, LabelError> {
        let label = label.into();
        if label.len() < MIN_LABEL_LEN || label.len() >= MAX_LABEL_LEN {
            return Err(LabelError::BadLength(label.len()));
        }
        Ok(Self(label))
    }

    /// Validates a label copied out of a caller-supplied byte buffer
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LabelError> {
        let s = std::str::from_utf8(bytes).map_err(|_| LabelError::NotUtf8)?;
        Self::new(s)
    }

    /// Returns the label text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServiceLabel {
    type Error = LabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServiceLabel> for String {
    fn from(label: ServiceLabel) -> Self {
        label.0
    }
}

impl fmt::Display for ServiceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
