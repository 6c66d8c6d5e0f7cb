//! Error types for action primitives

use std::time::Duration;

use roamdeck_core_types::RoamError;
use thiserror::Error;

/// Misuse of a [`crate::Lock`]. Always a caller bug.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// `release` was called more times than `acquire` was granted
    #[error("release called more times than acquire (capacity {capacity})")]
    OverRelease { capacity: usize },
}

/// Failure of a condition wait
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// The condition did not hold before the deadline
    #[error("condition wait timed out after {}ms{}", .after.as_millis(), label_suffix(.label))]
    Timeout {
        after: Duration,
        label: Option<String>,
    },

    /// The predicate itself failed
    #[error("condition predicate failed: {0}")]
    Predicate(String),

    /// The watched target stopped delivering notifications
    #[error("watched target detached{}", label_suffix(.label))]
    Detached { label: Option<String> },
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            WaitError::Timeout { label, .. } | WaitError::Detached { label } => label.as_deref(),
            WaitError::Predicate(_) => None,
        }
    }
}

fn label_suffix(label: &Option<String>) -> String {
    match label {
        Some(label) => format!(" ({label})"),
        None => String::new(),
    }
}

impl From<LockError> for RoamError {
    fn from(err: LockError) -> Self {
        RoamError::new(err.to_string())
    }
}

impl From<WaitError> for RoamError {
    fn from(err: WaitError) -> Self {
        RoamError::new(err.to_string())
    }
}
