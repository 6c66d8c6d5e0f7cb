use std::time::Duration;

use action_primitives::WaitError;
use roamdeck_core_types::RoamError;
use thiserror::Error;

use crate::model::{CallState, CallerKey};
use crate::roster::CallbackId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallError {
    #[error("{0} must be calling to connect")]
    NotCalling(CallerKey),
    #[error("{0} is no longer active")]
    StaleCaller(CallerKey),
    #[error("{caller} was {actual}, expected {expected}")]
    StateMismatch {
        caller: CallerKey,
        expected: CallState,
        actual: CallState,
    },
    #[error("dialog layout mismatch: {0}")]
    LayoutMismatch(String),
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error("action timed out after {}ms", .0.as_millis())]
    ActionTimeout(Duration),
    #[error("activation failed: {0}")]
    Activation(String),
    #[error("unreadable host entry: {0}")]
    MalformedEntry(String),
    #[error("{0} is not registered")]
    UnknownCallback(CallbackId),
    #[error("{0} port is required")]
    MissingPort(&'static str),
}

impl CallError {
    /// Short label used for failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::NotCalling(_) => "not_calling",
            CallError::StaleCaller(_) => "stale_caller",
            CallError::StateMismatch { .. } => "state_mismatch",
            CallError::LayoutMismatch(_) => "layout_mismatch",
            CallError::Wait(WaitError::Timeout { .. }) => "wait_timeout",
            CallError::Wait(WaitError::Predicate(_)) => "predicate",
            CallError::Wait(WaitError::Detached { .. }) => "detached",
            CallError::ActionTimeout(_) => "action_timeout",
            CallError::Activation(_) => "activation",
            CallError::MalformedEntry(_) => "malformed_entry",
            CallError::UnknownCallback(_) => "unknown_callback",
            CallError::MissingPort(_) => "missing_port",
        }
    }
}

impl From<RoamError> for CallError {
    fn from(err: RoamError) -> Self {
        CallError::Activation(err.to_string())
    }
}

impl From<CallError> for RoamError {
    fn from(err: CallError) -> Self {
        RoamError::new(err.to_string())
    }
}
