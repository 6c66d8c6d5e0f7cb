//! Error types for the console library

use call_handler::CallError;
use roamdeck_core_types::RoamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no statement is running")]
    NotRunning,

    #[error("statement {0} does not exist")]
    UnknownStatement(usize),

    #[error("no room to add participants")]
    CannotAdd,

    #[error(transparent)]
    Call(#[from] CallError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid override")]
    InvalidOverride { var: &'static str, value: String },

    #[error("unknown configuration key {0}")]
    UnknownKey(String),
}

impl From<SessionError> for RoamError {
    fn from(err: SessionError) -> Self {
        RoamError::new(err.to_string())
    }
}
