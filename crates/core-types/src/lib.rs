use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Shared error type for the roamdeck crates.
#[derive(Debug, Error, Clone)]
pub enum RoamError {
    #[error("{message}")]
    Message { message: String },
}

impl RoamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to an element on the live page.
///
/// The console never interprets the handle; it only hands it back to the
/// page port when dispatching an activation.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_ids_are_unique() {
        assert_ne!(ActionId::new(), ActionId::new());
    }

    #[test]
    fn error_displays_message() {
        let err = RoamError::new("dialog never opened");
        assert_eq!(err.to_string(), "dialog never opened");
    }
}
