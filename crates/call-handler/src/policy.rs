use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the call handler. Loaded from the `handler` config section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallPolicy {
    pub timeouts: CallTimeouts,
    pub connect: ControlSpec,
    pub disconnect: ControlSpec,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeouts: CallTimeouts::default(),
            connect: ControlSpec::new(3, "Connect"),
            disconnect: ControlSpec::new(2, "Disconnect"),
        }
    }
}

/// Position and expected label of a control in the call dialog footer.
/// Ordinals are 1-based.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ControlSpec {
    pub ordinal: usize,
    pub label: String,
}

impl ControlSpec {
    pub fn new(ordinal: usize, label: impl Into<String>) -> Self {
        Self {
            ordinal,
            label: label.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallTimeouts {
    /// Deadline for a whole connect/disconnect run.
    pub action_ms: u64,
    /// Pause after each activation before polling the page again.
    pub settle_ms: u64,
    /// Pause before looking for the confirmation control.
    pub confirmation_settle_ms: u64,
    /// Optional bound on each individual wait inside a run.
    pub step_ms: Option<u64>,
    /// How long to wait for page landmarks when attaching.
    pub attach_ms: u64,
}

impl CallTimeouts {
    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn confirmation_settle(&self) -> Duration {
        Duration::from_millis(self.confirmation_settle_ms)
    }

    pub fn step(&self) -> Option<Duration> {
        self.step_ms.map(Duration::from_millis)
    }

    pub fn attach(&self) -> Duration {
        Duration::from_millis(self.attach_ms)
    }
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            action_ms: 1000,
            settle_ms: 10,
            confirmation_settle_ms: 50,
            step_ms: None,
            attach_ms: 30_000,
        }
    }
}
