use std::fmt;

use chrono::{DateTime, Utc};
use roamdeck_core_types::{ActionId, ElementRef};
use serde::{Deserialize, Serialize};

use crate::errors::CallError;
use crate::policy::{CallPolicy, ControlSpec};

/// Numeric account id recovered from the caller's avatar, when there is one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerId {
    Known(u64),
    Anonymous,
}

impl CallerId {
    /// Avatar URLs look like `https://host/<a>/<b>/<id>/...`; the id is the
    /// third path segment. Anything else is anonymous.
    pub fn from_avatar(src: &str) -> Self {
        url::Url::parse(src)
            .ok()
            .and_then(|parsed| {
                parsed
                    .path_segments()
                    .and_then(|mut segments| segments.nth(2))
                    .and_then(|segment| segment.parse::<u64>().ok())
            })
            .map_or(CallerId::Anonymous, CallerId::Known)
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerId::Known(id) => write!(f, "#{id}"),
            CallerId::Anonymous => f.write_str("anonymous"),
        }
    }
}

/// Stable identity of a caller: the id alone may be unrecoverable, so it is
/// always paired with the display name.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CallerKey {
    pub id: CallerId,
    pub name: String,
}

impl CallerKey {
    pub fn new(id: CallerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for CallerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Calling,
    Active,
    Speaking,
}

impl CallState {
    /// Connected to the stage, whether or not currently speaking.
    pub fn is_connected(self) -> bool {
        !matches!(self, CallState::Calling)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallState::Calling => "calling",
            CallState::Active => "active",
            CallState::Speaking => "speaking",
        })
    }
}

/// Raw row of the hosts panel as read from the page.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HostEntry {
    pub click_target: Option<ElementRef>,
    pub active: bool,
    pub in_progress: bool,
    pub waiting: bool,
    pub speaking: bool,
    pub avatar: Option<String>,
    pub name: Option<String>,
}

/// Immutable snapshot of one caller, recomputed on every read.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallerRef {
    pub key: CallerKey,
    pub avatar: String,
    pub state: CallState,
    #[serde(skip_serializing, default = "detached_target")]
    pub click_target: ElementRef,
}

fn detached_target() -> ElementRef {
    ElementRef::new("detached")
}

impl CallerRef {
    /// Derive a snapshot from a host row. Inactive rows are not callers and
    /// yield `Ok(None)`; rows that look active but cannot be read are errors.
    pub fn from_entry(entry: &HostEntry) -> Result<Option<Self>, CallError> {
        if !entry.active {
            return Ok(None);
        }
        let avatar = entry
            .avatar
            .clone()
            .ok_or_else(|| CallError::MalformedEntry("no avatar image".into()))?;
        let id = CallerId::from_avatar(&avatar);
        let state = if entry.in_progress {
            if entry.speaking {
                CallState::Speaking
            } else {
                CallState::Active
            }
        } else if entry.waiting {
            CallState::Calling
        } else {
            return Err(CallError::MalformedEntry("unknown call state".into()));
        };
        let name = entry
            .name
            .clone()
            .ok_or_else(|| CallError::MalformedEntry("no caller name".into()))?;
        let click_target = entry
            .click_target
            .clone()
            .ok_or_else(|| CallError::MalformedEntry(format!("no click target for {name}")))?;

        Ok(Some(Self {
            key: CallerKey::new(id, name),
            avatar,
            state,
            click_target,
        }))
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }
}

/// One pending connect or disconnect, captured when the operator asked for it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub caller: CallerKey,
    pub expected: CallState,
    pub control: ControlSpec,
    pub needs_confirmation: bool,
}

impl QueuedAction {
    pub fn connect(caller: &CallerRef, policy: &CallPolicy) -> Result<Self, CallError> {
        if caller.state != CallState::Calling {
            return Err(CallError::NotCalling(caller.key.clone()));
        }
        Ok(Self {
            caller: caller.key.clone(),
            expected: caller.state,
            control: policy.connect.clone(),
            needs_confirmation: false,
        })
    }

    /// Hanging up on a connected caller goes through an extra confirmation;
    /// declining a caller still in the queue does not.
    pub fn disconnect(caller: &CallerRef, policy: &CallPolicy) -> Self {
        Self {
            caller: caller.key.clone(),
            expected: caller.state,
            control: policy.disconnect.clone(),
            needs_confirmation: caller.state.is_connected(),
        }
    }
}

/// Outcome of one processed action.
#[derive(Clone, Debug)]
pub struct ActionReport {
    pub action_id: ActionId,
    pub action: QueuedAction,
    pub ok: bool,
    pub error: Option<CallError>,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl ActionReport {
    pub fn summary(&self) -> String {
        match &self.error {
            None => format!(
                "{} {}: ok in {}ms",
                self.action.control.label, self.action.caller, self.latency_ms
            ),
            Some(err) => format!(
                "{} {}: failed after {}ms: {}",
                self.action.control.label, self.action.caller, self.latency_ms, err
            ),
        }
    }
}
