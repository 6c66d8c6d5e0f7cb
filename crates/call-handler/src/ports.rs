use std::fmt;

use async_trait::async_trait;
use roamdeck_core_types::{ElementRef, RoamError};
use roamdeck_event_bus::WatchTarget;

use crate::model::HostEntry;

/// Watched regions of the live page.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Surface {
    /// The whole document; top-level overlays are mounted here.
    Document,
    /// The hosts panel listing callers.
    Hosts,
    /// The per-caller call dialog.
    Dialog,
    /// The secondary confirmation box shown when hanging up.
    Confirmation,
}

/// Elements the console needs to find once and keep.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Landmark {
    HostsContainer,
    CallDialog,
    CallsSwitch,
    MessageInput,
    MessageSend,
    AboutInput,
    AboutSave,
}

impl fmt::Display for Landmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Landmark::HostsContainer => "hosts container",
            Landmark::CallDialog => "call dialog",
            Landmark::CallsSwitch => "calls switch",
            Landmark::MessageInput => "message input",
            Landmark::MessageSend => "message send button",
            Landmark::AboutInput => "about input",
            Landmark::AboutSave => "about save button",
        })
    }
}

/// A control with its rendered label.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlRef {
    pub element: ElementRef,
    pub label: String,
}

/// Everything the console reads from or does to the live page.
///
/// Reads are synchronous snapshots of current state; they are re-run by
/// condition waits whenever the matching [`Surface`] notifies a change.
#[async_trait]
pub trait StagePort: Send + Sync {
    fn surface(&self, surface: Surface) -> &dyn WatchTarget;
    fn locate(&self, landmark: Landmark) -> Option<ElementRef>;

    fn host_entries(&self) -> Vec<HostEntry>;

    fn dialog_subject(&self) -> Option<String>;
    /// Footer control at a 1-based position.
    fn dialog_control(&self, ordinal: usize) -> Option<ControlRef>;
    fn dialog_displayed(&self) -> bool;
    /// Busy signal: keep the dialog out of the operator's sight.
    fn set_dialog_hidden(&self, hidden: bool);

    fn confirmation_present(&self) -> bool;
    fn confirmation_control(&self) -> Option<ControlRef>;
    fn set_confirmation_hidden(&self, hidden: bool);

    fn switch_checked(&self, switch: &ElementRef) -> Result<bool, RoamError>;
    /// Replace an input's value and notify the page as if typed.
    fn fill_text(&self, input: &ElementRef, value: &str) -> Result<(), RoamError>;

    async fn activate(&self, element: &ElementRef) -> Result<(), RoamError>;
}

pub trait MetricsPort: Send + Sync {
    fn record_ok(&self, latency_ms: u64);
    fn record_fail(&self, kind: &str);
}
