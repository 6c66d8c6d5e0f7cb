//! In-memory live-event page.
//!
//! Behaves like the hosting site closely enough to drive the call handler
//! end to end: rows in the hosts panel, a call dialog that opens when a row
//! is clicked, a confirmation box when hanging up on a connected caller, and
//! the switch, chat and about controls. Every reaction to an activation is
//! applied after a configurable latency, from a spawned task, and announced
//! on the matching surface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use roamdeck_core_types::{ElementRef, RoamError};
use roamdeck_event_bus::{ChangeFilter, Mutation, MutationHub, MutationKind, Subscription, WatchTarget};
use tokio::time::sleep;
use tracing::{debug, trace};

use action_primitives::ChildContainer;

use crate::model::HostEntry;
use crate::ports::{ControlRef, Landmark, StagePort, Surface};

const HOSTS: &str = "hosts";
const DIALOG: &str = "call-dialog";
const SWITCH: &str = "calls-switch";
const MESSAGE_INPUT: &str = "message-input";
const MESSAGE_SEND: &str = "message-send";
const ABOUT_INPUT: &str = "about-input";
const ABOUT_SAVE: &str = "about-save";
const CONFIRM: &str = "confirm-ok";
const ROW_PREFIX: &str = "host-row-";
const CONTROL_PREFIX: &str = "dialog-control-";

#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Delay before the page reacts to an activation.
    pub latency: Duration,
    /// Delay between the confirmation box mounting and its controls appearing.
    pub confirmation_delay: Duration,
    /// When false, hanging up on a connected caller never shows the
    /// confirmation box and the call dialog stays open.
    pub confirmation_responds: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(5),
            confirmation_delay: Duration::from_millis(20),
            confirmation_responds: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RowStatus {
    Waiting,
    InProgress,
    Speaking,
}

struct SimRow {
    row: u64,
    id: Option<u64>,
    name: String,
    status: RowStatus,
    active: bool,
}

impl SimRow {
    fn entry(&self) -> HostEntry {
        let avatar = match self.id {
            Some(id) => format!("https://cdn.example.com/avatars/u/{id}/photo.jpg"),
            None => "https://cdn.example.com/avatars/u/default/photo.jpg".to_string(),
        };
        HostEntry {
            click_target: Some(ElementRef::new(format!("{ROW_PREFIX}{}", self.row))),
            active: self.active,
            in_progress: matches!(self.status, RowStatus::InProgress | RowStatus::Speaking),
            waiting: self.status == RowStatus::Waiting,
            speaking: self.status == RowStatus::Speaking,
            avatar: Some(avatar),
            name: Some(self.name.clone()),
        }
    }
}

#[derive(Default)]
struct SimDialog {
    row: Option<u64>,
    displayed: bool,
    hidden: bool,
}

struct SimConfirmation {
    row: u64,
    ready: bool,
    hidden: bool,
}

#[derive(Default)]
struct StageState {
    mounted: bool,
    rows: Vec<SimRow>,
    next_row: u64,
    dialog: SimDialog,
    confirmation: Option<SimConfirmation>,
    calls_allowed: bool,
    message_draft: String,
    messages: Vec<String>,
    about_draft: String,
    about: String,
    busy_log: Vec<bool>,
    confirmation_veils: Vec<bool>,
}

impl StageState {
    fn row(&self, row: u64) -> Option<&SimRow> {
        self.rows.iter().find(|candidate| candidate.row == row)
    }

    fn row_mut(&mut self, row: u64) -> Option<&mut SimRow> {
        self.rows.iter_mut().find(|candidate| candidate.row == row)
    }
}

struct StageInner {
    config: SimConfig,
    state: Mutex<StageState>,
    document: MutationHub,
    hosts: MutationHub,
    dialog: MutationHub,
    confirmation: MutationHub,
}

#[derive(Clone)]
pub struct SimulatedStage {
    inner: Arc<StageInner>,
}

impl SimulatedStage {
    /// A stage whose landmarks are already on the page.
    pub fn new(config: SimConfig) -> Self {
        let stage = Self::unmounted(config);
        stage.inner.state.lock().mounted = true;
        stage
    }

    /// A stage whose landmarks appear only after [`SimulatedStage::mount`].
    pub fn unmounted(config: SimConfig) -> Self {
        Self {
            inner: Arc::new(StageInner {
                config,
                state: Mutex::new(StageState::default()),
                document: MutationHub::new(),
                hosts: MutationHub::new(),
                dialog: MutationHub::new(),
                confirmation: MutationHub::new(),
            }),
        }
    }

    pub fn mount(&self) {
        self.inner.state.lock().mounted = true;
        self.inner
            .document
            .notify(Mutation::nested(MutationKind::ChildList));
    }

    /// Add a caller to the queue. Returns the row handle.
    pub fn dial_in(&self, name: impl Into<String>, id: Option<u64>) -> u64 {
        let row = {
            let mut state = self.inner.state.lock();
            state.next_row += 1;
            let row = state.next_row;
            state.rows.push(SimRow {
                row,
                id,
                name: name.into(),
                status: RowStatus::Waiting,
                active: true,
            });
            row
        };
        self.inner.hosts.notify(Mutation::child_list());
        row
    }

    /// The row stays in the panel but no longer counts as a caller.
    pub fn hang_up(&self, row: u64) {
        if let Some(entry) = self.inner.state.lock().row_mut(row) {
            entry.active = false;
        }
        self.inner.hosts.notify(Mutation::child_list());
    }

    pub fn set_status(&self, row: u64, status: RowStatus) {
        if let Some(entry) = self.inner.state.lock().row_mut(row) {
            entry.status = status;
        }
        self.inner.hosts.notify(Mutation::child_list());
    }

    pub fn status_of(&self, row: u64) -> Option<RowStatus> {
        self.inner.state.lock().row(row).map(|entry| entry.status)
    }

    pub fn row_count(&self) -> usize {
        self.inner.state.lock().rows.len()
    }

    pub fn calls_allowed(&self) -> bool {
        self.inner.state.lock().calls_allowed
    }

    pub fn messages(&self) -> Vec<String> {
        self.inner.state.lock().messages.clone()
    }

    pub fn about(&self) -> String {
        self.inner.state.lock().about.clone()
    }

    pub fn dialog_hidden(&self) -> bool {
        self.inner.state.lock().dialog.hidden
    }

    /// Every busy-signal write, in order.
    pub fn busy_log(&self) -> Vec<bool> {
        self.inner.state.lock().busy_log.clone()
    }

    /// Every confirmation visibility write, in order.
    pub fn confirmation_veils(&self) -> Vec<bool> {
        self.inner.state.lock().confirmation_veils.clone()
    }

    /// Live subscriptions across all surfaces.
    pub fn subscriber_count(&self) -> usize {
        self.inner.document.subscriber_count()
            + self.inner.hosts.subscriber_count()
            + self.inner.dialog.subscriber_count()
            + self.inner.confirmation.subscriber_count()
    }

    pub fn hosts_hub(&self) -> &MutationHub {
        &self.inner.hosts
    }

    pub fn hosts(&self) -> HostsView {
        HostsView {
            stage: self.clone(),
        }
    }

    fn entries(&self) -> Vec<HostEntry> {
        self.inner
            .state
            .lock()
            .rows
            .iter()
            .map(SimRow::entry)
            .collect()
    }

    fn later(&self, delay: Duration, apply: impl FnOnce(&SimulatedStage) + Send + 'static) {
        let stage = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            apply(&stage);
        });
    }

    fn open_dialog(&self, row: u64) {
        {
            let mut state = self.inner.state.lock();
            if state.row(row).is_none() {
                return;
            }
            state.dialog.row = Some(row);
            state.dialog.displayed = true;
        }
        debug!(row, "call dialog opened");
        self.inner.dialog.notify(Mutation::attributes());
        self.inner
            .dialog
            .notify(Mutation::nested(MutationKind::ChildList));
    }

    fn close_dialog(&self) {
        {
            let mut state = self.inner.state.lock();
            state.dialog.row = None;
            state.dialog.displayed = false;
        }
        debug!("call dialog closed");
        self.inner.dialog.notify(Mutation::attributes());
    }

    fn remove_row(&self, row: u64) {
        self.inner
            .state
            .lock()
            .rows
            .retain(|candidate| candidate.row != row);
        self.inner.hosts.notify(Mutation::child_list());
    }

    fn apply_control(&self, label: &str) {
        let Some((row, status)) = ({
            let state = self.inner.state.lock();
            state
                .dialog
                .row
                .and_then(|row| state.row(row).map(|entry| (row, entry.status)))
        }) else {
            return;
        };
        trace!(row, label, "dialog control applied");
        match (label, status) {
            ("Connect", _) => {
                if let Some(entry) = self.inner.state.lock().row_mut(row) {
                    entry.status = RowStatus::InProgress;
                }
                self.inner.hosts.notify(Mutation::child_list());
                self.close_dialog();
            }
            ("Disconnect", RowStatus::Waiting) => {
                self.remove_row(row);
                self.close_dialog();
            }
            ("Disconnect", _) => {
                if !self.inner.config.confirmation_responds {
                    debug!(row, "confirmation box suppressed");
                    return;
                }
                self.inner.state.lock().confirmation = Some(SimConfirmation {
                    row,
                    ready: false,
                    hidden: false,
                });
                self.inner.document.notify(Mutation::child_list());
                self.later(self.inner.config.confirmation_delay, |stage| {
                    if let Some(confirmation) = stage.inner.state.lock().confirmation.as_mut() {
                        confirmation.ready = true;
                    }
                    stage
                        .inner
                        .confirmation
                        .notify(Mutation::nested(MutationKind::ChildList));
                });
            }
            _ => self.close_dialog(),
        }
    }

    fn apply_confirm(&self) {
        let Some(confirmation) = self.inner.state.lock().confirmation.take() else {
            return;
        };
        self.inner.document.notify(Mutation::child_list());
        self.remove_row(confirmation.row);
        self.close_dialog();
    }
}

fn control_labels(status: RowStatus) -> [&'static str; 3] {
    match status {
        RowStatus::Waiting => ["Cancel", "Disconnect", "Connect"],
        RowStatus::InProgress | RowStatus::Speaking => ["Cancel", "Disconnect", "Mute"],
    }
}

fn unknown(element: &ElementRef) -> RoamError {
    RoamError::new(format!("no such {element}"))
}

#[async_trait]
impl StagePort for SimulatedStage {
    fn surface(&self, surface: Surface) -> &dyn WatchTarget {
        match surface {
            Surface::Document => &self.inner.document,
            Surface::Hosts => &self.inner.hosts,
            Surface::Dialog => &self.inner.dialog,
            Surface::Confirmation => &self.inner.confirmation,
        }
    }

    fn locate(&self, landmark: Landmark) -> Option<ElementRef> {
        if !self.inner.state.lock().mounted {
            return None;
        }
        let handle = match landmark {
            Landmark::HostsContainer => HOSTS,
            Landmark::CallDialog => DIALOG,
            Landmark::CallsSwitch => SWITCH,
            Landmark::MessageInput => MESSAGE_INPUT,
            Landmark::MessageSend => MESSAGE_SEND,
            Landmark::AboutInput => ABOUT_INPUT,
            Landmark::AboutSave => ABOUT_SAVE,
        };
        Some(ElementRef::new(handle))
    }

    fn host_entries(&self) -> Vec<HostEntry> {
        self.entries()
    }

    fn dialog_subject(&self) -> Option<String> {
        let state = self.inner.state.lock();
        if !state.dialog.displayed {
            return None;
        }
        state
            .dialog
            .row
            .and_then(|row| state.row(row))
            .map(|entry| entry.name.clone())
    }

    fn dialog_control(&self, ordinal: usize) -> Option<ControlRef> {
        let state = self.inner.state.lock();
        if !state.dialog.displayed {
            return None;
        }
        let status = state.dialog.row.and_then(|row| state.row(row))?.status;
        let label = *control_labels(status).get(ordinal.checked_sub(1)?)?;
        Some(ControlRef {
            element: ElementRef::new(format!("{CONTROL_PREFIX}{ordinal}")),
            label: label.to_string(),
        })
    }

    fn dialog_displayed(&self) -> bool {
        self.inner.state.lock().dialog.displayed
    }

    fn set_dialog_hidden(&self, hidden: bool) {
        {
            let mut state = self.inner.state.lock();
            state.dialog.hidden = hidden;
            state.busy_log.push(hidden);
        }
        self.inner.dialog.notify(Mutation::attributes());
    }

    fn confirmation_present(&self) -> bool {
        self.inner.state.lock().confirmation.is_some()
    }

    fn confirmation_control(&self) -> Option<ControlRef> {
        let state = self.inner.state.lock();
        let confirmation = state.confirmation.as_ref()?;
        confirmation.ready.then(|| ControlRef {
            element: ElementRef::new(CONFIRM),
            label: "OK".to_string(),
        })
    }

    fn set_confirmation_hidden(&self, hidden: bool) {
        {
            let mut state = self.inner.state.lock();
            if let Some(confirmation) = state.confirmation.as_mut() {
                confirmation.hidden = hidden;
            }
            state.confirmation_veils.push(hidden);
        }
        self.inner.confirmation.notify(Mutation::attributes());
    }

    fn switch_checked(&self, switch: &ElementRef) -> Result<bool, RoamError> {
        if switch.0 != SWITCH {
            return Err(unknown(switch));
        }
        Ok(self.inner.state.lock().calls_allowed)
    }

    fn fill_text(&self, input: &ElementRef, value: &str) -> Result<(), RoamError> {
        let mut state = self.inner.state.lock();
        match input.0.as_str() {
            MESSAGE_INPUT => state.message_draft = value.to_string(),
            ABOUT_INPUT => state.about_draft = value.to_string(),
            _ => return Err(unknown(input)),
        }
        Ok(())
    }

    async fn activate(&self, element: &ElementRef) -> Result<(), RoamError> {
        trace!(%element, "activate");
        let latency = self.inner.config.latency;
        let handle = element.0.as_str();

        if let Some(row) = handle.strip_prefix(ROW_PREFIX) {
            let row: u64 = row.parse().map_err(|_| unknown(element))?;
            let live = self
                .inner
                .state
                .lock()
                .row(row)
                .map_or(false, |entry| entry.active);
            if !live {
                return Err(unknown(element));
            }
            self.later(latency, move |stage| stage.open_dialog(row));
            return Ok(());
        }

        if let Some(ordinal) = handle.strip_prefix(CONTROL_PREFIX) {
            let ordinal: usize = ordinal.parse().map_err(|_| unknown(element))?;
            let control = self.dialog_control(ordinal).ok_or_else(|| unknown(element))?;
            self.later(latency, move |stage| stage.apply_control(&control.label));
            return Ok(());
        }

        match handle {
            CONFIRM => {
                if self.confirmation_control().is_none() {
                    return Err(unknown(element));
                }
                self.later(latency, |stage| stage.apply_confirm());
            }
            SWITCH => {
                let mut state = self.inner.state.lock();
                state.calls_allowed = !state.calls_allowed;
            }
            MESSAGE_SEND => {
                let mut state = self.inner.state.lock();
                let message = std::mem::take(&mut state.message_draft);
                state.messages.push(message);
            }
            ABOUT_SAVE => {
                let mut state = self.inner.state.lock();
                state.about = std::mem::take(&mut state.about_draft);
            }
            _ => return Err(unknown(element)),
        }
        Ok(())
    }
}

/// The hosts panel as a child container.
pub struct HostsView {
    stage: SimulatedStage,
}

impl WatchTarget for HostsView {
    fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        self.stage.inner.hosts.subscribe(filter)
    }
}

impl ChildContainer for HostsView {
    type Child = HostEntry;

    fn children(&self) -> Vec<HostEntry> {
        self.stage.entries()
    }
}
