use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use roamdeck_event_bus::Subscription;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::HandlerInner;
use crate::errors::CallError;
use crate::model::CallerRef;

pub type RosterCallback = Arc<dyn Fn(&[CallerRef]) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CallbackId(pub u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback #{}", self.0)
    }
}

/// Registered roster observers plus the watcher feeding them. The watcher
/// exists only while at least one observer is registered.
#[derive(Default)]
pub(crate) struct Roster {
    state: Mutex<RosterState>,
}

#[derive(Default)]
struct RosterState {
    next_id: u64,
    callbacks: Vec<(CallbackId, RosterCallback)>,
    watcher: Option<CancellationToken>,
}

impl Roster {
    pub(crate) fn register(
        &self,
        callback: RosterCallback,
        start_watcher: impl FnOnce() -> CancellationToken,
    ) -> CallbackId {
        let mut state = self.state.lock();
        if state.watcher.is_none() {
            state.watcher = Some(start_watcher());
        }
        state.next_id += 1;
        let id = CallbackId(state.next_id);
        state.callbacks.push((id, callback));
        id
    }

    pub(crate) fn unregister(&self, id: CallbackId) -> Result<(), CallError> {
        let mut state = self.state.lock();
        let index = state
            .callbacks
            .iter()
            .position(|(registered, _)| *registered == id)
            .ok_or(CallError::UnknownCallback(id))?;
        state.callbacks.remove(index);
        if state.callbacks.is_empty() {
            if let Some(watcher) = state.watcher.take() {
                watcher.cancel();
            }
        }
        Ok(())
    }

    pub(crate) fn callbacks(&self) -> Vec<RosterCallback> {
        self.state
            .lock()
            .callbacks
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }

    pub(crate) fn is_watching(&self) -> bool {
        self.state.lock().watcher.is_some()
    }
}

impl Drop for Roster {
    fn drop(&mut self) {
        if let Some(watcher) = self.state.get_mut().watcher.take() {
            watcher.cancel();
        }
    }
}

/// Push a fresh caller list to every observer after each hosts change.
pub(crate) fn spawn_watcher(
    handler: Weak<HandlerInner>,
    mut subscription: Subscription,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                change = subscription.changed() => {
                    if change.is_none() {
                        warn!("hosts surface detached; roster updates stopped");
                        break;
                    }
                    let Some(inner) = handler.upgrade() else {
                        break;
                    };
                    let callers = inner.callers();
                    for callback in inner.roster.callbacks() {
                        callback(&callers);
                    }
                }
            }
        }
        debug!("roster watcher stopped");
    });
}
