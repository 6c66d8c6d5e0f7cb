use tracing::warn;

use crate::errors::CallError;
use crate::model::{CallerRef, QueuedAction};
use crate::ports::StagePort;

/// Current caller snapshots. Rows that cannot be read are logged and skipped.
pub fn read_callers(stage: &dyn StagePort) -> Vec<CallerRef> {
    stage
        .host_entries()
        .iter()
        .filter_map(|entry| match CallerRef::from_entry(entry) {
            Ok(caller) => caller,
            Err(err) => {
                warn!(%err, "skipping unreadable host entry");
                None
            }
        })
        .collect()
}

/// Re-check a queued action against the page as it is now. The caller may
/// have left or changed state while the action waited for its turn.
pub fn revalidate(stage: &dyn StagePort, action: &QueuedAction) -> Result<CallerRef, CallError> {
    let caller = read_callers(stage)
        .into_iter()
        .find(|caller| caller.key == action.caller)
        .ok_or_else(|| CallError::StaleCaller(action.caller.clone()))?;
    if caller.state != action.expected {
        return Err(CallError::StateMismatch {
            caller: caller.key,
            expected: action.expected,
            actual: caller.state,
        });
    }
    Ok(caller)
}
