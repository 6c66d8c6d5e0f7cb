use std::convert::Infallible;

use action_primitives::{settle, ConditionWait};
use roamdeck_event_bus::ChangeFilter;
use tracing::{debug, instrument};

use crate::errors::CallError;
use crate::model::QueuedAction;
use crate::policy::CallPolicy;
use crate::ports::{StagePort, Surface};
use crate::precheck;
use crate::signals::ConfirmationVeil;

pub struct RuntimeDeps<'a> {
    pub stage: &'a dyn StagePort,
    pub policy: &'a CallPolicy,
}

/// Drive one queued action through the call dialog. The caller is expected
/// to hold the single-flight lock and to bound the whole run with a deadline.
#[instrument(skip_all, fields(caller = %action.caller, control = %action.control.label))]
pub async fn execute(action: &QueuedAction, deps: RuntimeDeps<'_>) -> Result<(), CallError> {
    let stage = deps.stage;
    let timeouts = &deps.policy.timeouts;

    let caller = precheck::revalidate(stage, action)?;
    stage.activate(&caller.click_target).await?;
    debug!("caller row activated");

    // The dialog must open for this caller, not for one clicked just before.
    settle(timeouts.settle()).await;
    ConditionWait::new(stage.surface(Surface::Dialog), ChangeFilter::subtree())
        .timeout_opt(timeouts.step())
        .label(format!("dialog subject {}", caller.name()))
        .until(|| Ok::<_, Infallible>(stage.dialog_subject().as_deref() == Some(caller.name())))
        .await?;

    let spec = &action.control;
    let control = stage.dialog_control(spec.ordinal).ok_or_else(|| {
        CallError::LayoutMismatch(format!("no dialog control at position {}", spec.ordinal))
    })?;
    if control.label != spec.label {
        return Err(CallError::LayoutMismatch(format!(
            "dialog control {} is {:?}, expected {:?}",
            spec.ordinal, control.label, spec.label
        )));
    }
    stage.activate(&control.element).await?;
    debug!(ordinal = spec.ordinal, "dialog control activated");

    if action.needs_confirmation {
        confirm(&deps).await?;
    }

    settle(timeouts.settle()).await;
    ConditionWait::new(stage.surface(Surface::Dialog), ChangeFilter::attributes())
        .timeout_opt(timeouts.step())
        .label("dialog closed")
        .until(|| Ok::<_, Infallible>(!stage.dialog_displayed()))
        .await?;
    debug!("dialog closed");
    Ok(())
}

async fn confirm(deps: &RuntimeDeps<'_>) -> Result<(), CallError> {
    let stage = deps.stage;
    let timeouts = &deps.policy.timeouts;

    settle(timeouts.settle()).await;
    ConditionWait::new(stage.surface(Surface::Document), ChangeFilter::children())
        .timeout_opt(timeouts.step())
        .label("confirmation surface")
        .until(|| Ok::<_, Infallible>(stage.confirmation_present()))
        .await?;

    let _veil = ConfirmationVeil::raise(stage);
    // The box registers its controls a little after it mounts.
    settle(timeouts.confirmation_settle()).await;
    let button = ConditionWait::new(stage.surface(Surface::Confirmation), ChangeFilter::subtree())
        .timeout_opt(timeouts.step())
        .label("confirmation control")
        .until_some(|| Ok::<_, Infallible>(stage.confirmation_control()))
        .await?;
    stage.activate(&button.element).await?;
    debug!("confirmation accepted");
    Ok(())
}
