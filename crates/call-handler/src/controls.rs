//! Page controls outside the call dialog: the "calls allowed" switch, the
//! chat box and the room's about text.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use action_primitives::ConditionWait;
use roamdeck_core_types::ElementRef;
use roamdeck_event_bus::ChangeFilter;
use tracing::{debug, info};

use crate::errors::CallError;
use crate::ports::{Landmark, StagePort, Surface};

/// Wait until `landmark` is present anywhere in the document.
pub(crate) async fn await_landmark(
    stage: &dyn StagePort,
    landmark: Landmark,
    limit: Duration,
) -> Result<ElementRef, CallError> {
    let element = ConditionWait::new(stage.surface(Surface::Document), ChangeFilter::subtree())
        .timeout(limit)
        .label(landmark.to_string())
        .until_some(|| Ok::<_, Infallible>(stage.locate(landmark)))
        .await?;
    debug!(%landmark, %element, "landmark located");
    Ok(element)
}

/// The switch deciding whether listeners may call in.
pub struct AllowCalls {
    stage: Arc<dyn StagePort>,
    switch: ElementRef,
}

impl AllowCalls {
    pub async fn attach(stage: Arc<dyn StagePort>, limit: Duration) -> Result<Self, CallError> {
        let switch = await_landmark(stage.as_ref(), Landmark::CallsSwitch, limit).await?;
        Ok(Self { stage, switch })
    }

    pub fn is_enabled(&self) -> Result<bool, CallError> {
        Ok(self.stage.switch_checked(&self.switch)?)
    }

    pub async fn enable_calls(&self) -> Result<(), CallError> {
        self.set(true).await
    }

    pub async fn disable_calls(&self) -> Result<(), CallError> {
        self.set(false).await
    }

    async fn set(&self, enabled: bool) -> Result<(), CallError> {
        if self.is_enabled()? != enabled {
            self.stage.activate(&self.switch).await?;
            info!(enabled, "calls switch toggled");
        }
        Ok(())
    }
}

/// Posts messages to the room chat.
pub struct Messenger {
    stage: Arc<dyn StagePort>,
    input: ElementRef,
    send: ElementRef,
}

impl Messenger {
    pub async fn attach(stage: Arc<dyn StagePort>, limit: Duration) -> Result<Self, CallError> {
        let (input, send) = tokio::try_join!(
            await_landmark(stage.as_ref(), Landmark::MessageInput, limit),
            await_landmark(stage.as_ref(), Landmark::MessageSend, limit),
        )?;
        Ok(Self { stage, input, send })
    }

    pub async fn send_message(&self, message: &str) -> Result<(), CallError> {
        self.stage.fill_text(&self.input, message)?;
        self.stage.activate(&self.send).await?;
        info!(message, "chat message sent");
        Ok(())
    }
}

/// The room's about text, used to show the current statement.
pub struct About {
    stage: Arc<dyn StagePort>,
    input: ElementRef,
    save: ElementRef,
}

impl About {
    pub async fn attach(stage: Arc<dyn StagePort>, limit: Duration) -> Result<Self, CallError> {
        let (input, save) = tokio::try_join!(
            await_landmark(stage.as_ref(), Landmark::AboutInput, limit),
            await_landmark(stage.as_ref(), Landmark::AboutSave, limit),
        )?;
        Ok(Self { stage, input, save })
    }

    pub async fn set_about(&self, about: &str) -> Result<(), CallError> {
        self.stage.fill_text(&self.input, about)?;
        self.stage.activate(&self.save).await?;
        info!(about, "about text updated");
        Ok(())
    }
}
