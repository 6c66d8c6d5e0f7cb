use crate::ports::StagePort;

/// Marks the call dialog hidden while an automated action is in flight.
pub(crate) struct DialogBusy<'a> {
    stage: &'a dyn StagePort,
}

impl<'a> DialogBusy<'a> {
    pub(crate) fn raise(stage: &'a dyn StagePort) -> Self {
        stage.set_dialog_hidden(true);
        Self { stage }
    }
}

impl Drop for DialogBusy<'_> {
    fn drop(&mut self) {
        self.stage.set_dialog_hidden(false);
    }
}

/// Keeps the confirmation box invisible while it is clicked through.
pub(crate) struct ConfirmationVeil<'a> {
    stage: &'a dyn StagePort,
}

impl<'a> ConfirmationVeil<'a> {
    pub(crate) fn raise(stage: &'a dyn StagePort) -> Self {
        stage.set_confirmation_hidden(true);
        Self { stage }
    }
}

impl Drop for ConfirmationVeil<'_> {
    fn drop(&mut self) {
        self.stage.set_confirmation_hidden(false);
    }
}
