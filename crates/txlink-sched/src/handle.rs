//! Control surface used by the UI and tooling

use tokio::sync::watch;
use txlink_protocol::{
    BoardCapabilities, ChannelOutputs, ModelSettings, ModuleMode, ModuleSlot, ProtocolId,
};

use crate::error::LinkError;
use crate::failsafe::capture_failsafe;
use crate::mixer::LinkStatus;
use crate::state::{
    lock, read, write, BindDestination, BindTicket, SharedEngine, SharedModel, SharedOutputs,
};

/// Cloneable handle onto a running link
///
/// Every call takes the engine or model lock briefly and never waits on the
/// mixer loop, so it is safe to call from any task or thread.
#[derive(Clone)]
pub struct LinkHandle {
    engine: SharedEngine,
    outputs: SharedOutputs,
    model: SharedModel,
    board: BoardCapabilities,
    status: watch::Receiver<LinkStatus>,
}

impl LinkHandle {
    pub(crate) fn new(
        engine: SharedEngine,
        outputs: SharedOutputs,
        status: watch::Receiver<LinkStatus>,
    ) -> Self {
        let (model, board) = {
            let engine = lock(&engine);
            (engine.model(), engine.board().clone())
        };
        Self {
            engine,
            outputs,
            model,
            board,
            status,
        }
    }

    /// Put a slot into bind mode
    pub fn start_bind(
        &self,
        slot: ModuleSlot,
        destination: BindDestination,
    ) -> Result<BindTicket, LinkError> {
        lock(&self.engine).start_bind(slot, destination)
    }

    /// Change a slot's operating mode
    pub fn set_mode(&self, slot: ModuleSlot, mode: ModuleMode) -> Result<(), LinkError> {
        lock(&self.engine).set_mode(slot, mode)
    }

    /// Protocol the slot should be running now
    pub fn required_protocol(&self, slot: ModuleSlot) -> ProtocolId {
        lock(&self.engine).required_protocol(slot)
    }

    /// Protocol currently running on the slot
    pub fn active_protocol(&self, slot: ModuleSlot) -> ProtocolId {
        lock(&self.engine).active_protocol(slot)
    }

    /// Stop all pulses (model loading)
    pub fn pause_pulses(&self) {
        lock(&self.engine).pause_pulses();
    }

    /// Resume pulses
    pub fn resume_pulses(&self) {
        lock(&self.engine).resume_pulses();
    }

    /// Returns whether pulses are paused
    pub fn is_paused(&self) -> bool {
        lock(&self.engine).is_paused()
    }

    /// Edit the model; the change is rejected if the result is invalid or
    /// asks a bay for a module the board cannot drive
    pub fn update_model<F>(&self, edit: F) -> Result<(), LinkError>
    where
        F: FnOnce(&mut ModelSettings),
    {
        let mut model = write(&self.model);
        let mut edited = model.clone();
        edit(&mut edited);
        edited.validate_for(&self.board)?;
        *model = edited;
        Ok(())
    }

    /// Copy of the current model
    pub fn model(&self) -> ModelSettings {
        read(&self.model).clone()
    }

    /// Latest mixer outputs
    pub fn outputs(&self) -> ChannelOutputs {
        *lock(&self.outputs)
    }

    /// Store the live outputs as the failsafe of `slot`'s channels
    pub fn capture_failsafe(&self, slot: ModuleSlot) {
        let outputs = *lock(&self.outputs);
        capture_failsafe(&mut write(&self.model), &outputs, slot);
    }

    /// Last published status
    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Wait for the next status publication
    pub async fn changed(&mut self) -> Option<LinkStatus> {
        self.status.changed().await.ok()?;
        Some(self.status.borrow_and_update().clone())
    }
}
