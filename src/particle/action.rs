use crate::program::ComputeProgramId;
use crate::signal::Signal;
use crate::systems::context::UpdateHook;

/// One step of a particle system's update: a shared compute program run
/// over every particle, with hooks around the dispatch.
#[derive(Debug)]
pub struct Action {
    program: ComputeProgramId,
    pub(crate) pre_update: Signal<UpdateHook>,
    pub(crate) post_update: Signal<UpdateHook>,
}

impl Action {
    pub(crate) fn new(program: ComputeProgramId) -> Self {
        Self {
            program,
            pre_update: Signal::new(),
            post_update: Signal::new(),
        }
    }

    /// Compute program run by this action.
    #[must_use]
    pub fn program(&self) -> ComputeProgramId {
        self.program
    }

    /// Runs after the particle buffers are bound and before subroutines
    /// are activated, so selections made here apply to this dispatch.
    pub fn pre_update(&mut self) -> &mut Signal<UpdateHook> {
        &mut self.pre_update
    }

    /// Runs after the dispatch and its memory barrier.
    pub fn post_update(&mut self) -> &mut Signal<UpdateHook> {
        &mut self.post_update
    }
}
