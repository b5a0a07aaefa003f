use super::{Action, ParticleBuffers};
use crate::gpu::GpuDevice;
use crate::program::ComputeProgramId;
use crate::resources::{MaterialId, MeshId};
use crate::signal::Signal;
use crate::systems::context::RenderHook;

/// Id of a particle system owned by an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleSystemId(pub(crate) u64);

/// A fixed number of particles, their named buffers, the actions that
/// update them, and the mesh and material they are drawn with.
#[derive(Debug)]
pub struct ParticleSystem {
    particle_count: u32,
    mesh: MeshId,
    material: MaterialId,
    pub(crate) buffers: ParticleBuffers,
    pub(crate) actions: Vec<Action>,
    pub(crate) pre_render: Signal<RenderHook>,
    pub(crate) post_render: Signal<RenderHook>,
}

impl ParticleSystem {
    pub(crate) fn new(particle_count: u32, mesh: MeshId, material: MaterialId) -> Self {
        Self {
            particle_count,
            mesh,
            material,
            buffers: ParticleBuffers::new(particle_count),
            actions: Vec::new(),
            pre_render: Signal::new(),
            post_render: Signal::new(),
        }
    }

    /// Number of particles.
    #[must_use]
    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    /// Mesh drawn once per particle.
    #[must_use]
    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    /// Material the mesh is drawn with.
    #[must_use]
    pub fn material(&self) -> MaterialId {
        self.material
    }

    /// Named buffers.
    #[must_use]
    pub fn buffers(&self) -> &ParticleBuffers {
        &self.buffers
    }

    /// Mutable named buffers.
    pub fn buffers_mut(&mut self) -> &mut ParticleBuffers {
        &mut self.buffers
    }

    /// Append an action running `program`. Actions run in append order.
    pub fn append_action(&mut self, program: ComputeProgramId) -> &mut Action {
        self.actions.push(Action::new(program));
        let last = self.actions.len() - 1;
        &mut self.actions[last]
    }

    /// Actions in execution order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Mutable actions, e.g. to connect hooks after creation.
    pub fn actions_mut(&mut self) -> &mut [Action] {
        &mut self.actions
    }

    /// Runs after the particle buffers are bound, before subroutines are
    /// activated and the draw is issued. Typically sources per-particle
    /// vertex attributes.
    pub fn pre_render(&mut self) -> &mut Signal<RenderHook> {
        &mut self.pre_render
    }

    /// Runs right after the draw, before any binding is reverted.
    pub fn post_render(&mut self) -> &mut Signal<RenderHook> {
        &mut self.post_render
    }

    pub(crate) fn release(mut self, device: &mut dyn GpuDevice) {
        self.buffers.release(device);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;
    use crate::gpu::HeadlessDevice;

    #[test]
    fn actions_keep_append_order() {
        let mut system = ParticleSystem::new(10, MeshId(0), MaterialId(0));
        for program in [2, 0, 1] {
            let _ = system.append_action(ComputeProgramId(program));
        }
        let programs: Vec<_> = system.actions().iter().map(Action::program).collect();
        assert_eq!(
            programs,
            vec![ComputeProgramId(2), ComputeProgramId(0), ComputeProgramId(1)]
        );
        assert_eq!(system.buffers().particle_count(), 10);
    }

    #[test]
    fn release_frees_every_buffer() {
        let mut device = HeadlessDevice::new();
        let mut system = ParticleSystem::new(4, MeshId(0), MaterialId(0));
        let _ = system.buffers_mut().add_attribute::<Vec4>(&mut device, "position").unwrap();
        let _ = system.buffers_mut().add_atomic_counter(&mut device, "alive", 1).unwrap();
        assert_eq!(device.live_buffers(), 2);

        system.release(&mut device);
        assert_eq!(device.live_buffers(), 0);
    }
}
