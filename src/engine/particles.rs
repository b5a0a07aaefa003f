//! Particle system management for [`Engine`].

use super::Engine;
use crate::gpu::GpuDevice;
use crate::particle::{ParticleSystem, ParticleSystemId};
use crate::resources::{MaterialId, MeshId};

impl<D: GpuDevice> Engine<D> {
    /// Create a system of `particle_count` particles drawn as `mesh` with
    /// `material`. Buffers and actions are added afterwards.
    pub fn create_particle_system(
        &mut self,
        particle_count: u32,
        mesh: MeshId,
        material: MaterialId,
    ) -> ParticleSystemId {
        let id = ParticleSystemId(self.next_system);
        self.next_system += 1;
        let _ = self
            .systems
            .insert(id, ParticleSystem::new(particle_count, mesh, material));
        log::debug!("Engine: particle system {id:?} created ({particle_count} particles)");
        id
    }

    /// Particle system `id`.
    #[must_use]
    pub fn particle_system(&self, id: ParticleSystemId) -> Option<&ParticleSystem> {
        self.systems.get(&id)
    }

    /// Mutable particle system `id`.
    pub fn particle_system_mut(&mut self, id: ParticleSystemId) -> Option<&mut ParticleSystem> {
        self.systems.get_mut(&id)
    }

    /// Particle system `id` together with the device, for adding,
    /// mapping and reading its buffers.
    pub fn particle_system_with_device(
        &mut self,
        id: ParticleSystemId,
    ) -> Option<(&mut ParticleSystem, &mut dyn GpuDevice)> {
        let system = self.systems.get_mut(&id)?;
        let device: &mut dyn GpuDevice = &mut self.device;
        Some((system, device))
    }

    /// Ids of every particle system, in creation order.
    pub fn particle_system_ids(&self) -> impl Iterator<Item = ParticleSystemId> + '_ {
        self.systems.keys().copied()
    }

    /// Remove particle system `id` and release its buffers. Returns
    /// `false` when there is no such system.
    pub fn remove_particle_system(&mut self, id: ParticleSystemId) -> bool {
        match self.systems.remove(&id) {
            Some(system) => {
                system.release(&mut self.device);
                log::debug!("Engine: particle system {id:?} removed");
                true
            }
            None => false,
        }
    }
}
