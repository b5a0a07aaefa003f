use super::binding::{bind_particle_buffers, unbind_particle_buffers};
use super::context::{GlobalGpuState, UpdateContext};
use crate::gpu::{Barriers, GpuDevice};
use crate::particle::ParticleSystem;
use crate::program::ProgramService;

/// Runs the update pass of particle systems.
///
/// Each action of a system binds its compute program and the system's
/// buffers, emits `pre_update`, activates subroutines, dispatches one
/// invocation per particle, issues a barrier and emits `post_update`.
#[derive(Debug, Clone, Default)]
pub struct ComputeSystem {
    log_unresolved: bool,
}

impl ComputeSystem {
    /// New system. `log_unresolved` warns about buffers the action's
    /// program has no block for.
    #[must_use]
    pub fn new(log_unresolved: bool) -> Self {
        Self { log_unresolved }
    }

    /// Toggle warnings for unresolved buffer names.
    pub fn set_log_unresolved(&mut self, enabled: bool) {
        self.log_unresolved = enabled;
    }

    /// Run every action of `system` in append order.
    ///
    /// An action whose program is missing or unbuilt is skipped with a
    /// warning and the pass continues with the next one.
    pub fn update(
        &self,
        device: &mut dyn GpuDevice,
        programs: &mut ProgramService,
        system: &mut ParticleSystem,
    ) {
        let particle_count = system.particle_count();
        let ParticleSystem {
            buffers, actions, ..
        } = system;

        for action in actions.iter_mut() {
            let Some(program) = programs.compute_program_mut(action.program()) else {
                log::warn!(
                    "ComputeSystem: action refers to an unknown program {:?}",
                    action.program()
                );
                continue;
            };
            if program.bind(device).is_err() {
                continue;
            }
            let _ = bind_particle_buffers(device, buffers, program, self.log_unresolved);

            action.pre_update.emit(|hook| {
                hook(&mut UpdateContext {
                    particle_count,
                    buffers: &mut *buffers,
                    program: &mut *program,
                    gpu: GlobalGpuState::new(&mut *device),
                });
            });

            program.activate_subroutines(device);
            let groups = program.groups_for(particle_count);
            if groups > 0 {
                device.dispatch_compute([groups, 1, 1]);
            }
            device.memory_barrier(Barriers::SHADER_STORAGE | Barriers::VERTEX_ATTRIB_ARRAY);

            action.post_update.emit(|hook| {
                hook(&mut UpdateContext {
                    particle_count,
                    buffers: &mut *buffers,
                    program: &mut *program,
                    gpu: GlobalGpuState::new(&mut *device),
                });
            });
        }

        device.use_program(None);
        unbind_particle_buffers(device, buffers);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec4;

    use super::*;
    use crate::gpu::{DeviceCall, HeadlessDevice, ShaderStage};
    use crate::program::tests::INTEGRATE;
    use crate::program::ComputeProgramId;
    use crate::resources::{MaterialId, MeshId};

    fn setup(device: &mut HeadlessDevice) -> (ProgramService, ComputeProgramId) {
        let mut programs = ProgramService::new(3);
        programs.add_source("integrate.wgsl", INTEGRATE).unwrap();
        let id = programs
            .create_compute_program(device, "integrate", "integrate.wgsl")
            .unwrap();
        (programs, id)
    }

    fn particles(device: &mut HeadlessDevice, count: u32) -> ParticleSystem {
        let mut system = ParticleSystem::new(count, MeshId(0), MaterialId(0));
        let _ = system.buffers_mut().add_attribute::<Vec4>(device, "position").unwrap();
        let _ = system.buffers_mut().add_attribute::<Vec4>(device, "velocity").unwrap();
        system
    }

    #[test]
    fn action_runs_bind_hook_dispatch_barrier_hook() {
        let mut device = HeadlessDevice::new();
        let (mut programs, id) = setup(&mut device);
        let mut system = particles(&mut device, 100);
        let handle = programs.compute_program(id).unwrap().handle().unwrap();

        let action = system.append_action(id);
        let _ = action.pre_update().connect(Box::new(|ctx: &mut UpdateContext<'_>| {
            ctx.select_subroutine("integrator", "damped").unwrap();
            ctx.set_uniform("time_step", 0.5_f32).unwrap();
        }));
        device.clear_calls();
        ComputeSystem::new(true).update(&mut device, &mut programs, &mut system);

        let calls = device.calls();
        let dispatch = calls
            .iter()
            .position(|call| {
                *call
                    == DeviceCall::DispatchCompute {
                        program: handle,
                        groups: [2, 1, 1],
                    }
            })
            .unwrap();
        let subroutines = calls
            .iter()
            .position(|call| matches!(call, DeviceCall::UniformSubroutines { .. }))
            .unwrap();
        assert!(subroutines < dispatch);
        assert_eq!(
            calls[dispatch + 1],
            DeviceCall::MemoryBarrier(Barriers::SHADER_STORAGE | Barriers::VERTEX_ATTRIB_ARRAY)
        );
        assert_eq!(device.active_subroutines(handle, ShaderStage::Compute), Some(&[1][..]));
        assert_eq!(device.current_program(), None);
        assert!(system.buffers().attribute("position").unwrap().binding().is_none());
    }

    #[test]
    fn actions_run_in_append_order() {
        let mut device = HeadlessDevice::new();
        let (mut programs, id) = setup(&mut device);
        let mut system = particles(&mut device, 10);
        let order = Rc::new(RefCell::new(Vec::new()));

        for name in ["A", "B", "C"] {
            let order = Rc::clone(&order);
            let _ = system
                .append_action(id)
                .pre_update()
                .connect(Box::new(move |_: &mut UpdateContext<'_>| {
                    order.borrow_mut().push(name);
                }));
        }
        ComputeSystem::new(false).update(&mut device, &mut programs, &mut system);

        assert_eq!(*order.borrow(), vec!["A", "B", "C"]);
        let dispatches = device
            .calls()
            .iter()
            .filter(|call| matches!(call, DeviceCall::DispatchCompute { .. }))
            .count();
        assert_eq!(dispatches, 3);
    }

    #[test]
    fn post_update_can_swap_attributes() {
        let mut device = HeadlessDevice::new();
        let (mut programs, id) = setup(&mut device);
        let mut system = particles(&mut device, 4);
        let position = system.buffers().attribute("position").unwrap().handle();
        let velocity = system.buffers().attribute("velocity").unwrap().handle();

        let _ = system
            .append_action(id)
            .post_update()
            .connect(Box::new(|ctx: &mut UpdateContext<'_>| {
                ctx.swap_attributes("position", "velocity").unwrap();
            }));
        ComputeSystem::new(true).update(&mut device, &mut programs, &mut system);

        assert_eq!(system.buffers().attribute("position").unwrap().handle(), velocity);
        assert_eq!(system.buffers().attribute("velocity").unwrap().handle(), position);
        assert!(system.buffers().attribute("velocity").unwrap().binding().is_none());
    }

    #[test]
    fn missing_program_skips_the_action() {
        let mut device = HeadlessDevice::new();
        let (mut programs, id) = setup(&mut device);
        let mut system = particles(&mut device, 4);
        let ran = Rc::new(RefCell::new(0));

        let counter = Rc::clone(&ran);
        let _ = system
            .append_action(ComputeProgramId(99))
            .pre_update()
            .connect(Box::new(move |_: &mut UpdateContext<'_>| {
                *counter.borrow_mut() += 1;
            }));
        let _ = system.append_action(id);
        ComputeSystem::new(true).update(&mut device, &mut programs, &mut system);

        assert_eq!(*ran.borrow(), 0);
        let dispatches = device
            .calls()
            .iter()
            .filter(|call| matches!(call, DeviceCall::DispatchCompute { .. }))
            .count();
        assert_eq!(dispatches, 1);
    }
}
