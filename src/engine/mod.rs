//! The top-level engine context.
//!
//! [`Engine`] owns the device, the program service, mesh and material
//! registries, the compute and render systems and every particle system.
//! A driver loop calls [`Engine::update_all`], then
//! [`Engine::begin_frame`] and [`Engine::draw_all`], then
//! [`Engine::end_frame`] once per simulated frame.

mod particles;
mod resources;

use std::collections::BTreeMap;

use glam::{Mat3, Mat4};

use crate::error::EngineError;
use crate::gpu::{DebugSeverity, GpuContext, GpuDevice, WgpuDevice};
use crate::options::EngineOptions;
use crate::particle::{ParticleSystem, ParticleSystemId};
use crate::program::{ProgramService, RenderProgramId};
use crate::resources::{MaterialId, MaterialManager, MeshId, MeshManager};
use crate::systems::{ComputeSystem, RenderSystem};
use crate::util::FrameTiming;

/// Particle engine over a device backend.
pub struct Engine<D: GpuDevice> {
    device: D,
    options: EngineOptions,
    programs: ProgramService,
    meshes: MeshManager,
    materials: MaterialManager,
    compute: ComputeSystem,
    render: RenderSystem,
    systems: BTreeMap<ParticleSystemId, ParticleSystem>,
    next_system: u64,
    default_program: RenderProgramId,
    default_mesh: MeshId,
    default_material: MaterialId,
    timing: FrameTiming,
    shut_down: bool,
}

impl<D: GpuDevice> Engine<D> {
    /// Create an engine over `device`.
    ///
    /// Configures the device's debug output from `options` and creates
    /// the built-in program, mesh and material.
    ///
    /// # Errors
    ///
    /// Fails when the built-in point program does not build.
    pub fn new(mut device: D, options: EngineOptions) -> Result<Self, EngineError> {
        {
            let debug = device.debug_output();
            debug.set_level(options.debug.level);
            debug.set_retain(options.debug.retain_messages);
        }
        device.set_depth_test(options.render.depth_test);

        let mut programs = ProgramService::new(options.render.default_patch_size);
        let default_program = programs
            .default_render_program(&mut device, options.render.default_point_color)?;
        let mut meshes = MeshManager::new();
        let default_mesh = meshes.default_mesh(&mut device);
        let mut materials = MaterialManager::new();
        let default_material = materials.default_material(default_program);

        let log_unresolved = options.debug.log_unresolved_bindings;
        log::info!("Engine: initialized");
        Ok(Self {
            device,
            programs,
            meshes,
            materials,
            compute: ComputeSystem::new(log_unresolved),
            render: RenderSystem::new(log_unresolved),
            systems: BTreeMap::new(),
            next_system: 0,
            default_program,
            default_mesh,
            default_material,
            timing: FrameTiming::new(options.timing.target_fps),
            options,
            shut_down: false,
        })
    }

    /// The device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable device access. Binding state changed through it must be
    /// restored before the next update or draw.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Options the engine was created with.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Minimum severity of device messages that are logged and kept.
    pub fn set_debug_level(&mut self, level: DebugSeverity) {
        self.options.debug.level = level;
        self.device.debug_output().set_level(level);
    }

    /// Toggle warnings for particle buffers without a matching block.
    pub fn set_log_unresolved_bindings(&mut self, enabled: bool) {
        self.options.debug.log_unresolved_bindings = enabled;
        self.compute.set_log_unresolved(enabled);
        self.render.set_log_unresolved(enabled);
    }

    // ── Frame ──

    /// Run every particle system's actions, in creation order.
    pub fn update_all(&mut self) {
        for system in self.systems.values_mut() {
            self.compute
                .update(&mut self.device, &mut self.programs, system);
        }
    }

    /// Clear the target with the configured color.
    pub fn begin_frame(&mut self) {
        self.render
            .begin_frame(&mut self.device, self.options.render.clear_color);
    }

    /// Draw every particle system, in creation order.
    pub fn draw_all(&mut self, view_projection: Mat4, normal_matrix: Mat3) {
        self.render.set_view_projection(view_projection);
        self.render.set_normal_matrix(normal_matrix);
        for system in self.systems.values_mut() {
            self.render.draw(
                &mut self.device,
                &mut self.programs,
                &mut self.meshes,
                &self.materials,
                system,
            );
        }
    }

    /// Block until the device is idle.
    pub fn finish(&mut self) {
        self.device.finish();
    }

    /// Whether the frame-rate cap allows starting another frame.
    #[must_use]
    pub fn should_render(&self) -> bool {
        self.timing.should_render()
    }

    /// Mark the end of a frame for fps measurement.
    pub fn end_frame(&mut self) {
        self.timing.end_frame();
    }

    /// Frame timing.
    #[must_use]
    pub fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    // ── Lifecycle ──

    /// Release every particle system, mesh and program. Later calls are
    /// no-ops; dropping the engine calls this.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        for (_, system) in std::mem::take(&mut self.systems) {
            system.release(&mut self.device);
        }
        self.meshes.release(&mut self.device);
        self.programs.release(&mut self.device);
        self.materials.clear();
        self.shut_down = true;
        log::info!("Engine: shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) ran.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Engine<WgpuDevice> {
    /// Create an engine on the default wgpu adapter.
    ///
    /// # Errors
    ///
    /// Fails when no adapter or device is available, or as
    /// [`Engine::new`] does.
    pub fn with_wgpu(options: EngineOptions) -> Result<Self, EngineError> {
        let context = GpuContext::new_blocking()?;
        Self::new(WgpuDevice::new(context), options)
    }
}

impl<D: GpuDevice> Drop for Engine<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<D: GpuDevice> std::fmt::Debug for Engine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("programs", &self.programs.len())
            .field("meshes", &self.meshes.len())
            .field("materials", &self.materials.len())
            .field("particle_systems", &self.systems.len())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::{Vec3, Vec4};

    use super::*;
    use crate::gpu::{DeviceCall, HeadlessDevice, Topology};
    use crate::program::ComputeProgramId;
    use crate::resources::RenderType;
    use crate::systems::UpdateContext;

    const IDENTITY: &str = r"
@group(0) @binding(0) var<storage, read_write> position: array<vec4<f32>>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&position)) {
        position[id.x] = position[id.x];
    }
}
";

    fn engine() -> Engine<HeadlessDevice> {
        crate::util::test_log::init();
        Engine::new(HeadlessDevice::new(), EngineOptions::default()).unwrap()
    }

    fn identity(engine: &mut Engine<HeadlessDevice>) -> ComputeProgramId {
        engine.add_source("identity.wgsl", IDENTITY).unwrap();
        engine
            .create_compute_program("identity", "identity.wgsl")
            .unwrap()
    }

    fn points(engine: &mut Engine<HeadlessDevice>, count: u32) -> ParticleSystemId {
        let (mesh, material) = (engine.default_mesh(), engine.default_material());
        engine.create_particle_system(count, mesh, material)
    }

    fn dispatches(engine: &Engine<HeadlessDevice>) -> Vec<[u32; 3]> {
        engine
            .device()
            .calls()
            .iter()
            .filter_map(|call| match call {
                DeviceCall::DispatchCompute { groups, .. } => Some(*groups),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn identity_update_preserves_mapped_positions() {
        let mut engine = engine();
        let program = identity(&mut engine);
        let id = points(&mut engine, 100);
        {
            let (system, device) = engine.particle_system_with_device(id).unwrap();
            let position = system
                .buffers_mut()
                .add_attribute::<Vec4>(device, "position")
                .unwrap();
            for (i, item) in position.map_as::<Vec4>(device).unwrap().iter_mut().enumerate() {
                *item = Vec4::new(i as f32, 0.0, 0.0, 1.0);
            }
            position.unmap(device);
            let _ = system.append_action(program);
        }

        engine.update_all();

        let (system, device) = engine.particle_system_with_device(id).unwrap();
        let values = system
            .buffers_mut()
            .attribute_mut("position")
            .unwrap()
            .read::<Vec4>(device)
            .unwrap();
        assert_eq!(values.len(), 100);
        for (i, value) in values.iter().enumerate() {
            assert_eq!(*value, Vec4::new(i as f32, 0.0, 0.0, 1.0));
        }
        assert_eq!(dispatches(&engine), vec![[2, 1, 1]]);
    }

    #[test]
    fn shared_program_dispatches_once_per_system() {
        let mut engine = engine();
        let program = identity(&mut engine);
        for count in [100, 1000] {
            let id = points(&mut engine, count);
            let (system, device) = engine.particle_system_with_device(id).unwrap();
            let _ = system
                .buffers_mut()
                .add_attribute::<Vec4>(device, "position")
                .unwrap();
            let _ = system.append_action(program);
        }
        engine.device_mut().clear_calls();

        engine.update_all();

        assert_eq!(dispatches(&engine), vec![[2, 1, 1], [16, 1, 1]]);
        let handle = engine.compute_program(program).unwrap().handle();
        let binds = engine
            .device()
            .calls()
            .iter()
            .filter(|call| **call == DeviceCall::UseProgram(handle))
            .count();
        assert_eq!(binds, 2);
    }

    #[test]
    fn swapping_twice_restores_buffers() {
        let mut engine = engine();
        let program = identity(&mut engine);
        let id = points(&mut engine, 8);
        let (current, previous) = {
            let (system, device) = engine.particle_system_with_device(id).unwrap();
            let current = system
                .buffers_mut()
                .add_attribute::<Vec4>(device, "position")
                .unwrap()
                .handle();
            let previous = system
                .buffers_mut()
                .add_attribute::<Vec4>(device, "previous")
                .unwrap()
                .handle();
            let _ = system
                .append_action(program)
                .post_update()
                .connect(Box::new(|ctx: &mut UpdateContext<'_>| {
                    ctx.swap_attributes("position", "previous").unwrap();
                }));
            (current, previous)
        };

        engine.update_all();
        let buffers = engine.particle_system(id).unwrap().buffers();
        assert_eq!(buffers.attribute("position").unwrap().handle(), previous);

        engine.update_all();
        let buffers = engine.particle_system(id).unwrap().buffers();
        assert_eq!(buffers.attribute("position").unwrap().handle(), current);
        assert_eq!(buffers.attribute("previous").unwrap().handle(), previous);
    }

    #[test]
    fn unresolved_buffers_do_not_stop_the_frame() {
        let mut engine = engine();
        let program = identity(&mut engine);
        let id = points(&mut engine, 64);
        let ran = Rc::new(RefCell::new(false));
        {
            let (system, device) = engine.particle_system_with_device(id).unwrap();
            let buffers = system.buffers_mut();
            let _ = buffers.add_attribute::<Vec4>(device, "position").unwrap();
            let _ = buffers.add_attribute::<Vec4>(device, "color").unwrap();
            let _ = buffers.add_atomic_counter(device, "alive", 1).unwrap();
            let flag = Rc::clone(&ran);
            let _ = system
                .append_action(program)
                .post_update()
                .connect(Box::new(move |_: &mut UpdateContext<'_>| {
                    *flag.borrow_mut() = true;
                }));
        }

        engine.update_all();
        engine.draw_all(Mat4::IDENTITY, Mat3::IDENTITY);

        assert!(*ran.borrow());
        assert_eq!(dispatches(&engine), vec![[1, 1, 1]]);
        assert!(engine.device().calls().iter().any(|call| matches!(
            call,
            DeviceCall::DrawElementsInstanced {
                topology: Topology::Points,
                instances: 64,
                ..
            }
        )));
    }

    #[test]
    fn frame_draws_every_system_with_its_material() {
        let mut engine = engine();
        let ico = engine.create_icosahedron("ico").unwrap();
        let solid = engine
            .create_material("solid", engine.default_program(), RenderType::Triangles)
            .unwrap();
        let _ = points(&mut engine, 3);
        let _ = engine.create_particle_system(5, ico, solid);
        engine.device_mut().clear_calls();

        engine.begin_frame();
        engine.draw_all(Mat4::from_translation(Vec3::X), Mat3::IDENTITY);
        engine.finish();
        engine.end_frame();

        let draws: Vec<(Topology, u32, u32)> = engine
            .device()
            .calls()
            .iter()
            .filter_map(|call| match call {
                DeviceCall::DrawElementsInstanced {
                    topology,
                    index_count,
                    instances,
                    ..
                } => Some((*topology, *index_count, *instances)),
                _ => None,
            })
            .collect();
        assert_eq!(
            draws,
            vec![(Topology::Points, 1, 3), (Topology::Triangles, 60, 5)]
        );
        let calls = engine.device().calls();
        assert!(matches!(calls.first(), Some(DeviceCall::Clear(_))));
        assert_eq!(calls.last(), Some(&DeviceCall::Finish));
        assert_eq!(engine.timing().frame_count(), 1);
    }

    #[test]
    fn shutdown_releases_everything_once() {
        let mut engine = engine();
        let program = identity(&mut engine);
        let id = points(&mut engine, 16);
        let removed = points(&mut engine, 4);
        for system in [id, removed] {
            let (system, device) = engine.particle_system_with_device(system).unwrap();
            let _ = system
                .buffers_mut()
                .add_attribute::<Vec4>(device, "position")
                .unwrap();
            let _ = system.append_action(program);
        }
        let before = engine.device().live_buffers();
        assert!(engine.remove_particle_system(removed));
        assert!(!engine.remove_particle_system(removed));
        assert_eq!(engine.device().live_buffers(), before - 1);
        assert_eq!(engine.particle_system_ids().collect::<Vec<_>>(), vec![id]);

        engine.shutdown();
        assert!(engine.is_shut_down());
        assert_eq!(engine.device().live_buffers(), 0);
        assert_eq!(engine.device().live_programs(), 0);
        engine.shutdown();
    }

    #[test]
    fn debug_options_configure_the_device() {
        let mut options = EngineOptions::default();
        options.debug.level = DebugSeverity::High;
        let mut engine = Engine::new(HeadlessDevice::new(), options).unwrap();
        assert_eq!(engine.device_mut().debug_output().level(), DebugSeverity::High);

        engine.set_debug_level(DebugSeverity::Notification);
        assert_eq!(
            engine.device_mut().debug_output().level(),
            DebugSeverity::Notification
        );
        assert_eq!(engine.options().debug.level, DebugSeverity::Notification);
    }
}
